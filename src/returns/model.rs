use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One return aggregate as the return-management service reports it.
///
/// Fields outside the requested expansion paths arrive unset, so everything
/// beyond the identifying core is optional. The copy held here is
/// request-scoped: it is mutated only by the sanitizer and by received-channel
/// relabeling, and discarded once the response is produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Return {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub confirmation_code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_fees: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_method: Option<DropoffMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_shipment: Option<ReturnShipment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<Retailer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_identity: Option<CustomerIdentity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropoffMethod {
    #[serde(default)]
    pub method_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A single item instance within the return. `received_at` is null until the
/// item is dropped off or received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received_channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<InstanceRefund>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase: Option<Purchase>,
}

/// Instances sharing a refund carry the same refund id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRefund {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Purchase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnShipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retailer {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer_hosted: Option<RetailerHosted>,
}

/// Refund-timing policy fields on the retailer's hosted configuration. The
/// narrative only points at these; it never evaluates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetailerHosted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_refund_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbnl_issue_refund_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rb_issue_refund_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Identity-verification state attached to the return. Both values are
/// secrets and are blanked by the sanitizer before anything leaves the
/// process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerIdentity {
    #[serde(default)]
    pub recaptcha_value: String,
    #[serde(default)]
    pub token: String,
}
