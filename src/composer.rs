use crate::logistics::{LogisticsError, LogisticsSource, ReturnBag, ReturnBagInstance, Shipment, TrackedUnit};
use crate::models::ReturnStatusRequest;
use crate::returns::client::{ReturnSource, ReturnsError};
use crate::returns::fields::{DetailFlags, expand_paths};
use crate::returns::model::Return;
use crate::returns::sanitize::sanitize;
use crate::returns::vocab;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Builds the full status narrative for one return: plan the field expansion,
/// fetch the aggregate, sanitize it, walk the logistics legs the flags ask
/// for, and close with the sanitized aggregate as a reference payload.
///
/// One composition handles exactly one request; the aggregate copy is owned
/// by that request and dropped with it.
#[derive(Clone)]
pub struct Composer<R, L> {
    returns: R,
    logistics: L,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct ComposeError {
    stage: &'static str,
    message: String,
    kind: ComposeErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeErrorKind {
    InvalidInput,
    NotFound,
    Upstream,
    Internal,
}

impl ComposeError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ComposeErrorKind::InvalidInput,
        }
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ComposeErrorKind::NotFound,
        }
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ComposeErrorKind::Upstream,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ComposeErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> ComposeErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

/// Snapshot of the four return-bar logistics reads, gathered in the fixed
/// order the physical flow takes: bags, bag-to-hub shipments, hub induction,
/// outbound shipments.
#[derive(Debug, Default)]
struct ReturnBarLegs {
    bags: Vec<ReturnBag>,
    shipments: Vec<Shipment>,
    inductions: Vec<ReturnBagInstance>,
    outbound: Vec<TrackedUnit>,
}

impl<R, L> Composer<R, L>
where
    R: ReturnSource,
    L: LogisticsSource,
{
    pub fn new(returns: R, logistics: L) -> Self {
        Self { returns, logistics }
    }

    pub async fn compose(&self, request: &ReturnStatusRequest) -> Result<String, ComposeError> {
        let confirmation_code = request.confirmation_code.trim();
        if confirmation_code.is_empty() {
            return Err(ComposeError::invalid_input(
                "request",
                "confirmation_code must be provided",
            ));
        }

        let flags = DetailFlags::from(request);
        let paths = expand_paths(&flags);
        let mut retrn = self
            .returns
            .fetch_by_confirmation(confirmation_code, &paths)
            .await
            .map_err(|err| match err {
                ReturnsError::NotFound => {
                    ComposeError::not_found("fetch_return", "no return matches the confirmation code")
                }
                ReturnsError::Request(message) => ComposeError::upstream("fetch_return", message),
                ReturnsError::Deserialize(message) => {
                    ComposeError::upstream("fetch_return", message)
                }
            })?;
        sanitize(&mut retrn);

        let mut fragments: Vec<String> = Vec::new();
        fragments.push(format!(
            "The return status is currently set to {}.",
            retrn.status
        ));
        fragments.push(format!(
            "The expected total refund amount is {} if all items are returned and received. \
             Partial return may result in partial refund.",
            retrn.total
        ));

        if flags.item_details {
            fragments.push(
                "Item details are included in the `instances` field of the return JSON object below."
                    .to_string(),
            );
            fragments.push(
                "Whether an item is received/dropped-off or not is indicated by the `received_at` \
                 field in the `instances` list."
                    .to_string(),
            );
        }

        if flags.dropoff_details {
            let label = retrn
                .dropoff_method
                .as_ref()
                .and_then(|method| vocab::dropoff_method_label(&method.method_id))
                .unwrap_or("");
            fragments.push(format!(
                "The dropoff method submitted by user was {label}. The actual dropoff channel for \
                 each item is located at the `received_channel_id` field in the `instances` list."
            ));
            relabel_received_channels(&mut retrn);
        }

        if flags.refund_details {
            fragments.extend(refund_fragments());
        }

        if flags.shipping_details {
            let method_id = retrn
                .dropoff_method
                .as_ref()
                .map(|method| method.method_id.as_str())
                .unwrap_or("");
            if method_id == "return-bar" {
                let legs = self.gather_return_bar_legs(&retrn.id).await;
                fragments.extend(return_bar_fragments(&legs));
            } else if retrn.return_shipment.is_some() {
                fragments.push(
                    "This is a mail return that will be shipped directly to the retailer \
                     warehouse. The returns hub will not be involved in the shipping process."
                        .to_string(),
                );
                fragments.push(
                    "The tracking number for the shipment is located at the \
                     `return_shipment.tracking` field."
                        .to_string(),
                );
                fragments.push(
                    "The shipment departure date is located at `return_shipment.departure` field, \
                     the estimated arrival date is located at `return_shipment.estimated_arrival` \
                     field, and the delivery date is located at `return_shipment.arrival` field."
                        .to_string(),
                );
            } else {
                fragments
                    .push("Unable to determine the shipping status for this return.".to_string());
            }
        }

        let payload = serde_json::to_string(&retrn)
            .map_err(|err| ComposeError::internal("serialize_return", err.to_string()))?;
        fragments.push(format!(
            "The JSON object of the return is provided below. It can be used as reference to \
             answer return related questions, but it should not be displayed to the user \
             directly.\nJSON object: {payload}"
        ));

        Ok(fragments.join(" "))
    }

    /// Walks the return-bar legs in physical order, feeding each lookup from
    /// the previous one. Lookups that fail (or reject an empty key set) are
    /// recovered as zero rows; shipping detail is supplementary and never
    /// sinks the whole composition. A lookup whose key set is known to be
    /// empty is not attempted at all.
    async fn gather_return_bar_legs(&self, return_id: &str) -> ReturnBarLegs {
        let bags = recover(
            "bags_by_return",
            self.logistics.bags_by_return(return_id).await,
        );
        let barcodes: Vec<String> = bags.iter().map(|bag| bag.barcode.clone()).collect();
        let bag_ids: Vec<i64> = bags.iter().map(|bag| bag.id).collect();

        let shipments = if barcodes.is_empty() {
            Vec::new()
        } else {
            recover(
                "shipments_by_barcodes",
                self.logistics.shipments_by_barcodes(&barcodes).await,
            )
        };

        let inductions = if bag_ids.is_empty() {
            Vec::new()
        } else {
            recover(
                "induction_by_bag_ids",
                self.logistics.induction_by_bag_ids(&bag_ids).await,
            )
        };
        let inducted_instance_ids: Vec<String> = inductions
            .iter()
            .map(|row| row.instance_id.clone())
            .collect();

        let outbound = if inducted_instance_ids.is_empty() {
            Vec::new()
        } else {
            recover(
                "outbound_by_instance_ids",
                self.logistics
                    .outbound_by_instance_ids(&inducted_instance_ids)
                    .await,
            )
        };

        ReturnBarLegs {
            bags,
            shipments,
            inductions,
            outbound,
        }
    }
}

/// Best-effort recovery for a logistics read: an empty key set is a normal
/// no-data case, a store error is logged and degraded to no data.
fn recover<T>(operation: &'static str, result: Result<Vec<T>, LogisticsError>) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(LogisticsError::EmptyInput) => Vec::new(),
        Err(err) => {
            warn!(
                target = "retrace.logistics",
                operation,
                error = %err,
                "lookup_degraded"
            );
            Vec::new()
        }
    }
}

/// Swaps each instance's received-channel code for its display label, in
/// place, so the serialized payload and the narrative agree. Unknown codes
/// blank out, matching the upstream service's historical behavior.
fn relabel_received_channels(retrn: &mut Return) {
    for instance in &mut retrn.instances {
        if instance.received_channel_id.is_empty() {
            continue;
        }
        instance.received_channel_id = vocab::received_channel_label(&instance.received_channel_id)
            .unwrap_or_default()
            .to_string();
    }
}

// The refund-timing wording is fixed. `issue_refund_at` is referenced for
// both Mail and No Pack No Print at Return Bar returns; that duplication is
// what the retailer configuration actually does today.
fn refund_fragments() -> Vec<String> {
    [
        "The refund details for each item is located at the `refund` field in the `instances` \
         list. Multiple items may share the same refund, as indicated by the same id in the \
         `refund` field.",
        "The instance with empty `refund` field or `refunded_at` field is not refunded yet.",
        "If an item has valid `received_at` field but is not yet refunded, this is likely due to \
         the refund settings in `retailer.retailer_hosted` field.",
        "`retailer.retailer_hosted.issue_refund_at` field controls the refund timing for all Mail \
         returns.",
        "`retailer.retailer_hosted.nbnl_issue_refund_at` field controls the refund timing for all \
         Mail returns except No Pack No Print.",
        "`retailer.retailer_hosted.issue_refund_at` field controls the refund timing for No Pack \
         No Print Mail at Return Bar returns.",
        "`retailer.retailer_hosted.rb_issue_refund_at` field controls the refund timing for \
         Return Bar dropoff returns.",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn return_bar_fragments(legs: &ReturnBarLegs) -> Vec<String> {
    let mut fragments = Vec::new();

    if legs.bags.is_empty() {
        fragments.push("The return has not been dropped off at Return bar yet.".to_string());
    } else {
        fragments.push(format!(
            "The return has been dropped off at Return bar, there are {} return bags associated \
             with the return.",
            legs.bags.len()
        ));
    }

    if legs.shipments.is_empty() {
        fragments.push(
            "No shipments have been created to ship the return bags to the hub yet.".to_string(),
        );
    } else {
        fragments.push(format!(
            "{} shipments have been created to ship the return bags to the hub.",
            legs.shipments.len()
        ));
        for (position, shipment) in legs.shipments.iter().enumerate() {
            fragments.push(format!(
                "The tracking number for shipment {} is {}.",
                position + 1,
                shipment.tracking
            ));
            if let Some(departure) = shipment.departure {
                fragments.push(format!(
                    "The departure date is {}.",
                    format_timestamp(departure)
                ));
            }
            if let Some(estimated_arrival) = shipment.estimated_arrival {
                fragments.push(format!(
                    "The estimated arrival date is {}.",
                    format_timestamp(estimated_arrival)
                ));
            }
            if let Some(arrival) = shipment.arrival {
                fragments.push(format!(
                    "The delivery date is {}.",
                    format_timestamp(arrival)
                ));
            }
        }
    }

    if !legs.bags.is_empty() {
        let inducted_bag_ids: HashSet<i64> = legs
            .inductions
            .iter()
            .map(|row| row.return_bag_id)
            .collect();
        fragments.push(format!(
            "Out of the {} return bags in the return, {} have been inducted at the hub.",
            legs.bags.len(),
            inducted_bag_ids.len()
        ));
    }

    if legs.outbound.is_empty() {
        fragments.push(
            "No outbound shipments have been created to ship the return bags to the retailer \
             warehouse yet."
                .to_string(),
        );
    } else {
        fragments.push(format!(
            "The return bags have been processed by the hub and are being shipped to the retailer \
             warehouse. There are {} outbound shipments created for the return bags.",
            legs.outbound.len()
        ));
        for (position, unit) in legs.outbound.iter().enumerate() {
            fragments.push(format!(
                "The tracking number for shipment {} is {}.",
                position + 1,
                unit.tracking
            ));
            if let Some(departure) = unit.departure {
                fragments.push(format!(
                    "The departure date is {}.",
                    format_timestamp(departure)
                ));
            }
            if let Some(arrival) = unit.arrival {
                fragments.push(format!(
                    "The delivery date is {}.",
                    format_timestamp(arrival)
                ));
            }
        }
    }

    fragments
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::model::{
        CustomerIdentity, DropoffMethod, Instance, ReturnShipment,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FakeReturns {
        result: Mutex<Option<Result<Return, ReturnsError>>>,
        paths_seen: Mutex<Vec<String>>,
    }

    impl FakeReturns {
        fn ok(retrn: Return) -> Self {
            Self {
                result: Mutex::new(Some(Ok(retrn))),
                paths_seen: Mutex::new(Vec::new()),
            }
        }

        fn err(err: ReturnsError) -> Self {
            Self {
                result: Mutex::new(Some(Err(err))),
                paths_seen: Mutex::new(Vec::new()),
            }
        }

        fn paths(&self) -> Vec<String> {
            self.paths_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReturnSource for &FakeReturns {
        async fn fetch_by_confirmation(
            &self,
            _confirmation_code: &str,
            paths: &[&str],
        ) -> Result<Return, ReturnsError> {
            *self.paths_seen.lock().unwrap() =
                paths.iter().map(|path| path.to_string()).collect();
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| panic!("fetch_by_confirmation called twice"))
        }
    }

    #[derive(Default)]
    struct FakeLogistics {
        bags: Option<Result<Vec<ReturnBag>, LogisticsError>>,
        shipments: Vec<Shipment>,
        inductions: Vec<ReturnBagInstance>,
        outbound: Vec<TrackedUnit>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeLogistics {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogisticsSource for &FakeLogistics {
        async fn bags_by_return(
            &self,
            _return_id: &str,
        ) -> Result<Vec<ReturnBag>, LogisticsError> {
            self.calls.lock().unwrap().push("bags_by_return");
            match &self.bags {
                Some(Ok(bags)) => Ok(bags.clone()),
                Some(Err(LogisticsError::EmptyInput)) => Err(LogisticsError::EmptyInput),
                Some(Err(LogisticsError::Query(_))) => {
                    Err(LogisticsError::Query(sqlx::Error::PoolTimedOut))
                }
                None => Ok(Vec::new()),
            }
        }

        async fn shipments_by_barcodes(
            &self,
            barcodes: &[String],
        ) -> Result<Vec<Shipment>, LogisticsError> {
            self.calls.lock().unwrap().push("shipments_by_barcodes");
            assert!(!barcodes.is_empty(), "composer must skip empty key sets");
            Ok(self.shipments.clone())
        }

        async fn induction_by_bag_ids(
            &self,
            bag_ids: &[i64],
        ) -> Result<Vec<ReturnBagInstance>, LogisticsError> {
            self.calls.lock().unwrap().push("induction_by_bag_ids");
            assert!(!bag_ids.is_empty(), "composer must skip empty key sets");
            Ok(self.inductions.clone())
        }

        async fn outbound_by_instance_ids(
            &self,
            instance_ids: &[String],
        ) -> Result<Vec<TrackedUnit>, LogisticsError> {
            self.calls.lock().unwrap().push("outbound_by_instance_ids");
            assert!(!instance_ids.is_empty(), "composer must skip empty key sets");
            Ok(self.outbound.clone())
        }
    }

    fn request(confirmation_code: &str) -> ReturnStatusRequest {
        ReturnStatusRequest {
            confirmation_code: confirmation_code.to_string(),
            with_item_details: false,
            with_dropoff_details: false,
            with_refund_details: false,
            with_shipping_details: false,
        }
    }

    fn base_return() -> Return {
        Return {
            id: "ret-77".into(),
            confirmation_code: "HR1A2B3C".into(),
            status: "started".into(),
            total: "$42.50".into(),
            ..Default::default()
        }
    }

    fn bag(id: i64, barcode: &str) -> ReturnBag {
        ReturnBag {
            id,
            return_id: "ret-77".into(),
            location_id: None,
            retailer_id: None,
            barcode: barcode.into(),
            label_layout: None,
        }
    }

    #[tokio::test]
    async fn no_flags_yields_status_refund_and_payload_only() {
        let returns = FakeReturns::ok(base_return());
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let narrative = composer.compose(&request("HR1A2B3C")).await.unwrap();

        assert!(narrative.starts_with("The return status is currently set to started."));
        assert!(narrative.contains(
            "The expected total refund amount is $42.50 if all items are returned and received. \
             Partial return may result in partial refund."
        ));
        assert!(narrative.contains("The JSON object of the return is provided below."));
        assert!(!narrative.contains("Item details"));
        assert!(!narrative.contains("dropoff method"));
        assert!(!narrative.contains("refund timing"));
        assert!(!narrative.contains("shipping"));
        assert_eq!(
            returns.paths(),
            vec!["return.processing_fees", "return.dropoff_method"],
        );
        assert!(logistics.calls().is_empty());
    }

    #[tokio::test]
    async fn dropoff_details_names_method_and_relabels_channels() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "mail-nolabel".into(),
            submitted_at: None,
        });
        retrn.instances = vec![
            Instance {
                id: "inst-1".into(),
                received_channel_id: "hosted".into(),
                ..Default::default()
            },
            Instance {
                id: "inst-2".into(),
                received_channel_id: String::new(),
                ..Default::default()
            },
        ];
        let returns = FakeReturns::ok(retrn);
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_dropoff_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains("The dropoff method submitted by user was No Print Mail."));
        assert!(narrative.contains("\"received_channel_id\":\"Mail\""));
        // The untouched empty channel stays empty.
        assert!(narrative.contains("\"received_channel_id\":\"\""));
    }

    #[tokio::test]
    async fn refund_details_emits_the_fixed_guidance() {
        let returns = FakeReturns::ok(base_return());
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_refund_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains(
            "`retailer.retailer_hosted.rb_issue_refund_at` field controls the refund timing for \
             Return Bar dropoff returns."
        ));
        assert_eq!(narrative.matches("issue_refund_at").count(), 4);
    }

    #[tokio::test]
    async fn return_bar_with_no_bags_skips_downstream_lookups() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "return-bar".into(),
            submitted_at: None,
        });
        let returns = FakeReturns::ok(retrn);
        let logistics = FakeLogistics {
            bags: Some(Ok(Vec::new())),
            ..Default::default()
        };
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains("The return has not been dropped off at Return bar yet."));
        assert!(narrative
            .contains("No shipments have been created to ship the return bags to the hub yet."));
        assert!(narrative.contains(
            "No outbound shipments have been created to ship the return bags to the retailer \
             warehouse yet."
        ));
        assert!(!narrative.contains("have been inducted at the hub"));
        assert_eq!(logistics.calls(), vec!["bags_by_return"]);
    }

    #[tokio::test]
    async fn return_bar_reports_bags_shipments_and_induction() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "return-bar".into(),
            submitted_at: None,
        });
        let returns = FakeReturns::ok(retrn);
        let departure = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let logistics = FakeLogistics {
            bags: Some(Ok(vec![bag(11, "BC-11"), bag(12, "BC-12")])),
            shipments: vec![Shipment {
                id: "ship-1".into(),
                carrier: "UPS".into(),
                tracking: "1Z999".into(),
                departure: Some(departure),
                estimated_arrival: None,
                arrival: None,
            }],
            ..Default::default()
        };
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains(
            "The return has been dropped off at Return bar, there are 2 return bags associated \
             with the return."
        ));
        assert!(narrative
            .contains("1 shipments have been created to ship the return bags to the hub."));
        assert!(narrative.contains("The tracking number for shipment 1 is 1Z999."));
        assert!(narrative.contains("The departure date is 2025-03-14T09:30:00Z."));
        assert!(!narrative.contains("The delivery date is"));
        assert!(narrative
            .contains("Out of the 2 return bags in the return, 0 have been inducted at the hub."));
        assert!(narrative.contains(
            "No outbound shipments have been created to ship the return bags to the retailer \
             warehouse yet."
        ));
        // No induction rows, so the outbound lookup never runs.
        assert_eq!(
            logistics.calls(),
            vec![
                "bags_by_return",
                "shipments_by_barcodes",
                "induction_by_bag_ids",
            ],
        );
    }

    #[tokio::test]
    async fn return_bar_counts_distinct_inducted_bags_and_reports_outbound() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "return-bar".into(),
            submitted_at: None,
        });
        let returns = FakeReturns::ok(retrn);
        let arrival = Utc.with_ymd_and_hms(2025, 4, 2, 18, 0, 0).unwrap();
        let logistics = FakeLogistics {
            bags: Some(Ok(vec![bag(11, "BC-11"), bag(12, "BC-12")])),
            inductions: vec![
                ReturnBagInstance {
                    id: 1,
                    return_bag_id: 11,
                    instance_id: "inst-1".into(),
                },
                ReturnBagInstance {
                    id: 2,
                    return_bag_id: 11,
                    instance_id: "inst-2".into(),
                },
            ],
            outbound: vec![TrackedUnit {
                id: "tu-1".into(),
                carrier: "FedEx".into(),
                tracking: "FX123".into(),
                departure: None,
                arrival: Some(arrival),
            }],
            ..Default::default()
        };
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative
            .contains("Out of the 2 return bags in the return, 1 have been inducted at the hub."));
        assert!(narrative.contains(
            "The return bags have been processed by the hub and are being shipped to the \
             retailer warehouse. There are 1 outbound shipments created for the return bags."
        ));
        assert!(narrative.contains("The tracking number for shipment 1 is FX123."));
        assert!(narrative.contains("The delivery date is 2025-04-02T18:00:00Z."));
        assert_eq!(
            logistics.calls(),
            vec![
                "bags_by_return",
                "shipments_by_barcodes",
                "induction_by_bag_ids",
                "outbound_by_instance_ids",
            ],
        );
    }

    #[tokio::test]
    async fn mail_return_with_shipment_points_at_the_shipment_record() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "mail".into(),
            submitted_at: None,
        });
        retrn.return_shipment = Some(ReturnShipment {
            carrier: Some("USPS".into()),
            tracking: Some("9400-111".into()),
            ..Default::default()
        });
        let returns = FakeReturns::ok(retrn);
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains(
            "This is a mail return that will be shipped directly to the retailer warehouse."
        ));
        assert!(narrative.contains("`return_shipment.tracking` field."));
        assert!(logistics.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_method_without_shipment_reports_undetermined_status() {
        let returns = FakeReturns::ok(base_return());
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains("Unable to determine the shipping status for this return."));
        assert!(!narrative.contains("dropped off"));
        assert!(!narrative.contains("shipments have been created"));
        assert!(logistics.calls().is_empty());
    }

    #[tokio::test]
    async fn bags_lookup_failure_degrades_to_no_data() {
        let mut retrn = base_return();
        retrn.dropoff_method = Some(DropoffMethod {
            method_id: "return-bar".into(),
            submitted_at: None,
        });
        let returns = FakeReturns::ok(retrn);
        let logistics = FakeLogistics {
            bags: Some(Err(LogisticsError::Query(sqlx::Error::PoolTimedOut))),
            ..Default::default()
        };
        let composer = Composer::new(&returns, &logistics);

        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;
        let narrative = composer.compose(&req).await.unwrap();

        assert!(narrative.contains("The return has not been dropped off at Return bar yet."));
    }

    #[tokio::test]
    async fn payload_is_sanitized_before_serialization() {
        let mut retrn = base_return();
        retrn.itemization = Some("raw-itemization".into());
        retrn.customer_identity = Some(CustomerIdentity {
            recaptcha_value: "challenge-answer".into(),
            token: "secret-session".into(),
        });
        let returns = FakeReturns::ok(retrn);
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let narrative = composer.compose(&request("HR1A2B3C")).await.unwrap();

        assert!(!narrative.contains("raw-itemization"));
        assert!(!narrative.contains("challenge-answer"));
        assert!(!narrative.contains("secret-session"));
    }

    #[tokio::test]
    async fn missing_confirmation_code_is_rejected_before_fetching() {
        let returns = FakeReturns::ok(base_return());
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let err = composer.compose(&request("   ")).await.unwrap_err();
        assert_eq!(err.kind(), ComposeErrorKind::InvalidInput);
        assert_eq!(err.stage(), "request");
        assert!(returns.paths().is_empty());
    }

    #[tokio::test]
    async fn remote_not_found_aborts_composition() {
        let returns = FakeReturns::err(ReturnsError::NotFound);
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let err = composer.compose(&request("HR1A2B3C")).await.unwrap_err();
        assert_eq!(err.kind(), ComposeErrorKind::NotFound);
        assert_eq!(err.stage(), "fetch_return");
    }

    #[tokio::test]
    async fn remote_transport_failure_surfaces_as_upstream() {
        let returns = FakeReturns::err(ReturnsError::Request("connection reset".into()));
        let logistics = FakeLogistics::default();
        let composer = Composer::new(&returns, &logistics);

        let err = composer.compose(&request("HR1A2B3C")).await.unwrap_err();
        assert_eq!(err.kind(), ComposeErrorKind::Upstream);
        assert!(err.detail().contains("connection reset"));
    }

    #[tokio::test]
    async fn narrative_is_deterministic_for_fixed_inputs() {
        let mut req = request("HR1A2B3C");
        req.with_shipping_details = true;

        let mut narratives = Vec::new();
        for _ in 0..2 {
            let mut retrn = base_return();
            retrn.dropoff_method = Some(DropoffMethod {
                method_id: "return-bar".into(),
                submitted_at: None,
            });
            let returns = FakeReturns::ok(retrn);
            let logistics = FakeLogistics {
                bags: Some(Ok(vec![bag(11, "BC-11")])),
                ..Default::default()
            };
            let composer = Composer::new(&returns, &logistics);
            narratives.push(composer.compose(&req).await.unwrap());
        }
        assert_eq!(narratives[0], narratives[1]);
    }
}
