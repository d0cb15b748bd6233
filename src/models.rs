use serde::{Deserialize, Deserializer, Serialize};

/// Arguments for the return-status tool. `confirmation_code` is required and
/// must be a string; the detail flags are optional and lenient — a missing or
/// wrong-typed flag reads as false rather than failing the request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReturnStatusRequest {
    pub confirmation_code: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub with_item_details: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub with_dropoff_details: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub with_refund_details: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub with_shipping_details: bool,
}

/// Arguments for the analytical passthrough tool.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticalQueryRequest {
    pub sql_query: String,
}

/// Every tool responds with one text block.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_default_to_false() {
        let request: ReturnStatusRequest =
            serde_json::from_value(json!({"confirmation_code": "HR1A2B3C"})).unwrap();
        assert_eq!(request.confirmation_code, "HR1A2B3C");
        assert!(!request.with_item_details);
        assert!(!request.with_dropoff_details);
        assert!(!request.with_refund_details);
        assert!(!request.with_shipping_details);
    }

    #[test]
    fn wrong_typed_flags_read_as_false() {
        let request: ReturnStatusRequest = serde_json::from_value(json!({
            "confirmation_code": "HR1A2B3C",
            "with_item_details": "yes",
            "with_dropoff_details": 1,
            "with_refund_details": null,
            "with_shipping_details": true,
        }))
        .unwrap();
        assert!(!request.with_item_details);
        assert!(!request.with_dropoff_details);
        assert!(!request.with_refund_details);
        assert!(request.with_shipping_details);
    }

    #[test]
    fn wrong_typed_confirmation_code_is_a_hard_error() {
        let result: Result<ReturnStatusRequest, _> =
            serde_json::from_value(json!({"confirmation_code": 12345678}));
        assert!(result.is_err());

        let result: Result<ReturnStatusRequest, _> = serde_json::from_value(json!({}));
        assert!(result.is_err());
    }
}
