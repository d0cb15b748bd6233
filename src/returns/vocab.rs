//! Static code-to-label vocabularies for dropoff methods and received
//! channels. Unknown codes resolve to `None`; callers decide whether that
//! means an empty label (matching the upstream service's behavior).

pub const DROPOFF_METHOD_LABELS: &[(&str, &str)] = &[
    ("return-bar", "Return Bar"),
    ("mail", "Mail"),
    ("mail-shopper-provided", "Shopper Provided Label Mail"),
    ("retailer-store", "Retailer Store"),
    ("mail-nolabel", "No Print Mail"),
    ("mail-nobox-nolabel", "No Pack No Print Mail at Return Bar"),
];

pub const RECEIVED_CHANNEL_LABELS: &[(&str, &str)] = &[
    ("app", "Return Bar Dropoff"),
    ("store-app", "Retailer Store Dropoff"),
    ("hosted", "Mail"),
    ("mail-nolabel", "No Print Mail"),
    ("mail-nobox-nolabel", "No Pack No Print Mail at Return Bar"),
    ("mail-shopper-provided", "Shopper Provided Label Mail"),
    ("retailer-dashboard", "Approved by Retailer Dashboard"),
    ("returnless", "Returnless Refund"),
];

pub fn dropoff_method_label(code: &str) -> Option<&'static str> {
    DROPOFF_METHOD_LABELS
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, label)| *label)
}

pub fn received_channel_label(code: &str) -> Option<&'static str> {
    RECEIVED_CHANNEL_LABELS
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropoff_codes_resolve() {
        assert_eq!(dropoff_method_label("return-bar"), Some("Return Bar"));
        assert_eq!(dropoff_method_label("mail-nolabel"), Some("No Print Mail"));
        assert_eq!(
            dropoff_method_label("mail-nobox-nolabel"),
            Some("No Pack No Print Mail at Return Bar"),
        );
    }

    #[test]
    fn received_channel_codes_resolve() {
        assert_eq!(received_channel_label("hosted"), Some("Mail"));
        assert_eq!(
            received_channel_label("retailer-dashboard"),
            Some("Approved by Retailer Dashboard"),
        );
    }

    #[test]
    fn unknown_codes_resolve_to_none() {
        assert_eq!(dropoff_method_label("carrier-pigeon"), None);
        assert_eq!(received_channel_label(""), None);
    }
}
