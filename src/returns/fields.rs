use crate::models::ReturnStatusRequest;

/// The four optional detail areas a caller can request. Absent or malformed
/// request flags deserialize to false upstream, so a default `DetailFlags`
/// means "basic information only".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailFlags {
    pub item_details: bool,
    pub dropoff_details: bool,
    pub refund_details: bool,
    pub shipping_details: bool,
}

impl From<&ReturnStatusRequest> for DetailFlags {
    fn from(request: &ReturnStatusRequest) -> Self {
        Self {
            item_details: request.with_item_details,
            dropoff_details: request.with_dropoff_details,
            refund_details: request.with_refund_details,
            shipping_details: request.with_shipping_details,
        }
    }
}

/// Requested on every fetch, whatever the flags say.
pub const BASE_PATHS: [&str; 2] = ["return.processing_fees", "return.dropoff_method"];

/// Maps detail flags to the field-expansion paths the fetch must request.
/// Contributions may overlap (`return.instances`, `return.location`); the
/// remote service tolerates duplicates, so no dedup happens here.
pub fn expand_paths(flags: &DetailFlags) -> Vec<&'static str> {
    let mut paths = BASE_PATHS.to_vec();
    if flags.item_details {
        paths.push("return.instances");
    }
    if flags.dropoff_details {
        paths.extend(["return.instances", "return.location"]);
    }
    if flags.refund_details {
        paths.extend([
            "return.instances.instance_refund",
            "return.retailer.retailer_hosted",
        ]);
    }
    if flags.shipping_details {
        paths.extend(["return.location", "return.return_shipment"]);
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn path_set(flags: &DetailFlags) -> HashSet<&'static str> {
        expand_paths(flags).into_iter().collect()
    }

    #[test]
    fn base_paths_always_present() {
        for bits in 0..16u8 {
            let flags = DetailFlags {
                item_details: bits & 1 != 0,
                dropoff_details: bits & 2 != 0,
                refund_details: bits & 4 != 0,
                shipping_details: bits & 8 != 0,
            };
            let paths = path_set(&flags);
            assert!(paths.contains("return.processing_fees"), "flags {bits:04b}");
            assert!(paths.contains("return.dropoff_method"), "flags {bits:04b}");
        }
    }

    #[test]
    fn no_flags_yields_only_base_paths() {
        assert_eq!(
            path_set(&DetailFlags::default()),
            HashSet::from(["return.processing_fees", "return.dropoff_method"]),
        );
    }

    #[test]
    fn each_flag_contributes_its_paths() {
        let item = path_set(&DetailFlags {
            item_details: true,
            ..Default::default()
        });
        assert!(item.contains("return.instances"));
        assert!(!item.contains("return.location"));

        let dropoff = path_set(&DetailFlags {
            dropoff_details: true,
            ..Default::default()
        });
        assert!(dropoff.contains("return.instances"));
        assert!(dropoff.contains("return.location"));

        let refund = path_set(&DetailFlags {
            refund_details: true,
            ..Default::default()
        });
        assert!(refund.contains("return.instances.instance_refund"));
        assert!(refund.contains("return.retailer.retailer_hosted"));

        let shipping = path_set(&DetailFlags {
            shipping_details: true,
            ..Default::default()
        });
        assert!(shipping.contains("return.location"));
        assert!(shipping.contains("return.return_shipment"));
    }

    #[test]
    fn all_flags_yield_full_set() {
        let flags = DetailFlags {
            item_details: true,
            dropoff_details: true,
            refund_details: true,
            shipping_details: true,
        };
        assert_eq!(
            path_set(&flags),
            HashSet::from([
                "return.processing_fees",
                "return.dropoff_method",
                "return.instances",
                "return.location",
                "return.instances.instance_refund",
                "return.retailer.retailer_hosted",
                "return.return_shipment",
            ]),
        );
    }
}
