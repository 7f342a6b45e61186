//! Physical display identity across the two saved record formats.
//!
//! Records written by current versions carry `(connector, display name)`. Older
//! versions wrote `(connector, vendor, product, serial)`, and those must keep
//! loading and matching. The connector is never part of a display's identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDisplayRecord", into = "RawDisplayRecord")]
pub(crate) enum DisplayRecord {
    Modern {
        connector: String,
        display_name: String,
    },
    Legacy {
        connector: String,
        vendor: String,
        product: String,
        serial: String,
    },
}

// The four-field form must be tried first: a two-element array never fits it.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDisplayRecord {
    Legacy(String, String, String, String),
    Modern(String, String),
}

impl From<RawDisplayRecord> for DisplayRecord {
    fn from(raw: RawDisplayRecord) -> Self {
        match raw {
            RawDisplayRecord::Modern(connector, display_name) => DisplayRecord::Modern {
                connector,
                display_name,
            },
            RawDisplayRecord::Legacy(connector, vendor, product, serial) => {
                DisplayRecord::Legacy {
                    connector,
                    vendor,
                    product,
                    serial,
                }
            }
        }
    }
}

impl From<DisplayRecord> for RawDisplayRecord {
    fn from(record: DisplayRecord) -> Self {
        match record {
            DisplayRecord::Modern {
                connector,
                display_name,
            } => RawDisplayRecord::Modern(connector, display_name),
            DisplayRecord::Legacy {
                connector,
                vendor,
                product,
                serial,
            } => RawDisplayRecord::Legacy(connector, vendor, product, serial),
        }
    }
}

/// What a record says about the hardware, with the connector stripped off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisplayIdentity<'a> {
    Named(&'a str),
    Triplet {
        vendor: &'a str,
        product: &'a str,
        serial: &'a str,
    },
}

impl<'a> DisplayIdentity<'a> {
    /// Single name usable across formats: the display name, or the first
    /// non-empty of vendor, product, serial. Empty when nothing is known.
    pub(crate) fn comparable_name(self) -> &'a str {
        match self {
            DisplayIdentity::Named(name) => name,
            DisplayIdentity::Triplet {
                vendor,
                product,
                serial,
            } => [vendor, product, serial]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or(""),
        }
    }
}

impl DisplayRecord {
    pub(crate) fn connector(&self) -> &str {
        match self {
            DisplayRecord::Modern { connector, .. } | DisplayRecord::Legacy { connector, .. } => {
                connector
            }
        }
    }

    pub(crate) fn identity(&self) -> DisplayIdentity<'_> {
        match self {
            DisplayRecord::Modern { display_name, .. } => DisplayIdentity::Named(display_name),
            DisplayRecord::Legacy {
                vendor,
                product,
                serial,
                ..
            } => DisplayIdentity::Triplet {
                vendor,
                product,
                serial,
            },
        }
    }

    pub(crate) fn comparable_name(&self) -> &str {
        self.identity().comparable_name()
    }
}

/// True when both records describe the same piece of hardware.
///
/// Two empty identities compare equal; callers that care must check
/// [`DisplayRecord::comparable_name`] themselves.
pub(crate) fn same_display(a: &DisplayRecord, b: &DisplayRecord) -> bool {
    match (a.identity(), b.identity()) {
        (DisplayIdentity::Named(x), DisplayIdentity::Named(y)) => x == y,
        (DisplayIdentity::Triplet { .. }, DisplayIdentity::Triplet { .. }) => {
            a.identity() == b.identity()
        }
        (ia, ib) => ia.comparable_name() == ib.comparable_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn modern(connector: &str, name: &str) -> DisplayRecord {
        DisplayRecord::Modern {
            connector: connector.to_string(),
            display_name: name.to_string(),
        }
    }

    fn legacy(connector: &str, vendor: &str, product: &str, serial: &str) -> DisplayRecord {
        DisplayRecord::Legacy {
            connector: connector.to_string(),
            vendor: vendor.to_string(),
            product: product.to_string(),
            serial: serial.to_string(),
        }
    }

    fn any_record() -> impl Strategy<Value = DisplayRecord> {
        let field = prop_oneof![Just(String::new()), "[A-C]{1,2}"].boxed();
        prop_oneof![
            ("[A-Z]{2}-[1-3]", field.clone()).prop_map(|(c, n)| modern(&c, &n)),
            ("[A-Z]{2}-[1-3]", field.clone(), field.clone(), field)
                .prop_map(|(c, v, p, s)| legacy(&c, &v, &p, &s)),
        ]
    }

    #[test]
    fn modern_records_compare_display_name_only() {
        assert!(same_display(
            &modern("DP-1", "LG Monitor"),
            &modern("HDMI-2", "LG Monitor")
        ));
        assert!(!same_display(
            &modern("DP-1", "LG Monitor"),
            &modern("DP-1", "lg monitor")
        ));
    }

    #[test]
    fn legacy_records_compare_full_triplet() {
        assert!(same_display(
            &legacy("DP-1", "GSM", "27GL850", "001"),
            &legacy("DP-3", "GSM", "27GL850", "001")
        ));
        assert!(!same_display(
            &legacy("DP-1", "GSM", "27GL850", "001"),
            &legacy("DP-1", "GSM", "27GL850", "002")
        ));
    }

    #[test]
    fn mixed_records_use_first_non_empty_legacy_field() {
        assert!(same_display(
            &modern("DP-1", "27GL850"),
            &legacy("DP-2", "", "27GL850", "001")
        ));
        assert!(!same_display(
            &modern("DP-1", "27GL850"),
            &legacy("DP-2", "GSM", "27GL850", "001")
        ));
    }

    #[test]
    fn empty_identities_match_each_other() {
        assert!(same_display(&modern("DP-1", ""), &legacy("DP-2", "", "", "")));
        assert_eq!(legacy("DP-2", "", "", "").comparable_name(), "");
    }

    #[test]
    fn legacy_records_round_trip_as_four_element_arrays() {
        let record = legacy("DP-1", "GSM", "27GL850", "001");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"["DP-1","GSM","27GL850","001"]"#);
        let back: DisplayRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        let short: DisplayRecord = serde_json::from_str(r#"["DP-1","LG"]"#).unwrap();
        assert_eq!(short, modern("DP-1", "LG"));
    }

    proptest! {
        #[test]
        fn same_display_is_symmetric(a in any_record(), b in any_record()) {
            prop_assert_eq!(same_display(&a, &b), same_display(&b, &a));
        }

        #[test]
        fn same_display_is_reflexive(a in any_record()) {
            prop_assert!(same_display(&a, &a));
        }
    }
}
