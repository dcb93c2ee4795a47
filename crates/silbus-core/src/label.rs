//! Matching labels for publish/subscribe and RPC endpoints.
//!
//! Labels are key/value pairs attached to publishers, subscribers and RPC
//! endpoints. They travel inside a service's supplemental data as a
//! JSON-serialised list and decide, together with topic/function name and
//! media type, whether two endpoints are connected.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SilbusError};

/// How strictly a label constrains the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    /// The key must be present on the other side with the same value.
    Mandatory,
    /// The key may be absent on the other side; if present, the value must
    /// match.
    Optional,
}

/// A single matching label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingLabel {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
    /// Matching strictness.
    pub kind: LabelKind,
}

impl MatchingLabel {
    /// Construct a mandatory label.
    pub fn mandatory(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: LabelKind::Mandatory,
        }
    }

    /// Construct an optional label.
    pub fn optional(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: LabelKind::Optional,
        }
    }
}

fn find_label_by_key<'a>(key: &str, labels: &'a [MatchingLabel]) -> Option<&'a MatchingLabel> {
    labels.iter().find(|label| label.key == key)
}

fn label_matches_list(label: &MatchingLabel, labels: &[MatchingLabel]) -> bool {
    match find_label_by_key(&label.key, labels) {
        None => {
            // Mandatory labels must exist; optional labels that do not exist
            // are ignored.
            label.kind != LabelKind::Mandatory
        }
        Some(found) => found.value == label.value,
    }
}

/// Check whether two label lists match.
///
/// Matching is symmetric: each side's labels are checked against the other
/// side's list.
pub fn match_labels(labels1: &[MatchingLabel], labels2: &[MatchingLabel]) -> bool {
    labels1
        .iter()
        .all(|label| label_matches_list(label, labels2))
        && labels2
            .iter()
            .all(|label| label_matches_list(label, labels1))
}

/// Serialise a label list for embedding into supplemental data.
pub fn encode_labels(labels: &[MatchingLabel]) -> String {
    // Serialising a Vec of plain structs cannot fail.
    serde_json::to_string(labels).unwrap_or_default()
}

/// Parse a label list out of supplemental data.
pub fn decode_labels(value: &str) -> Result<Vec<MatchingLabel>> {
    serde_json::from_str(value)
        .map_err(|error| SilbusError::protocol(format!("malformed label list: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lists_match() {
        assert!(match_labels(&[], &[]));
    }

    #[test]
    fn mandatory_requires_presence_and_value() {
        let wanted = [MatchingLabel::mandatory("kind", "brake")];
        assert!(!match_labels(&wanted, &[]));
        assert!(!match_labels(
            &wanted,
            &[MatchingLabel::mandatory("kind", "steering")]
        ));
        assert!(match_labels(
            &wanted,
            &[MatchingLabel::mandatory("kind", "brake")]
        ));
        assert!(match_labels(
            &wanted,
            &[MatchingLabel::optional("kind", "brake")]
        ));
    }

    #[test]
    fn optional_allows_absence() {
        let wanted = [MatchingLabel::optional("kind", "brake")];
        assert!(match_labels(&wanted, &[]));
        assert!(!match_labels(
            &wanted,
            &[MatchingLabel::optional("kind", "steering")]
        ));
    }

    #[test]
    fn matching_is_symmetric() {
        // The other side's mandatory label binds us as well.
        let ours = [MatchingLabel::optional("kind", "brake")];
        let theirs = [
            MatchingLabel::mandatory("kind", "brake"),
            MatchingLabel::mandatory("instance", "front"),
        ];
        assert!(!match_labels(&ours, &theirs));
        assert!(!match_labels(&theirs, &ours));
    }

    mod properties {
        use crate::label::{match_labels, LabelKind, MatchingLabel};
        use proptest::prelude::*;

        fn label_strategy() -> impl Strategy<Value = MatchingLabel> {
            (
                proptest::sample::select(vec!["kA", "kB"]),
                proptest::sample::select(vec!["v1", "v2"]),
                proptest::bool::ANY,
            )
                .prop_map(|(key, value, mandatory)| MatchingLabel {
                    key: key.to_string(),
                    value: value.to_string(),
                    kind: if mandatory {
                        LabelKind::Mandatory
                    } else {
                        LabelKind::Optional
                    },
                })
        }

        proptest! {
            #[test]
            fn matching_is_order_independent(
                a in proptest::collection::vec(label_strategy(), 0..4),
                b in proptest::collection::vec(label_strategy(), 0..4),
            ) {
                prop_assert_eq!(match_labels(&a, &b), match_labels(&b, &a));
            }
        }
    }

    #[test]
    fn labels_round_trip_through_supplemental_encoding() {
        let labels = vec![
            MatchingLabel::mandatory("kind", "brake"),
            MatchingLabel::optional("instance", "front"),
        ];
        let encoded = encode_labels(&labels);
        assert_eq!(decode_labels(&encoded).unwrap(), labels);
        assert!(decode_labels("not json").is_err());
    }
}
