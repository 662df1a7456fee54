//! Compatibility decoding for string-map configuration fields.
//!
//! Older task configurations encode maps such as `environment` as a list of
//! single-entry maps (`[{"A": "1"}, {"B": "2"}]`). Both shapes are accepted
//! and folded into one map; later entries win on duplicate keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringMapRepr {
    Map(BTreeMap<String, String>),
    Entries(Vec<BTreeMap<String, String>>),
}

/// Deserializes a string map from either accepted shape.
///
/// An explicit `null` yields an empty map.
///
/// # Errors
///
/// Returns the deserializer's error if the value is neither a map nor a
/// sequence of maps with string values.
pub fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<StringMapRepr>::deserialize(deserializer)?;
    Ok(match repr {
        None => BTreeMap::new(),
        Some(StringMapRepr::Map(map)) => map,
        Some(StringMapRepr::Entries(entries)) => entries.into_iter().flatten().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "string_map")]
        env: BTreeMap<String, String>,
    }

    #[test]
    fn accepts_plain_map() {
        let h: Holder = serde_json::from_str(r#"{"env": {"A": "1", "B": "2"}}"#).expect("parse");
        assert_eq!(h.env.len(), 2);
        assert_eq!(h.env["A"], "1");
    }

    #[test]
    fn folds_sequence_of_single_entry_maps() {
        let h: Holder =
            serde_json::from_str(r#"{"env": [{"A": "1"}, {"B": "2"}]}"#).expect("parse");
        assert_eq!(h.env.len(), 2);
        assert_eq!(h.env["B"], "2");
    }

    #[test]
    fn later_sequence_entries_win() {
        let h: Holder =
            serde_json::from_str(r#"{"env": [{"A": "1"}, {"A": "2"}]}"#).expect("parse");
        assert_eq!(h.env.len(), 1);
        assert_eq!(h.env["A"], "2");
    }

    #[test]
    fn null_and_missing_yield_empty_map() {
        let h: Holder = serde_json::from_str(r#"{"env": null}"#).expect("parse");
        assert!(h.env.is_empty());
        let h: Holder = serde_json::from_str("{}").expect("parse");
        assert!(h.env.is_empty());
    }

    #[test]
    fn yaml_sequence_shape_is_accepted() {
        let h: Holder = serde_yaml::from_str("env:\n  - A: \"1\"\n  - B: \"2\"\n").expect("parse");
        assert_eq!(h.env["A"], "1");
        assert_eq!(h.env["B"], "2");
    }

    #[test]
    fn rejects_non_string_values() {
        assert!(serde_json::from_str::<Holder>(r#"{"env": {"A": [1]}}"#).is_err());
    }
}
