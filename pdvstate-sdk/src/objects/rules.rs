//! Rule document served by `GET /config/rules`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The raw, uncompiled rule set as published by the collector.
///
/// Both fields fall back to empty values when absent; only a body that is
/// not valid JSON (or has the wrong shape) is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesDocument {
    #[serde(default)]
    pub version: String,
    /// Ordered rule lists keyed by log channel name.
    #[serde(default)]
    pub rules: HashMap<String, Vec<RuleEntry>>,
}

/// A single pattern-to-event mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default)]
    pub regex: String,
    #[serde(rename = "eventType", default)]
    pub event_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_document_parsing() {
        let body = r#"{
            "version": "7",
            "rules": {
                "log1": [
                    {"regex": "ERR-(?P<code>\\d+)", "eventType": "ERROR_CODE"},
                    {"regex": "WARN", "eventType": "WARNING"}
                ]
            }
        }"#;
        let doc: RulesDocument = serde_json::from_str(body).unwrap();
        assert_eq!(doc.version, "7");
        let log1 = &doc.rules["log1"];
        assert_eq!(log1.len(), 2);
        assert_eq!(log1[0].regex, r"ERR-(?P<code>\d+)");
        assert_eq!(log1[1].event_type, "WARNING");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let doc: RulesDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, RulesDocument::default());
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(serde_json::from_str::<RulesDocument>("{\"version\": ").is_err());
        assert!(serde_json::from_str::<RulesDocument>("[1, 2]").is_err());
    }
}
