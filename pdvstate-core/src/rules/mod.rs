//! Versioned, per-channel pattern rules.
//!
//! A [`RuleSet`] is compiled once from the collector's [`RulesDocument`] and
//! never mutated afterwards; updates replace the whole set in the
//! [`RuleStore`]. Within a channel, rules are tested in order and the first
//! match wins.

mod fetcher;
mod store;

pub use fetcher::{FetchError, FetchRuleSet, FetchRuleVersion, RuleFetcher, RuleSource};
pub use store::{RuleStore, RuleStoreWatcher};

use pdvstate_sdk::objects::RulesDocument;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// A single pattern-to-event rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub event_type: String,
    /// `None` when `pattern` failed to compile; such a rule never matches.
    pub matcher: Option<Regex>,
}

impl Rule {
    /// Compile `pattern`, logging a warning when it is invalid.
    pub fn compile(channel: &str, pattern: impl Into<String>, event_type: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let event_type = event_type.into();
        let matcher = match Regex::new(&pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(
                    channel,
                    %pattern,
                    %event_type,
                    error = %e,
                    "Invalid rule pattern, rule disabled"
                );
                None
            }
        };
        Self {
            pattern,
            event_type,
            matcher,
        }
    }

    /// Named captures of `line` if this rule matches it.
    ///
    /// Every named group of the pattern is present in the result; groups that
    /// did not take part in the match map to an empty string.
    pub fn captures(&self, line: &str) -> Option<BTreeMap<String, String>> {
        let regex = self.matcher.as_ref()?;
        let caps = regex.captures(line)?;
        let data = regex
            .capture_names()
            .flatten()
            .map(|name| {
                let value = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
                (name.to_string(), value.to_string())
            })
            .collect();
        Some(data)
    }
}

/// Result of matching one line against a channel's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Position of the matching rule in the channel's list.
    pub index: usize,
    pub event_type: String,
    pub data: BTreeMap<String, String>,
}

/// An immutable, versioned collection of per-channel rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub version: String,
    pub rules: HashMap<String, Vec<Rule>>,
}

impl RuleSet {
    /// Compile every entry of `document`.
    ///
    /// Invalid patterns do not fail the compilation; the affected rules stay
    /// in the set with no matcher.
    pub fn compile(document: RulesDocument) -> Self {
        let rules = document
            .rules
            .into_iter()
            .map(|(channel, entries)| {
                let compiled = entries
                    .into_iter()
                    .map(|entry| Rule::compile(&channel, entry.regex, entry.event_type))
                    .collect();
                (channel, compiled)
            })
            .collect();
        Self {
            version: document.version,
            rules,
        }
    }

    /// Rules for `channel`, in evaluation order. Empty for unknown channels.
    pub fn rules_for(&self, channel: &str) -> &[Rule] {
        self.rules.get(channel).map(Vec::as_slice).unwrap_or_default()
    }

    /// Channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.rules.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Number of rules whose pattern failed to compile.
    pub fn disabled_rules(&self) -> usize {
        self.rules
            .values()
            .flatten()
            .filter(|rule| rule.matcher.is_none())
            .count()
    }

    /// Test `line` against the rules of `channel` in order and return the
    /// first match. Later rules are not evaluated.
    pub fn first_match(&self, channel: &str, line: &str) -> Option<RuleMatch> {
        self.rules_for(channel)
            .iter()
            .enumerate()
            .find_map(|(index, rule)| {
                rule.captures(line).map(|data| RuleMatch {
                    index,
                    event_type: rule.event_type.clone(),
                    data,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdvstate_sdk::objects::RuleEntry;

    fn document(version: &str, rules: Vec<(&str, Vec<(&str, &str)>)>) -> RulesDocument {
        RulesDocument {
            version: version.to_string(),
            rules: rules
                .into_iter()
                .map(|(channel, entries)| {
                    let entries = entries
                        .into_iter()
                        .map(|(regex, event_type)| RuleEntry {
                            regex: regex.to_string(),
                            event_type: event_type.to_string(),
                        })
                        .collect();
                    (channel.to_string(), entries)
                })
                .collect(),
        }
    }

    #[test]
    fn test_named_captures_become_event_data() {
        let set = RuleSet::compile(document(
            "1",
            vec![("log1", vec![(r"ERR-(?P<code>\d+)", "ERROR_CODE")])],
        ));

        let found = set.first_match("log1", "2024 ERR-42 occurred").unwrap();

        assert_eq!(found.event_type, "ERROR_CODE");
        assert_eq!(
            found.data,
            BTreeMap::from([("code".to_string(), "42".to_string())])
        );
    }

    #[test]
    fn test_first_match_wins() {
        let set = RuleSet::compile(document(
            "1",
            vec![(
                "logtef",
                vec![
                    (r"RC=(?P<rc>\d+)", "ERRO_TEF"),
                    (r"RC=(?P<rc>\d+) (?P<msg>.+)", "ERRO_TEF_DETALHADO"),
                ],
            )],
        ));

        let found = set.first_match("logtef", "RC=12 cartao recusado").unwrap();

        assert_eq!(found.index, 0);
        assert_eq!(found.event_type, "ERRO_TEF");
        assert_eq!(found.data.len(), 1);
        assert_eq!(found.data["rc"], "12");
    }

    #[test]
    fn test_unnamed_groups_are_not_reported() {
        let set = RuleSet::compile(document(
            "1",
            vec![("log1", vec![(r"(\d+) itens, total (?P<valor>[\d,]+)", "VENDA_DETALHES")])],
        ));

        let found = set.first_match("log1", "3 itens, total 10,50").unwrap();

        assert_eq!(
            found.data,
            BTreeMap::from([("valor".to_string(), "10,50".to_string())])
        );
    }

    #[test]
    fn test_non_participating_group_maps_to_empty_string() {
        let set = RuleSet::compile(document(
            "1",
            vec![("log1", vec![(r"PAGO(?: via (?P<forma>\w+))?", "PAGAMENTO")])],
        ));

        let found = set.first_match("log1", "PAGO").unwrap();

        assert_eq!(found.data["forma"], "");
    }

    #[test]
    fn test_invalid_pattern_is_inert_but_kept() {
        let set = RuleSet::compile(document(
            "1",
            vec![
                ("log1", vec![("ERR-(", "BROKEN"), ("ERR-(?P<code>\\d+)", "ERROR_CODE")]),
                ("log2", vec![("OK", "FINE")]),
            ],
        ));

        assert_eq!(set.rules_for("log1").len(), 2);
        assert_eq!(set.disabled_rules(), 1);
        let found = set.first_match("log1", "ERR-7").unwrap();
        assert_eq!(found.event_type, "ERROR_CODE");
        assert_eq!(found.index, 1);
        assert!(set.first_match("log2", "all OK").is_some());
    }

    #[test]
    fn test_unknown_channel_or_no_match_yields_nothing() {
        let set = RuleSet::compile(document("1", vec![("log1", vec![("ERR", "E")])]));
        assert!(set.first_match("log1", "everything fine").is_none());
        assert!(set.first_match("other", "ERR").is_none());
        assert!(set.rules_for("other").is_empty());
    }

    #[test]
    fn test_channels_are_sorted() {
        let set = RuleSet::compile(document(
            "3",
            vec![("logtef", vec![]), ("logpdv", vec![]), ("logecf", vec![])],
        ));
        assert_eq!(set.channels(), vec!["logecf", "logpdv", "logtef"]);
        assert_eq!(set.version, "3");
    }
}
