use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelRequirement {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

/// Label selector: every `match_labels` pair and every expression must hold.
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn with_requirement(
        mut self,
        key: impl Into<String>,
        operator: SelectorOperator,
        values: Vec<String>,
    ) -> Self {
        self.match_expressions.push(LabelRequirement {
            key: key.into(),
            operator,
            values,
        });
        self
    }

    pub fn without_label(self, key: impl Into<String>) -> Self {
        self.with_requirement(key, SelectorOperator::DoesNotExist, Vec::new())
    }

    pub fn is_everything(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        for r in &self.match_expressions {
            parts.push(match r.operator {
                SelectorOperator::In => format!("{} in ({})", r.key, r.values.join(",")),
                SelectorOperator::NotIn => format!("{} notin ({})", r.key, r.values.join(",")),
                SelectorOperator::Exists => r.key.clone(),
                SelectorOperator::DoesNotExist => format!("!{}", r.key),
            });
        }
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(LabelSelector::everything().matches(&HashMap::new()));
        assert!(LabelSelector::everything().matches(&labels(&[("a", "b")])));
    }

    #[test]
    fn match_labels_require_equality() {
        let sel = LabelSelector::everything()
            .with_label("tenant", "t1")
            .with_label("principal", "p1");
        assert!(sel.matches(&labels(&[("tenant", "t1"), ("principal", "p1"), ("x", "y")])));
        assert!(!sel.matches(&labels(&[("tenant", "t1")])));
        assert!(!sel.matches(&labels(&[("tenant", "t2"), ("principal", "p1")])));
    }

    #[test]
    fn expressions() {
        let sel = LabelSelector::everything().with_requirement(
            "key",
            SelectorOperator::In,
            vec!["a".into(), "b".into()],
        );
        assert!(sel.matches(&labels(&[("key", "b")])));
        assert!(!sel.matches(&labels(&[("key", "c")])));
        assert!(!sel.matches(&HashMap::new()));

        let not_global = LabelSelector::everything()
            .with_label("principal", "p1")
            .without_label("global");
        assert!(not_global.matches(&labels(&[("principal", "p1")])));
        assert!(!not_global.matches(&labels(&[("principal", "p1"), ("global", "true")])));

        let not_in =
            LabelSelector::everything().with_requirement("k", SelectorOperator::NotIn, vec!["x".into()]);
        assert!(not_in.matches(&HashMap::new()));
        assert!(!not_in.matches(&labels(&[("k", "x")])));
    }

    #[test]
    fn display_is_readable() {
        let sel = LabelSelector::everything()
            .with_label("a", "1")
            .without_label("g");
        assert_eq!(sel.to_string(), "a=1,!g");
    }
}
