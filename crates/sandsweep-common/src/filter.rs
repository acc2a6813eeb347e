//! Property filter rules
//!
//! A filter rule extracts a named property from a resource and evaluates a
//! match expression against it; a positive match marks the resource as
//! untouchable. The engine treats the expression as opaque and only calls
//! [`Filter::matches`].

use anyhow::{Context, Result};
use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;

/// The match expression operator of a filter rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Exact string equality (the default).
    #[default]
    Exact,
    /// Substring containment.
    Contains,
    /// Shell-style glob (`*`, `?`, `[...]`).
    Glob,
    /// Regular expression.
    Regex,
    /// Membership in `values`.
    In,
    /// Numeric greater-than against `value`.
    Gt,
    /// Numeric less-than against `value`.
    Lt,
}

/// One configured filter rule: `(property, match-expression, invert)`.
///
/// In YAML a rule is either a bare string, shorthand for an exact match
/// against the resource identity, or a mapping:
///
/// ```yaml
/// filters:
///   S3Bucket:
///     - keep-me
///     - property: Name
///       type: glob
///       value: "logs-*"
///       invert: true
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Property to extract; empty means the resource identity.
    pub property: String,
    pub kind: MatchKind,
    pub value: String,
    /// Candidate set for `in` expressions.
    pub values: Vec<String>,
    /// Negates the match result.
    pub invert: bool,
}

impl Filter {
    /// Shorthand rule: exact match of `value` against the resource identity.
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Evaluate the match expression against an extracted property value.
    ///
    /// Does not apply `invert`; the caller owns negation.
    pub fn matches(&self, value: &str) -> Result<bool> {
        match self.kind {
            MatchKind::Exact => Ok(self.value == value),
            MatchKind::Contains => Ok(value.contains(&self.value)),
            MatchKind::Glob => {
                let glob = globset::Glob::new(&self.value)
                    .with_context(|| format!("invalid glob pattern {:?}", self.value))?;
                Ok(glob.compile_matcher().is_match(value))
            }
            MatchKind::Regex => {
                let re = regex::Regex::new(&self.value)
                    .with_context(|| format!("invalid regex pattern {:?}", self.value))?;
                Ok(re.is_match(value))
            }
            MatchKind::In => Ok(self.values.iter().any(|v| v == value)),
            MatchKind::Gt => {
                let (extracted, configured) = self.parse_numbers(value)?;
                Ok(extracted > configured)
            }
            MatchKind::Lt => {
                let (extracted, configured) = self.parse_numbers(value)?;
                Ok(extracted < configured)
            }
        }
    }

    /// Parse `(extracted, configured)` for numeric comparisons.
    fn parse_numbers(&self, value: &str) -> Result<(f64, f64)> {
        let extracted: f64 = value
            .parse()
            .with_context(|| format!("property value {value:?} is not numeric"))?;
        let configured: f64 = self
            .value
            .parse()
            .with_context(|| format!("filter value {:?} is not numeric", self.value))?;
        Ok((extracted, configured))
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Shorthand(String),
            Full {
                #[serde(default)]
                property: String,
                #[serde(rename = "type", default)]
                kind: MatchKind,
                #[serde(default)]
                value: String,
                #[serde(default)]
                values: Vec<String>,
                #[serde(default)]
                invert: bool,
            },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Shorthand(value) => Ok(Filter::exact(value)),
            Raw::Full {
                property,
                kind,
                value,
                values,
                invert,
            } => {
                if kind == MatchKind::In && values.is_empty() {
                    return Err(D::Error::custom("`in` filter requires a `values` list"));
                }
                Ok(Filter {
                    property,
                    kind,
                    value,
                    values,
                    invert,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let rule = Filter::exact("keep-me");
        assert!(rule.matches("keep-me").unwrap());
        assert!(!rule.matches("drop-me").unwrap());
    }

    #[test]
    fn test_contains_match() {
        let rule = Filter {
            kind: MatchKind::Contains,
            value: "prod".into(),
            ..Default::default()
        };
        assert!(rule.matches("my-prod-bucket").unwrap());
        assert!(!rule.matches("my-dev-bucket").unwrap());
    }

    #[test]
    fn test_glob_match() {
        let rule = Filter {
            kind: MatchKind::Glob,
            value: "logs-*".into(),
            ..Default::default()
        };
        assert!(rule.matches("logs-2024").unwrap());
        assert!(!rule.matches("audit-logs").unwrap());
    }

    #[test]
    fn test_glob_invalid_pattern_errors() {
        let rule = Filter {
            kind: MatchKind::Glob,
            value: "logs-[".into(),
            ..Default::default()
        };
        assert!(rule.matches("logs-x").is_err());
    }

    #[test]
    fn test_regex_match() {
        let rule = Filter {
            kind: MatchKind::Regex,
            value: "^i-[0-9a-f]+$".into(),
            ..Default::default()
        };
        assert!(rule.matches("i-0abc123").unwrap());
        assert!(!rule.matches("vol-0abc123").unwrap());
    }

    #[test]
    fn test_membership_match() {
        let rule = Filter {
            kind: MatchKind::In,
            values: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert!(rule.matches("a").unwrap());
        assert!(!rule.matches("c").unwrap());
    }

    #[test]
    fn test_numeric_comparison() {
        let gt = Filter {
            kind: MatchKind::Gt,
            value: "10".into(),
            ..Default::default()
        };
        assert!(gt.matches("11").unwrap());
        assert!(!gt.matches("9").unwrap());
        assert!(gt.matches("not-a-number").is_err());

        let lt = Filter {
            kind: MatchKind::Lt,
            value: "10".into(),
            ..Default::default()
        };
        assert!(lt.matches("9").unwrap());
        assert!(!lt.matches("11").unwrap());
    }

    #[test]
    fn test_double_invert_is_identity() {
        // Inverting a rule toggles its effect; inverting twice restores it.
        let mut rule = Filter::exact("keep-me");
        for input in ["keep-me", "drop-me", ""] {
            let apply = |rule: &Filter, input: &str| {
                let matched = rule.matches(input).unwrap();
                if rule.invert {
                    !matched
                } else {
                    matched
                }
            };
            let base = apply(&rule, input);
            rule.invert = !rule.invert;
            let inverted = apply(&rule, input);
            rule.invert = !rule.invert;
            let restored = apply(&rule, input);
            assert_eq!(inverted, !base);
            assert_eq!(restored, base);
        }
    }

    #[test]
    fn test_deserialize_shorthand() {
        let rule: Filter = serde_yaml::from_str("keep-me").unwrap();
        assert_eq!(rule, Filter::exact("keep-me"));
    }

    #[test]
    fn test_deserialize_full_form() {
        let rule: Filter = serde_yaml::from_str(
            "{property: Name, type: glob, value: 'logs-*', invert: true}",
        )
        .unwrap();
        assert_eq!(rule.property, "Name");
        assert_eq!(rule.kind, MatchKind::Glob);
        assert_eq!(rule.value, "logs-*");
        assert!(rule.invert);
    }

    #[test]
    fn test_deserialize_defaults_to_exact() {
        let rule: Filter = serde_yaml::from_str("{property: Name, value: x}").unwrap();
        assert_eq!(rule.kind, MatchKind::Exact);
        assert!(!rule.invert);
    }

    #[test]
    fn test_deserialize_in_requires_values() {
        let result: Result<Filter, _> = serde_yaml::from_str("{type: in, value: x}");
        assert!(result.is_err());
    }
}
