//! Delimited `key=value` property strings.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

/// Parsed provider-specific properties, e.g. `"url=db://x;timeout=5"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` into properties.
    ///
    /// With no explicit delimiter both `;` and `,` separate entries. Blank
    /// entries are skipped, keys and values are trimmed, and an entry
    /// without `=` is a configuration error.
    pub fn parse(text: &str, delimiter: Option<&str>) -> Result<Self> {
        let pieces: Vec<&str> = match delimiter {
            Some(d) if !d.is_empty() => text.split(d).collect(),
            _ => text.split([';', ',']).collect(),
        };

        let mut entries = BTreeMap::new();
        for piece in pieces {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let Some((key, value)) = piece.split_once('=') else {
                return Err(CacheError::config(
                    "properties",
                    format!("expected `key=value`, found `{piece}`"),
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(CacheError::config(
                    "properties",
                    format!("empty key in `{piece}`"),
                ));
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self { entries })
    }

    /// Set a property (builder pattern).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The same entries as a string-valued environment map.
    pub fn to_environment(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_delimiters() {
        let props = Properties::parse("a=1; b = two ,c=3", None).unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(props.get("a"), Some("1"));
        assert_eq!(props.get("b"), Some("two"));
        assert_eq!(props.get("c"), Some("3"));
    }

    #[test]
    fn test_parse_explicit_delimiter_keeps_commas() {
        let props = Properties::parse("hosts=a,b,c|port=80", Some("|")).unwrap();
        assert_eq!(props.get("hosts"), Some("a,b,c"));
        assert_eq!(props.get("port"), Some("80"));
    }

    #[test]
    fn test_parse_skips_blank_entries() {
        let props = Properties::parse(";;a=1;", None).unwrap();
        assert_eq!(props.len(), 1);
        assert!(Properties::parse("", None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_equals() {
        let err = Properties::parse("a=1;oops", None).unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));
        assert!(Properties::parse("=1", None).is_err());
    }

    #[test]
    fn test_to_environment() {
        let env = Properties::new().with("k", "v").to_environment();
        assert_eq!(env.get("k"), Some(&Value::String("v".into())));
    }
}
