//! Origin acceptance filters.
//!
//! A filter is a pair of regular expressions written `"<keyspace>:<table>"`
//! and matched case-insensitively against the whole name. A filter without a
//! colon constrains the keyspace only. Filters compose with AND; an empty
//! predicate accepts every origin.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::str::FromStr;

use crate::core::Origin;
use crate::error::{AviaryError, Result};

#[derive(Debug, Clone)]
pub struct OriginFilter {
    keyspace: Regex,
    table: Regex,
    source: String,
}

impl OriginFilter {
    pub fn new(keyspace_pattern: &str, table_pattern: &str) -> Result<Self> {
        Ok(Self {
            keyspace: compile(keyspace_pattern)?,
            table: compile(table_pattern)?,
            source: format!("{}:{}", keyspace_pattern, table_pattern),
        })
    }

    pub fn accepts(&self, origin: &Origin) -> bool {
        self.keyspace.is_match(origin.keyspace()) && self.table.is_match(origin.table())
    }
}

impl FromStr for OriginFilter {
    type Err = AviaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((keyspace, table)) => Self::new(keyspace, table),
            None => Self::new(s, ".*"),
        }
    }
}

impl fmt::Display for OriginFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            AviaryError::Config(format!("invalid origin filter pattern {:?}: {}", pattern, e))
        })
}

/// Conjunction of origin filters.
#[derive(Debug, Clone, Default)]
pub struct OriginPredicate {
    filters: Vec<OriginFilter>,
}

impl OriginPredicate {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn new(filters: Vec<OriginFilter>) -> Self {
        Self { filters }
    }

    /// Parse every filter expression, failing on the first invalid one.
    pub fn parse<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filters = specs
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn and(mut self, filter: OriginFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn accepts(&self, origin: &Origin) -> bool {
        self.filters.iter().all(|f| f.accepts(origin))
    }

    pub fn filters(&self) -> &[OriginFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_predicate_accepts_all() {
        let predicate = OriginPredicate::accept_all();
        assert!(predicate.accepts(&Origin::new("anything", "at_all")));
    }

    #[test]
    fn test_full_match_case_insensitive() {
        let filter: OriginFilter = "shop:ord.*".parse().unwrap();
        assert!(filter.accepts(&Origin::new("SHOP", "Orders")));
        assert!(!filter.accepts(&Origin::new("shop2", "orders")));
        assert!(!filter.accepts(&Origin::new("shop", "archived_orders")));
    }

    #[test]
    fn test_filters_combine_with_and() {
        let predicate = OriginPredicate::parse(["shop.*:.*", ".*:orders"]).unwrap();
        assert!(predicate.accepts(&Origin::new("shop_eu", "orders")));
        assert!(!predicate.accepts(&Origin::new("shop_eu", "carts")));
        assert!(!predicate.accepts(&Origin::new("billing", "orders")));
    }

    #[test]
    fn test_without_colon_constrains_keyspace_only() {
        let filter: OriginFilter = "metrics".parse().unwrap();
        assert!(filter.accepts(&Origin::new("metrics", "whatever")));
        assert!(!filter.accepts(&Origin::new("metrics_old", "whatever")));
        assert_eq!(filter.to_string(), "metrics:.*");
    }

    #[test]
    fn test_alternation_is_anchored_as_a_whole() {
        let filter: OriginFilter = "a|b:t".parse().unwrap();
        assert!(filter.accepts(&Origin::new("b", "t")));
        assert!(!filter.accepts(&Origin::new("ab", "t")));
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let err = OriginPredicate::parse(["ks:(unclosed"]).unwrap_err();
        assert!(matches!(err, AviaryError::Config(_)));
    }
}
