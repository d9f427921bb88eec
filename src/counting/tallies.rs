use std::collections::BTreeMap;

use serde::Serialize;

use crate::fusion::Category;

/// Bucket every increment also lands in.
pub const TOTAL: &str = "total";

/// Bucket for names that are not a known category.
pub const FALLBACK: &str = "non_target";

/// Running counts per category plus a total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tallies {
    counts: BTreeMap<String, u64>,
}

impl Default for Tallies {
    fn default() -> Self {
        let counts = [
            Category::Fresh.as_str(),
            Category::Rotten.as_str(),
            Category::NonTarget.as_str(),
            TOTAL,
        ]
        .into_iter()
        .map(|name| (name.to_string(), 0))
        .collect();
        Self { counts }
    }
}

impl Tallies {
    /// Count one object under `category`.
    ///
    /// Names other than the known categories are folded into [`FALLBACK`].
    pub fn increment(&mut self, category: &str) {
        let bucket = match category {
            TOTAL => FALLBACK,
            name if self.counts.contains_key(name) => name,
            _ => FALLBACK,
        };
        *self.counts.entry(bucket.to_string()).or_insert(0) += 1;
        *self.counts.entry(TOTAL.to_string()).or_insert(0) += 1;
    }

    /// Count for `category`, zero if it never appeared.
    pub fn get(&self, category: &str) -> u64 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.get(TOTAL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_known() {
        let mut tallies = Tallies::default();
        tallies.increment("fresh");
        tallies.increment("rotten");
        tallies.increment("fresh");

        assert_eq!(tallies.get("fresh"), 2);
        assert_eq!(tallies.get("rotten"), 1);
        assert_eq!(tallies.total(), 3);
    }

    #[test]
    fn test_unknown_folds_into_fallback() {
        let mut tallies = Tallies::default();
        tallies.increment("banana");
        tallies.increment(TOTAL);

        assert_eq!(tallies.get(FALLBACK), 2);
        assert_eq!(tallies.get("banana"), 0);
        assert_eq!(tallies.total(), 2);
    }

    #[test]
    fn test_reset() {
        let mut tallies = Tallies::default();
        tallies.increment("fresh");
        tallies.reset();
        assert_eq!(tallies, Tallies::default());
        assert_eq!(tallies.iter().count(), 4);
    }

    #[test]
    fn test_serializes_as_map() {
        let mut tallies = Tallies::default();
        tallies.increment("rotten");
        let json = serde_json::to_value(&tallies).unwrap();
        assert_eq!(json["rotten"], 1);
        assert_eq!(json["total"], 1);
        assert_eq!(json["fresh"], 0);
    }
}
