//! Catalog filters and typed option sets.
//!
//! Filters are reduced to a canonical *signature* string that doubles as the
//! cache bucket key for listing results. The empty signature identifies the
//! unfiltered game-wide listing, which is the only listing the response cache
//! is allowed to serve.
//!
//! Community/maturity/monetization options are typed sets rather than raw
//! integer flags; `bits`/`from_bits` keep the wire-compatible integer form at
//! the serialization boundary.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeSet;

/// An enum usable as a member of an [`OptionSet`].
pub trait FlagValue: Copy + Ord + 'static {
    /// Every variant, in bit order.
    const ALL: &'static [Self];

    /// The wire bit for this variant.
    fn bit(self) -> u64;
}

/// A set of enum variants with integer round-tripping for the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet<T: FlagValue> {
    values: BTreeSet<T>,
}

impl<T: FlagValue> Default for OptionSet<T> {
    fn default() -> Self {
        OptionSet {
            values: BTreeSet::new(),
        }
    }
}

impl<T: FlagValue> OptionSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> bool {
        self.values.insert(value)
    }

    pub fn remove(&mut self, value: T) -> bool {
        self.values.remove(&value)
    }

    pub fn contains(&self, value: T) -> bool {
        self.values.contains(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.values.iter().copied()
    }

    pub fn union(&self, other: &Self) -> Self {
        OptionSet {
            values: self.values.union(&other.values).copied().collect(),
        }
    }

    /// Wire form: the OR of every member's bit.
    pub fn bits(&self) -> u64 {
        self.values.iter().fold(0, |acc, v| acc | v.bit())
    }

    /// Unknown bits are dropped rather than rejected; the server may grow new
    /// flags ahead of the client.
    pub fn from_bits(bits: u64) -> Self {
        let values = T::ALL
            .iter()
            .copied()
            .filter(|v| bits & v.bit() != 0)
            .collect();
        OptionSet { values }
    }
}

impl<T: FlagValue> FromIterator<T> for OptionSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        OptionSet {
            values: iter.into_iter().collect(),
        }
    }
}

impl<T: FlagValue> Serialize for OptionSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de, T: FlagValue> Deserialize<'de> for OptionSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        Ok(OptionSet::from_bits(bits))
    }
}

/// Content maturity flags a mod may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaturityOption {
    Alcohol,
    Drugs,
    Violence,
    Explicit,
}

impl FlagValue for MaturityOption {
    const ALL: &'static [Self] = &[
        MaturityOption::Alcohol,
        MaturityOption::Drugs,
        MaturityOption::Violence,
        MaturityOption::Explicit,
    ];

    fn bit(self) -> u64 {
        match self {
            MaturityOption::Alcohol => 1,
            MaturityOption::Drugs => 2,
            MaturityOption::Violence => 4,
            MaturityOption::Explicit => 8,
        }
    }
}

/// Community feature flags on a mod profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommunityOption {
    Comments,
    Guides,
    Previews,
}

impl FlagValue for CommunityOption {
    const ALL: &'static [Self] = &[
        CommunityOption::Comments,
        CommunityOption::Guides,
        CommunityOption::Previews,
    ];

    fn bit(self) -> u64 {
        match self {
            CommunityOption::Comments => 1,
            CommunityOption::Guides => 2,
            CommunityOption::Previews => 4,
        }
    }
}

/// Monetization flags on a mod profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MonetizationOption {
    Enabled,
    Marketplace,
}

impl FlagValue for MonetizationOption {
    const ALL: &'static [Self] = &[MonetizationOption::Enabled, MonetizationOption::Marketplace];

    fn bit(self) -> u64 {
        match self {
            MonetizationOption::Enabled => 1,
            MonetizationOption::Marketplace => 2,
        }
    }
}

pub type MaturityOptions = OptionSet<MaturityOption>;
pub type CommunityOptions = OptionSet<CommunityOption>;
pub type MonetizationOptions = OptionSet<MonetizationOption>;

/// Sort key for catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    DateUpdated,
    Downloads,
    Rating,
    Name,
}

impl SortField {
    fn as_str(self) -> &'static str {
        match self {
            SortField::DateUpdated => "date_updated",
            SortField::Downloads => "downloads",
            SortField::Rating => "rating",
            SortField::Name => "name",
        }
    }
}

/// Filter over the mod catalog.
///
/// A default filter matches everything and produces the empty signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModFilter {
    pub name_query: Option<String>,
    pub tags: Vec<String>,
    pub sort: Option<SortField>,
    pub sort_descending: bool,
    pub maturity: MaturityOptions,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ModFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Query parameters in a stable order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(ref q) = self.name_query {
            params.push(("_q".to_string(), q.clone()));
        }
        for tag in &self.tags {
            params.push(("tags".to_string(), tag.clone()));
        }
        if let Some(sort) = self.sort {
            let key = if self.sort_descending {
                format!("-{}", sort.as_str())
            } else {
                sort.as_str().to_string()
            };
            params.push(("_sort".to_string(), key));
        }
        if !self.maturity.is_empty() {
            params.push(("maturity_option".to_string(), self.maturity.bits().to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("_limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("_offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Canonical signature used as the listing cache bucket key. Empty iff
    /// the filter matches everything.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .to_query()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(&v)))
            .collect();
        parts.sort();
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_set_bits_round_trip() {
        let mut set = MaturityOptions::new();
        set.insert(MaturityOption::Alcohol);
        set.insert(MaturityOption::Explicit);
        assert_eq!(set.bits(), 9);
        assert_eq!(MaturityOptions::from_bits(9), set);
    }

    #[test]
    fn test_option_set_ignores_unknown_bits() {
        let set = CommunityOptions::from_bits(0xFF);
        assert_eq!(set.bits(), 7);
    }

    #[test]
    fn test_option_set_serde_as_integer() {
        let mut set = MonetizationOptions::new();
        set.insert(MonetizationOption::Enabled);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "1");
        let back: MonetizationOptions = serde_json::from_str("3").unwrap();
        assert!(back.contains(MonetizationOption::Marketplace));
    }

    #[test]
    fn test_option_set_union() {
        let a: CommunityOptions = [CommunityOption::Comments].into_iter().collect();
        let b: CommunityOptions = [CommunityOption::Guides].into_iter().collect();
        assert_eq!(a.union(&b).bits(), 3);
    }

    #[test]
    fn test_empty_filter_has_empty_signature() {
        assert!(ModFilter::none().is_empty());
        assert_eq!(ModFilter::none().signature(), "");
    }

    #[test]
    fn test_signature_is_canonical() {
        let mut a = ModFilter::none();
        a.name_query = Some("space".to_string());
        a.tags = vec!["total conversion".to_string()];

        let sig = a.signature();
        assert!(sig.contains("_q=space"));
        assert!(sig.contains("tags=total%20conversion"));

        // Same filter built again yields the same signature.
        let mut b = ModFilter::none();
        b.tags = vec!["total conversion".to_string()];
        b.name_query = Some("space".to_string());
        assert_eq!(sig, b.signature());
    }

    #[test]
    fn test_sort_direction_in_query() {
        let mut f = ModFilter::none();
        f.sort = Some(SortField::Downloads);
        f.sort_descending = true;
        let q = f.to_query();
        assert!(q.contains(&("_sort".to_string(), "-downloads".to_string())));
        assert!(!f.is_empty());
    }
}
