//! Requested property list.

use serde::{Deserialize, Serialize};

/// Properties resolved when no explicit list is configured.
pub const DEFAULT_PROPERTIES: &str =
    "IpRangeStart,IpRangeEnd,AccuracyRadius,RegisteredCountry,RegisteredName,Longitude,Latitude,Areas";

/// Subset of dataset fields to resolve per lookup. Empty means every property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct PropertySet {
    names: Vec<String>,
}

impl PropertySet {
    /// Every property the dataset carries.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a comma separated list. Blank entries and duplicates are dropped.
    pub fn parse(list: &str) -> Self {
        Self::from_names(list.split(','))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                continue;
            }
            out.push(name.to_string());
        }
        Self { names: out }
    }

    pub fn is_all(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `property` should be resolved. Matching ignores ASCII case.
    pub fn includes(&self, property: &str) -> bool {
        self.is_all() || self.names.iter().any(|n| n.eq_ignore_ascii_case(property))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Comma separated form, as handed to the native layer.
    pub fn to_list(&self) -> String {
        self.names.join(",")
    }
}

impl From<Vec<String>> for PropertySet {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<PropertySet> for Vec<String> {
    fn from(set: PropertySet) -> Self {
        set.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_dedups() {
        let set = PropertySet::parse(" RegisteredCountry, ,registeredcountry,Areas ");
        assert_eq!(set.names(), &["RegisteredCountry".to_string(), "Areas".to_string()]);
        assert_eq!(set.to_list(), "RegisteredCountry,Areas");
    }

    #[test]
    fn test_empty_means_all() {
        let set = PropertySet::parse("");
        assert!(set.is_all());
        assert!(set.includes("Anything"));
    }

    #[test]
    fn test_default_list() {
        let set = PropertySet::parse(DEFAULT_PROPERTIES);
        assert_eq!(set.names().len(), 8);
        assert!(set.includes("latitude"));
        assert!(!set.includes("Mcc"));
    }
}
