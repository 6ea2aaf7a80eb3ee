//! Lookup results: property name to weighted values.

use serde::Serialize;

/// One candidate value for a property with its confidence weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedValue {
    pub value: String,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValues {
    pub property: String,
    pub values: Vec<WeightedValue>,
}

/// Properties resolved for one address, in dataset order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IpResults {
    properties: Vec<PropertyValues>,
}

impl IpResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, grouping it with earlier values of the same property.
    pub fn push(&mut self, property: &str, value: impl Into<String>, weight: f32) {
        let value = WeightedValue { value: value.into(), weight };
        match self.entry_mut(property) {
            Some(entry) => entry.values.push(value),
            None => self.properties.push(PropertyValues {
                property: property.to_string(),
                values: vec![value],
            }),
        }
    }

    /// Highest-weighted value for `property`.
    pub fn value_weight(&self, property: &str) -> Option<(&str, f32)> {
        self.values(property)?
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|v| (v.value.as_str(), v.weight))
    }

    pub fn values(&self, property: &str) -> Option<&[WeightedValue]> {
        self.properties
            .iter()
            .find(|p| p.property.eq_ignore_ascii_case(property))
            .map(|p| p.values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValues> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn entry_mut(&mut self, property: &str) -> Option<&mut PropertyValues> {
        self.properties
            .iter_mut()
            .find(|p| p.property.eq_ignore_ascii_case(property))
    }
}
