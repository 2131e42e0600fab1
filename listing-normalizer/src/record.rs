use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ParseError;

/// Field names shared by every listing category.
pub mod fields {
    pub const URL: &str = "URL";
    pub const BRAND: &str = "Brand";
    pub const MODEL: &str = "ModelNumber";
    pub const CATEGORY: &str = "Category";
    pub const FOUND_TIME: &str = "FoundTime";
    pub const PRICE: &str = "Price";

    pub const SCREEN_SIZE: &str = "ScreenSize";
    pub const RESOLUTION: &str = "Resolution";
    pub const RESPONSE_TIME: &str = "ResponseTime";
    pub const REFRESH_RATE: &str = "RefreshRate";

    pub const CONNECTORS: &str = "Connectors";
    pub const ERGONOMICS: &str = "Ergonomics";

    /// Copied verbatim from the raw record after normalization, never normalized.
    pub const PASS_THROUGH: [&str; 5] = [URL, MODEL, CATEGORY, FOUND_TIME, PRICE];
}

/// A regrouped record: flat string fields plus one nested object per category.
pub type ExplodedRecord = serde_json::Map<String, Value>;

/// One scraped listing snapshot: field name to raw string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a flat JSON object. Scalars are kept in their textual form, nulls count as absent
    /// and nested values are rejected.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ParseError> {
        let Value::Object(object) = serde_json::from_slice::<Value>(payload)? else {
            return Err(ParseError::NotAnObject);
        };

        let mut record = Record::new();
        for (field, value) in object {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ParseError::NestedValue { field });
                }
            };
            record.fields.insert(field, value);
        }
        Ok(record)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.fields.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
