use std::sync::Arc;

use serde_json::{Map, Value};

use crate::record::{ExplodedRecord, Record};
use crate::vocabulary::CategoryMap;

/// Regroups flat fields into one nested object per category.
#[derive(Debug, Clone)]
pub struct StructureExploder {
    categories: Arc<CategoryMap>,
}

impl StructureExploder {
    pub fn new(categories: Arc<CategoryMap>) -> Self {
        Self { categories }
    }

    /// Categories claim fields in declared order; a field moved by an earlier category is not
    /// seen by later ones. Every category is emitted, possibly as an empty object.
    pub fn explode(&self, record: &Record) -> ExplodedRecord {
        let mut flat = record.clone();
        let mut groups = Vec::new();

        for category in self.categories.iter() {
            let mut nested = Map::new();
            for field in &category.fields {
                if let Some(value) = flat.remove(field) {
                    nested.insert(field.clone(), Value::String(value));
                }
            }
            groups.push((category.name.clone(), Value::Object(nested)));
        }

        // a stray flat field never shadows a category of the same name
        let mut exploded: ExplodedRecord = flat
            .into_iter()
            .map(|(field, value)| (field, Value::String(value)))
            .collect();
        exploded.extend(groups);
        exploded
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;
    use crate::vocabulary::Category;

    fn exploder() -> StructureExploder {
        StructureExploder::new(Arc::new(CategoryMap::new(vec![
            Category {
                name: "Ergonomics".to_owned(),
                fields: vec!["TiltAdjustment".to_owned(), "VesaMount".to_owned()],
            },
            Category {
                name: "Connectivity".to_owned(),
                fields: vec!["HDMI".to_owned(), "VesaMount".to_owned()],
            },
        ])))
    }

    /// Inverse of `explode` for records whose categories only hold strings.
    fn flatten(exploded: &ExplodedRecord, categories: &CategoryMap) -> Record {
        let mut record = Record::new();
        for (field, value) in exploded {
            match value {
                Value::Object(nested) if categories.names().any(|n| n == field) => {
                    for (field, value) in nested {
                        record.insert(field.as_str(), value.as_str().unwrap_or_default());
                    }
                }
                value => {
                    record.insert(field.as_str(), value.as_str().unwrap_or_default());
                }
            }
        }
        record
    }

    #[test]
    fn nests_claimed_fields_and_keeps_the_rest_flat() {
        let record: Record = [
            ("URL", "u"),
            ("TiltAdjustment", "true"),
            ("VesaMount", "100 100"),
            ("HDMI", "2"),
        ]
        .into_iter()
        .collect();

        let exploded = exploder().explode(&record);

        assert_json_eq!(
            Value::Object(exploded),
            json!({
                "URL": "u",
                "Ergonomics": {"TiltAdjustment": "true", "VesaMount": "100 100"},
                "Connectivity": {"HDMI": "2"}
            })
        );
    }

    #[test]
    fn empty_categories_are_still_emitted() {
        let record: Record = [("URL", "u")].into_iter().collect();

        assert_json_eq!(
            Value::Object(exploder().explode(&record)),
            json!({"URL": "u", "Ergonomics": {}, "Connectivity": {}})
        );
    }

    #[test]
    fn explode_then_flatten_restores_the_record() {
        let exploder = exploder();
        let record: Record = [
            ("TiltAdjustment", "false"),
            ("VesaMount", "75 75"),
            ("HDMI", "1"),
        ]
        .into_iter()
        .collect();

        let exploded = exploder.explode(&record);

        assert_eq!(flatten(&exploded, &exploder.categories), record);
    }
}
