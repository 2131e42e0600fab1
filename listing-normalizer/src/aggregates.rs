use regex::Regex;
use tracing::debug;

use crate::metrics_consts::AGGREGATES_EXPANDED_COUNTER;
use crate::record::Record;

/// Routes an aggregate item to a target field when its pattern matches anywhere in the item.
#[derive(Debug, Clone)]
pub struct AggregateTag {
    pattern: Regex,
    target: String,
}

impl AggregateTag {
    pub fn new(pattern: Regex, target: String) -> Self {
        Self { pattern, target }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn matches(&self, item: &str) -> bool {
        self.pattern.is_match(item)
    }
}

/// A multi-value field and how to split it. Without an item separator each row is one item.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    field: String,
    row_separator: String,
    item_separator: Option<String>,
    tags: Vec<AggregateTag>,
}

impl AggregateSpec {
    pub fn new(
        field: String,
        row_separator: String,
        item_separator: Option<String>,
        tags: Vec<AggregateTag>,
    ) -> Self {
        Self {
            field,
            row_separator,
            item_separator,
            tags,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn tags(&self) -> &[AggregateTag] {
        &self.tags
    }

    /// Non-blank items, trimmed. Targets receive the trimmed text so anchored extraction
    /// patterns see the bare value.
    fn items<'a>(&'a self, value: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        value
            .split(self.row_separator.as_str())
            .flat_map(move |row| match &self.item_separator {
                Some(separator) => row.split(separator.as_str()).collect::<Vec<_>>(),
                None => vec![row],
            })
            .map(str::trim)
            .filter(|item| !item.is_empty())
    }
}

/// Splits aggregate fields into the synthetic per-target fields the vocabulary knows about.
#[derive(Debug, Clone, Copy)]
pub struct AggregateExpander<'a> {
    specs: &'a [AggregateSpec],
}

impl<'a> AggregateExpander<'a> {
    pub fn new(specs: &'a [AggregateSpec]) -> Self {
        Self { specs }
    }

    /// Returns a copy of `record` with every aggregate field replaced by its tagged items.
    /// A later item overwrites an earlier one for the same target.
    pub fn expand(&self, record: &Record) -> Record {
        let mut expanded = record.clone();

        for spec in self.specs {
            let Some(value) = expanded.remove(spec.field()) else {
                continue;
            };

            let mut assigned = 0;
            for item in spec.items(&value) {
                for tag in spec.tags().iter().filter(|tag| tag.matches(item)) {
                    expanded.insert(tag.target(), item);
                    assigned += 1;
                }
            }

            debug!(field = spec.field(), assigned, "expanded aggregate field");
            metrics::counter!(AGGREGATES_EXPANDED_COUNTER, "field" => spec.field().to_owned())
                .increment(1);
        }

        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::compile_pattern;

    fn tag(pattern: &str, target: &str) -> AggregateTag {
        AggregateTag::new(
            compile_pattern("test", pattern, false).unwrap(),
            target.to_owned(),
        )
    }

    fn connectors() -> AggregateSpec {
        AggregateSpec::new(
            "Connectors".to_owned(),
            "\n".to_owned(),
            Some(",".to_owned()),
            vec![
                tag(r"d-?sub|\bvga\b", "VGA"),
                tag(r"\bdvi", "DVI"),
                tag("hdmi", "HDMI"),
                tag(r"display\s*port|\bdp\b", "DisplayPort"),
            ],
        )
    }

    fn ergonomics() -> AggregateSpec {
        AggregateSpec::new(
            "Ergonomics".to_owned(),
            "\n".to_owned(),
            None,
            vec![
                tag("height", "HeightAdjustment"),
                tag("tilt", "TiltAdjustment"),
                tag("vesa", "VesaMount"),
            ],
        )
    }

    #[test]
    fn splits_rows_and_items() {
        let specs = [connectors()];
        let record: Record = [
            ("URL", "u"),
            ("Connectors", "1 x D-Sub, 2 x HDMI\n1 x DisplayPort 1.2,  \n"),
        ]
        .into_iter()
        .collect();

        let expanded = AggregateExpander::new(&specs).expand(&record);

        assert_eq!(expanded.get("VGA"), Some("1 x D-Sub"));
        assert_eq!(expanded.get("HDMI"), Some("2 x HDMI"));
        assert_eq!(expanded.get("DisplayPort"), Some("1 x DisplayPort 1.2"));
        assert!(!expanded.contains("DVI"));
        assert!(!expanded.contains("Connectors"));
        assert_eq!(expanded.get("URL"), Some("u"));
        // input untouched
        assert!(record.contains("Connectors"));
    }

    #[test]
    fn rows_without_item_separator_are_single_items() {
        let specs = [ergonomics()];
        let record: Record = [(
            "Ergonomics",
            "height-adjustable stand: 130mm\ntilt, swivel\nvesa 100 x 100",
        )]
        .into_iter()
        .collect();

        let expanded = AggregateExpander::new(&specs).expand(&record);

        assert_eq!(
            expanded.get("HeightAdjustment"),
            Some("height-adjustable stand: 130mm")
        );
        assert_eq!(expanded.get("TiltAdjustment"), Some("tilt, swivel"));
        assert_eq!(expanded.get("VesaMount"), Some("vesa 100 x 100"));
    }

    #[test]
    fn items_after_a_separator_are_assigned_without_padding() {
        let vocabulary = crate::vocabulary::Vocabulary::display_default().unwrap();
        let normalizer = crate::normalizer::FieldNormalizer::new(vocabulary.store.clone());
        let record: Record = [("Connectors", "2 x HDMI,   1 x DisplayPort\n")]
            .into_iter()
            .collect();

        let expanded = AggregateExpander::new(&vocabulary.aggregates).expand(&record);

        assert_eq!(expanded.get("DisplayPort"), Some("1 x DisplayPort"));
        assert_eq!(
            normalizer.normalize("DisplayPort", "1 x DisplayPort").as_deref(),
            Some("1")
        );
        assert_eq!(normalizer.normalize("DisplayPort", "   1 x DisplayPort"), None);
    }

    #[test]
    fn last_match_for_a_target_wins() {
        let specs = [connectors()];
        let record: Record = [("Connectors", "HDMI 1.4\nHDMI 2.0")].into_iter().collect();

        let expanded = AggregateExpander::new(&specs).expand(&record);

        assert_eq!(expanded.get("HDMI"), Some("HDMI 2.0"));
    }

    #[test]
    fn aggregate_overrides_existing_target_field() {
        let specs = [connectors()];
        let record: Record = [("HDMI", "no"), ("Connectors", "1 x HDMI")]
            .into_iter()
            .collect();

        let expanded = AggregateExpander::new(&specs).expand(&record);

        assert_eq!(expanded.get("HDMI"), Some("1 x HDMI"));
    }

    #[test]
    fn records_without_aggregates_are_unchanged() {
        let specs = [connectors(), ergonomics()];
        let record: Record = [("Brand", "Acer")].into_iter().collect();

        assert_eq!(AggregateExpander::new(&specs).expand(&record), record);
    }
}
