use std::sync::Arc;

use crate::aggregates::{AggregateExpander, AggregateSpec};
use crate::exploder::StructureExploder;
use crate::normalizer::FieldNormalizer;
use crate::record::{fields, ExplodedRecord, Record};
use crate::transformer::{ListingTransformer, TransformerRegistry};
use crate::validation::RecordValidator;
use crate::vocabulary::Vocabulary;

pub const DISPLAY_CATEGORY: &str = "Display";
const DISPLAY_ALIASES: &[&str] = &["Monitor", "Monitors", "Displays"];

/// Category reported by the transformer for listings without a known `Category`.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Computer monitors, normalized against the display vocabulary.
#[derive(Debug, Clone)]
pub struct DisplayTransformer {
    category: &'static str,
    aliases: &'static [&'static str],
    validator: RecordValidator,
    aggregates: Arc<Vec<AggregateSpec>>,
    normalizer: FieldNormalizer,
    exploder: StructureExploder,
}

impl DisplayTransformer {
    /// Listings whose `Category` names a display. These must also carry the time they were found.
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self::build(
            vocabulary,
            DISPLAY_CATEGORY,
            DISPLAY_ALIASES,
            RecordValidator::default().requiring(fields::FOUND_TIME),
        )
    }

    /// Listings with no or an unrecognized `Category`. Same vocabulary, but only URL, Brand and
    /// ModelNumber are required up front.
    pub fn uncategorized(vocabulary: &Vocabulary) -> Self {
        Self::build(vocabulary, UNCATEGORIZED, &[], RecordValidator::default())
    }

    fn build(
        vocabulary: &Vocabulary,
        category: &'static str,
        aliases: &'static [&'static str],
        validator: RecordValidator,
    ) -> Self {
        Self {
            category,
            aliases,
            validator,
            aggregates: vocabulary.aggregates.clone(),
            normalizer: FieldNormalizer::new(vocabulary.store.clone()),
            exploder: StructureExploder::new(vocabulary.categories.clone()),
        }
    }
}

/// Dispatch for the display vocabulary: explicit display categories get the stricter
/// transformer, every other listing the uncategorized one.
pub fn display_registry(vocabulary: &Vocabulary) -> TransformerRegistry {
    TransformerRegistry::new(Arc::new(DisplayTransformer::uncategorized(vocabulary)))
        .register(Arc::new(DisplayTransformer::new(vocabulary)))
}

impl ListingTransformer for DisplayTransformer {
    fn category(&self) -> &str {
        self.category
    }

    fn aliases(&self) -> &[&str] {
        self.aliases
    }

    fn pre_validate(&self, record: &Record) -> bool {
        self.validator.pre_validate(record)
    }

    fn post_validate(&self, record: &Record) -> bool {
        self.validator.post_validate(record)
    }

    fn pre_process(&self, record: &Record) -> Record {
        AggregateExpander::new(&self.aggregates).expand(record)
    }

    fn normalize(&self, record: &Record) -> Record {
        self.normalizer.normalize_record(record)
    }

    fn post_process(&self, record: &Record) -> ExplodedRecord {
        self.exploder.explode(record)
    }
}
