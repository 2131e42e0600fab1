use std::sync::Arc;

use regex::Regex;
use tracing::trace;

use crate::metrics_consts::FIELDS_DROPPED_COUNTER;
use crate::record::{fields, Record};
use crate::vocabulary::{FieldVocabulary, VocabularyStore};

/// Maps raw field values onto the controlled vocabulary.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    store: Arc<VocabularyStore>,
}

impl FieldNormalizer {
    pub fn new(store: Arc<VocabularyStore>) -> Self {
        Self { store }
    }

    /// Canonical value for `raw`, or `None` when the field is unknown or nothing matched.
    ///
    /// Extraction (`FIND`) candidates are tried first and need to match the whole value; the
    /// last pattern producing a non-empty extraction wins and ordinary candidates are skipped.
    /// Otherwise every ordinary pattern is matched anywhere in the value and the longest matching
    /// label wins, the earliest declared one on a tie.
    pub fn normalize(&self, field: &str, raw: &str) -> Option<String> {
        let vocabulary = self.store.get(field)?;

        if let Some(extracted) = extract(vocabulary, raw) {
            trace!(field, raw, extracted = %extracted, "extracted value");
            return Some(extracted);
        }

        let mut best: Option<&str> = None;
        for candidate in vocabulary.canonical_candidates() {
            let label = candidate.label();
            let longer = best.map_or(true, |b| label.chars().count() > b.chars().count());
            if longer && candidate.patterns().iter().any(|p| p.is_match(raw)) {
                best = Some(label);
            }
        }

        best.filter(|label| !label.is_empty()).map(str::to_owned)
    }

    /// Normalizes every field of `record` into a new record. Fields that normalize to nothing are
    /// dropped, then the pass-through fields are copied back verbatim.
    pub fn normalize_record(&self, record: &Record) -> Record {
        let mut normalized = Record::new();

        for (field, raw) in record.iter() {
            match self.normalize(field, raw) {
                Some(value) => {
                    normalized.insert(field, value);
                }
                None if fields::PASS_THROUGH.contains(&field) => {}
                None => {
                    trace!(field, raw, "dropping unmatched field");
                    metrics::counter!(FIELDS_DROPPED_COUNTER, "field" => field.to_owned())
                        .increment(1);
                }
            }
        }

        for field in fields::PASS_THROUGH {
            if let Some(value) = record.get(field) {
                normalized.insert(field, value);
            }
        }

        normalized
    }
}

fn extract(vocabulary: &FieldVocabulary, raw: &str) -> Option<String> {
    vocabulary
        .extraction_candidates()
        .flat_map(|candidate| candidate.patterns())
        .filter_map(|pattern| captured(pattern, raw))
        .last()
}

fn captured(pattern: &Regex, raw: &str) -> Option<String> {
    let captures = pattern.captures(raw)?;
    let joined = captures
        .iter()
        .skip(1)
        .flatten()
        .map(|group| group.as_str())
        .filter(|group| !group.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let joined = joined.trim();
    (!joined.is_empty()).then(|| joined.to_owned())
}
