//! Static vocabulary configuration: per-field candidate dictionaries, aggregate tag dictionaries
//! and the category map used to regroup fields.
//!
//! The document is loaded once at startup and never mutated afterwards. Patterns are compiled up
//! front with the linear-time `regex` engine and a bounded compiled size, so a pathological
//! pattern cannot stall a partition. Patterns that fail to compile are logged and skipped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::{info, warn};

use crate::aggregates::{AggregateSpec, AggregateTag};
use crate::error::{PatternError, VocabularyError};
use crate::metrics_consts::INVALID_PATTERNS_COUNTER;

/// Sentinel label switching a candidate to extraction mode.
pub const FIND_TAG: &str = "FIND";

/// Upper bound on the compiled size of a single pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

const DISPLAY_VOCABULARY: &str = include_str!("../vocabulary/display.json");

#[derive(Debug, Deserialize)]
struct VocabularyDocument {
    fields: HashMap<String, Vec<CandidateDocument>>,
    #[serde(default)]
    aggregates: Vec<AggregateDocument>,
    #[serde(default)]
    categories: Vec<CategoryDocument>,
}

#[derive(Debug, Deserialize)]
struct CandidateDocument {
    label: String,
    patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateDocument {
    field: String,
    row_separator: String,
    #[serde(default)]
    item_separator: Option<String>,
    tags: Vec<TagDocument>,
}

#[derive(Debug, Deserialize)]
struct TagDocument {
    pattern: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct CategoryDocument {
    name: String,
    fields: Vec<String>,
}

/// Compiles a case-insensitive pattern. Extraction patterns are anchored so they only accept
/// a match spanning the whole value.
pub(crate) fn compile_pattern(
    owner: &str,
    pattern: &str,
    full_match: bool,
) -> Result<Regex, PatternError> {
    let source = if full_match {
        format!(r"\A(?:{pattern})\z")
    } else {
        pattern.to_owned()
    };

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|error| PatternError {
            owner: owner.to_owned(),
            pattern: pattern.to_owned(),
            error,
        })
}

/// One canonical value and the patterns recognizing raw text that represents it.
#[derive(Debug, Clone)]
pub struct CandidateValue {
    label: String,
    patterns: Vec<Regex>,
}

impl CandidateValue {
    pub fn new(label: impl Into<String>, patterns: Vec<Regex>) -> Self {
        Self {
            label: label.into(),
            patterns,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// Extraction candidates produce their output from capture groups instead of their label.
    pub fn is_extraction(&self) -> bool {
        self.label.eq_ignore_ascii_case(FIND_TAG)
    }
}

/// Ordered candidates for one field.
#[derive(Debug, Clone, Default)]
pub struct FieldVocabulary {
    candidates: Vec<CandidateValue>,
}

impl FieldVocabulary {
    pub fn new(candidates: Vec<CandidateValue>) -> Self {
        Self { candidates }
    }

    pub fn extraction_candidates(&self) -> impl Iterator<Item = &CandidateValue> {
        self.candidates.iter().filter(|c| c.is_extraction())
    }

    pub fn canonical_candidates(&self) -> impl Iterator<Item = &CandidateValue> {
        self.candidates.iter().filter(|c| !c.is_extraction())
    }
}

/// Field name to candidate dictionary.
#[derive(Debug, Clone, Default)]
pub struct VocabularyStore {
    fields: HashMap<String, FieldVocabulary>,
}

impl VocabularyStore {
    pub fn get(&self, field: &str) -> Option<&FieldVocabulary> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FieldVocabulary)> for VocabularyStore {
    fn from_iter<I: IntoIterator<Item = (S, FieldVocabulary)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A named group of fields nested together on output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub fields: Vec<String>,
}

/// Categories in their declared order. Earlier categories claim shared fields first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    categories: Vec<Category>,
}

impl CategoryMap {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }
}

/// Everything one listing category needs to normalize and regroup its records.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub store: Arc<VocabularyStore>,
    pub aggregates: Arc<Vec<AggregateSpec>>,
    pub categories: Arc<CategoryMap>,
    skipped_patterns: usize,
}

impl Vocabulary {
    /// The bundled vocabulary for computer displays.
    pub fn display_default() -> Result<Self, VocabularyError> {
        Self::from_json(DISPLAY_VOCABULARY)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|error| VocabularyError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Self::from_json(&document)
    }

    pub fn from_json(document: &str) -> Result<Self, VocabularyError> {
        let document: VocabularyDocument = serde_json::from_str(document)?;
        let mut skipped_patterns = 0;
        let mut compile = |owner: &str, pattern: &str, full_match: bool| {
            match compile_pattern(owner, pattern, full_match) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(owner = %e.owner, pattern = %e.pattern, error = %e.error, "skipping invalid vocabulary pattern");
                    metrics::counter!(INVALID_PATTERNS_COUNTER, "owner" => e.owner).increment(1);
                    skipped_patterns += 1;
                    None
                }
            }
        };

        let mut store = HashMap::with_capacity(document.fields.len());
        for (field, candidates) in document.fields {
            let candidates = candidates
                .into_iter()
                .map(|candidate| {
                    let full_match = candidate.label.eq_ignore_ascii_case(FIND_TAG);
                    let patterns = candidate
                        .patterns
                        .iter()
                        .filter_map(|p| compile(&field, p, full_match))
                        .collect();
                    CandidateValue::new(candidate.label, patterns)
                })
                .collect();
            store.insert(field, FieldVocabulary::new(candidates));
        }

        let aggregates = document
            .aggregates
            .into_iter()
            .map(|aggregate| {
                let tags = aggregate
                    .tags
                    .iter()
                    .filter_map(|tag| {
                        compile(&aggregate.field, &tag.pattern, false)
                            .map(|pattern| AggregateTag::new(pattern, tag.target.clone()))
                    })
                    .collect();
                AggregateSpec::new(
                    aggregate.field,
                    aggregate.row_separator,
                    aggregate.item_separator,
                    tags,
                )
            })
            .collect::<Vec<_>>();

        let categories = document
            .categories
            .into_iter()
            .map(|c| Category {
                name: c.name,
                fields: c.fields,
            })
            .collect();

        info!(
            fields = store.len(),
            aggregates = aggregates.len(),
            skipped_patterns,
            "loaded vocabulary"
        );

        Ok(Self {
            store: Arc::new(VocabularyStore { fields: store }),
            aggregates: Arc::new(aggregates),
            categories: Arc::new(CategoryMap::new(categories)),
            skipped_patterns,
        })
    }

    /// Number of patterns dropped at load time because they failed to compile.
    pub fn skipped_patterns(&self) -> usize {
        self.skipped_patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_display_vocabulary_compiles_cleanly() {
        let vocabulary = Vocabulary::display_default().unwrap();

        assert_eq!(vocabulary.skipped_patterns(), 0);
        assert!(vocabulary.store.contains("ScreenSize"));
        assert!(vocabulary.store.contains("RefreshRate"));
        assert_eq!(
            vocabulary.categories.names().collect::<Vec<_>>(),
            vec!["Ergonomics", "Connectivity"]
        );
        assert_eq!(vocabulary.aggregates.len(), 2);
    }

    #[test]
    fn invalid_patterns_are_skipped_not_fatal() {
        let vocabulary = Vocabulary::from_json(
            r#"{"fields": {"PanelType": [{"label": "IPS", "patterns": ["ips(", "ips"]}]}}"#,
        )
        .unwrap();

        assert_eq!(vocabulary.skipped_patterns(), 1);
        let panel = vocabulary.store.get("PanelType").unwrap();
        let ips = panel.canonical_candidates().next().unwrap();
        assert_eq!(ips.label(), "IPS");
        assert_eq!(ips.patterns().len(), 1);
    }

    #[test]
    fn extraction_patterns_are_anchored() {
        let pattern = compile_pattern("ScreenSize", r"(\d+)\s*in", true).unwrap();
        assert!(pattern.is_match("22 IN"));
        assert!(!pattern.is_match("about 22 in wide"));

        let partial = compile_pattern("ScreenSize", r"(\d+)\s*in", false).unwrap();
        assert!(partial.is_match("about 22 in wide"));
    }

    #[test]
    fn find_label_is_case_insensitive() {
        assert!(CandidateValue::new("find", vec![]).is_extraction());
        assert!(CandidateValue::new("FIND", vec![]).is_extraction());
        assert!(!CandidateValue::new("Finder", vec![]).is_extraction());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(
            Vocabulary::from_json(r#"{"fields": 3}"#),
            Err(VocabularyError::Json(_))
        ));
        assert!(matches!(
            Vocabulary::from_path("/nonexistent/vocabulary.json"),
            Err(VocabularyError::Io { .. })
        ));
    }
}
