use std::sync::Arc;

use tracing::debug;

use crate::record::{fields, ExplodedRecord, Record};

/// Category-specific handling of a listing, from validation to the final nested shape.
pub trait ListingTransformer: Send + Sync {
    /// Primary `Category` value this transformer handles.
    fn category(&self) -> &str;

    /// Other `Category` values routed to this transformer.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn pre_validate(&self, record: &Record) -> bool;

    fn post_validate(&self, record: &Record) -> bool;

    /// Prepares a raw record for normalization, e.g. by expanding aggregate fields.
    fn pre_process(&self, record: &Record) -> Record;

    fn normalize(&self, record: &Record) -> Record;

    /// Shapes a normalized record for the success sink.
    fn post_process(&self, record: &Record) -> ExplodedRecord;

    fn handles(&self, category: &str) -> bool {
        self.category().eq_ignore_ascii_case(category)
            || self
                .aliases()
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(category))
    }
}

/// Picks a transformer by the record's `Category`, falling back to a default one.
#[derive(Clone)]
pub struct TransformerRegistry {
    transformers: Vec<Arc<dyn ListingTransformer>>,
    fallback: Arc<dyn ListingTransformer>,
}

impl TransformerRegistry {
    pub fn new(fallback: Arc<dyn ListingTransformer>) -> Self {
        Self {
            transformers: vec![fallback.clone()],
            fallback,
        }
    }

    pub fn register(mut self, transformer: Arc<dyn ListingTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn select(&self, record: &Record) -> &dyn ListingTransformer {
        let Some(category) = record.get(fields::CATEGORY) else {
            return self.fallback.as_ref();
        };

        match self.transformers.iter().find(|t| t.handles(category)) {
            Some(transformer) => transformer.as_ref(),
            None => {
                debug!(
                    category,
                    fallback = self.fallback.category(),
                    "no transformer for category"
                );
                self.fallback.as_ref()
            }
        }
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field(
                "categories",
                &self
                    .transformers
                    .iter()
                    .map(|t| t.category())
                    .collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.category())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static [&'static str]);

    impl ListingTransformer for Fixed {
        fn category(&self) -> &str {
            self.0
        }

        fn aliases(&self) -> &[&str] {
            self.1
        }

        fn pre_validate(&self, _: &Record) -> bool {
            true
        }

        fn post_validate(&self, _: &Record) -> bool {
            true
        }

        fn pre_process(&self, record: &Record) -> Record {
            record.clone()
        }

        fn normalize(&self, record: &Record) -> Record {
            record.clone()
        }

        fn post_process(&self, _: &Record) -> ExplodedRecord {
            ExplodedRecord::new()
        }
    }

    fn registry() -> TransformerRegistry {
        TransformerRegistry::new(Arc::new(Fixed("Display", &["Monitor"])))
            .register(Arc::new(Fixed("Keyboard", &[])))
    }

    fn with_category(category: &str) -> Record {
        [("Category", category)].into_iter().collect()
    }

    #[test]
    fn selects_by_category_and_alias() {
        let registry = registry();

        assert_eq!(registry.select(&with_category("Keyboard")).category(), "Keyboard");
        assert_eq!(registry.select(&with_category("keyboard")).category(), "Keyboard");
        assert_eq!(registry.select(&with_category("MONITOR")).category(), "Display");
    }

    #[test]
    fn unknown_or_missing_category_uses_fallback() {
        let registry = registry();

        assert_eq!(registry.select(&with_category("Toaster")).category(), "Display");
        assert_eq!(registry.select(&Record::new()).category(), "Display");
    }
}
