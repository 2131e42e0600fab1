use tracing::debug;

use crate::record::{fields, Record};

/// Fields of which a normalized display record must keep a minimum number.
pub const DISPLAY_KEY_FIELDS: [&str; 4] = [
    fields::SCREEN_SIZE,
    fields::RESOLUTION,
    fields::RESPONSE_TIME,
    fields::REFRESH_RATE,
];

const MIN_KEY_FIELDS: usize = 2;

/// Structural completeness checks run before and after normalization.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    required: Vec<&'static str>,
    key_fields: Vec<&'static str>,
    min_key_fields: usize,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self {
            required: vec![fields::URL, fields::BRAND, fields::MODEL],
            key_fields: DISPLAY_KEY_FIELDS.to_vec(),
            min_key_fields: MIN_KEY_FIELDS,
        }
    }
}

impl RecordValidator {
    /// Additionally require `field` before normalization.
    pub fn requiring(mut self, field: &'static str) -> Self {
        if !self.required.contains(&field) {
            self.required.push(field);
        }
        self
    }

    pub fn pre_validate(&self, record: &Record) -> bool {
        match self.required.iter().find(|field| !record.contains(field)) {
            Some(missing) => {
                debug!(missing, "record failed pre-validation");
                false
            }
            None => true,
        }
    }

    pub fn post_validate(&self, record: &Record) -> bool {
        let present = self
            .key_fields
            .iter()
            .filter(|field| record.contains(field))
            .count();
        if present < self.min_key_fields {
            debug!(present, "record failed post-validation");
        }
        present >= self.min_key_fields
    }
}
