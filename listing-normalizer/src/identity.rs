use std::fmt;

use crate::error::HashingError;
use crate::metrics_consts::HASHING_FAILURES_COUNTER;
use crate::record::{fields, Record};

const KEY_LENGTH: usize = 32;

/// Lowercase hex MD5 digest of a listing URL. Used as the dedup index, the Kafka partition key
/// and the primary key of stored listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn from_url(url: &str) -> Self {
        Self(format!("{:x}", md5::compute(url.as_bytes())))
    }

    /// Accepts a key read back from a message key.
    pub fn parse(key: &str) -> Result<Self, HashingError> {
        let valid = key.len() == KEY_LENGTH
            && key
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(HashingError::InvalidKey(key.to_owned()));
        }
        Ok(Self(key.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity key of a record that already passed pre-validation.
pub fn identity_key(record: &Record) -> Result<IdentityKey, HashingError> {
    match record.get(fields::URL) {
        Some(url) => Ok(IdentityKey::from_url(url)),
        None => {
            metrics::counter!(HASHING_FAILURES_COUNTER).increment(1);
            Err(HashingError::MissingField(fields::URL))
        }
    }
}
