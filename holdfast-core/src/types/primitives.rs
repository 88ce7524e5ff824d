use serde::{Deserialize, Serialize};

use crate::error::HoldfastError;

/// Maximum object name length in bytes
pub const MAX_OBJECT_NAME_BYTES: usize = 1024;

/// A globally unique bucket identifier.
///
/// Construct with [`BucketId::parse`]; the checks run locally so a malformed
/// name never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketId(String);

impl BucketId {
    pub fn parse(name: impl Into<String>) -> Result<Self, HoldfastError> {
        let name = name.into();
        validate_bucket_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BucketId {
    type Error = HoldfastError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BucketId> for String {
    fn from(value: BucketId) -> Self {
        value.0
    }
}

/// Composite key addressing one object inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub bucket: BucketId,
    pub object: String,
}

impl ObjectKey {
    pub fn new(bucket: BucketId, object: impl Into<String>) -> Result<Self, HoldfastError> {
        let object = object.into();
        validate_object_name(&object)?;
        Ok(Self { bucket, object })
    }

    /// Parses both halves of the key
    pub fn parse(bucket: &str, object: &str) -> Result<Self, HoldfastError> {
        Self::new(BucketId::parse(bucket)?, object)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_bucket_name(name: &str) -> Result<(), HoldfastError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(HoldfastError::InvalidArgument(format!(
            "bucket name '{}' must be 3-63 characters long",
            name
        )));
    }

    let valid_char = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.'
    };
    if !name.chars().all(valid_char) {
        return Err(HoldfastError::InvalidArgument(format!(
            "bucket name '{}' may only contain lowercase letters, digits, '-', '_' and '.'",
            name
        )));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(HoldfastError::InvalidArgument(format!(
            "bucket name '{}' must start and end with a letter or digit",
            name
        )));
    }

    Ok(())
}

pub fn validate_object_name(name: &str) -> Result<(), HoldfastError> {
    if name.is_empty() {
        return Err(HoldfastError::InvalidArgument(
            "object name is required".to_string(),
        ));
    }
    if name.len() > MAX_OBJECT_NAME_BYTES {
        return Err(HoldfastError::InvalidArgument(format!(
            "object name exceeds {} bytes",
            MAX_OBJECT_NAME_BYTES
        )));
    }
    if name.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
        return Err(HoldfastError::InvalidArgument(
            "object name must not contain carriage returns, line feeds or NUL".to_string(),
        ));
    }
    Ok(())
}

/// Converts a caller supplied retention period into the unsigned form the
/// store understands.
pub fn validate_retention_period(period_secs: i64) -> Result<u64, HoldfastError> {
    u64::try_from(period_secs).map_err(|_| {
        HoldfastError::InvalidArgument(format!(
            "retention period must not be negative (got {}s)",
            period_secs
        ))
    })
}
