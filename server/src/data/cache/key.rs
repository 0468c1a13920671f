//! Type-safe cache key builder with versioning

use crate::core::constants::CACHE_KEY_VERSION;

/// Cache key builder
///
/// All keys are prefixed with a version (e.g. "v1:") so a format change
/// orphans every stale entry at once.
pub struct CacheKey;

impl CacheKey {
    /// Credential billing configuration by credential ID
    pub fn credential(id: &str) -> String {
        format!("{}:credential:{}", CACHE_KEY_VERSION, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_key() {
        assert_eq!(CacheKey::credential("abc"), "v1:credential:abc");
    }
}
