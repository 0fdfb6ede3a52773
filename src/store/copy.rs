//! Copy Strategy Module
//!
//! Value copying applied at a tier boundary when a store is configured for
//! copy-on-read or copy-on-write.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

/// Produces an independent copy of a value.
pub trait ValueCopier<V>: Send + Sync {
    fn copy(&self, value: &V) -> Result<V>;
}

/// Copies through `Clone`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneCopier;

impl<V: Clone> ValueCopier<V> for CloneCopier {
    fn copy(&self, value: &V) -> Result<V> {
        Ok(value.clone())
    }
}

/// Copies by serializing to JSON and reading it back.
///
/// Nothing but the serialized form survives, so the copy shares no state
/// with the original.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCopier;

impl<V: Serialize + DeserializeOwned> ValueCopier<V> for JsonCopier {
    fn copy(&self, value: &V) -> Result<V> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Copy(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Copy(e.to_string()))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_clone_copier() {
        let original = vec![1u32, 2, 3];
        let copy = CloneCopier.copy(&original).unwrap();
        assert_eq!(copy, original);
        assert_ne!(copy.as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_json_copier_round_trips_structs() {
        let original = Profile {
            name: "ada".to_string(),
            tags: vec!["admin".to_string()],
        };
        let copy = JsonCopier.copy(&original).unwrap();
        assert_eq!(copy, original);
    }

    #[test]
    fn test_json_copier_reports_unserializable_values() {
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), 3u8);
        let err = JsonCopier.copy(&map).unwrap_err();
        assert!(matches!(err, CacheError::Copy(_)));
    }
}
