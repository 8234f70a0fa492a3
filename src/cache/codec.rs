//! Serialization boundary between cached values and stored blobs

use serde::{de::DeserializeOwned, Serialize};

use super::CacheError;

/// Converts values of type `V` to and from the bytes kept in the store
///
/// A codec is built where the serde bounds are known, so the persistent
/// store itself only needs `V: Clone`.
pub struct Codec<V> {
    encode: fn(&V) -> Result<Vec<u8>, CacheError>,
    decode: fn(&[u8]) -> Result<V, CacheError>,
}

impl<V> Clone for Codec<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Codec<V> {}

impl<V: Serialize + DeserializeOwned> Codec<V> {
    /// JSON codec backed by `serde_json`
    pub fn json() -> Self {
        Self {
            encode: |value| serde_json::to_vec(value).map_err(CacheError::Encode),
            decode: |bytes| serde_json::from_slice(bytes).map_err(CacheError::Decode),
        }
    }
}

impl<V> Codec<V> {
    pub fn encode(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        (self.encode)(value)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<V, CacheError> {
        (self.decode)(bytes)
    }
}

impl<V> std::fmt::Debug for Codec<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        token: String,
        cookies: BTreeMap<String, String>,
        scopes: Vec<Option<u32>>,
    }

    #[test]
    fn test_json_codec_preserves_nested_containers() {
        let codec = Codec::<Session>::json();
        let mut cookies = BTreeMap::new();
        cookies.insert("sid".to_string(), "abc".to_string());
        let session = Session {
            token: "t0k3n".to_string(),
            cookies,
            scopes: vec![Some(1), None, Some(3)],
        };

        let bytes = codec.encode(&session).expect("Encode should succeed");
        let decoded = codec.decode(&bytes).expect("Decode should succeed");

        assert_eq!(decoded, session);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = Codec::<Session>::json();
        let err = codec.decode(b"not json").unwrap_err();
        assert!(matches!(err, CacheError::Decode(_)));
    }
}
