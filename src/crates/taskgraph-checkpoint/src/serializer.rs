//! Serialization of session records for storage backends

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Byte-level encoding used by checkpoint stores
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON serializer
///
/// Session contexts are arbitrary JSON values, so only self-describing formats
/// round-trip them.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output, used for files meant to be read by people
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        if self.pretty {
            Ok(serde_json::to_vec_pretty(value)?)
        } else {
            Ok(serde_json::to_vec(value)?)
        }
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionState, SessionStatus};
    use serde_json::json;

    #[test]
    fn test_json_serializer_keeps_nested_context() {
        let serializer = JsonSerializer::new();
        let mut state = SessionState::new("s-1", "retrieve", true, json!({"nodes": []}));
        state.suspend(
            "review_retrieval",
            "write",
            json!({"values": {"documents": [{"title": "a", "score": 0.5}]}}),
        );

        let bytes = serializer.dumps(&state).unwrap();
        let restored: SessionState = serializer.loads(&bytes).unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.status, SessionStatus::Suspended);
    }

    #[test]
    fn test_pretty_output_is_indented() {
        let bytes = JsonSerializer::pretty().dumps(&json!({"a": 1})).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains('\n'));
    }

    #[test]
    fn test_garbage_fails_to_load() {
        let result: Result<SessionState> = JsonSerializer::new().loads(b"not json");
        assert!(result.is_err());
    }
}
