//! # Serialization Formats
//!
//! Converts call arguments and results to and from body bytes.
//!
//! The serializer is never named on the wire: client and server must be
//! configured with the same [`Serializer`] out of band. The codecs only ever
//! call [`Serializer::marshal`] and [`Serializer::unmarshal`].
//!
//! ## Formats
//! - **Bincode**: compact binary, fastest (default)
//! - **JSON**: human-readable, handy for debugging and interop
//! - **MessagePack**: compact self-describing binary
//!
//! ## Usage
//! ```rust
//! use tinyrpc::core::serialization::Serializer;
//!
//! let bytes = Serializer::Json.marshal(&(2, 3)).unwrap();
//! let (a, b): (i32, i32) = Serializer::Json.unmarshal(&bytes).unwrap();
//! assert_eq!(a + b, 5);
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    MessagePack,
}

impl Serializer {
    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Serializer::Bincode => "Bincode",
            Serializer::Json => "JSON",
            Serializer::MessagePack => "MessagePack",
        }
    }

    /// Serialize `value` into body bytes
    pub fn marshal<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Serializer::Bincode => bincode::serialize(value)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
            Serializer::Json => {
                serde_json::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            Serializer::MessagePack => rmp_serde::to_vec(value)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
        }
    }

    /// Deserialize body bytes into a `T`
    pub fn unmarshal<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            Serializer::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            Serializer::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            Serializer::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }
}

/// Object-safe view of a serializable value.
///
/// Lets heterogeneous reply types travel through a single non-generic
/// response path: any `&T` where `T: Serialize` coerces to `&dyn Marshal`.
pub trait Marshal: Send + Sync {
    /// Serialize `self` with `serializer`
    fn marshal_with(&self, serializer: Serializer) -> Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> Marshal for T {
    fn marshal_with(&self, serializer: Serializer) -> Result<Vec<u8>> {
        serializer.marshal(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ArithRequest {
        a: i64,
        b: i64,
    }

    const ALL: [Serializer; 3] = [
        Serializer::Bincode,
        Serializer::Json,
        Serializer::MessagePack,
    ];

    #[test]
    #[allow(clippy::expect_used)]
    fn test_struct_roundtrip_every_format() {
        let request = ArithRequest { a: 20, b: 22 };
        for format in ALL {
            let bytes = format.marshal(&request).expect("serialize");
            let recovered: ArithRequest = format.unmarshal(&bytes).expect("deserialize");
            assert_eq!(request, recovered, "{}", format.name());
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(Serializer::Bincode.name(), "Bincode");
        assert_eq!(Serializer::Json.name(), "JSON");
        assert_eq!(Serializer::MessagePack.name(), "MessagePack");
    }

    #[test]
    fn test_default_format() {
        assert_eq!(Serializer::default(), Serializer::Bincode);
    }

    #[test]
    fn test_garbage_is_deserialize_error() {
        for format in ALL {
            let result: Result<ArithRequest> = format.unmarshal(&[0xc1]);
            assert!(
                matches!(result, Err(ProtocolError::DeserializeError(_))),
                "{}",
                format.name()
            );
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_marshal_trait_object() {
        let value = ArithRequest { a: 1, b: 2 };
        let erased: &dyn Marshal = &value;
        let bytes = erased.marshal_with(Serializer::Json).expect("serialize");
        assert_eq!(bytes, br#"{"a":1,"b":2}"#);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_format_sizes() {
        let request = ArithRequest { a: 1, b: 2 };
        let json_size = Serializer::Json.marshal(&request).expect("json").len();
        let msgpack_size = Serializer::MessagePack
            .marshal(&request)
            .expect("msgpack")
            .len();

        // MessagePack should be more compact than JSON
        assert!(msgpack_size < json_size);
    }
}
