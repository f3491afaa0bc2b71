//! Write builder for staging entities.

use bytes::Bytes;
use tempo_core::{NumericValue, WriteRequest};

/// Fluent builder for a [`WriteRequest`].
///
/// ```no_run
/// use tempo_api::Write;
///
/// let request = Write::new("invoice-7")
///     .payload(b"pdf bytes".as_ref())
///     .content_type("application/pdf")
///     .owner("0xabc")
///     .expires_in(100)
///     .string_annotation("status", "open")
///     .numeric_annotation("amount", 99.5)
///     .build();
/// ```
pub struct Write {
    request: WriteRequest,
}

impl Write {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            request: WriteRequest {
                key: key.into(),
                ..Default::default()
            },
        }
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.request.payload = payload.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request.content_type = content_type.into();
        self
    }

    pub fn owner(mut self, owner_address: impl Into<String>) -> Self {
        self.request.owner_address = owner_address.into();
        self
    }

    /// Lifetime in blocks, measured from the block the write lands in.
    pub fn expires_in(mut self, blocks: u64) -> Self {
        self.request.expires_in = blocks;
        self
    }

    /// Mark the entity as a deletion tombstone.
    pub fn deleted(mut self) -> Self {
        self.request.deleted = true;
        self
    }

    pub fn string_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.request
            .string_annotations
            .insert(key.into(), value.into());
        self
    }

    pub fn numeric_annotation(mut self, key: impl Into<String>, value: f64) -> Self {
        self.request
            .numeric_annotations
            .insert(key.into(), NumericValue::Number(value));
        self
    }

    pub fn build(self) -> WriteRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assembles_request() {
        let request = Write::new("k1")
            .payload(b"body".as_ref())
            .content_type("text/plain")
            .owner("0xabc")
            .expires_in(50)
            .string_annotation("tag", "x")
            .numeric_annotation("pri", 2.0)
            .build();

        assert_eq!(request.key, "k1");
        assert_eq!(request.expires_in, 50);
        assert_eq!(request.owner_address, "0xabc");
        assert!(!request.deleted);
        assert_eq!(request.string_annotations.get("tag"), Some(&"x".to_string()));
        assert_eq!(
            request.numeric_annotations.get("pri"),
            Some(&NumericValue::Number(2.0))
        );
    }
}
