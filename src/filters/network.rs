/*
 * Copyright 2024 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Binding for `demo.proto`, the demo network filter's configuration.

use std::fmt;

use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize};

use crate::codec::{self, CachedSize, MalformedEncoding, WireReader, WireType};
use crate::descriptor::{self, MessageDescriptor};
use crate::reflect::{Describable, FieldAccessError, FieldValue};

/// Field number of `message` within [`DemoConfig`], as declared in
/// `demo.proto`. Stable for the life of the schema: this tag is never
/// reused for another type.
pub const MESSAGE_FIELD_TAG: u32 = 1;

/// Configuration for the demo network filter.
///
/// Carries a single free-form string. Fields this schema version does
/// not recognize are preserved through a decode and re-emitted verbatim
/// on encode, so a config written by a newer schema survives a pass
/// through this binding.
#[derive(Clone, Default)]
pub struct DemoConfig {
    message: String,
    unknown_fields: Bytes,
    encoded_len: CachedSize,
}

impl DemoConfig {
    /// Returns a config with `message` empty and no unknown fields.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replaces the carried string. Any string is legal, the empty one
    /// included.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.encoded_len.invalidate();
    }

    /// Bytes of fields this schema version does not know about, exactly
    /// as they appeared in the decoded input.
    pub fn unknown_fields(&self) -> &[u8] {
        &self.unknown_fields
    }

    /// Returns the config to its zero value.
    pub fn clear(&mut self) {
        self.message.clear();
        self.unknown_fields = Bytes::new();
        self.encoded_len.invalidate();
    }

    /// Serialized length of this config in the wire format.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len.get_or_compute(|| {
            let mut len = self.unknown_fields.len();
            if !self.message.is_empty() {
                len += codec::string_len(MESSAGE_FIELD_TAG, &self.message);
            }
            len
        })
    }

    /// Encodes this config into `buf`: known fields first, then any
    /// preserved unknown bytes in their original order. An empty
    /// `message` is elided entirely. Encoding cannot fail.
    pub fn encode(&self, buf: &mut impl BufMut) {
        if !self.message.is_empty() {
            codec::put_string(buf, MESSAGE_FIELD_TAG, &self.message);
        }
        buf.put_slice(&self.unknown_fields);
    }

    /// Encodes this config into a fresh buffer.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Decodes a config from `buf`.
    ///
    /// Empty input is the valid encoding of the default config. Tags
    /// other than [`MESSAGE_FIELD_TAG`] are preserved rather than
    /// rejected. The result accumulates in a fresh value, so no
    /// existing instance is left half-written when decoding fails.
    pub fn decode(buf: &[u8]) -> Result<Self, MalformedEncoding> {
        let mut decoded = Self::new();
        let mut unknown = Vec::new();
        let mut reader = WireReader::new(buf);

        while reader.has_remaining() {
            let start = reader.position();
            let (tag, wire_type) = reader.read_key()?;
            match (tag, wire_type) {
                (MESSAGE_FIELD_TAG, WireType::LengthDelimited) => {
                    let payload = reader.read_length_delimited()?;
                    decoded.message = std::str::from_utf8(payload)
                        .map_err(|_| MalformedEncoding::InvalidUtf8 { field: "message" })?
                        .to_owned();
                }
                // A known tag with the wrong wire type is treated the
                // same as an unknown tag.
                _ => {
                    reader.skip_value(wire_type)?;
                    tracing::debug!(tag, ?wire_type, "preserving unknown field");
                    unknown.extend_from_slice(reader.consumed_since(start));
                }
            }
        }

        decoded.unknown_fields = unknown.into();
        Ok(decoded)
    }
}

impl PartialEq for DemoConfig {
    fn eq(&self, other: &Self) -> bool {
        // The size cache is bookkeeping, not message data.
        self.message == other.message && self.unknown_fields == other.unknown_fields
    }
}

impl Eq for DemoConfig {}

impl fmt::Debug for DemoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemoConfig")
            .field("message", &self.message)
            .field("unknown_fields", &self.unknown_fields.len())
            .finish()
    }
}

impl fmt::Display for DemoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::reflect::render(self))
    }
}

impl Describable for DemoConfig {
    fn descriptor(&self) -> &'static MessageDescriptor {
        descriptor::demo_config()
    }

    fn field_count(&self) -> usize {
        self.descriptor().fields().len()
    }

    fn field_at(&self, index: usize) -> Option<(u32, &'static str, FieldValue)> {
        let field = self.descriptor().fields().get(index)?;
        Some((
            field.tag(),
            field.name(),
            FieldValue::String(self.message.clone()),
        ))
    }

    fn set_field_at(&mut self, index: usize, value: FieldValue) -> Result<(), FieldAccessError> {
        if index >= self.field_count() {
            return Err(FieldAccessError::OutOfRange(index));
        }

        match value {
            FieldValue::String(message) => {
                self.set_message(message);
                Ok(())
            }
        }
    }
}

/// Human-readable form of [`DemoConfig`], as it appears in a proxy
/// configuration file.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct Config {
    /// Free-form string carried by the demo filter.
    #[serde(default)]
    pub message: String,
}

impl From<Config> for DemoConfig {
    fn from(config: Config) -> Self {
        let mut proto = Self::new();
        proto.set_message(config.message);
        proto
    }
}

impl From<DemoConfig> for Config {
    fn from(proto: DemoConfig) -> Self {
        Self {
            message: proto.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn encodes_the_message_field() {
        let mut config = DemoConfig::new();
        config.set_message("hello");

        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            // Tag 1, length-delimited
            0x0a,
            // Length
            0x05,
            // Payload
            b'h', b'e', b'l', b'l', b'o',
        ];

        assert_eq!(config.encode_to_vec(), EXPECTED);
        assert_eq!(config.encoded_len(), EXPECTED.len());
    }

    #[test]
    fn default_value_is_elided() {
        assert_eq!(DemoConfig::new().encode_to_vec(), Vec::<u8>::new());
        assert_eq!(DemoConfig::new().encoded_len(), 0);
    }

    #[test]
    fn empty_input_decodes_to_default() {
        let config = DemoConfig::decode(&[]).unwrap();
        assert_eq!(config, DemoConfig::new());
        assert_eq!(config.message(), "");
        assert!(config.unknown_fields().is_empty());
    }

    #[test]
    fn round_trips() {
        for message in ["", "hello", "hello world", "héllo wörld", "日本語", "\0\t\n"] {
            let mut config = DemoConfig::new();
            config.set_message(message);

            let decoded = DemoConfig::decode(&config.encode_to_vec()).unwrap();
            assert_eq!(decoded, config);
            assert_eq!(decoded.message(), message);
        }
    }

    #[test]
    fn last_value_wins() {
        #[rustfmt::skip]
        const INPUT: &[u8] = &[
            // message: "first"
            0x0a, 0x05, b'f', b'i', b'r', b's', b't',
            // message: "second"
            0x0a, 0x06, b's', b'e', b'c', b'o', b'n', b'd',
        ];

        assert_eq!(DemoConfig::decode(INPUT).unwrap().message(), "second");
    }

    #[traced_test]
    #[test]
    fn unknown_fields_survive_a_round_trip() {
        #[rustfmt::skip]
        const INPUT: &[u8] = &[
            // Tag 2, varint 150
            0x10, 0x96, 0x01,
            // message: "hi"
            0x0a, 0x02, b'h', b'i',
            // Tag 3, length-delimited "x"
            0x1a, 0x01, b'x',
            // Tag 4, fixed32
            0x25, 0x01, 0x02, 0x03, 0x04,
            // Tag 5, fixed64
            0x29, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];

        let config = DemoConfig::decode(INPUT).unwrap();
        assert_eq!(config.message(), "hi");

        // Known fields lead; the unknown bytes follow in original order.
        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            0x0a, 0x02, b'h', b'i',
            0x10, 0x96, 0x01,
            0x1a, 0x01, b'x',
            0x25, 0x01, 0x02, 0x03, 0x04,
            0x29, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];
        assert_eq!(config.encode_to_vec(), EXPECTED);

        // Decoding the re-encoded form preserves them again, unchanged.
        let decoded = DemoConfig::decode(&config.encode_to_vec()).unwrap();
        assert_eq!(decoded, config);

        assert!(logs_contain("preserving unknown field"));
    }

    #[test]
    fn overlong_unknown_varint_preserved_verbatim() {
        // Varint 1 encoded in two bytes. Re-encoding must not
        // canonicalize it.
        #[rustfmt::skip]
        const INPUT: &[u8] = &[0x10, 0x81, 0x00];

        let config = DemoConfig::decode(INPUT).unwrap();
        assert_eq!(config.unknown_fields(), INPUT);
        assert_eq!(config.encode_to_vec(), INPUT);
    }

    #[test]
    fn wrong_wire_type_for_known_tag_is_preserved() {
        // Tag 1 as a varint rather than a string.
        #[rustfmt::skip]
        const INPUT: &[u8] = &[0x08, 0x2a];

        let config = DemoConfig::decode(INPUT).unwrap();
        assert_eq!(config.message(), "");
        assert_eq!(config.unknown_fields(), INPUT);
        assert_eq!(config.encode_to_vec(), INPUT);
    }

    #[test]
    fn truncated_field_rejected() {
        // Length prefix claims ten bytes with five present.
        #[rustfmt::skip]
        const INPUT: &[u8] = &[0x0a, 0x0a, b'h', b'e', b'l', b'l', b'o'];

        assert_eq!(
            DemoConfig::decode(INPUT).unwrap_err(),
            MalformedEncoding::TruncatedField {
                declared: 10,
                available: 5
            }
        );
    }

    #[test]
    fn truncated_key_rejected() {
        assert_eq!(
            DemoConfig::decode(&[0x80]).unwrap_err(),
            MalformedEncoding::TruncatedVarint
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        #[rustfmt::skip]
        const INPUT: &[u8] = &[0x0a, 0x02, 0xc3, 0x28];

        assert_eq!(
            DemoConfig::decode(INPUT).unwrap_err(),
            MalformedEncoding::InvalidUtf8 { field: "message" }
        );
    }

    #[test]
    fn clear_returns_to_zero_value() {
        let mut config = DemoConfig::decode(&[0x10, 0x2a, 0x0a, 0x02, b'h', b'i']).unwrap();
        assert_eq!(config.message(), "hi");
        assert!(!config.unknown_fields().is_empty());

        config.clear();
        assert_eq!(config, DemoConfig::new());
        assert_eq!(config.encoded_len(), 0);
    }

    #[test]
    fn encoded_len_tracks_mutation() {
        let mut config = DemoConfig::new();
        config.set_message("hello");
        assert_eq!(config.encoded_len(), config.encode_to_vec().len());

        config.set_message("a longer message than before");
        assert_eq!(config.encoded_len(), config.encode_to_vec().len());

        // Clones drop the cache but not the data.
        let clone = config.clone();
        assert_eq!(clone, config);
        assert_eq!(clone.encoded_len(), config.encoded_len());
    }

    #[test]
    fn renders_like_the_wire_content() {
        let mut config = DemoConfig::new();
        assert_eq!(config.to_string(), "");

        config.set_message("hello");
        assert_eq!(config.to_string(), r#"message:"hello""#);
    }

    #[test]
    fn config_from_yaml() {
        let config: Config = serde_yaml::from_str("message: hello").unwrap();
        let proto = DemoConfig::from(config);
        assert_eq!(proto.message(), "hello");

        // An empty mapping is a valid config: the field is optional.
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(DemoConfig::from(config), DemoConfig::new());
    }

    #[test]
    fn config_from_json() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "message": "hello",
        }))
        .unwrap();

        assert_eq!(config, Config::from(DemoConfig::from(config.clone())));
    }
}
