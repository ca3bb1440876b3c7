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

//! The compiled-in schema for `demo.proto` and its process-wide registry.

use once_cell::sync::{Lazy, OnceCell};
use prost::Message;
use prost_types::field_descriptor_proto::Type;

use crate::codec::WireType;

/// Serialized `FileDescriptorProto` for `demo.proto`.
///
/// Byte-identical to the descriptor embedded by the other language
/// bindings of this file, so descriptor-driven tooling agrees on the
/// schema no matter which binding produced it.
#[rustfmt::skip]
pub const RAW_FILE_DESCRIPTOR: &[u8] = &[
    // name: "source/filters/network/proto/demo.proto"
    0x0a, 0x27, 0x73, 0x6f, 0x75, 0x72, 0x63, 0x65, 0x2f, 0x66, 0x69, 0x6c,
    0x74, 0x65, 0x72, 0x73, 0x2f, 0x6e, 0x65, 0x74, 0x77, 0x6f, 0x72, 0x6b,
    0x2f, 0x70, 0x72, 0x6f, 0x74, 0x6f, 0x2f, 0x64, 0x65, 0x6d, 0x6f, 0x2e,
    0x70, 0x72, 0x6f, 0x74, 0x6f,
    // package: "greymatter_io.gm_proxy.source.filters.network"
    0x12, 0x2d, 0x67, 0x72, 0x65, 0x79, 0x6d, 0x61, 0x74, 0x74, 0x65, 0x72,
    0x5f, 0x69, 0x6f, 0x2e, 0x67, 0x6d, 0x5f, 0x70, 0x72, 0x6f, 0x78, 0x79,
    0x2e, 0x73, 0x6f, 0x75, 0x72, 0x63, 0x65, 0x2e, 0x66, 0x69, 0x6c, 0x74,
    0x65, 0x72, 0x73, 0x2e, 0x6e, 0x65, 0x74, 0x77, 0x6f, 0x72, 0x6b,
    // message_type { name: "DemoConfig"
    0x22, 0x26, 0x0a, 0x0a, 0x44, 0x65, 0x6d, 0x6f, 0x43, 0x6f, 0x6e, 0x66,
    0x69, 0x67,
    //   field { name: "message" number: 1 label: OPTIONAL type: STRING json_name: "message" } }
    0x12, 0x18, 0x0a, 0x07, 0x6d, 0x65, 0x73, 0x73, 0x61, 0x67, 0x65, 0x18,
    0x01, 0x20, 0x01, 0x28, 0x09, 0x52, 0x07, 0x6d, 0x65, 0x73, 0x73, 0x61,
    0x67, 0x65,
    // options { go_package: "github.com/greymatter-io/gm-proxy/source/filters/network/proto" }
    0x42, 0x40, 0x5a, 0x3e, 0x67, 0x69, 0x74, 0x68, 0x75, 0x62, 0x2e, 0x63,
    0x6f, 0x6d, 0x2f, 0x67, 0x72, 0x65, 0x79, 0x6d, 0x61, 0x74, 0x74, 0x65,
    0x72, 0x2d, 0x69, 0x6f, 0x2f, 0x67, 0x6d, 0x2d, 0x70, 0x72, 0x6f, 0x78,
    0x79, 0x2f, 0x73, 0x6f, 0x75, 0x72, 0x63, 0x65, 0x2f, 0x66, 0x69, 0x6c,
    0x74, 0x65, 0x72, 0x73, 0x2f, 0x6e, 0x65, 0x74, 0x77, 0x6f, 0x72, 0x6b,
    0x2f, 0x70, 0x72, 0x6f, 0x74, 0x6f,
    // syntax: "proto3"
    0x62, 0x06, 0x70, 0x72, 0x6f, 0x74, 0x6f, 0x33,
];

static FILE_DESCRIPTOR: OnceCell<FileDescriptor> = OnceCell::new();

/// An error raised while registering the embedded descriptor.
///
/// The descriptor is fixed at compile time, so any of these indicates a
/// defective build rather than a runtime condition.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaInitError {
    #[error("embedded descriptor failed to parse: {0}")]
    Parse(#[from] prost::DecodeError),
    #[error("embedded descriptor does not declare message `{0}`")]
    MissingMessage(&'static str),
    #[error("descriptor field `{field}` does not match the compiled-in schema: {reason}")]
    FieldMismatch { field: String, reason: String },
}

/// Parses, validates, and registers the embedded descriptor.
///
/// Idempotent: after the first successful call every later call,
/// including concurrent ones, returns the same reference without
/// re-registering.
pub fn initialize() -> Result<&'static FileDescriptor, SchemaInitError> {
    FILE_DESCRIPTOR.get_or_try_init(|| {
        let file = FileDescriptor::parse(RAW_FILE_DESCRIPTOR)?;
        tracing::debug!(
            file = %file.name(),
            package = %file.package(),
            "registered filter configuration schema"
        );
        Ok(file)
    })
}

/// The registered descriptor for the demo filter configuration message.
///
/// Panics if the embedded descriptor is corrupt, which a correct build
/// rules out; fallible registration is available through
/// [`initialize`].
pub fn demo_config() -> &'static MessageDescriptor {
    initialize()
        .expect("embedded demo.proto descriptor is malformed")
        .message("DemoConfig")
        .expect("demo.proto declares DemoConfig")
}

/// Gzip-compressed form of [`RAW_FILE_DESCRIPTOR`].
///
/// Computed on first use and cached for the life of the process. Only
/// descriptor introspection wants this; encode and decode never touch
/// it.
pub fn raw_file_descriptor_gzip() -> &'static [u8] {
    static COMPRESSED: Lazy<Vec<u8>> = Lazy::new(|| {
        let mut encoder = libflate::gzip::Encoder::new(Vec::new())
            .expect("gzip encoder over an in-memory buffer");
        std::io::copy(&mut &RAW_FILE_DESCRIPTOR[..], &mut encoder)
            .expect("gzip compression of an in-memory buffer");
        encoder
            .finish()
            .into_result()
            .expect("gzip finalization of an in-memory buffer")
    });

    &COMPRESSED
}

/// Immutable description of one `.proto` file.
#[derive(Debug)]
pub struct FileDescriptor {
    name: String,
    package: String,
    messages: Vec<MessageDescriptor>,
}

impl FileDescriptor {
    fn parse(raw: &[u8]) -> Result<Self, SchemaInitError> {
        let file = prost_types::FileDescriptorProto::decode(raw)?;
        let package = file.package.unwrap_or_default();
        let messages = file
            .message_type
            .iter()
            .map(|message| MessageDescriptor::from_proto(&package, message))
            .collect::<Result<Vec<_>, _>>()?;

        let file = Self {
            name: file.name.unwrap_or_default(),
            package,
            messages,
        };
        file.validate()?;
        Ok(file)
    }

    /// The schema this crate was built against: one message,
    /// `DemoConfig`, whose tag 1 is the `message` string. Anything else
    /// means the embedded bytes were corrupted.
    fn validate(&self) -> Result<(), SchemaInitError> {
        let demo = self
            .message("DemoConfig")
            .ok_or(SchemaInitError::MissingMessage("DemoConfig"))?;

        match demo.field_by_tag(1) {
            Some(field) if field.name() == "message" && field.kind() == FieldKind::String => Ok(()),
            Some(field) => Err(SchemaInitError::FieldMismatch {
                field: field.name().to_owned(),
                reason: "tag 1 must be the `message` string field".into(),
            }),
            None => Err(SchemaInitError::FieldMismatch {
                field: "message".into(),
                reason: "tag 1 is not declared".into(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn messages(&self) -> &[MessageDescriptor] {
        &self.messages
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.iter().find(|message| message.name == name)
    }
}

/// Immutable description of one message type: its name and its ordered,
/// tagged fields.
#[derive(Debug)]
pub struct MessageDescriptor {
    name: String,
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    fn from_proto(
        package: &str,
        proto: &prost_types::DescriptorProto,
    ) -> Result<Self, SchemaInitError> {
        let name = proto.name().to_owned();
        let full_name = if package.is_empty() {
            name.clone()
        } else {
            format!("{package}.{name}")
        };

        let fields = proto
            .field
            .iter()
            .map(FieldDescriptor::from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            full_name,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name, package included.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.tag == tag)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Immutable description of one field.
#[derive(Debug)]
pub struct FieldDescriptor {
    name: String,
    tag: u32,
    kind: FieldKind,
}

impl FieldDescriptor {
    fn from_proto(proto: &prost_types::FieldDescriptorProto) -> Result<Self, SchemaInitError> {
        let name = proto.name().to_owned();

        let tag = u32::try_from(proto.number()).map_err(|_| SchemaInitError::FieldMismatch {
            field: name.clone(),
            reason: format!("field number {} is out of range", proto.number()),
        })?;

        let kind = match proto.r#type() {
            Type::String => FieldKind::String,
            other => {
                return Err(SchemaInitError::FieldMismatch {
                    field: name,
                    reason: format!("unsupported field type {other:?}"),
                });
            }
        };

        Ok(Self { name, tag, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }
}

/// The declared type of a field's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldKind {
    String,
}

impl FieldKind {
    pub fn wire_type(self) -> WireType {
        match self {
            Self::String => WireType::LengthDelimited,
        }
    }
}
