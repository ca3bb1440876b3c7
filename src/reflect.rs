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

//! Structural access to configuration messages without compile-time
//! knowledge of their concrete type.

use std::fmt::Write;

use crate::descriptor::MessageDescriptor;

/// A single field value as seen through [`Describable`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldValue {
    String(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
        }
    }

    /// Whether this is the default value for its type.
    pub fn is_default(&self) -> bool {
        match self {
            Self::String(value) => value.is_empty(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// An error raised on dynamic field access.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FieldAccessError {
    #[error("message has no field at index {0}")]
    OutOfRange(usize),
    #[error("message has no field with tag {0}")]
    UnknownTag(u32),
    #[error("message has no field named `{0}`")]
    UnknownName(String),
    #[error("value kind does not match field `{0}`")]
    WrongKind(&'static str),
}

/// Structural view over a message: ordered, named, tagged fields that
/// can be read and written without naming the concrete type.
///
/// Generic tooling (debug rendering, config diffing, dynamic access)
/// programs against this trait alone.
pub trait Describable {
    /// The registered descriptor for this message type.
    fn descriptor(&self) -> &'static MessageDescriptor;

    /// Number of fields the schema declares.
    fn field_count(&self) -> usize;

    /// The field at `index` in declaration order.
    fn field_at(&self, index: usize) -> Option<(u32, &'static str, FieldValue)>;

    /// Replaces the value of the field at `index`.
    fn set_field_at(&mut self, index: usize, value: FieldValue) -> Result<(), FieldAccessError>;

    fn field_by_tag(&self, tag: u32) -> Option<FieldValue> {
        (0..self.field_count())
            .filter_map(|index| self.field_at(index))
            .find(|(field_tag, _, _)| *field_tag == tag)
            .map(|(_, _, value)| value)
    }

    fn field_by_name(&self, name: &str) -> Option<FieldValue> {
        (0..self.field_count())
            .filter_map(|index| self.field_at(index))
            .find(|(_, field_name, _)| *field_name == name)
            .map(|(_, _, value)| value)
    }

    fn set_field_by_tag(&mut self, tag: u32, value: FieldValue) -> Result<(), FieldAccessError> {
        let index = (0..self.field_count())
            .find(|&index| {
                self.field_at(index)
                    .is_some_and(|(field_tag, _, _)| field_tag == tag)
            })
            .ok_or(FieldAccessError::UnknownTag(tag))?;

        self.set_field_at(index, value)
    }

    fn set_field_by_name(&mut self, name: &str, value: FieldValue) -> Result<(), FieldAccessError> {
        let index = (0..self.field_count())
            .find(|&index| {
                self.field_at(index)
                    .is_some_and(|(_, field_name, _)| field_name == name)
            })
            .ok_or_else(|| FieldAccessError::UnknownName(name.to_owned()))?;

        self.set_field_at(index, value)
    }
}

/// Renders a message in the protobuf text-format style, for debugging.
///
/// Default-valued fields are omitted, matching their absence on the
/// wire. The output is not a parseable serialization.
pub fn render(message: &dyn Describable) -> String {
    let mut out = String::new();
    for index in 0..message.field_count() {
        let Some((_, name, value)) = message.field_at(index) else {
            continue;
        };
        if value.is_default() {
            continue;
        }

        if !out.is_empty() {
            out.push(' ');
        }
        match value {
            FieldValue::String(value) => {
                // Infallible: writing into a String.
                let _ = write!(out, "{name}:{value:?}");
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filters::network::DemoConfig;

    #[test]
    fn enumerates_declared_fields() {
        let mut config = DemoConfig::new();
        config.set_message("hello");

        assert_eq!(config.field_count(), 1);
        let (tag, name, value) = config.field_at(0).unwrap();
        assert_eq!(tag, 1);
        assert_eq!(name, "message");
        assert_eq!(value, FieldValue::String("hello".into()));
        assert!(config.field_at(1).is_none());
    }

    #[test]
    fn reads_by_tag_and_name() {
        let mut config = DemoConfig::new();
        config.set_message("hello");

        assert_eq!(config.field_by_tag(1).unwrap().as_str(), Some("hello"));
        assert_eq!(config.field_by_name("message").unwrap().as_str(), Some("hello"));
        assert!(config.field_by_tag(2).is_none());
        assert!(config.field_by_name("nope").is_none());
    }

    #[test]
    fn writes_by_tag_and_name() {
        let mut config = DemoConfig::new();
        config.set_field_by_tag(1, "first".into()).unwrap();
        assert_eq!(config.message(), "first");

        config.set_field_by_name("message", "second".into()).unwrap();
        assert_eq!(config.message(), "second");

        assert_eq!(
            config.set_field_by_tag(9, "nope".into()).unwrap_err(),
            FieldAccessError::UnknownTag(9)
        );
        assert_eq!(
            config.set_field_by_name("nope", "nope".into()).unwrap_err(),
            FieldAccessError::UnknownName("nope".into())
        );
        assert_eq!(
            config.set_field_at(3, "nope".into()).unwrap_err(),
            FieldAccessError::OutOfRange(3)
        );
    }

    #[test]
    fn renders_set_fields() {
        let mut config = DemoConfig::new();
        assert_eq!(render(&config), "");

        config.set_message("hello \"there\"");
        assert_eq!(render(&config), r#"message:"hello \"there\"""#);
    }
}
