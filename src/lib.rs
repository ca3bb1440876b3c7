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

//! Wire-compatible binding for the demo network filter's protobuf
//! configuration message.
//!
//! The crate registers the compiled-in schema once per process, gives
//! [`DemoConfig`] structural (reflective) access through
//! [`Describable`], and encodes and decodes the Protocol Buffers wire
//! format byte-for-byte compatibly with the other language bindings of
//! `demo.proto`, preserving fields from newer schema versions across a
//! decode and re-encode.

#![deny(unused_must_use)]

pub mod codec;
pub mod descriptor;
pub mod filters;
pub mod reflect;

#[doc(inline)]
pub use self::{
    codec::MalformedEncoding,
    descriptor::SchemaInitError,
    filters::network::{Config, DemoConfig},
    reflect::{Describable, FieldValue},
};
