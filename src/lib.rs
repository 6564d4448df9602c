//! strata is a binary serialization library built around **schema
//! evolution**: values written by an older version of a type still
//! deserialize under a newer schema, and vice versa where the change
//! permits it, without breaking the existing byte stream.
//!
//! Records are laid out in per-generation *chunks*: every evolution step of
//! a type owns one chunk, a compact header describes the steps, and readers
//! of any version consume exactly the chunks they know about. On top of
//! that the crate provides the wire-level primitives (big-endian scalars,
//! zigzag var-ints, interned strings, deflate blobs) and a reference
//! tracker for shared and cyclic object graphs.
//!
//! # Quickstart
//!
//! Codecs for your own types come from the [`binary_record!`],
//! [`binary_adt!`] and [`binary_wrapper!`] macros:
//!
//! ```
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! strata::binary_record! {
//!     Point {
//!         x: i32,
//!         y: i32,
//!     }
//! }
//!
//! let bytes = strata::serialize(&Point { x: 1, y: 2 })?;
//! assert_eq!(strata::deserialize::<Point>(&bytes)?, Point { x: 1, y: 2 });
//! # Ok::<(), strata::Error>(())
//! ```
//!
//! # Evolving a schema
//!
//! Each schema change is recorded as an [`Evolution`] step. A codec with
//! steps beyond the initial version writes a versioned, chunked layout;
//! older and newer codecs reconcile through field defaults, optionality
//! promotion and removal markers:
//!
//! ```
//! use strata::Evolution;
//!
//! // Version 1 of this type had only `name`; `vip` arrived later with a
//! // default, so bytes written back then still decode today.
//! #[derive(Debug, PartialEq)]
//! struct Customer {
//!     name: String,
//!     vip: bool,
//! }
//!
//! strata::binary_record! {
//!     #[evolution(Evolution::field_added("vip", false))]
//!     Customer {
//!         name: String,
//!         vip: bool,
//!     }
//! }
//!
//! let bytes = strata::serialize(&Customer { name: "ada".into(), vip: true })?;
//! assert_eq!(
//!     strata::deserialize::<Customer>(&bytes)?,
//!     Customer { name: "ada".into(), vip: true }
//! );
//! # Ok::<(), strata::Error>(())
//! ```
//!
//! # Wire format
//!
//! A serialized value is exactly the bytes its codec writes: no outer
//! framing, no magic number, no content hash. The receiver must know the
//! expected codec. Multi-byte primitives are big-endian; strings are
//! deduplicated per stream; single-version records and tuples of the same
//! element types are byte-identical.

pub mod error;
pub use error::{Error, Result};
pub mod io;
mod state;
pub use state::SerializerState;
mod context;
pub use context::{ReadContext, WriteContext};
mod codec;
pub use codec::{read_streamed, write_streamed, BinaryRead, BinaryWrite, ErrorFrame, PersistedError};
mod registry;
pub use registry::TypeRegistry;
mod evolution;
pub use evolution::{
    DefaultValue, Evolution, FieldPosition, RecordMeta, SerializedEvolutionStep,
};
mod chunked;
pub mod adt;

use io::SliceInput;

/// Serialize a value into a fresh byte vector.
///
/// Every call owns a fresh [`SerializerState`], so string and reference ids
/// never leak between streams.
pub fn serialize<T: BinaryWrite + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serialize_with(value, &TypeRegistry::new())
}

/// Serialize with a [`TypeRegistry`] for streams containing polymorphic
/// references.
pub fn serialize_with<T: BinaryWrite + ?Sized>(
    value: &T,
    registry: &TypeRegistry,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut state = SerializerState::new();
    let mut ctx = WriteContext::new(&mut out, &mut state, registry);
    value.write(&mut ctx)?;
    Ok(out)
}

/// Deserialize a value from a byte slice.
pub fn deserialize<T: BinaryRead>(bytes: &[u8]) -> Result<T> {
    deserialize_with(bytes, &TypeRegistry::new())
}

/// Deserialize with a [`TypeRegistry`] for streams containing polymorphic
/// references. The registration order must match the writing side, since
/// type ids are part of the wire format.
pub fn deserialize_with<T: BinaryRead>(bytes: &[u8], registry: &TypeRegistry) -> Result<T> {
    let mut input = SliceInput::new(bytes);
    let mut state = SerializerState::new();
    let mut ctx = ReadContext::new(&mut input, &mut state, registry);
    T::read(&mut ctx)
}
