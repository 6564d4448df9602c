//! The generic codec for algebraic data types.
//!
//! [`RecordWriter`] and [`RecordReader`] carry the full compatibility
//! semantics; the [`binary_record!`](crate::binary_record),
//! [`binary_adt!`](crate::binary_adt) and
//! [`binary_wrapper!`](crate::binary_wrapper) macros only walk the declared
//! fields in order and delegate here, so the macros stay thin.
use {
    crate::{
        chunked::{ChunkedInput, ChunkedOutput},
        codec::{BinaryRead, BinaryWrite},
        context::{ReadContext, WriteContext},
        error::{
            deserialization_failure, field_removed_in_serialized_version,
            field_without_default_value_is_missing, non_optional_field_serialized_as_none,
            serialization_failure, Result,
        },
        evolution::{read_version, RecordMeta},
        io::{BinaryInput, BinaryOutput},
    },
};

/// Serializes one record (or one sum value) against its evolution metadata.
///
/// With a single-step history the record is written in simple mode: the
/// version byte `0` followed by the fields, with no header and no chunk
/// buffering. Evolved records buffer each generation's fields into its own
/// chunk and emit them after the header on [`RecordWriter::finish`].
pub struct RecordWriter<'a, 'c> {
    ctx: &'a mut WriteContext<'c>,
    meta: &'a RecordMeta,
    chunked: Option<ChunkedOutput>,
}

impl<'a, 'c> RecordWriter<'a, 'c> {
    pub fn new(ctx: &'a mut WriteContext<'c>, meta: &'a RecordMeta) -> Result<Self> {
        let chunked = if meta.version() == 0 {
            ctx.output().write_i8(0)?;
            None
        } else {
            Some(ChunkedOutput::new(meta.version()))
        };
        Ok(Self { ctx, meta, chunked })
    }

    /// Write one field into the chunk of its generation, recording its
    /// position for the header pass.
    pub fn write_field<T: BinaryWrite + ?Sized>(
        &mut self,
        name: &'static str,
        value: &T,
    ) -> Result<()> {
        match &mut self.chunked {
            None => value.write(self.ctx),
            Some(chunked) => {
                let generation = self.meta.generation_of(name);
                chunked.record_position(name, generation);
                let mut ctx = WriteContext {
                    out: chunked.chunk_mut(generation),
                    state: &mut *self.ctx.state,
                    registry: self.ctx.registry,
                };
                value.write(&mut ctx)
            }
        }
    }

    /// Write a constructor id and its payload into chunk 0.
    pub fn write_constructor(
        &mut self,
        id: u32,
        write_payload: impl FnOnce(&mut WriteContext<'_>) -> Result<()>,
    ) -> Result<()> {
        let id = i32::try_from(id)
            .map_err(|_| serialization_failure("constructor id exceeds i32::MAX", None))?;
        match &mut self.chunked {
            None => {
                self.ctx.output().write_var_int(id, true)?;
                write_payload(self.ctx)
            }
            Some(chunked) => {
                let mut ctx = WriteContext {
                    out: chunked.chunk_mut(0),
                    state: &mut *self.ctx.state,
                    registry: self.ctx.registry,
                };
                ctx.output().write_var_int(id, true)?;
                write_payload(&mut ctx)
            }
        }
    }

    /// Flush the version byte, header and buffered chunks. A no-op in
    /// simple mode.
    pub fn finish(self) -> Result<()> {
        match self.chunked {
            None => Ok(()),
            Some(chunked) => chunked.finish(self.meta, self.ctx),
        }
    }
}

/// Deserializes one record with full cross-version compatibility handling.
pub struct RecordReader<'a, 'c> {
    ctx: &'a mut ReadContext<'c>,
    meta: &'a RecordMeta,
    chunked: Option<ChunkedInput>,
}

impl<'a, 'c> RecordReader<'a, 'c> {
    /// Read the version byte and, for evolved streams, the header and all
    /// chunk bodies.
    pub fn begin(ctx: &'a mut ReadContext<'c>, meta: &'a RecordMeta) -> Result<Self> {
        let stored_version = read_version(ctx)?;
        let chunked = if stored_version == 0 {
            None
        } else {
            Some(ChunkedInput::read_from(ctx, stored_version)?)
        };
        Ok(Self { ctx, meta, chunked })
    }

    /// The version the stream was written with.
    pub fn stored_version(&self) -> u8 {
        self.chunked
            .as_ref()
            .map_or(0, ChunkedInput::stored_version)
    }

    /// Read one declared field, reconciling the stream's schema with the
    /// local one.
    ///
    /// In order: a field the stream's writer removed yields its absent
    /// value (`None`) or fails for non-optional types; a field newer than
    /// the stream is filled from its declared default; a field the stream
    /// serialized as optional but that is locally non-optional unwraps the
    /// stored option; a locally optional field older than its
    /// `FieldMadeOptional` step reads the bare payload and wraps it.
    pub fn read_field<T: BinaryRead + 'static>(&mut self, name: &'static str) -> Result<T> {
        let generation = self.meta.generation_of(name);
        let made_optional_since = self.meta.made_optional_at(name);
        match &mut self.chunked {
            None => {
                if generation > 0 {
                    return missing_field(self.meta, name);
                }
                if T::IS_OPTION && made_optional_since.is_some() {
                    T::read_pre_optional(self.ctx)
                } else {
                    T::read(self.ctx)
                }
            }
            Some(chunked) => {
                if chunked.is_removed(name) {
                    return T::absent().ok_or_else(|| field_removed_in_serialized_version(name));
                }
                let position = chunked.alloc_position(generation);
                let stored_version = chunked.stored_version();
                if stored_version < generation {
                    return missing_field(self.meta, name);
                }
                let stream_optional = chunked.is_optional_at(position);
                let mut ctx = ReadContext {
                    input: chunked.chunk_mut(generation)?,
                    state: &mut *self.ctx.state,
                    registry: self.ctx.registry,
                };
                if stream_optional && !T::IS_OPTION {
                    if ctx.input().read_bool()? {
                        T::read(&mut ctx)
                    } else {
                        Err(non_optional_field_serialized_as_none(name))
                    }
                } else if matches!(made_optional_since, Some(since) if T::IS_OPTION && stored_version < since)
                {
                    T::read_pre_optional(&mut ctx)
                } else {
                    T::read(&mut ctx)
                }
            }
        }
    }

    /// Read the constructor id of a sum value from chunk 0.
    pub fn read_constructor_id(&mut self) -> Result<u32> {
        let raw = match &mut self.chunked {
            None => self.ctx.input().read_var_int(true)?,
            Some(chunked) => chunked.chunk_mut(0)?.read_var_int(true)?,
        };
        u32::try_from(raw).map_err(|_| {
            deserialization_failure(format!("invalid constructor id encoding {raw}"), None)
        })
    }

    /// Read a constructor payload from chunk 0.
    pub fn read_variant<T>(
        &mut self,
        read_payload: impl FnOnce(&mut ReadContext<'_>) -> Result<T>,
    ) -> Result<T> {
        match &mut self.chunked {
            None => read_payload(self.ctx),
            Some(chunked) => {
                let mut ctx = ReadContext {
                    input: chunked.chunk_mut(0)?,
                    state: &mut *self.ctx.state,
                    registry: self.ctx.registry,
                };
                read_payload(&mut ctx)
            }
        }
    }
}

fn missing_field<T: BinaryRead + 'static>(meta: &RecordMeta, name: &'static str) -> Result<T> {
    let Some(default) = meta.default_of(name) else {
        return Err(field_without_default_value_is_missing(name));
    };
    T::from_erased_default(default.produce()).ok_or_else(|| {
        deserialization_failure(
            format!("default value for field `{name}` has a mismatched type"),
            None,
        )
    })
}

/// Implement [`BinaryWrite`] and [`BinaryRead`] for a record (product)
/// type by listing its fields in declaration order.
///
/// The optional `#[evolution(..)]` attribute lists the
/// [`Evolution`](crate::Evolution) steps that follow the initial version.
/// A field with an `= expression` initializer is transient: it is excluded
/// from the serialized layout and filled from the expression on every read.
///
/// # Examples
///
/// ```
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// strata::binary_record! {
///     Point {
///         x: i32,
///         y: i32,
///     }
/// }
///
/// let bytes = strata::serialize(&Point { x: 1, y: 2 })?;
/// assert_eq!(strata::deserialize::<Point>(&bytes)?, Point { x: 1, y: 2 });
/// # Ok::<(), strata::Error>(())
/// ```
///
/// With an evolution history and a transient field:
///
/// ```
/// use strata::Evolution;
///
/// struct Session {
///     user: String,
///     retries: i32,
///     dirty: bool,
/// }
///
/// strata::binary_record! {
///     #[evolution(Evolution::field_added("retries", 0i32))]
///     Session {
///         user: String,
///         retries: i32,
///         dirty: bool = false,
///     }
/// }
/// ```
#[macro_export]
macro_rules! binary_record {
    (
        $(#[evolution($($step:expr),* $(,)?)])?
        $name:ident {
            $($field:ident : $fty:ty $(= $transient_default:expr)?),* $(,)?
        }
    ) => {
        impl $name {
            #[doc(hidden)]
            fn __strata_meta() -> &'static $crate::RecordMeta {
                static META: ::std::sync::LazyLock<$crate::RecordMeta> =
                    ::std::sync::LazyLock::new(|| {
                        $crate::RecordMeta::new(
                            stringify!($name),
                            ::std::vec![$crate::Evolution::InitialVersion $($(, $step)*)?],
                        )
                    });
                &META
            }
        }

        impl $crate::BinaryWrite for $name {
            fn write(&self, ctx: &mut $crate::WriteContext<'_>) -> $crate::Result<()> {
                #[allow(unused_mut)]
                let mut __record = $crate::adt::RecordWriter::new(ctx, Self::__strata_meta())?;
                $($crate::__record_write_field!(__record, self, $field $(, $transient_default)?);)*
                __record.finish()
            }
        }

        impl $crate::BinaryRead for $name {
            fn read(ctx: &mut $crate::ReadContext<'_>) -> $crate::Result<Self> {
                #[allow(unused_mut)]
                let mut __record = $crate::adt::RecordReader::begin(ctx, Self::__strata_meta())?;
                $(let $field: $fty =
                    $crate::__record_read_field!(__record, $field : $fty $(= $transient_default)?);)*
                Ok(Self { $($field),* })
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_write_field {
    ($record:ident, $self:ident, $field:ident) => {
        $record.write_field(stringify!($field), &$self.$field)?;
    };
    // transient fields are not part of the layout
    ($record:ident, $self:ident, $field:ident, $default:expr) => {};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_read_field {
    ($record:ident, $field:ident : $fty:ty) => {
        $record.read_field::<$fty>(stringify!($field))?
    };
    ($record:ident, $field:ident : $fty:ty = $default:expr) => {
        $default
    };
}

/// Implement [`BinaryWrite`] and [`BinaryRead`] for a sum type.
///
/// Constructor ids follow the declared order and are part of the wire
/// format, so append new variants rather than reordering. Every variant
/// must use struct syntax (`Variant {}` for an empty payload); payloads
/// are encoded as single-version records. A payload that needs its own
/// evolution history belongs in a dedicated [`binary_record!`] type held
/// as the variant's single field.
///
/// # Examples
///
/// ```
/// #[derive(Debug, PartialEq)]
/// enum Shape {
///     Circle { radius: f64 },
///     Unknown {},
/// }
///
/// strata::binary_adt! {
///     Shape {
///         Circle { radius: f64 },
///         Unknown {},
///     }
/// }
///
/// let bytes = strata::serialize(&Shape::Circle { radius: 1.5 })?;
/// assert_eq!(
///     strata::deserialize::<Shape>(&bytes)?,
///     Shape::Circle { radius: 1.5 }
/// );
/// # Ok::<(), strata::Error>(())
/// ```
#[macro_export]
macro_rules! binary_adt {
    (
        $(#[evolution($($step:expr),* $(,)?)])?
        $name:ident {
            $($variant:ident { $($vfield:ident : $vfty:ty),* $(,)? }),+ $(,)?
        }
    ) => {
        impl $name {
            #[doc(hidden)]
            fn __strata_meta() -> &'static $crate::RecordMeta {
                static META: ::std::sync::LazyLock<$crate::RecordMeta> =
                    ::std::sync::LazyLock::new(|| {
                        $crate::RecordMeta::new(
                            stringify!($name),
                            ::std::vec![$crate::Evolution::InitialVersion $($(, $step)*)?],
                        )
                        .with_constructors(&[$(stringify!($variant)),+])
                    });
                &META
            }
        }

        impl $crate::BinaryWrite for $name {
            fn write(&self, ctx: &mut $crate::WriteContext<'_>) -> $crate::Result<()> {
                let meta = Self::__strata_meta();
                let mut record = $crate::adt::RecordWriter::new(ctx, meta)?;
                match self {
                    $(Self::$variant { $($vfield),* } => {
                        let id = meta.constructor_id(stringify!($variant))?;
                        record.write_constructor(id, |ctx| {
                            $crate::io::BinaryOutput::write_i8(ctx.output(), 0)?;
                            $($crate::BinaryWrite::write($vfield, ctx)?;)*
                            Ok(())
                        })?;
                    })+
                }
                record.finish()
            }
        }

        impl $crate::BinaryRead for $name {
            fn read(ctx: &mut $crate::ReadContext<'_>) -> $crate::Result<Self> {
                let meta = Self::__strata_meta();
                let mut record = $crate::adt::RecordReader::begin(ctx, meta)?;
                let id = record.read_constructor_id()?;
                let constructor = meta.constructor_name(id)?;
                $(if constructor == stringify!($variant) {
                    return record.read_variant(|ctx| {
                        let version = $crate::io::BinaryInput::read_i8(ctx.input())?;
                        if version != 0 {
                            return Err($crate::error::deserialization_failure(
                                format!("unsupported constructor payload version {version}"),
                                None,
                            ));
                        }
                        $(let $vfield = <$vfty as $crate::BinaryRead>::read(ctx)?;)*
                        Ok(Self::$variant { $($vfield),* })
                    });
                })+
                ::core::unreachable!("constructor name resolved outside the declared set")
            }
        }
    };
}

/// Implement the value-type wrapper codec for a single-field newtype: the
/// inner codec with a projection, no version byte.
///
/// # Examples
///
/// ```
/// #[derive(Debug, PartialEq)]
/// struct DocumentId(String);
///
/// strata::binary_wrapper! { DocumentId(String) }
///
/// let bytes = strata::serialize(&DocumentId("doc-1".into()))?;
/// // identical to the bare inner encoding
/// assert_eq!(bytes, strata::serialize(&"doc-1".to_owned())?);
/// # Ok::<(), strata::Error>(())
/// ```
#[macro_export]
macro_rules! binary_wrapper {
    ($name:ident ( $inner:ty )) => {
        impl $crate::BinaryWrite for $name {
            #[inline]
            fn write(&self, ctx: &mut $crate::WriteContext<'_>) -> $crate::Result<()> {
                $crate::BinaryWrite::write(&self.0, ctx)
            }
        }

        impl $crate::BinaryRead for $name {
            #[inline]
            fn read(ctx: &mut $crate::ReadContext<'_>) -> $crate::Result<Self> {
                Ok(Self(<$inner as $crate::BinaryRead>::read(ctx)?))
            }
        }
    };
}
