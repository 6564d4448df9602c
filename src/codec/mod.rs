//! Codec traits.
//!
//! A codec is the pair of a [`BinaryWrite`] and a [`BinaryRead`]
//! implementation for one static type. Both thread an explicit context so
//! that string interning, reference tracking and the chunked record
//! machinery see one consistent stream state.
use {
    crate::{
        context::{ReadContext, WriteContext},
        error::Result,
    },
    std::any::Any,
};

mod impls;
pub use impls::{read_streamed, write_streamed};
mod persisted;
pub use persisted::{ErrorFrame, PersistedError};

/// Types that can be written to a binary stream.
pub trait BinaryWrite {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()>;
}

/// Types that can be read back from a binary stream.
///
/// Besides [`BinaryRead::read`], the trait carries three hooks consumed by
/// the schema-evolution machinery. They have correct defaults for every
/// type except `Option`, which overrides all three; custom codecs normally
/// leave them alone.
pub trait BinaryRead: Sized {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self>;

    /// True only for `Option`, whose values may be substituted when a field
    /// disappears from or gains optionality in an evolved schema.
    const IS_OPTION: bool = false;

    /// The value standing in for a field that the serialized version
    /// removed: `Some(None)` for options, `None` (an error) otherwise.
    fn absent() -> Option<Self> {
        None
    }

    /// Read the pre-optional representation of this type. For `Option<T>`
    /// this reads a bare `T` and wraps it, which is how values written
    /// before a `FieldMadeOptional` step are decoded.
    fn read_pre_optional(ctx: &mut ReadContext<'_>) -> Result<Self> {
        Self::read(ctx)
    }

    /// Recover a declared evolution default for this type. `Option<T>`
    /// additionally accepts a default of the pre-optional type `T`.
    fn from_erased_default(default: Box<dyn Any>) -> Option<Self>
    where
        Self: 'static,
    {
        default.downcast::<Self>().ok().map(|value| *value)
    }
}
