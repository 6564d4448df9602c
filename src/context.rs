//! Contexts threading state through every nested codec invocation.
//!
//! A serialization or deserialization call builds one context over its
//! output or input and passes it down the codec tree. The contexts also
//! carry the string interning and object reference protocols, since those
//! need both the byte stream and the per-stream [`SerializerState`].
use {
    crate::{
        error::{deserialization_failure, serialization_failure, Result},
        io::{BinaryInput, BinaryOutput},
        registry::TypeRegistry,
        state::SerializerState,
    },
    std::{any::Any, rc::Rc},
};

/// Context for a single serialization call.
pub struct WriteContext<'a> {
    pub(crate) out: &'a mut dyn BinaryOutput,
    pub(crate) state: &'a mut SerializerState,
    pub(crate) registry: &'a TypeRegistry,
}

impl<'a> WriteContext<'a> {
    pub fn new(
        out: &'a mut dyn BinaryOutput,
        state: &'a mut SerializerState,
        registry: &'a TypeRegistry,
    ) -> Self {
        Self {
            out,
            state,
            registry,
        }
    }

    /// The underlying byte sink.
    #[inline]
    pub fn output(&mut self) -> &mut dyn BinaryOutput {
        self.out
    }

    /// Write a string with stream-level deduplication.
    ///
    /// The first occurrence of distinct content is written as a positive
    /// zigzag length followed by UTF-8 bytes and assigns the next id;
    /// repeats are written as the negated id. The empty string is the
    /// single byte `varint(0)` and never gets an id.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            return self.out.write_var_int(0, false);
        }
        if let Some(id) = self.state.string_id(value) {
            return self.out.write_var_int(-(id as i32), false);
        }
        let len = i32::try_from(value.len())
            .map_err(|_| serialization_failure("string length exceeds i32::MAX", None))?;
        self.out.write_var_int(len, false)?;
        self.out.write_bytes(value.as_bytes())?;
        self.state.register_string(value.to_owned());
        Ok(())
    }

    /// Write a back-reference if this exact `Rc` was already written in the
    /// stream, otherwise mint the next id and write the value itself via
    /// `write_value`.
    ///
    /// A back-reference is the negated id as a zigzag varint; a new object
    /// is `varint(0)` followed by its encoding.
    pub fn write_ref_or_else<T: Any>(
        &mut self,
        value: &Rc<T>,
        write_value: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let identity = Rc::as_ptr(value) as usize;
        if let Some(id) = self.state.object_id(identity) {
            return self.out.write_var_int(-(id as i32), false);
        }
        self.state.register_written_object(identity, value.clone());
        self.out.write_var_int(0, false)?;
        write_value(self)
    }

    /// Polymorphic variant of [`WriteContext::write_ref_or_else`]: the
    /// value's runtime type is resolved through the [`TypeRegistry`] and its
    /// type id is written after the new-object marker so the reader can
    /// dispatch.
    pub fn store_ref_or_object(&mut self, value: &Rc<dyn Any>) -> Result<()> {
        let identity = Rc::as_ptr(value) as *const u8 as usize;
        if let Some(id) = self.state.object_id(identity) {
            return self.out.write_var_int(-(id as i32), false);
        }
        let entry = self
            .registry
            .entry_of(value.as_ref().type_id())
            .ok_or_else(|| {
                serialization_failure("value type is not registered for polymorphic writes", None)
            })?;
        self.state.register_written_object(identity, value.clone());
        self.out.write_var_int(0, false)?;
        self.out.write_var_int(entry.id() as i32, true)?;
        entry.write(value.as_ref(), self)
    }
}

/// Context for a single deserialization call.
pub struct ReadContext<'a> {
    pub(crate) input: &'a mut dyn BinaryInput,
    pub(crate) state: &'a mut SerializerState,
    pub(crate) registry: &'a TypeRegistry,
}

impl<'a> ReadContext<'a> {
    pub fn new(
        input: &'a mut dyn BinaryInput,
        state: &'a mut SerializerState,
        registry: &'a TypeRegistry,
    ) -> Self {
        Self {
            input,
            state,
            registry,
        }
    }

    /// The underlying byte source.
    #[inline]
    pub fn input(&mut self) -> &mut dyn BinaryInput {
        self.input
    }

    /// Read a string written by [`WriteContext::write_string`].
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.input.read_var_int(false)?;
        if len == 0 {
            return Ok(String::new());
        }
        if len > 0 {
            let bytes = self.input.read_bytes(len as usize)?;
            let value = String::from_utf8(bytes)
                .map_err(|e| deserialization_failure("invalid UTF-8 in string", Some(Box::new(e))))?;
            self.state.register_string(value.clone());
            return Ok(value);
        }
        let id = len
            .checked_neg()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| deserialization_failure("invalid string back-reference", None))?;
        self.state
            .resolve_string(id)
            .map(str::to_owned)
            .ok_or_else(|| {
                deserialization_failure(format!("unresolved string back-reference {id}"), None)
            })
    }

    /// Register a partially constructed value so that back-references inside
    /// its own body resolve to the same handle. Cycle-aware codecs call this
    /// right after allocating their node shell and before reading fields
    /// that may refer back.
    pub fn store_read_ref(&mut self, handle: Rc<dyn Any>) {
        self.state.register_read_object(handle);
    }

    /// Resolve a back-reference or read a new value via `read_value`.
    ///
    /// `read_value` is responsible for id registration: either it calls
    /// [`ReadContext::store_read_ref`] on its shell before reading the body
    /// (cycle-capable), or the caller uses [`ReadContext::read_ref_or_value`]
    /// which registers after construction.
    pub fn read_ref_or_else<T: Any>(
        &mut self,
        read_value: impl FnOnce(&mut Self) -> Result<Rc<T>>,
    ) -> Result<Rc<T>> {
        let marker = self.input.read_var_int(false)?;
        if marker == 0 {
            return read_value(self);
        }
        let object = self.resolve_back_reference(marker)?;
        object
            .downcast::<T>()
            .map_err(|_| deserialization_failure("object back-reference type mismatch", None))
    }

    /// Read a reference-tracked value of a statically known type.
    ///
    /// With `store_read_reference` the freshly read value is registered
    /// under the next id; this matches writers that track the type but is
    /// only suitable for acyclic values, since registration happens after
    /// the body has been read.
    pub fn read_ref_or_value<T: crate::codec::BinaryRead + Any>(
        &mut self,
        store_read_reference: bool,
    ) -> Result<Rc<T>> {
        self.read_ref_or_else(|ctx| {
            let value = Rc::new(T::read(ctx)?);
            if store_read_reference {
                ctx.store_read_ref(value.clone());
            }
            Ok(value)
        })
    }

    /// Polymorphic variant of [`ReadContext::read_ref_or_else`]: dispatches
    /// on the type id written by [`WriteContext::store_ref_or_object`].
    pub fn read_ref_or_object(&mut self, store_read_reference: bool) -> Result<Rc<dyn Any>> {
        let marker = self.input.read_var_int(false)?;
        if marker != 0 {
            return self.resolve_back_reference(marker);
        }
        let type_id = u32::try_from(self.input.read_var_int(true)?)
            .map_err(|_| deserialization_failure("invalid polymorphic type id", None))?;
        let entry = self.registry.entry_by_id(type_id).ok_or_else(|| {
            deserialization_failure(format!("unregistered polymorphic type id {type_id}"), None)
        })?;
        let value = entry.read(self)?;
        if store_read_reference {
            self.state.register_read_object(value.clone());
        }
        Ok(value)
    }

    fn resolve_back_reference(&self, marker: i32) -> Result<Rc<dyn Any>> {
        let id = marker
            .checked_neg()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| {
                deserialization_failure(format!("invalid object reference marker {marker}"), None)
            })?;
        self.state.resolve_object(id).ok_or_else(|| {
            deserialization_failure(format!("unresolved object back-reference {id}"), None)
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::io::SliceInput,
    };

    fn write_with<F: FnOnce(&mut WriteContext<'_>)>(f: F) -> Vec<u8> {
        let mut out = Vec::new();
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = WriteContext::new(&mut out, &mut state, &registry);
        f(&mut ctx);
        out
    }

    #[test]
    fn string_dedup_emits_back_reference() {
        let bytes = write_with(|ctx| {
            ctx.write_string("Hello").unwrap();
            ctx.write_string("Hello").unwrap();
        });
        // first: zigzag(5) + UTF-8, second: zigzag(-1)
        assert_eq!(bytes, [0x0a, b'H', b'e', b'l', b'l', b'o', 0x01]);

        let mut input = SliceInput::new(&bytes);
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = ReadContext::new(&mut input, &mut state, &registry);
        assert_eq!(ctx.read_string().unwrap(), "Hello");
        assert_eq!(ctx.read_string().unwrap(), "Hello");
    }

    #[test]
    fn empty_string_gets_no_id() {
        let bytes = write_with(|ctx| {
            ctx.write_string("").unwrap();
            ctx.write_string("x").unwrap();
            ctx.write_string("x").unwrap();
        });
        // "", then "x" as id 1, then the back-reference -1
        assert_eq!(bytes, [0x00, 0x02, b'x', 0x01]);
    }

    #[test]
    fn unresolved_back_reference_fails() {
        let bytes = [0x03u8]; // zigzag(-2): back-reference to id 2, never written
        let mut input = SliceInput::new(&bytes);
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = ReadContext::new(&mut input, &mut state, &registry);
        assert!(ctx.read_string().is_err());
    }

    #[test]
    fn shared_reference_round_trip() {
        let shared = Rc::new(42i64);
        let bytes = write_with(|ctx| {
            for _ in 0..2 {
                ctx.write_ref_or_else(&shared, |ctx| ctx.output().write_i64(42))
                    .unwrap();
            }
        });
        // new-object marker + payload, then zigzag(-1)
        assert_eq!(bytes[0], 0x00);
        assert_eq!(*bytes.last().unwrap(), 0x01);

        let mut input = SliceInput::new(&bytes);
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = ReadContext::new(&mut input, &mut state, &registry);
        let first: Rc<i64> = ctx.read_ref_or_value(true).unwrap();
        let second: Rc<i64> = ctx.read_ref_or_value(true).unwrap();
        assert_eq!(*first, 42);
        assert!(Rc::ptr_eq(&first, &second));
    }
}
