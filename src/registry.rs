//! Runtime type registry for polymorphic references.
use {
    crate::{
        codec::{BinaryRead, BinaryWrite},
        context::{ReadContext, WriteContext},
        error::{serialization_failure, Result},
    },
    std::{
        any::{Any, TypeId},
        collections::HashMap,
        rc::Rc,
    },
};

type ErasedWrite = fn(&dyn Any, &mut WriteContext<'_>) -> Result<()>;
type ErasedRead = fn(&mut ReadContext<'_>) -> Result<Rc<dyn Any>>;

/// One registered type: a stable small id plus erased codec entry points.
pub(crate) struct RegisteredType {
    id: u32,
    type_name: &'static str,
    write_fn: ErasedWrite,
    read_fn: ErasedRead,
}

impl RegisteredType {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn write(&self, value: &dyn Any, ctx: &mut WriteContext<'_>) -> Result<()> {
        (self.write_fn)(value, ctx)
    }

    pub(crate) fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Rc<dyn Any>> {
        (self.read_fn)(ctx)
    }
}

/// Registry mapping runtime type identity to small integer ids.
///
/// Only the explicit ref/object protocol consults it, and only when the
/// static type at the call site is polymorphic. Ids are assigned in
/// registration order starting at 1; they are part of the wire format for
/// polymorphic references and must stay stable across deployments, so
/// register types in a fixed order.
///
/// The registry is read-only after construction and can be shared freely.
///
/// # Examples
///
/// ```
/// let mut registry = strata::TypeRegistry::new();
/// assert_eq!(registry.register::<i64>(), 1);
/// assert_eq!(registry.register::<String>(), 2);
/// ```
#[derive(Default)]
pub struct TypeRegistry {
    entries: Vec<RegisteredType>,
    by_type: HashMap<TypeId, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and return its assigned id.
    pub fn register<T: BinaryWrite + BinaryRead + Any>(&mut self) -> u32 {
        let id = self.entries.len() as u32 + 1;
        self.by_type.insert(TypeId::of::<T>(), self.entries.len());
        self.entries.push(RegisteredType {
            id,
            type_name: std::any::type_name::<T>(),
            write_fn: write_erased::<T>,
            read_fn: read_erased::<T>,
        });
        id
    }

    pub(crate) fn entry_of(&self, type_id: TypeId) -> Option<&RegisteredType> {
        self.by_type.get(&type_id).map(|&index| &self.entries[index])
    }

    pub(crate) fn entry_by_id(&self, id: u32) -> Option<&RegisteredType> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|entry| (entry.id, entry.type_name)))
            .finish()
    }
}

fn write_erased<T: BinaryWrite + Any>(value: &dyn Any, ctx: &mut WriteContext<'_>) -> Result<()> {
    let value = value.downcast_ref::<T>().ok_or_else(|| {
        serialization_failure("registered type does not match the value being written", None)
    })?;
    value.write(ctx)
}

fn read_erased<T: BinaryRead + Any>(ctx: &mut ReadContext<'_>) -> Result<Rc<dyn Any>> {
    Ok(Rc::new(T::read(ctx)?))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{io::SliceInput, SerializerState},
    };

    #[test]
    fn ids_follow_registration_order() {
        let mut registry = TypeRegistry::new();
        assert_eq!(registry.register::<i32>(), 1);
        assert_eq!(registry.register::<String>(), 2);
        assert_eq!(registry.register::<bool>(), 3);
        assert_eq!(registry.entry_of(TypeId::of::<String>()).unwrap().id(), 2);
        assert!(registry.entry_by_id(0).is_none());
        assert!(registry.entry_by_id(4).is_none());
        assert_eq!(registry.entry_by_id(3).unwrap().type_name, "bool");
    }

    #[test]
    fn polymorphic_round_trip_dispatches_on_id() {
        let mut registry = TypeRegistry::new();
        registry.register::<i64>();
        registry.register::<String>();

        let values: Vec<Rc<dyn Any>> = vec![Rc::new(12i64), Rc::new("twelve".to_owned())];
        let mut out = Vec::new();
        let mut state = SerializerState::new();
        let mut ctx = crate::WriteContext::new(&mut out, &mut state, &registry);
        for value in &values {
            ctx.store_ref_or_object(value).unwrap();
        }

        let mut input = SliceInput::new(&out);
        let mut state = SerializerState::new();
        let mut ctx = crate::ReadContext::new(&mut input, &mut state, &registry);
        let first = ctx.read_ref_or_object(true).unwrap();
        let second = ctx.read_ref_or_object(true).unwrap();
        assert_eq!(*first.downcast_ref::<i64>().unwrap(), 12);
        assert_eq!(second.downcast_ref::<String>().unwrap(), "twelve");
    }

    #[test]
    fn unregistered_type_fails_to_write() {
        let registry = TypeRegistry::new();
        let mut out = Vec::new();
        let mut state = SerializerState::new();
        let mut ctx = crate::WriteContext::new(&mut out, &mut state, &registry);
        let value: Rc<dyn Any> = Rc::new(1u8);
        assert!(ctx.store_ref_or_object(&value).is_err());
    }

    #[test]
    fn repeated_polymorphic_reference_is_shared() {
        let mut registry = TypeRegistry::new();
        registry.register::<String>();

        let shared: Rc<dyn Any> = Rc::new("once".to_owned());
        let mut out = Vec::new();
        let mut state = SerializerState::new();
        let mut ctx = crate::WriteContext::new(&mut out, &mut state, &registry);
        ctx.store_ref_or_object(&shared).unwrap();
        ctx.store_ref_or_object(&shared).unwrap();

        let mut input = SliceInput::new(&out);
        let mut state = SerializerState::new();
        let mut ctx = crate::ReadContext::new(&mut input, &mut state, &registry);
        let first = ctx.read_ref_or_object(true).unwrap();
        let second = ctx.read_ref_or_object(true).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
