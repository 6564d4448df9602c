//! Codec implementations for std types.
use {
    super::{BinaryRead, BinaryWrite},
    crate::{
        context::{ReadContext, WriteContext},
        error::{deserialization_failure, serialization_failure, Result},
        io::{BinaryInput, BinaryOutput},
    },
    std::{
        any::Any,
        collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
        hash::Hash,
    },
    uuid::Uuid,
};

macro_rules! impl_primitive {
    ($type:ty, $write:ident, $read:ident) => {
        impl BinaryWrite for $type {
            #[inline]
            fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
                ctx.output().$write(*self)
            }
        }

        impl BinaryRead for $type {
            #[inline]
            fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
                ctx.input().$read()
            }
        }
    };
}

impl_primitive!(u8, write_u8, read_u8);
impl_primitive!(i8, write_i8, read_i8);
impl_primitive!(u16, write_u16, read_u16);
impl_primitive!(i16, write_i16, read_i16);
impl_primitive!(u32, write_u32, read_u32);
impl_primitive!(i32, write_i32, read_i32);
impl_primitive!(u64, write_u64, read_u64);
impl_primitive!(i64, write_i64, read_i64);
impl_primitive!(f32, write_f32, read_f32);
impl_primitive!(f64, write_f64, read_f64);
impl_primitive!(bool, write_bool, read_bool);

/// Unit occupies zero bytes.
impl BinaryWrite for () {
    #[inline]
    fn write(&self, _ctx: &mut WriteContext<'_>) -> Result<()> {
        Ok(())
    }
}

impl BinaryRead for () {
    #[inline]
    fn read(_ctx: &mut ReadContext<'_>) -> Result<Self> {
        Ok(())
    }
}

impl BinaryWrite for char {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        ctx.output().write_u32(*self as u32)
    }
}

impl BinaryRead for char {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let raw = ctx.input().read_u32()?;
        char::from_u32(raw).ok_or_else(|| {
            deserialization_failure(format!("invalid char scalar value {raw:#x}"), None)
        })
    }
}

/// Strings are interned per stream; see [`WriteContext::write_string`].
impl BinaryWrite for str {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        ctx.write_string(self)
    }
}

impl BinaryWrite for String {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        ctx.write_string(self)
    }
}

impl BinaryRead for String {
    #[inline]
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        ctx.read_string()
    }
}

/// A UUID is its sixteen raw bytes, the two halves big-endian.
impl BinaryWrite for Uuid {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        ctx.output().write_bytes(self.as_bytes())
    }
}

impl BinaryRead for Uuid {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let mut bytes = [0u8; 16];
        ctx.input().read_exact(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

impl<T: BinaryWrite> BinaryWrite for Option<T> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        match self {
            Some(value) => {
                ctx.output().write_bool(true)?;
                value.write(ctx)
            }
            None => ctx.output().write_bool(false),
        }
    }
}

impl<T: BinaryRead> BinaryRead for Option<T> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        if ctx.input().read_bool()? {
            Ok(Some(T::read(ctx)?))
        } else {
            Ok(None)
        }
    }

    const IS_OPTION: bool = true;

    fn absent() -> Option<Self> {
        Some(None)
    }

    fn read_pre_optional(ctx: &mut ReadContext<'_>) -> Result<Self> {
        T::read(ctx).map(Some)
    }

    fn from_erased_default(default: Box<dyn Any>) -> Option<Self>
    where
        Self: 'static,
    {
        match default.downcast::<Self>() {
            Ok(value) => Some(*value),
            // a default captured before the field was made optional
            Err(pre_optional) => pre_optional.downcast::<T>().ok().map(|value| Some(*value)),
        }
    }
}

/// The sum-of-two codec: one tag byte, `0 = Err`, `1 = Ok`.
impl<T: BinaryWrite, E: BinaryWrite> BinaryWrite for core::result::Result<T, E> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        match self {
            Err(error) => {
                ctx.output().write_u8(0)?;
                error.write(ctx)
            }
            Ok(value) => {
                ctx.output().write_u8(1)?;
                value.write(ctx)
            }
        }
    }
}

impl<T: BinaryRead, E: BinaryRead> BinaryRead for core::result::Result<T, E> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        match ctx.input().read_u8()? {
            0 => Ok(Err(E::read(ctx)?)),
            1 => Ok(Ok(T::read(ctx)?)),
            other => Err(deserialization_failure(
                format!("invalid result tag {other:#04x}"),
                None,
            )),
        }
    }
}

impl<T: BinaryWrite + ?Sized> BinaryWrite for &T {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        (**self).write(ctx)
    }
}

impl<T: BinaryWrite + ?Sized> BinaryWrite for Box<T> {
    #[inline]
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        (**self).write(ctx)
    }
}

impl<T: BinaryRead> BinaryRead for Box<T> {
    #[inline]
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        Ok(Box::new(T::read(ctx)?))
    }
}

// Tuples share the wire shape of single-version records: a leading zero
// version byte, then the elements in order.
macro_rules! impl_tuple {
    ($($t:ident : $field:tt),+) => {
        impl<$($t: BinaryWrite),+> BinaryWrite for ($($t,)+) {
            fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
                ctx.output().write_i8(0)?;
                $(self.$field.write(ctx)?;)+
                Ok(())
            }
        }

        impl<$($t: BinaryRead),+> BinaryRead for ($($t,)+) {
            fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
                let version = ctx.input().read_i8()?;
                if version != 0 {
                    return Err(deserialization_failure(
                        format!("tuple cannot decode record version {version}"),
                        None,
                    ));
                }
                Ok(($($t::read(ctx)?,)+))
            }
        }
    };
}

impl_tuple! { A: 0, B: 1 }
impl_tuple! { A: 0, B: 1, C: 2 }
impl_tuple! { A: 0, B: 1, C: 2, D: 3 }
impl_tuple! { A: 0, B: 1, C: 2, D: 3, E: 4 }
impl_tuple! { A: 0, B: 1, C: 2, D: 3, E: 4, F: 5 }
impl_tuple! { A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6 }
impl_tuple! { A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7 }

fn write_len(ctx: &mut WriteContext<'_>, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| serialization_failure("collection length exceeds i32::MAX", None))?;
    ctx.output().write_var_int(len, true)
}

fn read_len(ctx: &mut ReadContext<'_>) -> Result<usize> {
    let len = ctx.input().read_var_int(true)?;
    usize::try_from(len)
        .map_err(|_| deserialization_failure(format!("invalid collection length {len}"), None))
}

fn write_elem_iter<'a, T, I>(ctx: &mut WriteContext<'_>, items: I) -> Result<()>
where
    T: BinaryWrite + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    write_len(ctx, items.len())?;
    for item in items {
        item.write(ctx)?;
    }
    Ok(())
}

/// Write a sequence of unknown length: each element is wrapped like
/// `Some(element)` and a final `None` terminates the stream. Which of the
/// sized and streamed forms applies to a value is decided by the codec in
/// use, never at runtime.
pub fn write_streamed<'a, T, I>(ctx: &mut WriteContext<'_>, items: I) -> Result<()>
where
    T: BinaryWrite + 'a,
    I: IntoIterator<Item = &'a T>,
{
    for item in items {
        ctx.output().write_bool(true)?;
        item.write(ctx)?;
    }
    ctx.output().write_bool(false)
}

/// Read a sequence written by [`write_streamed`].
pub fn read_streamed<T: BinaryRead>(ctx: &mut ReadContext<'_>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    while ctx.input().read_bool()? {
        items.push(T::read(ctx)?);
    }
    Ok(items)
}

impl<T: BinaryWrite> BinaryWrite for Vec<T> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead> BinaryRead for Vec<T> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let len = read_len(ctx)?;
        let mut items = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            items.push(T::read(ctx)?);
        }
        Ok(items)
    }
}

impl<T: BinaryWrite> BinaryWrite for VecDeque<T> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead> BinaryRead for VecDeque<T> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        Ok(Vec::<T>::read(ctx)?.into())
    }
}

impl<T: BinaryWrite> BinaryWrite for [T] {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead> BinaryRead for Box<[T]> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        Ok(Vec::<T>::read(ctx)?.into_boxed_slice())
    }
}

impl<T: BinaryWrite, const N: usize> BinaryWrite for [T; N] {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead, const N: usize> BinaryRead for [T; N] {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let len = read_len(ctx)?;
        if len != N {
            return Err(deserialization_failure(
                format!("expected array of length {N}, stream has {len}"),
                None,
            ));
        }
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::read(ctx)?);
        }
        items
            .try_into()
            .map_err(|_| deserialization_failure("array length mismatch", None))
    }
}

impl<T: BinaryWrite> BinaryWrite for HashSet<T> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead + Eq + Hash> BinaryRead for HashSet<T> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let len = read_len(ctx)?;
        let mut items = HashSet::with_capacity(len.min(4096));
        for _ in 0..len {
            items.insert(T::read(ctx)?);
        }
        Ok(items)
    }
}

impl<T: BinaryWrite> BinaryWrite for BTreeSet<T> {
    fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        write_elem_iter(ctx, self.iter())
    }
}

impl<T: BinaryRead + Ord> BinaryRead for BTreeSet<T> {
    fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let len = read_len(ctx)?;
        let mut items = BTreeSet::new();
        for _ in 0..len {
            items.insert(T::read(ctx)?);
        }
        Ok(items)
    }
}

// Maps are sized sequences of (key, value) tuple encodings, so every entry
// carries the tuple's leading version byte.
macro_rules! impl_map {
    ($map:ident, $($bound:path),+) => {
        impl<K: BinaryWrite, V: BinaryWrite> BinaryWrite for $map<K, V> {
            fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
                write_len(ctx, self.len())?;
                for (key, value) in self {
                    ctx.output().write_i8(0)?;
                    key.write(ctx)?;
                    value.write(ctx)?;
                }
                Ok(())
            }
        }

        impl<K: BinaryRead $(+ $bound)+, V: BinaryRead> BinaryRead for $map<K, V> {
            fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
                let len = read_len(ctx)?;
                let mut map = $map::new();
                for _ in 0..len {
                    let (key, value) = <(K, V)>::read(ctx)?;
                    map.insert(key, value);
                }
                Ok(map)
            }
        }
    };
}

impl_map!(HashMap, Eq, Hash);
impl_map!(BTreeMap, Ord);

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{deserialize, serialize},
        proptest::prelude::*,
    };

    #[test]
    fn fixed_int_is_big_endian() {
        assert_eq!(serialize(&100i32).unwrap(), [0x00, 0x00, 0x00, 0x64]);
        assert_eq!(serialize(&1i64).unwrap().len(), 8);
        assert_eq!(deserialize::<i32>(&[0x00, 0x00, 0x00, 0x64]).unwrap(), 100);
    }

    #[test]
    fn bool_and_unit_encodings() {
        assert_eq!(serialize(&true).unwrap(), [0x01]);
        assert_eq!(serialize(&false).unwrap(), [0x00]);
        assert_eq!(serialize(&()).unwrap(), Vec::<u8>::new());
        deserialize::<()>(&[]).unwrap();
    }

    #[test]
    fn string_encoding_is_interned_zigzag() {
        assert_eq!(
            serialize(&"Hello".to_owned()).unwrap(),
            [0x0a, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
        assert_eq!(deserialize::<String>(&[0x00]).unwrap(), "");
    }

    #[test]
    fn repeated_strings_deduplicate() {
        let list = vec!["Hello".to_owned(), "Hello".to_owned()];
        let bytes = serialize(&list).unwrap();
        // count, inline string, then the single-byte back-reference
        assert_eq!(bytes, [0x02, 0x0a, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x01]);
        assert_eq!(deserialize::<Vec<String>>(&bytes).unwrap(), list);
    }

    #[test]
    fn tuple_has_leading_version_byte() {
        let bytes = serialize(&(1i32, 2i32, 3i32)).unwrap();
        assert_eq!(
            bytes,
            [0x00, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
        );
        assert_eq!(deserialize::<(i32, i32, i32)>(&bytes).unwrap(), (1, 2, 3));
    }

    #[test]
    fn nan_bit_patterns_survive() {
        let weird = f32::from_bits(0x7fc0_0001);
        let bytes = serialize(&weird).unwrap();
        assert_eq!(
            deserialize::<f32>(&bytes).unwrap().to_bits(),
            0x7fc0_0001
        );

        let weird = f64::from_bits(0x7ff8_0000_0000_0042);
        let bytes = serialize(&weird).unwrap();
        assert_eq!(
            deserialize::<f64>(&bytes).unwrap().to_bits(),
            0x7ff8_0000_0000_0042
        );
    }

    #[test]
    fn uuid_is_sixteen_bytes() {
        let id = uuid::Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let bytes = serialize(&id).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes, id.as_bytes());
        assert_eq!(deserialize::<uuid::Uuid>(&bytes).unwrap(), id);
    }

    #[test]
    fn result_tags() {
        let ok: core::result::Result<i32, String> = Ok(7);
        let err: core::result::Result<i32, String> = Err("no".to_owned());
        assert_eq!(serialize(&ok).unwrap()[0], 0x01);
        assert_eq!(serialize(&err).unwrap()[0], 0x00);
        assert_eq!(
            deserialize::<core::result::Result<i32, String>>(&serialize(&ok).unwrap()).unwrap(),
            ok
        );
        assert_eq!(
            deserialize::<core::result::Result<i32, String>>(&serialize(&err).unwrap()).unwrap(),
            err
        );
        assert!(deserialize::<core::result::Result<i32, String>>(&[0x02]).is_err());
    }

    #[test]
    fn array_length_is_checked() {
        let bytes = serialize(&[1u8, 2, 3]).unwrap();
        assert_eq!(bytes, [0x03, 1, 2, 3]);
        assert_eq!(deserialize::<[u8; 3]>(&bytes).unwrap(), [1, 2, 3]);
        assert!(deserialize::<[u8; 2]>(&bytes).is_err());
    }

    #[test]
    fn streamed_form_round_trips() {
        let items = vec![1u16, 2, 3];
        let mut out = Vec::new();
        let mut state = crate::SerializerState::new();
        let registry = crate::TypeRegistry::new();
        let mut ctx = crate::WriteContext::new(&mut out, &mut state, &registry);
        write_streamed(&mut ctx, items.iter()).unwrap();
        // Some(1) Some(2) Some(3) None
        assert_eq!(out, [1, 0, 1, 1, 0, 2, 1, 0, 3, 0]);

        let mut input = crate::io::SliceInput::new(&out);
        let mut state = crate::SerializerState::new();
        let mut ctx = crate::ReadContext::new(&mut input, &mut state, &registry);
        assert_eq!(read_streamed::<u16>(&mut ctx).unwrap(), items);
    }

    #[test]
    fn char_round_trip_and_validation() {
        let bytes = serialize(&'é').unwrap();
        assert_eq!(deserialize::<char>(&bytes).unwrap(), 'é');
        // a lone surrogate is not a scalar value
        assert!(deserialize::<char>(&0xd800u32.to_be_bytes()).is_err());
    }

    proptest! {
        #[test]
        fn scalar_round_trips(
            a in any::<i8>(), b in any::<i16>(), c in any::<i32>(), d in any::<i64>(),
            e in any::<u64>(), f in any::<f64>(), g in any::<bool>()
        ) {
            let value = (a, (b, c), (d, e), f, g);
            let bytes = serialize(&value).unwrap();
            let back = deserialize::<(i8, (i16, i32), (i64, u64), f64, bool)>(&bytes).unwrap();
            prop_assert_eq!(back.0, a);
            prop_assert_eq!(back.1, (b, c));
            prop_assert_eq!(back.2, (d, e));
            prop_assert_eq!(back.3.to_bits(), f.to_bits());
            prop_assert_eq!(back.4, g);
        }

        #[test]
        fn string_round_trip(value in "\\PC{0,64}") {
            let bytes = serialize(&value).unwrap();
            prop_assert_eq!(deserialize::<String>(&bytes).unwrap(), value);
        }

        #[test]
        fn collection_round_trips(values in proptest::collection::vec("\\PC{0,12}", 0..=24)) {
            let bytes = serialize(&values).unwrap();
            prop_assert_eq!(&deserialize::<Vec<String>>(&bytes).unwrap(), &values);

            let deque: VecDeque<String> = values.iter().cloned().collect();
            let bytes = serialize(&deque).unwrap();
            prop_assert_eq!(deserialize::<VecDeque<String>>(&bytes).unwrap(), deque);

            let set: BTreeSet<String> = values.iter().cloned().collect();
            let bytes = serialize(&set).unwrap();
            prop_assert_eq!(deserialize::<BTreeSet<String>>(&bytes).unwrap(), set);
        }

        #[test]
        fn map_round_trips(entries in proptest::collection::btree_map(any::<i32>(), "\\PC{0,8}", 0..=16)) {
            let bytes = serialize(&entries).unwrap();
            prop_assert_eq!(&deserialize::<BTreeMap<i32, String>>(&bytes).unwrap(), &entries);

            let hashed: HashMap<i32, String> = entries.clone().into_iter().collect();
            let bytes = serialize(&hashed).unwrap();
            prop_assert_eq!(deserialize::<HashMap<i32, String>>(&bytes).unwrap(), hashed);
        }

        #[test]
        fn set_round_trip(values in proptest::collection::hash_set(any::<u32>(), 0..=32)) {
            let bytes = serialize(&values).unwrap();
            prop_assert_eq!(deserialize::<HashSet<u32>>(&bytes).unwrap(), values);
        }

        #[test]
        fn option_round_trip(value in proptest::option::of(any::<i64>())) {
            let bytes = serialize(&value).unwrap();
            prop_assert_eq!(deserialize::<Option<i64>>(&bytes).unwrap(), value);
        }
    }
}
