//! Evolution steps and the derived per-codec metadata tables.
//!
//! The evolution history of a type is an ordered list of steps, the first
//! always [`Evolution::InitialVersion`]. The list index of a step is its
//! *generation*: fields added at step `i` live in chunk `i` of the chunked
//! record layout, and `len - 1` is the codec's current version byte.
use {
    crate::{
        context::{ReadContext, WriteContext},
        error::{
            deserialization_failure, invalid_constructor_id, invalid_constructor_name,
            serialization_failure, unknown_serialized_evolution_step, Result,
        },
        io::{BinaryInput, BinaryOutput},
    },
    std::{
        any::Any,
        collections::{HashMap, HashSet},
        fmt,
        sync::Arc,
    },
};

/// A captured default for a field added in a later schema version.
///
/// The value is stored type-erased; the consuming codec downcasts it at
/// decode time, so a mismatched default surfaces as a decode failure
/// rather than a construction error.
#[derive(Clone)]
pub struct DefaultValue(Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>);

impl DefaultValue {
    pub fn of<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(move || Box::new(value.clone())))
    }

    pub(crate) fn produce(&self) -> Box<dyn Any> {
        (self.0)()
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultValue(..)")
    }
}

/// One step in a type's evolution history.
#[derive(Clone, Debug)]
pub enum Evolution {
    InitialVersion,
    FieldAdded {
        name: &'static str,
        default: Option<DefaultValue>,
    },
    FieldMadeOptional {
        name: &'static str,
    },
    FieldRemoved {
        name: &'static str,
    },
    Unknown,
}

impl Evolution {
    /// A field added with a default, so that older streams still decode.
    pub fn field_added<T: Clone + Send + Sync + 'static>(name: &'static str, default: T) -> Self {
        Evolution::FieldAdded {
            name,
            default: Some(DefaultValue::of(default)),
        }
    }

    /// A field added without a default; decoding older streams fails with
    /// `FieldWithoutDefaultValueIsMissing`.
    pub fn field_added_without_default(name: &'static str) -> Self {
        Evolution::FieldAdded {
            name,
            default: None,
        }
    }

    pub fn field_made_optional(name: &'static str) -> Self {
        Evolution::FieldMadeOptional { name }
    }

    pub fn field_removed(name: &'static str) -> Self {
        Evolution::FieldRemoved { name }
    }
}

/// Coordinates of a field within a chunked record.
///
/// The wire form is a single byte: non-positive values address positions in
/// chunk 0, positive values address the head of a later chunk, and `0x80`
/// is reserved for "the referenced field was removed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldPosition {
    pub chunk: u8,
    pub position: u8,
}

impl FieldPosition {
    /// Marker for a `FieldMadeOptional` step whose field was also removed.
    pub const REMOVED: FieldPosition = FieldPosition {
        chunk: 128,
        position: 0,
    };

    pub fn new(chunk: u8, position: u8) -> Self {
        Self { chunk, position }
    }

    pub(crate) fn to_byte(self) -> Result<i8> {
        if self == Self::REMOVED {
            return Ok(i8::MIN);
        }
        if self.chunk == 0 {
            i8::try_from(self.position)
                .map(|position| -position)
                .map_err(|_| serialization_failure("field position exceeds the byte range", None))
        } else {
            i8::try_from(self.chunk)
                .map_err(|_| serialization_failure("chunk index exceeds the byte range", None))
        }
    }

    pub(crate) fn from_byte(byte: i8) -> Self {
        if byte == i8::MIN {
            Self::REMOVED
        } else if byte <= 0 {
            Self::new(0, byte.unsigned_abs())
        } else {
            Self::new(byte as u8, 0)
        }
    }
}

/// The on-wire form of one evolution header slot.
#[derive(Clone, Debug, PartialEq)]
pub enum SerializedEvolutionStep {
    /// `varint(size)` with `size > 0`: the chunk body length of this
    /// generation.
    FieldAddedToNewChunk { size: i32 },
    /// `varint(-1)` followed by a position byte.
    FieldMadeOptional { position: FieldPosition },
    /// `varint(-2)` followed by the field name.
    FieldRemoved { name: String },
    /// `varint(0)`.
    Unknown,
}

impl SerializedEvolutionStep {
    pub(crate) fn write(&self, ctx: &mut WriteContext<'_>) -> Result<()> {
        match self {
            Self::FieldAddedToNewChunk { size } => ctx.output().write_var_int(*size, false),
            Self::FieldMadeOptional { position } => {
                let byte = position.to_byte()?;
                ctx.output().write_var_int(-1, false)?;
                ctx.output().write_i8(byte)
            }
            Self::FieldRemoved { name } => {
                ctx.output().write_var_int(-2, false)?;
                ctx.write_string(name)
            }
            Self::Unknown => ctx.output().write_var_int(0, false),
        }
    }

    pub(crate) fn read(ctx: &mut ReadContext<'_>) -> Result<Self> {
        let code = ctx.input().read_var_int(false)?;
        match code {
            size if size > 0 => Ok(Self::FieldAddedToNewChunk { size }),
            0 => Ok(Self::Unknown),
            -1 => {
                let byte = ctx.input().read_i8()?;
                Ok(Self::FieldMadeOptional {
                    position: FieldPosition::from_byte(byte),
                })
            }
            -2 => Ok(Self::FieldRemoved {
                name: ctx.read_string()?,
            }),
            other => Err(unknown_serialized_evolution_step(other)),
        }
    }
}

/// Derived metadata for one record or sum codec, computed once per type.
pub struct RecordMeta {
    type_description: String,
    steps: Vec<Evolution>,
    version: u8,
    field_generations: HashMap<&'static str, u8>,
    field_defaults: HashMap<&'static str, DefaultValue>,
    made_optional_at: HashMap<&'static str, u8>,
    removed_fields: HashSet<&'static str>,
    constructors: Vec<&'static str>,
    constructor_ids: HashMap<&'static str, u32>,
}

impl RecordMeta {
    /// Build the derived tables from an evolution history.
    ///
    /// # Panics
    ///
    /// Panics if the history is empty or longer than 128 steps; the version
    /// must fit in a signed byte. This is a codec-definition error, not a
    /// runtime condition.
    pub fn new(type_description: impl Into<String>, steps: Vec<Evolution>) -> Self {
        assert!(
            !steps.is_empty() && steps.len() <= 128,
            "evolution history must contain 1..=128 steps"
        );
        let version = (steps.len() - 1) as u8;
        let mut field_generations = HashMap::new();
        let mut field_defaults = HashMap::new();
        let mut made_optional_at = HashMap::new();
        let mut removed_fields = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            let index = index as u8;
            match step {
                Evolution::FieldAdded { name, default } => {
                    field_generations.insert(*name, index);
                    if let Some(default) = default {
                        field_defaults.insert(*name, default.clone());
                    }
                }
                Evolution::FieldMadeOptional { name } => {
                    made_optional_at.insert(*name, index);
                }
                Evolution::FieldRemoved { name } => {
                    removed_fields.insert(*name);
                }
                Evolution::InitialVersion | Evolution::Unknown => {}
            }
        }
        Self {
            type_description: type_description.into(),
            steps,
            version,
            field_generations,
            field_defaults,
            made_optional_at,
            removed_fields,
            constructors: Vec::new(),
            constructor_ids: HashMap::new(),
        }
    }

    /// Attach the constructor list of a sum type, ids following declared
    /// order.
    pub fn with_constructors(mut self, names: &[&'static str]) -> Self {
        self.constructors = names.to_vec();
        self.constructor_ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (*name, id as u32))
            .collect();
        self
    }

    /// The current version of the type: `len(steps) - 1`.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn type_description(&self) -> &str {
        &self.type_description
    }

    pub(crate) fn steps(&self) -> &[Evolution] {
        &self.steps
    }

    /// The evolution step index at which a field was introduced; fields of
    /// the initial version have generation 0.
    pub(crate) fn generation_of(&self, name: &str) -> u8 {
        self.field_generations.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn default_of(&self, name: &str) -> Option<&DefaultValue> {
        self.field_defaults.get(name)
    }

    pub(crate) fn made_optional_at(&self, name: &str) -> Option<u8> {
        self.made_optional_at.get(name).copied()
    }

    pub(crate) fn is_removed(&self, name: &str) -> bool {
        self.removed_fields.contains(name)
    }

    /// The wire id of a constructor, by name.
    pub fn constructor_id(&self, name: &str) -> Result<u32> {
        self.constructor_ids
            .get(name)
            .copied()
            .ok_or_else(|| invalid_constructor_name(name, &self.type_description))
    }

    /// The constructor name a wire id resolves to.
    pub fn constructor_name(&self, id: u32) -> Result<&'static str> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.constructors.get(index).copied())
            .ok_or_else(|| invalid_constructor_id(id, &self.type_description))
    }
}

pub(crate) fn read_version(ctx: &mut ReadContext<'_>) -> Result<u8> {
    let version = ctx.input().read_i8()?;
    u8::try_from(version).map_err(|_| {
        deserialization_failure(format!("invalid record version byte {version}"), None)
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{io::SliceInput, SerializerState, TypeRegistry},
    };

    fn round_trip_step(step: SerializedEvolutionStep) -> SerializedEvolutionStep {
        let mut out = Vec::new();
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = WriteContext::new(&mut out, &mut state, &registry);
        step.write(&mut ctx).unwrap();

        let mut input = SliceInput::new(&out);
        let mut state = SerializerState::new();
        let mut ctx = ReadContext::new(&mut input, &mut state, &registry);
        SerializedEvolutionStep::read(&mut ctx).unwrap()
    }

    #[test]
    fn header_step_codes_round_trip() {
        assert_eq!(
            round_trip_step(SerializedEvolutionStep::FieldAddedToNewChunk { size: 9 }),
            SerializedEvolutionStep::FieldAddedToNewChunk { size: 9 }
        );
        assert_eq!(
            round_trip_step(SerializedEvolutionStep::FieldMadeOptional {
                position: FieldPosition::new(0, 2)
            }),
            SerializedEvolutionStep::FieldMadeOptional {
                position: FieldPosition::new(0, 2)
            }
        );
        assert_eq!(
            round_trip_step(SerializedEvolutionStep::FieldRemoved {
                name: "legacy".to_owned()
            }),
            SerializedEvolutionStep::FieldRemoved {
                name: "legacy".to_owned()
            }
        );
        assert_eq!(
            round_trip_step(SerializedEvolutionStep::Unknown),
            SerializedEvolutionStep::Unknown
        );
    }

    #[test]
    fn header_step_rejects_unknown_codes() {
        // zigzag(-3) = 5
        let bytes = [0x05u8];
        let mut input = SliceInput::new(&bytes);
        let mut state = SerializerState::new();
        let registry = TypeRegistry::new();
        let mut ctx = ReadContext::new(&mut input, &mut state, &registry);
        assert!(matches!(
            SerializedEvolutionStep::read(&mut ctx),
            Err(crate::Error::UnknownSerializedEvolutionStep(-3))
        ));
    }

    #[test]
    fn position_byte_encoding() {
        assert_eq!(FieldPosition::new(0, 0).to_byte().unwrap(), 0);
        assert_eq!(FieldPosition::new(0, 3).to_byte().unwrap(), -3);
        assert_eq!(FieldPosition::new(5, 0).to_byte().unwrap(), 5);
        assert_eq!(FieldPosition::REMOVED.to_byte().unwrap(), i8::MIN);
        for byte in [-127i8, -3, 0, 1, 127] {
            assert_eq!(FieldPosition::from_byte(byte).to_byte().unwrap(), byte);
        }
        assert_eq!(FieldPosition::from_byte(i8::MIN), FieldPosition::REMOVED);
    }

    #[test]
    fn derived_tables() {
        let meta = RecordMeta::new(
            "Example",
            vec![
                Evolution::InitialVersion,
                Evolution::field_added("count", 5i32),
                Evolution::field_made_optional("label"),
                Evolution::field_removed("legacy"),
            ],
        );
        assert_eq!(meta.version(), 3);
        assert_eq!(meta.generation_of("count"), 1);
        assert_eq!(meta.generation_of("label"), 0);
        assert_eq!(meta.made_optional_at("label"), Some(2));
        assert!(meta.is_removed("legacy"));
        assert!(meta.default_of("count").is_some());
        assert!(meta.default_of("label").is_none());
    }

    #[test]
    fn constructor_map_is_bidirectional() {
        let meta = RecordMeta::new("Shape", vec![Evolution::InitialVersion])
            .with_constructors(&["Circle", "Rect"]);
        assert_eq!(meta.constructor_id("Circle").unwrap(), 0);
        assert_eq!(meta.constructor_name(1).unwrap(), "Rect");
        assert!(matches!(
            meta.constructor_id("Triangle"),
            Err(crate::Error::InvalidConstructorName { .. })
        ));
        assert!(matches!(
            meta.constructor_name(2),
            Err(crate::Error::InvalidConstructorId { id: 2, .. })
        ));
    }
}
