//! Chunked record bodies and the evolution header.
//!
//! A versioned record buffers the fields of each generation into its own
//! chunk, then emits `[version][header][chunk_0]..[chunk_v]`. The header is
//! computed after the body pass (it needs the field positions) but written
//! first, which is why chunks are buffered at all.
use {
    crate::{
        context::{ReadContext, WriteContext},
        error::{
            deserialization_failure, deserializing_non_existing_chunk, serialization_failure,
            unknown_field_reference, Result,
        },
        evolution::{Evolution, FieldPosition, RecordMeta, SerializedEvolutionStep},
        io::{BinaryInput, BinaryOutput, MemoryInput},
    },
    std::collections::{HashMap, HashSet},
};

/// Write side: one buffer per generation plus field position accounting.
pub(crate) struct ChunkedOutput {
    chunks: Vec<Vec<u8>>,
    last_index_per_chunk: Vec<u8>,
    field_positions: HashMap<&'static str, FieldPosition>,
}

impl ChunkedOutput {
    pub(crate) fn new(version: u8) -> Self {
        let count = version as usize + 1;
        Self {
            chunks: vec![Vec::new(); count],
            last_index_per_chunk: vec![0; count],
            field_positions: HashMap::new(),
        }
    }

    /// The buffer for one generation. Generations come from the codec's own
    /// metadata, so they are always in range.
    pub(crate) fn chunk_mut(&mut self, generation: u8) -> &mut Vec<u8> {
        &mut self.chunks[generation as usize]
    }

    /// Allocate the next position in a generation's chunk for a named field.
    pub(crate) fn record_position(&mut self, name: &'static str, generation: u8) -> FieldPosition {
        let counter = &mut self.last_index_per_chunk[generation as usize];
        let position = FieldPosition::new(generation, *counter);
        *counter = counter.wrapping_add(1);
        self.field_positions.insert(name, position);
        position
    }

    /// Emit `[version][header][chunks]` into the primary output.
    pub(crate) fn finish(self, meta: &RecordMeta, ctx: &mut WriteContext<'_>) -> Result<()> {
        ctx.output().write_i8(meta.version() as i8)?;
        for (index, step) in meta.steps().iter().enumerate() {
            let serialized = match step {
                Evolution::InitialVersion | Evolution::FieldAdded { .. } => {
                    let size = i32::try_from(self.chunks[index].len()).map_err(|_| {
                        serialization_failure("chunk size exceeds i32::MAX", None)
                    })?;
                    SerializedEvolutionStep::FieldAddedToNewChunk { size }
                }
                Evolution::FieldMadeOptional { name } => {
                    let position = match self.field_positions.get(name) {
                        Some(position) => *position,
                        None if meta.is_removed(name) => FieldPosition::REMOVED,
                        None => return Err(unknown_field_reference(name)),
                    };
                    SerializedEvolutionStep::FieldMadeOptional { position }
                }
                Evolution::FieldRemoved { name } => SerializedEvolutionStep::FieldRemoved {
                    name: (*name).to_owned(),
                },
                Evolution::Unknown => SerializedEvolutionStep::Unknown,
            };
            serialized.write(ctx)?;
        }
        for chunk in &self.chunks {
            ctx.output().write_bytes(chunk)?;
        }
        Ok(())
    }
}

/// Read side: parsed header plus sized chunk bodies.
///
/// Steps that do not carry a chunk get a zero-byte placeholder, keeping
/// chunk index equal to generation. The header's made-optional and removed
/// tables describe the *stream's* schema, as opposed to the reading codec's
/// own metadata.
pub(crate) struct ChunkedInput {
    stored_version: u8,
    chunks: Vec<MemoryInput>,
    made_optional_at: HashMap<FieldPosition, u8>,
    removed_fields: HashSet<String>,
    last_index_per_chunk: Vec<u8>,
}

impl ChunkedInput {
    pub(crate) fn read_from(ctx: &mut ReadContext<'_>, stored_version: u8) -> Result<Self> {
        let count = stored_version as usize + 1;
        let mut sizes = vec![0usize; count];
        let mut made_optional_at = HashMap::new();
        let mut removed_fields = HashSet::new();
        for (index, size) in sizes.iter_mut().enumerate() {
            match SerializedEvolutionStep::read(ctx)? {
                SerializedEvolutionStep::FieldAddedToNewChunk { size: chunk_size } => {
                    *size = usize::try_from(chunk_size).map_err(|_| {
                        deserialization_failure("negative chunk size in header", None)
                    })?;
                }
                SerializedEvolutionStep::FieldMadeOptional { position } => {
                    made_optional_at.insert(position, index as u8);
                }
                SerializedEvolutionStep::FieldRemoved { name } => {
                    removed_fields.insert(name);
                }
                SerializedEvolutionStep::Unknown => {}
            }
        }
        let mut chunks = Vec::with_capacity(count);
        for size in sizes {
            chunks.push(MemoryInput::new(ctx.input().read_bytes(size)?));
        }
        Ok(Self {
            stored_version,
            chunks,
            made_optional_at,
            removed_fields,
            last_index_per_chunk: vec![0; count],
        })
    }

    pub(crate) fn stored_version(&self) -> u8 {
        self.stored_version
    }

    pub(crate) fn chunk_mut(&mut self, generation: u8) -> Result<&mut MemoryInput> {
        self.chunks
            .get_mut(generation as usize)
            .ok_or_else(|| deserializing_non_existing_chunk(generation))
    }

    /// Mirror of the writer's position allocation. The reading codec may
    /// know generations the stream has never seen, so the counters grow on
    /// demand.
    pub(crate) fn alloc_position(&mut self, generation: u8) -> FieldPosition {
        let index = generation as usize;
        if index >= self.last_index_per_chunk.len() {
            self.last_index_per_chunk.resize(index + 1, 0);
        }
        let counter = &mut self.last_index_per_chunk[index];
        let position = FieldPosition::new(generation, *counter);
        *counter = counter.wrapping_add(1);
        position
    }

    pub(crate) fn is_removed(&self, name: &str) -> bool {
        self.removed_fields.contains(name)
    }

    pub(crate) fn is_optional_at(&self, position: FieldPosition) -> bool {
        self.made_optional_at.contains_key(&position)
    }
}
