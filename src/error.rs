//! Error types and helpers.
use thiserror::Error;

/// Cause attached to the two generic failure kinds.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed error taxonomy of the crate.
///
/// Every error is terminal: once a codec produces one, no further bytes are
/// written or read and no partial value is returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("serialization failure: {message}")]
    SerializationFailure {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("deserialization failure: {message}")]
    DeserializationFailure {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("field `{0}` is not optional but was removed in the serialized version")]
    FieldRemovedInSerializedVersion(String),
    #[error("field `{0}` is missing from the stream and has no default value")]
    FieldWithoutDefaultValueIsMissing(String),
    #[error("field `{0}` was serialized as none but the local type is not optional")]
    NonOptionalFieldSerializedAsNone(String),
    #[error("invalid constructor name `{name}` for type {type_description}")]
    InvalidConstructorName {
        name: String,
        type_description: String,
    },
    #[error("invalid constructor id {id} for type {type_description}")]
    InvalidConstructorId { id: u32, type_description: String },
    #[error("evolution step references field `{0}`, which is neither serialized nor removed")]
    UnknownFieldReferenceInEvolutionStep(String),
    #[error("unknown serialized evolution step code {0}")]
    UnknownSerializedEvolutionStep(i32),
    #[error("chunk {0} does not exist in the serialized version")]
    DeserializingNonExistingChunk(u8),
}

pub type Result<T> = core::result::Result<T, Error>;

#[cold]
pub fn serialization_failure(message: impl Into<String>, cause: Option<Cause>) -> Error {
    Error::SerializationFailure {
        message: message.into(),
        cause,
    }
}

#[cold]
pub fn deserialization_failure(message: impl Into<String>, cause: Option<Cause>) -> Error {
    Error::DeserializationFailure {
        message: message.into(),
        cause,
    }
}

#[cold]
pub fn field_removed_in_serialized_version(name: &str) -> Error {
    Error::FieldRemovedInSerializedVersion(name.to_owned())
}

#[cold]
pub fn field_without_default_value_is_missing(name: &str) -> Error {
    Error::FieldWithoutDefaultValueIsMissing(name.to_owned())
}

#[cold]
pub fn non_optional_field_serialized_as_none(name: &str) -> Error {
    Error::NonOptionalFieldSerializedAsNone(name.to_owned())
}

#[cold]
pub fn invalid_constructor_name(name: &str, type_description: &str) -> Error {
    Error::InvalidConstructorName {
        name: name.to_owned(),
        type_description: type_description.to_owned(),
    }
}

#[cold]
pub fn invalid_constructor_id(id: u32, type_description: &str) -> Error {
    Error::InvalidConstructorId {
        id,
        type_description: type_description.to_owned(),
    }
}

#[cold]
pub fn unknown_field_reference(name: &str) -> Error {
    Error::UnknownFieldReferenceInEvolutionStep(name.to_owned())
}

#[cold]
pub fn unknown_serialized_evolution_step(code: i32) -> Error {
    Error::UnknownSerializedEvolutionStep(code)
}

#[cold]
pub fn deserializing_non_existing_chunk(chunk: u8) -> Error {
    Error::DeserializingNonExistingChunk(chunk)
}
