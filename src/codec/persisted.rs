//! Persisted failures.
//!
//! A caught failure is serialized as a plain data record so that any peer
//! can decode it without sharing the original error type. Decoding always
//! materializes a [`PersistedError`]; the original type is never
//! reconstructed.
use std::fmt;

/// One captured stack frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFrame {
    pub module: String,
    pub function: String,
    pub file: String,
    pub line: u32,
}

crate::binary_record! {
    ErrorFrame {
        module: String,
        function: String,
        file: String,
        line: u32,
    }
}

/// The wire form of a failure: type name, message, captured frames and an
/// optional cause chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedError {
    pub type_name: String,
    pub message: String,
    pub frames: Vec<ErrorFrame>,
    pub cause: Option<Box<PersistedError>>,
}

crate::binary_record! {
    PersistedError {
        type_name: String,
        message: String,
        frames: Vec<ErrorFrame>,
        cause: Option<Box<PersistedError>>,
    }
}

impl PersistedError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            frames: Vec::new(),
            cause: None,
        }
    }

    pub fn with_frames(mut self, frames: Vec<ErrorFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_cause(mut self, cause: PersistedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Capture an error and its source chain. Only the outermost type name
    /// is statically known; sources are recorded by message alone.
    pub fn capture<E: std::error::Error>(error: &E) -> Self {
        let mut root = Self::new(std::any::type_name::<E>(), error.to_string());
        let mut tail = &mut root;
        let mut source = error.source();
        while let Some(err) = source {
            source = err.source();
            tail = &mut **tail
                .cause
                .insert(Box::new(Self::new("core::error::Error", err.to_string())));
        }
        root
    }
}

impl fmt::Display for PersistedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for PersistedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
