// src/error.rs

//! Error taxonomy and the injected error sink.
//!
//! Every fallible operation inside the engine returns an [`EngineError`]. The host-facing
//! entry points (`apply_effect`, `apply_edit`, `load_audio`, `save_audio`, `record`) report
//! the error to an [`ErrorSink`] once and hand a plain `bool`/`Option` back to the caller.

use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Coarse grouping of error kinds, used for routing and for the console tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Filesystem,
    Audio,
    Dsp,
    Engine,
    Internal,
    Capture,
}

impl ErrorCategory {
    pub fn tag(self) -> &'static str {
        match self {
            ErrorCategory::Filesystem => "FILE",
            ErrorCategory::Audio => "AUDIO",
            ErrorCategory::Dsp => "DSP",
            ErrorCategory::Engine => "ENGINE",
            ErrorCategory::Internal => "INTERNAL",
            ErrorCategory::Capture => "CAPTURE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Filesystem
    FileNotFound,
    InvalidFilePath,
    UnsupportedFileFormat,
    FileReadError,
    FileWriteError,
    FileOpenError,
    FileClosingError,
    DirectoryNotFound,
    InsufficientPermissions,

    // Audio content
    EmptyAudioBuffer,
    InvalidSampleRate,
    InvalidChannelCount,
    CorruptedAudioData,
    InvalidAudioLength,
    InvalidBitDepth,
    BufferSizeMismatch,
    BufferOverflow,

    // DSP
    UnknownEffect,
    InvalidEffectParameters,
    DspProcessingFailed,
    InsufficientSampleData,
    InvalidProcessingRange,
    EffectNotInitialized,

    // Engine
    EngineNotInitialized,
    OperationNotAllowed,
    UndoStackEmpty,
    ResourceAllocationFailed,
    InvalidConfiguration,

    // Internal
    InternalError,
    MemoryError,
    StateError,
    UnhandledException,

    // Capture
    RecordingError,
    InvalidBufferSize,
    RingBufferOverflow,
    NullBufferPtr,
    EmptyBufferQueue,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            FileNotFound | InvalidFilePath | UnsupportedFileFormat | FileReadError
            | FileWriteError | FileOpenError | FileClosingError | DirectoryNotFound
            | InsufficientPermissions => ErrorCategory::Filesystem,
            EmptyAudioBuffer | InvalidSampleRate | InvalidChannelCount | CorruptedAudioData
            | InvalidAudioLength | InvalidBitDepth | BufferSizeMismatch | BufferOverflow => {
                ErrorCategory::Audio
            }
            UnknownEffect | InvalidEffectParameters | DspProcessingFailed
            | InsufficientSampleData | InvalidProcessingRange | EffectNotInitialized => {
                ErrorCategory::Dsp
            }
            EngineNotInitialized | OperationNotAllowed | UndoStackEmpty
            | ResourceAllocationFailed | InvalidConfiguration => ErrorCategory::Engine,
            InternalError | MemoryError | StateError | UnhandledException => {
                ErrorCategory::Internal
            }
            RecordingError | InvalidBufferSize | RingBufferOverflow | NullBufferPtr
            | EmptyBufferQueue => ErrorCategory::Capture,
        }
    }

    /// Numeric code. The hundreds digit encodes the category.
    pub fn code(self) -> u16 {
        use ErrorKind::*;
        match self {
            FileNotFound => 100,
            InvalidFilePath => 101,
            UnsupportedFileFormat => 102,
            FileReadError => 103,
            FileWriteError => 104,
            FileOpenError => 105,
            FileClosingError => 106,
            DirectoryNotFound => 107,
            InsufficientPermissions => 108,

            EmptyAudioBuffer => 200,
            InvalidSampleRate => 201,
            InvalidChannelCount => 202,
            CorruptedAudioData => 203,
            InvalidAudioLength => 204,
            InvalidBitDepth => 205,
            BufferSizeMismatch => 206,
            BufferOverflow => 207,

            UnknownEffect => 300,
            InvalidEffectParameters => 301,
            DspProcessingFailed => 302,
            InsufficientSampleData => 303,
            InvalidProcessingRange => 304,
            EffectNotInitialized => 305,

            EngineNotInitialized => 400,
            OperationNotAllowed => 401,
            UndoStackEmpty => 402,
            ResourceAllocationFailed => 403,
            InvalidConfiguration => 404,

            InternalError => 500,
            MemoryError => 501,
            StateError => 502,
            UnhandledException => 503,

            RecordingError => 600,
            InvalidBufferSize => 601,
            RingBufferOverflow => 602,
            NullBufferPtr => 603,
            EmptyBufferQueue => 604,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error produced by an engine operation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Forwards this error to a sink.
    pub fn report(&self, sink: &dyn ErrorSink) {
        sink.on_error(self.kind, &self.message);
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Receives every error the engine reports. Shared across threads.
pub trait ErrorSink: Send + Sync {
    fn on_error(&self, kind: ErrorKind, message: &str);
}

/// Writes each error as a single log line: `[DSP] message (code 304)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleErrorSink;

impl ErrorSink for ConsoleErrorSink {
    fn on_error(&self, kind: ErrorKind, message: &str) {
        log::error!(
            "[{}] {} (code {})",
            kind.category().tag(),
            message,
            kind.code()
        );
    }
}

/// Keeps every reported error in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    errors: Mutex<Vec<(ErrorKind, String)>>,
}

impl CollectingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors().into_iter().map(|(kind, _)| kind).collect()
    }

    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn clear(&self) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.clear();
        }
    }
}

impl ErrorSink for CollectingErrorSink {
    fn on_error(&self, kind: ErrorKind, message: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((kind, message.to_string()));
        }
    }
}
