use std::{error::Error as StdError, fmt, io, result::Result as StdResult};

/// Transport/protocol-level errors: the binary entry point and the LSP
/// plumbing around it.
#[derive(Debug)]
pub enum LspError {
    InvalidRequest(String),
    MissingDocument(String),
}

impl fmt::Display for LspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::MissingDocument(uri) => write!(f, "no such document: {uri}"),
        }
    }
}

impl StdError for LspError {}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    Lsp(LspError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Lsp(e) => write!(f, "LSP error: {e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Lsp(e) => Some(e),
        }
    }
}

impl From<LspError> for Error {
    fn from(e: LspError) -> Self {
        Self::Lsp(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = StdResult<T, Error>;

/// Core error taxonomy for the cursor-tracking state machine (see DESIGN.md).
/// These never propagate past a run: every call site logs and recovers.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// `applyEdit` returned `applied: false`, or the driver's begin-edit
    /// preconditions weren't met. Recovered locally by back-off + retry.
    TransientEditConflict(String),
    /// A pending update couldn't be matched to the transaction meant to
    /// contain it, or a transaction straddles it without starting at it.
    CursorDesync(String),
    /// Monotonic-version assumption broken, or a change event's range falls
    /// outside the document.
    ProtocolViolation(String),
    /// The text generator ended abnormally; surfaced as end-of-stream.
    GeneratorError(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientEditConflict(msg) => write!(f, "transient edit conflict: {msg}"),
            Self::CursorDesync(msg) => write!(f, "cursor desync: {msg}"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::GeneratorError(msg) => write!(f, "generator error: {msg}"),
        }
    }
}

impl StdError for CoreError {}
