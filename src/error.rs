use snafu::Snafu;

use crate::position::Position;

/// Errors surfaced by the cursor core, the find-newest engine, and the persistence layer.
///
/// One variant per error kind, each with a `#[snafu(display(...))]` message. Synchronous
/// operations return this directly via `Result`; asynchronous operations deliver it through the
/// completion of the future they return rather than a bespoke callback type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CursorError {
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    #[snafu(display(
        "mark_delete must be monotonic: requested {requested}, current mark_delete is {current}"
    ))]
    InvalidMarkDelete {
        requested: Position,
        current: Position,
    },

    #[snafu(display("cursor is already closed"))]
    CursorAlreadyClosed,

    #[snafu(display("cursor could not be reconstructed during recovery: {reason}"))]
    BrokenCursor { reason: String },

    #[snafu(display("metadata store error: {source}"))]
    MetaStoreFailed { source: MetaStoreError },

    #[snafu(display("log read error: {source}"))]
    LogReadError { source: LogViewError },

    #[snafu(display("a pending read is already registered on this cursor"))]
    PendingReadAlreadyRegistered,

    #[snafu(display("find_entry_failed: {source}"))]
    FindEntryFailed { source: LogViewError },
}

/// Opaque failure surfaced by a [`crate::log_view::LogView`] implementation.
#[derive(Debug, Snafu)]
#[snafu(display("{message}"))]
pub struct LogViewError {
    pub message: String,
}

impl LogViewError {
    pub fn new(message: impl Into<String>) -> Self {
        LogViewError {
            message: message.into(),
        }
    }
}

/// Opaque failure surfaced by a [`crate::persistence::MetadataStore`] implementation.
#[derive(Debug, Snafu)]
#[snafu(display("{message}"))]
pub struct MetaStoreError {
    pub message: String,
}

impl MetaStoreError {
    pub fn new(message: impl Into<String>) -> Self {
        MetaStoreError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CursorError>;
