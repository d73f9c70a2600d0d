use tokio::sync::oneshot;

use crate::entry::Entry;
use crate::error::Result;

/// A single outstanding `read_entries_or_wait` registration.
///
/// There is at most one of these per cursor at a time; registering a second while one is
/// outstanding is an error (`PendingReadAlreadyRegistered`), and cancellation simply drops this
/// struct without ever invoking `responder` — dropping a `oneshot::Sender` without sending
/// resolves the receiver with a `RecvError`, which the cursor translates into "the read was
/// cancelled" rather than propagating as a real failure.
pub struct PendingRead {
    pub max: usize,
    pub responder: oneshot::Sender<Result<Vec<Entry>>>,
}
