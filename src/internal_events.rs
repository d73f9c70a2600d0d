use metrics::{counter, gauge};

use crate::position::Position;

/// Common shape for structured logging/metrics emission: one small struct per notable event,
/// one `emit()` call site.
pub trait InternalEvent {
    fn emit(self);
}

pub struct CursorOpened<'a> {
    pub log_name: &'a str,
    pub cursor_name: &'a str,
    pub read_pos: Position,
    pub mark_delete_pos: Position,
}

impl InternalEvent for CursorOpened<'_> {
    fn emit(self) {
        tracing::debug!(
            log = self.log_name,
            cursor = self.cursor_name,
            read_pos = %self.read_pos,
            mark_delete_pos = %self.mark_delete_pos,
            "cursor opened"
        );
        counter!("cursor_opened_total", 1, "log" => self.log_name.to_string());
    }
}

pub struct MarkDeleteAdvanced<'a> {
    pub cursor_name: &'a str,
    pub from: Position,
    pub to: Position,
}

impl InternalEvent for MarkDeleteAdvanced<'_> {
    fn emit(self) {
        tracing::debug!(
            cursor = self.cursor_name,
            from = %self.from,
            to = %self.to,
            "mark_delete advanced"
        );
        counter!("cursor_mark_delete_total", 1, "cursor" => self.cursor_name.to_string());
    }
}

pub struct BacklogUpdated<'a> {
    pub cursor_name: &'a str,
    pub backlog: u64,
}

impl InternalEvent for BacklogUpdated<'_> {
    fn emit(self) {
        gauge!("cursor_backlog", self.backlog as f64, "cursor" => self.cursor_name.to_string());
    }
}

pub struct PersistenceSpilled<'a> {
    pub cursor_name: &'a str,
    pub ledger_id: u64,
}

impl InternalEvent for PersistenceSpilled<'_> {
    fn emit(self) {
        tracing::debug!(
            cursor = self.cursor_name,
            ledger_id = self.ledger_id,
            "cursor snapshot spilled to dedicated ledger"
        );
        counter!("cursor_persistence_spill_total", 1, "cursor" => self.cursor_name.to_string());
    }
}

pub struct PersistenceFailed<'a> {
    pub cursor_name: &'a str,
    pub error: String,
}

impl InternalEvent for PersistenceFailed<'_> {
    fn emit(self) {
        tracing::warn!(
            cursor = self.cursor_name,
            error = self.error,
            "cursor persistence failed"
        );
        counter!("cursor_persistence_failed_total", 1, "cursor" => self.cursor_name.to_string());
    }
}
