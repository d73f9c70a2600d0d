//! A durable, multi-consumer cursor over an append-only, segmented log.
//!
//! Producers append opaque byte payloads to a log (modeled here as a [`log_view::LogView`]); any
//! number of named [`cursor::Cursor`]s independently track their progress, acknowledge entries in
//! order or out of order, and survive process restart via [`persistence::PersistenceManager`].
//! The physical log-segment storage engine, its replication, and the metadata store's wire
//! protocol are external collaborators — this crate only defines the trait seams
//! ([`log_view::LogView`], [`persistence::metadata_store::MetadataStore`],
//! [`persistence::cursor_ledger::CursorLedgerLog`]) and the state machines layered on top.

pub mod config;
pub mod cursor;
pub mod entry;
pub mod entry_cache;
pub mod error;
pub mod find_newest;
pub mod internal_events;
pub mod log_view;
pub mod persistence;
pub mod position;
pub mod range_set;

pub use config::CursorConfig;
pub use cursor::{Cursor, CountPolicy};
pub use entry::Entry;
pub use entry_cache::EntryCache;
pub use error::{CursorError, Result};
pub use find_newest::SearchScope;
pub use log_view::LogView;
pub use persistence::cursor_ledger::CursorLedgerLog;
pub use persistence::metadata_store::MetadataStore;
pub use persistence::PersistenceManager;
pub use position::{CountBound, Position};
pub use range_set::{Interval, RangeSet};

#[cfg(feature = "testing")]
pub use log_view::InMemoryLogView;
#[cfg(feature = "testing")]
pub use persistence::cursor_ledger::InMemoryCursorLedgerLog;
#[cfg(feature = "testing")]
pub use persistence::metadata_store::InMemoryMetadataStore;
