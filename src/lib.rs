//! # Cycle Journal
//!
//! A low-overhead, lock-free journal for tracing function entry/exit and
//! custom markers in a running process, then dumping the trace with
//! symbolized addresses for offline inspection.
//!
//! ## Key Features
//!
//! * Lock-free recording: one atomic claim and one atomic store per event
//! * Fixed capacity, allocated once; no growth and no second buffer
//! * Cycle-counter timestamps packed with an entry-kind tag into one word
//! * Ring semantics with chronological flush, or a hardened drop-when-full mode
//! * Best-effort symbolization against whatever the dynamic loader has mapped
//!
//! ## Main Components
//!
//! * `EventJournal`: the ring of entries and its flush routine
//! * `journal_entry`: the fixed-width entry encoding
//! * `symbolizer`: address-to-symbol resolution used by flush
//! * `efficient_clock`: cycle-counter source
//! * `cpu_frequency`: best-effort cycles-to-wall-time calibration
//! * `trace_reader`: parses flushed traces and pairs calls into spans
//!
//! ## Quick Start
//!
//! ```
//! use cycle_journal::EventJournal;
//!
//! const FRAME_START: u8 = 1;
//!
//! fn work() {}
//!
//! let journal = EventJournal::<4096>::new();
//!
//! journal.call_begin(work as *const () as usize);
//! journal.event_add(FRAME_START);
//! work();
//! journal.call_end(work as *const () as usize);
//!
//! let mut out = Vec::new();
//! journal.flush(&mut out).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
//! ```

pub mod config;
pub mod cpu_frequency;
pub mod efficient_clock;
pub mod error;
pub mod event_journal;
#[cfg(feature = "cyg-profile")]
pub mod hooks;
pub mod journal_entry;
pub mod symbolizer;
pub mod trace_reader;

pub use config::{JournalConfig, OverflowPolicy};
pub use error::JournalError;
pub use event_journal::{EventJournal, FlushSummary, JournalState, RecordedEntry, DEFAULT_CAPACITY};
pub use journal_entry::{EntryKind, JournalEntry};
pub use symbolizer::{AddressResolver, DlAddrResolver, Resolution};
