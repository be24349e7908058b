use std::io;
use thiserror::Error;

/// Errors reported by the journal and the trace reader.
///
/// Running out of capacity and failing to resolve an address are not errors:
/// the first is counted in [`EventJournal::dropped`](crate::EventJournal::dropped),
/// the second renders placeholder text.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The flush sink rejected a write. Lines written before the failure stay written.
    #[error("trace sink is not writable: {0}")]
    SinkUnwritable(#[from] io::Error),

    /// A flushed trace line could not be parsed back.
    #[error("malformed trace line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    /// The instrumentation hooks already forward to a journal.
    #[error("a journal is already installed for instrumentation hooks")]
    AlreadyInstalled,
}

pub type Result<T> = std::result::Result<T, JournalError>;
