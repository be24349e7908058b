/// Fixed-width encoding of journal entries.
///
/// Every slot carries one 64-bit time word. The low two bits say what kind
/// of entry the slot holds, so a reader can decode any slot without knowing
/// which call produced it:
///
/// ```text
/// call:   [ cycles (62 bits) | 0b01 or 0b10 ]   address slot: function
/// marker: [ cycles (62 bits) | 0b11         ]   address slot: event code
/// ```
///
/// A word of zero is never produced by an encoder and marks a slot that
/// has not been written yet.

const KIND_BITS: u32 = 2;
const KIND_MASK: u64 = (1 << KIND_BITS) - 1;

const TAG_EMPTY: u64 = 0b00;
const TAG_CALL_BEGIN: u64 = 0b01;
const TAG_CALL_END: u64 = 0b10;
const TAG_MARKER: u64 = 0b11;

/// Cycle bits every entry keeps.
pub const TIMESTAMP_MASK: u64 = u64::MAX >> KIND_BITS;

/// What a journal slot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    CallBegin,
    CallEnd,
    Marker,
}

impl EntryKind {
    /// The single-letter tag used in flushed traces.
    pub fn tag(self) -> char {
        match self {
            EntryKind::CallBegin => 'B',
            EntryKind::CallEnd => 'E',
            EntryKind::Marker => 'M',
        }
    }

    /// Inverse of [`EntryKind::tag`].
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'B' => Some(EntryKind::CallBegin),
            'E' => Some(EntryKind::CallEnd),
            'M' => Some(EntryKind::Marker),
            _ => None,
        }
    }
}

/// A decoded journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    /// A function was entered.
    CallBegin { timestamp: u64, address: usize },
    /// A function returned.
    CallEnd { timestamp: u64, address: usize },
    /// An application-defined marker.
    Marker { timestamp: u64, code: u8 },
}

impl JournalEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            JournalEntry::CallBegin { .. } => EntryKind::CallBegin,
            JournalEntry::CallEnd { .. } => EntryKind::CallEnd,
            JournalEntry::Marker { .. } => EntryKind::Marker,
        }
    }

    /// Cycle count at recording time, truncated to the bits the encoding keeps.
    pub fn timestamp(&self) -> u64 {
        match *self {
            JournalEntry::CallBegin { timestamp, .. }
            | JournalEntry::CallEnd { timestamp, .. }
            | JournalEntry::Marker { timestamp, .. } => timestamp,
        }
    }

    /// The instrumented function's address, for call entries.
    pub fn address(&self) -> Option<usize> {
        match *self {
            JournalEntry::CallBegin { address, .. } | JournalEntry::CallEnd { address, .. } => {
                Some(address)
            }
            JournalEntry::Marker { .. } => None,
        }
    }

    /// The event code, for markers.
    pub fn code(&self) -> Option<u8> {
        match *self {
            JournalEntry::Marker { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Encodes a call begin (`begin == true`) or call end time word.
#[inline(always)]
pub fn encode_call(cycles: u64, begin: bool) -> u64 {
    let tag = if begin { TAG_CALL_BEGIN } else { TAG_CALL_END };
    (cycles << KIND_BITS) | tag
}

/// Encodes a marker time word. The event code goes in the slot's address
/// word; see [`marker_code_word`].
#[inline(always)]
pub fn encode_marker(cycles: u64) -> u64 {
    (cycles << KIND_BITS) | TAG_MARKER
}

/// The address word stored alongside a marker.
#[inline(always)]
pub fn marker_code_word(code: u8) -> usize {
    code as usize
}

/// Decodes a time word together with the address word stored in the same
/// slot.
///
/// Returns `None` for a slot that was never written. For markers the
/// address word holds the event code.
pub fn decode_word(word: u64, address: usize) -> Option<JournalEntry> {
    match word & KIND_MASK {
        TAG_EMPTY => None,
        TAG_CALL_BEGIN => Some(JournalEntry::CallBegin {
            timestamp: word >> KIND_BITS,
            address,
        }),
        TAG_CALL_END => Some(JournalEntry::CallEnd {
            timestamp: word >> KIND_BITS,
            address,
        }),
        _ => Some(JournalEntry::Marker {
            timestamp: word >> KIND_BITS,
            code: address as u8,
        }),
    }
}
