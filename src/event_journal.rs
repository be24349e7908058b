use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::config::{JournalConfig, OverflowPolicy};
use crate::efficient_clock::{CycleClock, HardwareClock};
use crate::error::Result;
use crate::journal_entry::{decode_word, encode_call, encode_marker, marker_code_word, JournalEntry};
use crate::symbolizer::{symbol_offset, AddressResolver, CachingResolver, DlAddrResolver};

/// Core implementation of the event journal.
///
/// This module provides the EventJournal struct, a fixed-capacity lock-free
/// ring of timestamped call and marker entries, and its flush routine.

/// Slots in a journal when no capacity is named.
pub const DEFAULT_CAPACITY: usize = 1 << 16;

/// Whether a journal has been flushed yet.
///
/// Flushing does not stop recording, so `Flushed` is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    Recording,
    Flushed,
}

/// An entry read back from the journal, with the slot it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedEntry {
    pub slot: usize,
    pub entry: JournalEntry,
}

/// Counters describing one flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    /// Lines written to the sink.
    pub lines: usize,
    /// How many of those lines were markers.
    pub markers: usize,
    /// Call entries whose address the resolver knew nothing about.
    pub unresolved: usize,
    /// Events rejected for lack of capacity since the journal was created.
    pub dropped: u64,
}

/// A fixed-capacity, lock-free journal of function calls and markers.
///
/// Recording is a clock read, one atomic fetch-add to claim a slot, and one
/// or two atomic stores. Any number of threads may record concurrently;
/// every caller gets a distinct slot.
///
/// Entries live in two parallel arrays: a 64-bit time word that also
/// carries the entry kind (see [`journal_entry`](crate::journal_entry)),
/// and the function address, or the event code for a marker. The address is stored first and the time word
/// last, so a reader that sees a time word also sees the address written
/// with it.
///
/// # Consistency
///
/// [`flush`](Self::flush) may run while other threads record, but it can
/// then observe a slot mid-overwrite once the ring has wrapped: a new time
/// word next to the address of the entry it replaces. Flush after recording
/// has stopped for torn-free output.
///
/// # Capacity
///
/// The claim counter never wraps; the physical slot is `claim % CAP`, so no
/// store lands outside the arrays. What happens past `CAP` claims depends
/// on the [`OverflowPolicy`].
///
/// # Type Parameters
///
/// * `CAP` - Number of slots
/// * `C` - Cycle-counter source
///
/// # Examples
///
/// ```
/// # use cycle_journal::EventJournal;
/// # use cycle_journal::symbolizer::NullResolver;
/// let journal = EventJournal::<1024>::new();
///
/// journal.call_begin(0x1000);
/// journal.event_add(1);
/// journal.call_end(0x1000);
///
/// let mut out = Vec::new();
/// let summary = journal.flush_with(&mut out, &NullResolver).unwrap();
/// assert_eq!(summary.lines, 3);
/// ```
pub struct EventJournal<const CAP: usize = DEFAULT_CAPACITY, C = HardwareClock> {
    times: Box<[AtomicU64]>,
    addresses: Box<[AtomicUsize]>,
    next_slot: AtomicU64,
    dropped: AtomicU64,
    flushed: AtomicBool,
    overflow: OverflowPolicy,
    clock: C,
}

impl<const CAP: usize> EventJournal<CAP, HardwareClock> {
    /// Creates an empty journal stamped by the hardware cycle counter.
    pub fn new() -> Self {
        Self::with_config(JournalConfig::default())
    }

    pub fn with_config(config: JournalConfig) -> Self {
        Self::with_clock(HardwareClock, config)
    }
}

impl<const CAP: usize> Default for EventJournal<CAP, HardwareClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize, C: CycleClock> EventJournal<CAP, C> {
    const NONZERO_CAPACITY: () = assert!(CAP > 0, "journal capacity must be non-zero");

    /// Creates an empty journal stamped by `clock`.
    pub fn with_clock(clock: C, config: JournalConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO_CAPACITY;

        Self {
            times: (0..CAP).map(|_| AtomicU64::new(0)).collect(),
            addresses: (0..CAP).map(|_| AtomicUsize::new(0)).collect(),
            next_slot: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            flushed: AtomicBool::new(false),
            overflow: config.overflow,
            clock,
        }
    }

    /// Claims the next slot, or `None` when the journal is full and
    /// configured to drop.
    #[inline(always)]
    fn claim(&self) -> Option<usize> {
        let claim = self.next_slot.fetch_add(1, Ordering::SeqCst);
        if claim >= CAP as u64 && self.overflow == OverflowPolicy::Drop {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some((claim % CAP as u64) as usize)
    }

    #[inline(always)]
    fn record_call(&self, address: usize, begin: bool) {
        let cycles = self.clock.now();
        if let Some(slot) = self.claim() {
            self.addresses[slot].store(address, Ordering::Relaxed);
            self.times[slot].store(encode_call(cycles, begin), Ordering::Release);
        }
    }

    /// Records an application-defined marker.
    ///
    /// Markers keep the same cycle bits as calls, so they interleave with
    /// call entries on one timeline.
    #[inline]
    pub fn event_add(&self, code: u8) {
        let cycles = self.clock.now();
        if let Some(slot) = self.claim() {
            self.addresses[slot].store(marker_code_word(code), Ordering::Relaxed);
            self.times[slot].store(encode_marker(cycles), Ordering::Release);
        }
    }

    /// Records entry into the function at `address`.
    #[inline]
    pub fn call_begin(&self, address: usize) {
        self.record_call(address, true);
    }

    /// Records return from the function at `address`.
    #[inline]
    pub fn call_end(&self, address: usize) {
        self.record_call(address, false);
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Events accepted since creation, including ones since overwritten.
    pub fn recorded(&self) -> u64 {
        self.next_slot.load(Ordering::SeqCst).saturating_sub(self.dropped())
    }

    /// Events rejected because the journal was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of claimed slots in the retained window.
    pub fn len(&self) -> usize {
        self.window().1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> JournalState {
        if self.flushed.load(Ordering::Acquire) {
            JournalState::Flushed
        } else {
            JournalState::Recording
        }
    }

    /// First slot of the retained window and its length.
    fn window(&self) -> (usize, usize) {
        let claimed = self.next_slot.load(Ordering::SeqCst);
        if claimed <= CAP as u64 {
            return (0, claimed as usize);
        }
        match self.overflow {
            OverflowPolicy::Drop => (0, CAP),
            OverflowPolicy::Wrap => ((claimed % CAP as u64) as usize, CAP),
        }
    }

    /// Retained entries, oldest first.
    ///
    /// Once the ring has wrapped, the oldest retained entry sits at the
    /// slot the next claim will overwrite, so the walk starts there. Slots
    /// that were claimed but not yet written are skipped.
    pub fn entries(&self) -> impl Iterator<Item = RecordedEntry> + '_ {
        let (start, len) = self.window();
        (0..len).filter_map(move |i| {
            let slot = (start + i) % CAP;
            let word = self.times[slot].load(Ordering::Acquire);
            let address = self.addresses[slot].load(Ordering::Relaxed);
            decode_word(word, address).map(|entry| RecordedEntry { slot, entry })
        })
    }

    /// Collects [`entries`](Self::entries).
    pub fn snapshot(&self) -> Vec<RecordedEntry> {
        self.entries().collect()
    }

    /// Writes one line per retained entry to `sink`, oldest first,
    /// resolving call addresses with `dladdr`.
    ///
    /// See [`flush_with`](Self::flush_with) for the line format.
    pub fn flush<W: Write>(&self, sink: &mut W) -> Result<FlushSummary> {
        self.flush_with(sink, &CachingResolver::new(DlAddrResolver))
    }

    /// Writes one line per retained entry to `sink`, oldest first.
    ///
    /// Call entries render as
    ///
    /// ```text
    /// B@0x<cycles> <module>(<symbol><+|-><offset>) [0x<address>]
    /// ```
    ///
    /// with `B` for a begin and `E` for an end. Markers render as
    /// `M@0x<cycles> event(0x<code>)`. Fields the resolver cannot supply
    /// are written as `??`.
    ///
    /// The journal is only read; recording may continue afterwards and a
    /// later flush sees everything still retained.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SinkUnwritable`](crate::JournalError::SinkUnwritable)
    /// if the sink rejects a write. Lines already written are left in place.
    pub fn flush_with<W, R>(&self, sink: &mut W, resolver: &R) -> Result<FlushSummary>
    where
        W: Write,
        R: AddressResolver + ?Sized,
    {
        self.flushed.store(true, Ordering::Release);

        let mut summary = FlushSummary {
            dropped: self.dropped(),
            ..FlushSummary::default()
        };

        for RecordedEntry { entry, .. } in self.entries() {
            match entry {
                JournalEntry::Marker { timestamp, code } => {
                    writeln!(sink, "M@{timestamp:#x} event({code:#04x})")?;
                    summary.markers += 1;
                }
                JournalEntry::CallBegin { timestamp, address }
                | JournalEntry::CallEnd { timestamp, address } => {
                    let resolved = resolver.resolve(address);
                    if resolved.is_unresolved() {
                        summary.unresolved += 1;
                    }
                    let (sign, offset) = symbol_offset(address, resolved.base);
                    writeln!(
                        sink,
                        "{}@{:#x} {}({}{}{:x}) [{:#x}]",
                        entry.kind().tag(),
                        timestamp,
                        resolved.module_or_unknown(),
                        resolved.symbol_or_unknown(),
                        sign,
                        offset,
                        address
                    )?;
                }
            }
            summary.lines += 1;
        }
        sink.flush()?;

        if summary.dropped > 0 {
            warn!(dropped = summary.dropped, capacity = CAP, "journal full, events were dropped");
        }
        debug!(
            lines = summary.lines,
            markers = summary.markers,
            unresolved = summary.unresolved,
            "journal flushed"
        );
        Ok(summary)
    }
}
