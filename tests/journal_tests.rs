use cycle_journal::symbolizer::{AddressResolver, NullResolver, Resolution};
use cycle_journal::{
    EntryKind, EventJournal, JournalConfig, JournalEntry, JournalError, JournalState,
    OverflowPolicy,
};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Clock that ticks by one on every read, so each entry's timestamp is
/// predictable.
fn ticking_clock() -> impl Fn() -> u64 + Send + Sync {
    let next = AtomicU64::new(100);
    move || next.fetch_add(1, Ordering::SeqCst)
}

fn journal_with<const CAP: usize>(policy: OverflowPolicy) -> EventJournal<CAP, impl Fn() -> u64 + Send + Sync> {
    EventJournal::<CAP, _>::with_clock(ticking_clock(), JournalConfig::new().overflow(policy))
}

struct MapResolver(HashMap<usize, Resolution>);

impl AddressResolver for MapResolver {
    fn resolve(&self, address: usize) -> Resolution {
        self.0.get(&address).cloned().unwrap_or_default()
    }
}

fn flush_lines<const CAP: usize, C: cycle_journal::efficient_clock::CycleClock>(
    journal: &EventJournal<CAP, C>,
    resolver: &dyn AddressResolver,
) -> Vec<String> {
    let mut out = Vec::new();
    journal.flush_with(&mut out, resolver).unwrap();
    String::from_utf8(out).unwrap().lines().map(str::to_owned).collect()
}

fn call_addresses<const CAP: usize, C: cycle_journal::efficient_clock::CycleClock>(
    journal: &EventJournal<CAP, C>,
) -> Vec<usize> {
    journal.entries().filter_map(|r| r.entry.address()).collect()
}

#[test]
fn test_begin_marker_end_sequence() {
    let journal = journal_with::<64>(OverflowPolicy::Wrap);
    let resolver = MapResolver(HashMap::from([(0x1000, Resolution::new("app", "main", 0x1000))]));

    journal.call_begin(0x1000);
    journal.event_add(1);
    journal.event_add(2);
    journal.call_end(0x1000);

    let lines = flush_lines(&journal, &resolver);
    assert_eq!(
        lines,
        vec![
            "B@0x64 app(main+0) [0x1000]",
            "M@0x65 event(0x01)",
            "M@0x66 event(0x02)",
            "E@0x67 app(main+0) [0x1000]",
        ]
    );
}

#[test]
fn test_sequential_order_is_preserved() {
    let journal = journal_with::<128>(OverflowPolicy::Wrap);
    for addr in 1..=50usize {
        journal.call_begin(addr * 0x10);
    }

    let expected: Vec<usize> = (1..=50).map(|a| a * 0x10).collect();
    assert_eq!(call_addresses(&journal), expected);
    assert_eq!(flush_lines(&journal, &NullResolver).len(), 50);
}

#[test]
fn test_wraparound_keeps_last_capacity_entries() {
    let journal = journal_with::<4>(OverflowPolicy::Wrap);
    for addr in (0x10..=0x60).step_by(0x10) {
        journal.call_begin(addr);
    }

    assert_eq!(call_addresses(&journal), vec![0x30, 0x40, 0x50, 0x60]);

    let lines = flush_lines(&journal, &NullResolver);
    let rendered: Vec<&str> = lines
        .iter()
        .map(|l| l.rsplit_once(' ').unwrap().1)
        .collect();
    assert_eq!(rendered, vec!["[0x30]", "[0x40]", "[0x50]", "[0x60]"]);
}

#[test]
fn test_wraparound_order_with_larger_window() {
    const CAP: usize = 16;
    let journal = journal_with::<CAP>(OverflowPolicy::Wrap);
    let total = CAP + 5;
    for i in 0..total {
        journal.call_begin(i + 1);
    }

    let expected: Vec<usize> = (total - CAP..total).map(|i| i + 1).collect();
    assert_eq!(call_addresses(&journal), expected);

    let stamps: Vec<u64> = journal.entries().map(|r| r.entry.timestamp()).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(journal.len(), CAP);
    assert_eq!(journal.recorded(), total as u64);
    assert_eq!(journal.dropped(), 0);
}

#[test]
fn test_tags_and_timestamps_round_trip() {
    let journal = journal_with::<32>(OverflowPolicy::Wrap);
    journal.call_begin(0xbeef);
    journal.call_end(0xbeef);

    let entries: Vec<JournalEntry> = journal.entries().map(|r| r.entry).collect();
    assert_eq!(
        entries,
        vec![
            JournalEntry::CallBegin { timestamp: 100, address: 0xbeef },
            JournalEntry::CallEnd { timestamp: 101, address: 0xbeef },
        ]
    );

    let lines = flush_lines(&journal, &NullResolver);
    assert!(lines[0].starts_with("B@0x64 "));
    assert!(lines[1].starts_with("E@0x65 "));
}

#[test]
fn test_unresolved_address_renders_placeholder() {
    let journal = journal_with::<8>(OverflowPolicy::Wrap);
    journal.call_begin(0x1234);

    let mut out = Vec::new();
    let summary = journal.flush_with(&mut out, &NullResolver).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(text, "B@0x64 ??(??+1234) [0x1234]\n");
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.lines, 1);
}

#[test]
fn test_address_below_symbol_base_uses_negative_offset() {
    let journal = journal_with::<8>(OverflowPolicy::Wrap);
    let resolver = MapResolver(HashMap::from([(0x0ff0, Resolution::new("lib.so", "first", 0x1000))]));
    journal.call_end(0x0ff0);

    assert_eq!(flush_lines(&journal, &resolver), vec!["E@0x64 lib.so(first-10) [0xff0]"]);
}

#[test]
fn test_unwritten_slots_are_not_flushed() {
    let journal = journal_with::<1024>(OverflowPolicy::Wrap);
    journal.event_add(9);

    assert_eq!(journal.len(), 1);
    assert_eq!(flush_lines(&journal, &NullResolver), vec!["M@0x64 event(0x09)"]);
}

#[test]
fn test_markers_keep_full_cycle_width_after_long_uptime() {
    let next = AtomicU64::new(1 << 60);
    let clock = move || next.fetch_add(1, Ordering::SeqCst);
    let journal = EventJournal::<8, _>::with_clock(clock, JournalConfig::default());

    journal.call_begin(0x10);
    journal.event_add(0xff);
    journal.call_end(0x10);

    assert_eq!(
        flush_lines(&journal, &NullResolver),
        vec![
            "B@0x1000000000000000 ??(??+10) [0x10]",
            "M@0x1000000000000001 event(0xff)",
            "E@0x1000000000000002 ??(??+10) [0x10]",
        ]
    );
    let stamps: Vec<u64> = journal.entries().map(|r| r.entry.timestamp()).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_empty_journal_flushes_nothing() {
    let journal = EventJournal::<16>::new();
    assert!(journal.is_empty());

    let mut out = Vec::new();
    let summary = journal.flush_with(&mut out, &NullResolver).unwrap();
    assert!(out.is_empty());
    assert_eq!(summary.lines, 0);
}

#[test]
fn test_drop_policy_stops_at_capacity() {
    let journal = journal_with::<4>(OverflowPolicy::Drop);
    for addr in (0x10..=0x60).step_by(0x10) {
        journal.call_begin(addr);
    }

    assert_eq!(call_addresses(&journal), vec![0x10, 0x20, 0x30, 0x40]);
    assert_eq!(journal.dropped(), 2);
    assert_eq!(journal.recorded(), 4);

    let mut out = Vec::new();
    let summary = journal.flush_with(&mut out, &NullResolver).unwrap();
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.lines, 4);
}

#[test]
fn test_flush_is_repeatable_and_recording_continues() {
    let journal = journal_with::<8>(OverflowPolicy::Wrap);
    assert_eq!(journal.state(), JournalState::Recording);

    journal.call_begin(0x10);
    let first = flush_lines(&journal, &NullResolver);
    assert_eq!(journal.state(), JournalState::Flushed);
    assert_eq!(flush_lines(&journal, &NullResolver), first);

    journal.call_end(0x10);
    let second = flush_lines(&journal, &NullResolver);
    assert_eq!(second.len(), 2);
    assert_eq!(second[0], first[0]);
    assert_eq!(journal.state(), JournalState::Flushed);
}

struct BrokenSink {
    accepted: usize,
}

impl Write for BrokenSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.accepted == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.accepted -= 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_unwritable_sink_reports_failure() {
    let journal = journal_with::<8>(OverflowPolicy::Wrap);
    journal.call_begin(0x10);
    journal.call_end(0x10);

    let mut sink = BrokenSink { accepted: 0 };
    let result = journal.flush_with(&mut sink, &NullResolver);
    assert!(matches!(result, Err(JournalError::SinkUnwritable(_))));
}

#[test]
fn test_flush_to_file() {
    let journal = journal_with::<8>(OverflowPolicy::Wrap);
    journal.call_begin(0x10);
    journal.event_add(3);

    let mut file = tempfile::tempfile().unwrap();
    let summary = journal.flush_with(&mut file, &NullResolver).unwrap();
    assert_eq!(summary.lines, 2);
    assert_eq!(summary.markers, 1);
}

#[test]
fn test_concurrent_writers_claim_distinct_slots() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;
    const CAP: usize = THREADS * PER_THREAD;

    let journal = Arc::new(EventJournal::<CAP>::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let journal = Arc::clone(&journal);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    journal.call_begin(t * PER_THREAD + i + 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = journal.snapshot();
    assert_eq!(snapshot.len(), CAP);

    let slots: HashSet<usize> = snapshot.iter().map(|r| r.slot).collect();
    assert_eq!(slots, (0..CAP).collect::<HashSet<_>>());

    let addresses: HashSet<usize> = snapshot.iter().filter_map(|r| r.entry.address()).collect();
    assert_eq!(addresses, (1..=CAP).collect::<HashSet<_>>());

    // Each thread's own events keep their relative order.
    for t in 0..THREADS {
        let own: Vec<usize> = snapshot
            .iter()
            .filter_map(|r| r.entry.address())
            .filter(|a| (a - 1) / PER_THREAD == t)
            .collect();
        assert!(own.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_concurrent_overflow_never_escapes_capacity() {
    const CAP: usize = 64;
    for policy in [OverflowPolicy::Wrap, OverflowPolicy::Drop] {
        let journal = Arc::new(EventJournal::<CAP>::with_config(JournalConfig::new().overflow(policy)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let journal = Arc::clone(&journal);
                thread::spawn(move || {
                    for i in 0..100 {
                        if i % 3 == 0 {
                            journal.event_add(t as u8);
                        } else {
                            journal.call_begin(0x1000 + i);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = journal.snapshot();
        assert_eq!(snapshot.len(), CAP);
        assert!(snapshot.iter().all(|r| r.slot < CAP));
        assert_eq!(journal.recorded() + journal.dropped(), 400);
    }
}

#[test]
fn test_random_call_patterns_stay_in_bounds() {
    // xorshift, so the pattern is reproducible
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let journal = journal_with::<32>(OverflowPolicy::Wrap);
    let mut expected = Vec::new();
    for _ in 0..(32 * 3 + 7) {
        let r = next();
        let addr = (r >> 8) as usize & 0xffff;
        match r % 3 {
            0 => {
                journal.event_add(r as u8);
                expected.push(EntryKind::Marker);
            }
            1 => {
                journal.call_begin(addr);
                expected.push(EntryKind::CallBegin);
            }
            _ => {
                journal.call_end(addr);
                expected.push(EntryKind::CallEnd);
            }
        }
    }

    let kinds: Vec<EntryKind> = journal.entries().map(|r| r.entry.kind()).collect();
    assert_eq!(kinds, expected[expected.len() - 32..].to_vec());
    assert!(journal.snapshot().iter().all(|r| r.slot < journal.capacity()));
}
