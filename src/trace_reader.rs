use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::error::{JournalError, Result};
use crate::journal_entry::EntryKind;

/// Reader and utilities for post-processing flushed traces.
///
/// This module parses the text produced by
/// [`EventJournal::flush`](crate::EventJournal::flush) back into structured
/// lines, and pairs begin/end lines into call spans with elapsed cycles.

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    Call(CallLine),
    Marker { timestamp: u64, code: u8 },
}

impl TraceLine {
    pub fn timestamp(&self) -> u64 {
        match self {
            TraceLine::Call(call) => call.timestamp,
            TraceLine::Marker { timestamp, .. } => *timestamp,
        }
    }
}

/// A parsed `B@...` or `E@...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLine {
    pub begin: bool,
    pub timestamp: u64,
    pub module: String,
    pub symbol: String,
    /// `'+'` when the address is at or after the symbol base, `'-'` before it.
    pub sign: char,
    /// Distance from the symbol base. Spans the full address width: with no
    /// known base it equals the address.
    pub offset: usize,
    pub address: usize,
}

/// A matched begin/end pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpan {
    pub start: u64,
    pub end: u64,
    pub module: String,
    pub symbol: String,
    pub address: usize,
}

/// Header row for [`CallSpan::to_csv_row`].
///
/// There is no source-line column. Mapping addresses to file and line needs
/// the debug info of the traced binary; run `addr2line -pCf` over the
/// `call_addr` column for that.
pub const CSV_HEADER: &str = "start_time,end_time,elapsed,elf,sym_name,call_addr";

impl CallSpan {
    /// Cycles between begin and end.
    pub fn elapsed(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{:#x},{:#x},{},{},{},{:#x}",
            self.start,
            self.end,
            self.elapsed(),
            self.module,
            self.symbol,
            self.address
        )
    }
}

impl fmt::Display for CallSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{:#x}] {} cycles",
            self.symbol,
            self.module,
            self.address,
            self.elapsed()
        )
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Parses one flushed line. `line_no` is only used in error messages.
pub fn parse_line(line: &str, line_no: usize) -> Result<TraceLine> {
    let malformed = |reason: &str| JournalError::MalformedLine {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut chars = line.chars();
    let kind = chars
        .next()
        .and_then(EntryKind::from_tag)
        .ok_or_else(|| malformed("unknown entry tag"))?;
    let rest = chars
        .as_str()
        .strip_prefix('@')
        .ok_or_else(|| malformed("missing '@'"))?;
    let (time, body) = rest
        .split_once(' ')
        .ok_or_else(|| malformed("missing body"))?;
    let timestamp = parse_hex(time).ok_or_else(|| malformed("bad timestamp"))?;

    if kind == EntryKind::Marker {
        let code = body
            .strip_prefix("event(")
            .and_then(|b| b.strip_suffix(')'))
            .and_then(parse_hex)
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(|| malformed("bad event code"))?;
        return Ok(TraceLine::Marker { timestamp, code });
    }

    // <module>(<symbol><sign><offset>) [<address>]
    let (location, address) = body
        .rsplit_once(" [")
        .ok_or_else(|| malformed("missing address"))?;
    let address = address
        .strip_suffix(']')
        .and_then(parse_hex)
        .ok_or_else(|| malformed("bad address"))? as usize;
    // The symbol group is the last parenthesized one; module paths may
    // contain '(' themselves.
    let (module, symbol_part) = location
        .rsplit_once('(')
        .ok_or_else(|| malformed("missing symbol"))?;
    let symbol_part = symbol_part
        .strip_suffix(')')
        .ok_or_else(|| malformed("unterminated symbol"))?;
    let sign_at = symbol_part
        .rfind(|c: char| c == '+' || c == '-')
        .ok_or_else(|| malformed("missing offset"))?;
    let offset = usize::from_str_radix(&symbol_part[sign_at + 1..], 16)
        .map_err(|_| malformed("bad offset"))?;
    let sign = if symbol_part[sign_at..].starts_with('-') { '-' } else { '+' };

    Ok(TraceLine::Call(CallLine {
        begin: kind == EntryKind::CallBegin,
        timestamp,
        module: module.to_string(),
        symbol: symbol_part[..sign_at].to_string(),
        sign,
        offset,
        address,
    }))
}

/// Sequential reader over a flushed trace.
///
/// # Examples
///
/// ```
/// # use cycle_journal::trace_reader::{TraceReader, TraceLine};
/// let text = "B@0x10 app(main+0) [0x1000]\nM@0x18 event(0x01)\nE@0x20 app(main+0) [0x1000]\n";
/// let mut reader = TraceReader::new(text);
///
/// let mut count = 0;
/// while let Some(line) = reader.read_line() {
///     line.unwrap();
///     count += 1;
/// }
/// assert_eq!(count, 3);
/// ```
pub struct TraceReader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> TraceReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    /// Reads the next non-blank line.
    ///
    /// Returns `None` at the end of the trace.
    pub fn read_line(&mut self) -> Option<Result<TraceLine>> {
        self.lines
            .by_ref()
            .find(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| parse_line(line.trim_end(), idx + 1))
    }

    /// Parsed lines only. Malformed lines are logged and skipped.
    pub fn valid_lines(self) -> impl Iterator<Item = TraceLine> + 'a {
        self.filter_map(|line| match line {
            Ok(line) => Some(line),
            Err(err) => {
                warn!(%err, "skipping malformed trace line");
                None
            }
        })
    }
}

impl Iterator for TraceReader<'_> {
    type Item = Result<TraceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_line()
    }
}

/// Pairs every end line with the most recent unmatched begin at the same
/// address.
///
/// Spans come out in the order their end lines appear. An end with no
/// matching begin is logged and skipped; begins still open at the end of
/// the trace produce no span. Markers are ignored.
pub fn pair_calls<I>(lines: I) -> Vec<CallSpan>
where
    I: IntoIterator<Item = TraceLine>,
{
    let mut open: HashMap<usize, Vec<u64>> = HashMap::new();
    let mut spans = Vec::new();

    for line in lines {
        let TraceLine::Call(call) = line else {
            continue;
        };

        if call.begin {
            open.entry(call.address).or_default().push(call.timestamp);
            continue;
        }

        match open.get_mut(&call.address).and_then(Vec::pop) {
            Some(start) => spans.push(CallSpan {
                start,
                end: call.timestamp,
                module: call.module,
                symbol: call.symbol,
                address: call.address,
            }),
            None => warn!(
                address = call.address,
                symbol = %call.symbol,
                "end call without a beginning"
            ),
        }
    }

    spans
}
