use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use cycle_journal::cpu_frequency::{cycles_per_second, cycles_to_duration};
use cycle_journal::trace_reader::{pair_calls, TraceReader, CSV_HEADER};
use cycle_journal::{EventJournal, JournalConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SWAP_BEGIN: u8 = 1;
const SWAP_END: u8 = 2;

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .init();
    guard
}

/// Records a short session of nested calls and frame markers, then flushes
/// it to stdout.
fn demo() -> Result<(), Box<dyn Error>> {
    let journal = EventJournal::<1024>::with_config(JournalConfig::from_env());
    let main_addr = main as *const () as usize;

    journal.call_begin(main_addr);
    for _ in 0..4 {
        journal.event_add(SWAP_BEGIN);
        journal.call_begin(demo as *const () as usize);
        journal.call_end(demo as *const () as usize);
        journal.event_add(SWAP_END);
    }
    journal.call_end(main_addr);

    let stdout = io::stdout();
    let summary = journal.flush(&mut stdout.lock())?;
    info!(
        lines = summary.lines,
        markers = summary.markers,
        unresolved = summary.unresolved,
        "demo trace written"
    );
    Ok(())
}

/// Prints one CSV row per matched call in a flushed trace file.
///
/// Malformed lines are skipped with a warning. Rows carry no source-line
/// column; see [`CSV_HEADER`].
fn report(path: &str) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    let spans = pair_calls(TraceReader::new(&text).valid_lines());

    let hz = cycles_per_second();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{CSV_HEADER}")?;
    for span in &spans {
        writeln!(out, "{}", span.to_csv_row())?;
    }

    let total: u64 = spans.iter().map(|s| s.elapsed()).sum();
    match cycles_to_duration(total, hz) {
        Some(wall) => info!(spans = spans.len(), ?wall, "report complete"),
        None => info!(spans = spans.len(), cycles = total, "report complete, cpu frequency unknown"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let _guard = init_logging();

    let args: Vec<String> = env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        None | Some("demo") => demo(),
        Some("report") => match args.get(2) {
            Some(path) => report(path),
            None => {
                eprintln!("usage: {} report <trace.txt>", args[0]);
                return ExitCode::FAILURE;
            }
        },
        Some(other) => {
            eprintln!("unknown command {other:?}; expected `demo` or `report <trace.txt>`");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "failed");
            ExitCode::FAILURE
        }
    }
}
