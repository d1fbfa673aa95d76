//! Console output for probe runs.
//!
//! Text mode prints one progress line per timed command. Fast iterations
//! start with a carriage return so a burst of them overwrites itself into a
//! single line; delayed ones start a new line, leaving a visible trace of
//! where the driver started pacing the calls.

use cmdq_common::config::DeviceBackend;
use cmdq_common::CmdqResult;
use cmdq_runtime::{IterationObserver, IterationRecord, ProbeReport, RealtimeStatus};
use serde::Serialize;
use std::io::{self, Write};
use std::ops::ControlFlow;

const RULE: &str = "-------------------";

/// Writes probe progress and summaries.
#[derive(Debug)]
pub struct ConsolePrinter<W: Write> {
    out: W,
    progress: bool,
    overwrite_fast: bool,
}

impl<W: Write> ConsolePrinter<W> {
    /// Create a printer.
    ///
    /// `progress` enables per-iteration lines; `overwrite_fast` makes fast
    /// iterations reuse the current line.
    pub fn new(out: W, progress: bool, overwrite_fast: bool) -> Self {
        Self {
            out,
            progress,
            overwrite_fast,
        }
    }

    /// Announce which device is being opened.
    pub fn print_opening(&mut self, args: &str) -> io::Result<()> {
        if self.progress {
            writeln!(self.out)?;
            writeln!(self.out, "Creating the radio device with: {args}...")?;
        }
        Ok(())
    }

    /// Print one iteration.
    pub fn print_iteration(&mut self, record: &IterationRecord) -> io::Result<()> {
        if !self.progress {
            return Ok(());
        }

        let lead = if record.fast && self.overwrite_fast {
            "\r"
        } else {
            "\n"
        };
        write!(
            self.out,
            "{lead}timed command issued: {:04} (delay {:.6})",
            record.index,
            record.delay.as_secs_f64()
        )?;
        self.out.flush()
    }

    /// Print the closing summary lines.
    pub fn print_summary(&mut self, report: &ProbeReport) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(
            self.out,
            "without delay: {} out of {}",
            report.fast_count, report.iterations_run
        )?;
        if report.aborted {
            writeln!(
                self.out,
                "stopped early after {} of {} commands",
                report.iterations_run, report.requested
            )?;
        }
        self.out.flush()
    }

    /// Print a machine-readable summary.
    pub fn print_json(&mut self, summary: &RunSummary<'_>) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, summary)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Recover the writer.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Everything reported for a run in JSON mode.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    /// Device address args as given.
    pub args: &'a str,
    /// Backend used.
    pub backend: DeviceBackend,
    /// Real-time setup outcome.
    pub realtime: &'a RealtimeStatus,
    /// Probe results.
    pub report: &'a ProbeReport,
}

/// Observer that prints progress and stops when asked to.
pub struct ConsoleObserver<'p, W: Write, S: Fn() -> bool> {
    printer: &'p mut ConsolePrinter<W>,
    stop_requested: S,
}

impl<'p, W: Write, S: Fn() -> bool> ConsoleObserver<'p, W, S> {
    /// Wrap a printer with a stop check.
    pub fn new(printer: &'p mut ConsolePrinter<W>, stop_requested: S) -> Self {
        Self {
            printer,
            stop_requested,
        }
    }
}

impl<W: Write, S: Fn() -> bool> IterationObserver for ConsoleObserver<'_, W, S> {
    fn on_iteration(&mut self, record: &IterationRecord) -> CmdqResult<ControlFlow<()>> {
        self.printer.print_iteration(record)?;
        if (self.stop_requested)() {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdq_common::metrics::CallMetrics;
    use cmdq_common::time::TimeSpec;
    use std::time::Duration;

    fn record(index: u32, delay_us: u64, fast: bool) -> IterationRecord {
        IterationRecord {
            index,
            command_time: TimeSpec::from_nanos(100_000_000),
            gain: 0.0,
            delay: Duration::from_micros(delay_us),
            fast,
        }
    }

    fn report(run: u32, fast: u32, aborted: bool) -> ProbeReport {
        ProbeReport {
            device: "test".into(),
            requested: 100,
            iterations_run: run,
            fast_count: fast,
            last_fast_index: fast.checked_sub(1),
            aborted,
            first_command_time: TimeSpec::from_nanos(100_000_000),
            metrics: CallMetrics::new(8, Duration::from_millis(5)).snapshot(&[]),
        }
    }

    fn text(printer: ConsolePrinter<Vec<u8>>) -> String {
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_fast_lines_overwrite() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, true);
        printer.print_iteration(&record(0, 12, true)).unwrap();
        printer.print_iteration(&record(1, 50_000, false)).unwrap();

        assert_eq!(
            text(printer),
            "\rtimed command issued: 0000 (delay 0.000012)\ntimed command issued: 0001 (delay 0.050000)"
        );
    }

    #[test]
    fn test_overwrite_disabled() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, false);
        printer.print_iteration(&record(7, 1, true)).unwrap();
        assert_eq!(text(printer), "\ntimed command issued: 0007 (delay 0.000001)");
    }

    #[test]
    fn test_summary() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, true);
        printer.print_summary(&report(100, 16, false)).unwrap();
        assert_eq!(
            text(printer),
            "\n-------------------\nwithout delay: 16 out of 100\n"
        );
    }

    #[test]
    fn test_aborted_summary() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, true);
        printer.print_summary(&report(10, 10, true)).unwrap();
        assert!(text(printer).ends_with("stopped early after 10 of 100 commands\n"));
    }

    #[test]
    fn test_quiet_progress() {
        let mut printer = ConsolePrinter::new(Vec::new(), false, true);
        printer.print_opening("type=b200").unwrap();
        printer.print_iteration(&record(0, 1, true)).unwrap();
        assert!(text(printer).is_empty());
    }

    #[test]
    fn test_opening_line() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, true);
        printer.print_opening("").unwrap();
        assert_eq!(text(printer), "\nCreating the radio device with: ...\n");
    }

    #[test]
    fn test_json_summary() {
        let mut printer = ConsolePrinter::new(Vec::new(), false, true);
        let realtime = RealtimeStatus::default();
        let report = report(4, 2, false);
        printer
            .print_json(&RunSummary {
                args: "queue_depth=2",
                backend: DeviceBackend::Simulated,
                realtime: &realtime,
                report: &report,
            })
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&text(printer)).unwrap();
        assert_eq!(value["backend"], "simulated");
        assert_eq!(value["report"]["fast_count"], 2);
        assert_eq!(value["realtime"]["memory_locked"], false);
    }

    #[test]
    fn test_observer_stops_on_request() {
        let mut printer = ConsolePrinter::new(Vec::new(), true, true);

        let flow = ConsoleObserver::new(&mut printer, || false)
            .on_iteration(&record(0, 1, true))
            .unwrap();
        assert!(flow.is_continue());

        let flow = ConsoleObserver::new(&mut printer, || true)
            .on_iteration(&record(1, 1, true))
            .unwrap();
        assert!(flow.is_break());

        // The iteration is still printed before stopping
        assert!(text(printer).contains("0001"));
    }
}
