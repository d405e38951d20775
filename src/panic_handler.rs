//! Crash reports for the agent.
//!
//! A panic writes a report to stderr and appends it to
//! `<data_dir>/crash.log`. Once the agent is running the report also says
//! which bus and name it served and which caller ids were recording, since
//! those are the recordings a crash leaves unfinished.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};

use crate::config::{BusConfig, Config};
use crate::context::AgentContext;

const RULE: &str =
    "================================================================================";

/// What the agent was serving, captured for crash reports.
struct AgentSnapshot {
    bus: String,
    context: Weak<AgentContext>,
}

static AGENT: OnceLock<AgentSnapshot> = OnceLock::new();

/// Install the panic hook. Call before anything else in `main`.
pub fn install() {
    if std::env::var("RUST_BACKTRACE").is_err() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    panic::set_hook(Box::new(|info| {
        let report = CrashReport::from_panic(info);
        eprintln!("{}", report);
        if let Some(path) = append_report(&report) {
            eprintln!("\nCrash report appended to: {}", path.display());
        }
    }));
}

/// Include `bus` and the recordings of `context` in later crash reports.
///
/// Only the first call per process takes effect.
pub fn watch_agent(bus: &BusConfig, context: &Arc<AgentContext>) {
    let _ = AGENT.set(AgentSnapshot {
        bus: format!("{} ({} bus)", bus.name, bus.kind),
        context: Arc::downgrade(context),
    });
}

fn crash_report_path() -> Option<PathBuf> {
    Config::data_dir().ok().map(|dir| dir.join("crash.log"))
}

fn append_report(report: &CrashReport) -> Option<PathBuf> {
    let path = crash_report_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    writeln!(file, "\n{}", report).ok()?;
    file.flush().ok()?;
    Some(path)
}

/// A formatted crash report.
struct CrashReport {
    time: String,
    thread: String,
    location: String,
    message: String,
    bus: Option<String>,
    /// `None` when the recorder could not be inspected
    recordings: Option<Vec<String>>,
    backtrace: String,
}

impl CrashReport {
    fn from_panic(info: &PanicHookInfo) -> Self {
        let thread = std::thread::current();
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = match info.payload().downcast_ref::<&str>() {
            Some(s) => s.to_string(),
            None => info
                .payload()
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "Box<dyn Any>".to_string()),
        };

        let agent = AGENT.get();
        let recordings = agent
            .and_then(|agent| agent.context.upgrade())
            .and_then(|context| context.recorder().recording_ids());

        Self {
            time: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
            thread: format!(
                "{} ({:?})",
                thread.name().unwrap_or("<unnamed>"),
                thread.id()
            ),
            location,
            message,
            bus: agent.map(|agent| agent.bus.clone()),
            recordings,
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "HWANGSAE-AGENT CRASH REPORT")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Version:    {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(f, "Time:       {}", self.time)?;
        writeln!(f, "Thread:     {}", self.thread)?;
        writeln!(f, "Location:   {}", self.location)?;
        writeln!(f, "Message:    {}", self.message)?;

        match &self.bus {
            Some(bus) => writeln!(f, "Bus:        {}", bus)?,
            None => writeln!(f, "Bus:        not connected")?,
        }
        match &self.recordings {
            Some(ids) if ids.is_empty() => writeln!(f, "Recordings: none")?,
            Some(ids) => writeln!(f, "Recordings: {}", ids.join(", "))?,
            None => writeln!(f, "Recordings: unknown")?,
        }

        writeln!(f, "\nBacktrace:\n{}", self.backtrace)?;
        writeln!(f, "{}", RULE)
    }
}
