//! Logging utilities
//!
//! Two channels exist side by side. Internal tracing goes through the `log`
//! facade and whatever logger the host installs (normally `env_logger`). User
//! facing diagnostics (extension tables, device listings, validation messages,
//! teardown steps) go to a [`LogSink`] that is passed explicitly from the
//! platform into the session and down to each component.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default level, `RUST_LOG` still wins
pub fn init_with_level(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_env("RUST_LOG");
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Text sink for session diagnostics
///
/// Cloning shares the underlying writer. The default sink discards everything.
#[derive(Clone, Default)]
pub struct LogSink {
    writer: Option<SharedWriter>,
}

impl LogSink {
    /// Sink that discards all output
    pub fn null() -> Self {
        Self { writer: None }
    }

    /// Sink writing to standard error
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// Sink over an arbitrary writer
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self { writer: Some(Arc::new(Mutex::new(Box::new(writer)))) }
    }

    /// Stderr when `verbose` is set, otherwise the null sink
    pub fn verbose_or_null(verbose: bool) -> Self {
        if verbose {
            Self::stderr()
        } else {
            Self::null()
        }
    }

    /// Sink collecting output in memory, paired with a handle to read it back
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    /// Whether anything written here goes somewhere
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Write one line
    pub fn line(&self, args: fmt::Arguments<'_>) {
        let Some(writer) = &self.writer else {
            return;
        };
        let Ok(mut writer) = writer.lock() else {
            log::warn!("diagnostic sink poisoned, dropping line");
            return;
        };
        if let Err(e) = writer.write_fmt(args).and_then(|()| writer.write_all(b"\n")) {
            log::warn!("diagnostic sink write failed: {e}");
        }
    }

    /// Write a line as-is
    pub fn write_str(&self, text: &str) {
        self.line(format_args!("{text}"));
    }

    /// Flush the underlying writer
    pub fn flush(&self) {
        if let Some(Ok(mut writer)) = self.writer.as_ref().map(|w| w.lock()) {
            if let Err(e) = writer.flush() {
                log::warn!("diagnostic sink flush failed: {e}");
            }
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("enabled", &self.is_enabled()).finish()
    }
}

/// Write a formatted line to a [`LogSink`]
#[macro_export]
macro_rules! sink_line {
    ($sink:expr, $($arg:tt)*) => {
        $sink.line(format_args!($($arg)*))
    };
}

/// In-memory writer backing [`LogSink::capture`]
#[derive(Clone, Default)]
pub struct CapturedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Everything written so far
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "capture buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reports how long a scope took when dropped
pub struct ScopeTimer<'a> {
    sink: &'a LogSink,
    label: &'a str,
    start: Instant,
}

impl<'a> ScopeTimer<'a> {
    /// Start timing
    pub fn new(sink: &'a LogSink, label: &'a str) -> Self {
        Self { sink, label, start: Instant::now() }
    }

    /// Time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopeTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::debug!("{} took {:?}", self.label, elapsed);
        self.sink.line(format_args!("{} took {:.3} ms", self.label, elapsed.as_secs_f64() * 1000.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_discards() {
        let sink = LogSink::null();
        assert!(!sink.is_enabled());
        sink_line!(sink, "nothing {}", 1);
        sink.flush();
    }

    #[test]
    fn test_capture_shares_writer_across_clones() {
        let (sink, output) = LogSink::capture();
        let clone = sink.clone();
        sink_line!(sink, "first {}", 1);
        clone.write_str("second");
        assert_eq!(output.contents(), "first 1\nsecond\n");
    }

    #[test]
    fn test_scope_timer_reports_label() {
        let (sink, output) = LogSink::capture();
        {
            let _timer = ScopeTimer::new(&sink, "pipeline build");
        }
        let text = output.contents();
        assert!(text.starts_with("pipeline build took "));
        assert!(text.trim_end().ends_with("ms"));
    }

    #[test]
    fn test_verbose_selection() {
        assert!(LogSink::verbose_or_null(true).is_enabled());
        assert!(!LogSink::verbose_or_null(false).is_enabled());
    }
}
