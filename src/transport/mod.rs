//! Transport wiring between a session and a tracker.
//!
//! A [`Session`] works over any `Read`/`Write` pair. This module provides
//! the pieces that connect it to a real tracker:
//! - **process**: spawn the tracker with piped stdio
//! - **tee**: copy the raw protocol bytes into a log
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   TeeWriter    ┌──────────────┐
//! │              │ ─────────────> │ stdin        │
//! │   Session    │                │   Tracker    │
//! │              │ <───────────── │ stdout       │
//! └──────────────┘   TeeReader    └──────────────┘
//!                        │
//!                        v
//!                    LogSink (file or stderr)
//! ```

mod process;
mod tee;

pub use process::TrackerProcess;
pub use tee::{sink, LogMode, LogSink, TeeReader, TeeWriter};

use std::fs::File;
use std::io::{Read, Write};
use std::process::{ChildStdin, ChildStdout, ExitStatus};
use std::time::Duration;

use crate::config::{Config, LoggingConfig};
use crate::error::{Result, TraxError};
use crate::protocol::Session;

/// Time a tracker gets to exit on its own after QUIT
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Session over a spawned tracker's pipes
pub type ProcessSession = Session<TeeReader<ChildStdout>, TeeWriter<ChildStdin>>;

/// Open the protocol log destination, `None` when logging is off.
pub fn open_log(config: &LoggingConfig) -> Result<Option<LogSink>> {
    if config.mode == LogMode::None {
        return Ok(None);
    }

    let sink = match config.file {
        Some(ref path) => {
            let file = File::create(path).map_err(|e| {
                TraxError::Config(format!(
                    "Failed to open protocol log {}: {}",
                    path.display(),
                    e
                ))
            })?;
            tee::sink(file)
        },
        None => tee::sink(std::io::stderr()),
    };
    Ok(Some(sink))
}

/// Wrap a stream pair with the tee adapters selected by `mode`.
pub fn wrap<R: Read, W: Write>(
    reader: R,
    writer: W,
    mode: LogMode,
    log: Option<&LogSink>,
) -> (TeeReader<R>, TeeWriter<W>) {
    let incoming = log.filter(|_| mode.logs_incoming()).cloned();
    let outgoing = log.filter(|_| mode.logs_outgoing()).cloned();
    (TeeReader::new(reader, incoming), TeeWriter::new(writer, outgoing))
}

/// Spawn the configured tracker and complete the handshake with it.
///
/// The process handle must outlive the session; dropping it kills the
/// tracker. End the session with [`finish_session`] instead.
pub fn spawn_session(config: &Config) -> Result<(TrackerProcess, ProcessSession)> {
    let log = open_log(&config.logging)?;
    let (process, stdout, stdin) = TrackerProcess::spawn(&config.tracker)?;
    let (reader, writer) = wrap(stdout, stdin, config.logging.mode, log.as_ref());
    let session = Session::connect(reader, writer)?;
    Ok((process, session))
}

/// Send QUIT, close the tracker's stdin and wait for it to exit.
///
/// The tracker is killed only if it is still running after `grace`.
/// Returns its exit status, or `None` when it had to be killed.
pub fn finish_session(
    mut process: TrackerProcess,
    mut session: ProcessSession,
    grace: Duration,
) -> Result<Option<ExitStatus>> {
    session.quit();
    drop(session);
    process.shutdown(grace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_open_log_off() {
        assert!(open_log(&LoggingConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_open_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.log");
        let config = LoggingConfig {
            mode: LogMode::All,
            file: Some(path.clone()),
        };

        let log = open_log(&config).unwrap().unwrap();
        let (_, mut writer) = wrap(Cursor::new(Vec::new()), Vec::new(), config.mode, Some(&log));
        writer.write_all(b"@@TRAX:quit \n").unwrap();
        drop(writer);
        drop(log);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "@@TRAX:quit \n");
    }

    #[test]
    fn test_wrap_respects_mode() {
        let buffer = Arc::new(Mutex::new(Vec::new()));

        struct Capture(Arc<Mutex<Vec<u8>>>);
        impl Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let log = sink(Capture(buffer.clone()));
        let (mut reader, mut writer) = wrap(
            Cursor::new(b"in".to_vec()),
            Vec::new(),
            LogMode::Outgoing,
            Some(&log),
        );

        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        writer.write_all(b"out").unwrap();

        assert_eq!(buffer.lock().unwrap().as_slice(), b"out");
    }
}
