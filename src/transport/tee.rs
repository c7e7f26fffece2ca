//! Protocol log tee.
//!
//! Copies the raw bytes flowing to and from the tracker into a shared log
//! sink without altering the stream itself.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Shared destination of the protocol log
pub type LogSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Which direction of the tracker stream to log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// Nothing is logged
    #[default]
    None,
    /// Bytes read from the tracker
    Incoming,
    /// Bytes written to the tracker
    Outgoing,
    /// Both directions
    All,
}

impl LogMode {
    /// Get mode name
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::All => "all",
        }
    }

    /// Whether tracker output is copied
    pub fn logs_incoming(&self) -> bool {
        matches!(self, Self::Incoming | Self::All)
    }

    /// Whether tracker input is copied
    pub fn logs_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing | Self::All)
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "incoming" | "in" => Ok(Self::Incoming),
            "outgoing" | "out" => Ok(Self::Outgoing),
            "all" => Ok(Self::All),
            _ => Err(format!("Unknown log mode: {}", s)),
        }
    }
}

/// Wrap a writer as a [`LogSink`]
pub fn sink(writer: impl Write + Send + 'static) -> LogSink {
    Arc::new(Mutex::new(Box::new(writer)))
}

fn copy_to(sink: &LogSink, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    // A broken log must never break the session.
    let result = match sink.lock() {
        Ok(mut out) => out.write_all(bytes).and_then(|()| out.flush()),
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::trace!(error = %e, "protocol log write failed");
    }
}

/// Reader that copies everything it reads into a log sink
pub struct TeeReader<R> {
    inner: R,
    sink: Option<LogSink>,
}

impl<R: Read> TeeReader<R> {
    /// Wrap `inner`; with no sink the reader is a pass-through.
    pub fn new(inner: R, sink: Option<LogSink>) -> Self {
        Self { inner, sink }
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(ref sink) = self.sink {
            copy_to(sink, &buf[..n]);
        }
        Ok(n)
    }
}

impl<R> fmt::Debug for TeeReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeReader")
            .field("logging", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

/// Writer that copies everything it writes into a log sink
pub struct TeeWriter<W> {
    inner: W,
    sink: Option<LogSink>,
}

impl<W: Write> TeeWriter<W> {
    /// Wrap `inner`; with no sink the writer is a pass-through.
    pub fn new(inner: W, sink: Option<LogSink>) -> Self {
        Self { inner, sink }
    }

    /// Underlying writer
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if let Some(ref sink) = self.sink {
            copy_to(sink, &buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W> fmt::Debug for TeeWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeWriter")
            .field("logging", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_log_mode_from_str() {
        assert_eq!("ALL".parse::<LogMode>().unwrap(), LogMode::All);
        assert_eq!("incoming".parse::<LogMode>().unwrap(), LogMode::Incoming);
        assert_eq!("off".parse::<LogMode>().unwrap(), LogMode::None);
        assert!("sideways".parse::<LogMode>().is_err());
    }

    #[test]
    fn test_log_mode_directions() {
        assert!(LogMode::All.logs_incoming() && LogMode::All.logs_outgoing());
        assert!(LogMode::Incoming.logs_incoming() && !LogMode::Incoming.logs_outgoing());
        assert!(!LogMode::None.logs_incoming() && !LogMode::None.logs_outgoing());
    }

    #[test]
    fn test_tee_reader_copies() {
        let log = Shared::default();
        let mut reader = TeeReader::new(&b"@@TRAX:quit\n"[..], Some(sink(log.clone())));

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "@@TRAX:quit\n");
        assert_eq!(log.text(), "@@TRAX:quit\n");
    }

    #[test]
    fn test_tee_writer_copies() {
        let log = Shared::default();
        let mut writer = TeeWriter::new(Vec::new(), Some(sink(log.clone())));
        writer.write_all(b"@@TRAX:frame \"x\" \n").unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.get_ref().as_slice(), b"@@TRAX:frame \"x\" \n");
        assert_eq!(log.text(), "@@TRAX:frame \"x\" \n");
    }

    #[test]
    fn test_pass_through_without_sink() {
        let mut writer = TeeWriter::new(Vec::new(), None);
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.into_inner(), b"abc");
    }
}
