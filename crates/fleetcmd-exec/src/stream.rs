//! Line-buffered, prefix-tagging output stream

use std::io::{self, Write};

use crate::result::OutputBuffer;

/// Where a stream sends its prefixed console copy
#[derive(Debug, Clone, Default)]
pub enum Sink {
    /// Process stdout
    #[default]
    Stdout,
    /// Process stderr
    Stderr,
    /// In-memory buffer, mostly for tests and embedding
    Buffer(OutputBuffer),
    /// Drop everything
    Discard,
}

impl Sink {
    /// Open a writer for this sink
    #[must_use]
    pub fn open(&self) -> Box<dyn Write + Send> {
        match self {
            Sink::Stdout => Box::new(io::stdout()),
            Sink::Stderr => Box::new(io::stderr()),
            Sink::Buffer(buffer) => Box::new(buffer.clone()),
            Sink::Discard => Box::new(io::sink()),
        }
    }
}

/// Writer that forwards complete lines to a sink with a prefix
///
/// Incomplete trailing data is held back until more bytes arrive or the
/// stream is closed. When recording is enabled the unprefixed text is kept in
/// an [`OutputBuffer`] for later inspection.
pub struct PrefixedStream {
    sink: Box<dyn Write + Send>,
    prefix: String,
    pending: Vec<u8>,
    record: bool,
    recorded: OutputBuffer,
}

impl PrefixedStream {
    pub fn new(sink: Box<dyn Write + Send>, prefix: impl Into<String>, record: bool) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
            pending: Vec::new(),
            record,
            recorded: OutputBuffer::new(),
        }
    }

    /// Handle to the recorded, unprefixed output
    #[must_use]
    pub fn get(&self) -> OutputBuffer {
        self.recorded.clone()
    }

    /// Reset the recorded output
    pub fn clear_recorded(&self) {
        self.recorded.clear();
    }

    /// Emit any buffered fragment, even without a trailing newline
    ///
    /// # Errors
    /// Returns the sink's write error
    pub fn close(&mut self) -> io::Result<()> {
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest)?;
        self.sink.flush()
    }

    fn emit(&mut self, text: &[u8]) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        if self.record {
            self.recorded.append(text);
        }

        let mut line = Vec::with_capacity(self.prefix.len() + text.len() + 1);
        line.extend_from_slice(self.prefix.as_bytes());
        line.extend_from_slice(text);
        if !text.ends_with(b"\n") {
            line.push(b'\n');
        }

        // one write per line keeps concurrent hosts from interleaving mid-line
        self.sink.write_all(&line)
    }
}

impl Write for PrefixedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl std::fmt::Debug for PrefixedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedStream")
            .field("prefix", &self.prefix)
            .field("pending", &self.pending.len())
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
