//! # Line Protocol
//!
//! Everything on the wire is a text line terminated by `\r\n`.
//!
//! ## Chunked transfer
//!
//! ```text
//! device -> host (output)              host -> device (input)
//!
//!   "v0 v1 v2 v3 v4"                     "v0 v1 v2 v3 v4"
//!   <- "5"        (cumulative)           -> echo of the line
//!   "v5 v6 v7 v8 v9"                     "v5 v6 v7 v8 v9"
//!   <- "10"                              -> echo
//!   "v10 v11"                            "v10 v11"
//!   <- "12"                              -> echo
//! ```
//!
//! An acknowledgment may be the bare count or `ack <count>`. A count that does not
//! match what has been sent so far is a protocol error.
//!
//! Echoed input is the received line exactly as sent, padding included, minus
//! its terminator.

use std::fmt::Display;
use std::io::{BufRead, Read, Write};

use tracing::trace;

use edgeset_core::error::{Error, Result};
use edgeset_core::utils::try_with_capacity;

/// Longest accepted input line, terminator included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Line-oriented request/response transport
pub trait LineChannel {
    /// Next line with surrounding whitespace removed, `None` once the peer has closed.
    ///
    /// A line that is too long or not UTF-8 is consumed and reported as a
    /// protocol error; the channel stays usable.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Send one line; the terminator is added by the channel
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Send back the last line read, untrimmed
    fn echo_last(&mut self) -> Result<()>;
}

impl<C: LineChannel + ?Sized> LineChannel for &mut C {
    fn read_line(&mut self) -> Result<Option<String>> {
        (**self).read_line()
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn echo_last(&mut self) -> Result<()> {
        (**self).echo_last()
    }
}

/// [`LineChannel`] over any buffered reader and writer (stdio, TCP, in-memory)
pub struct StreamChannel<R, W> {
    reader: R,
    writer: W,
    raw: Vec<u8>,
    max_line_len: usize,
}

impl<R: BufRead, W: Write> StreamChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            raw: Vec::new(),
            max_line_len: MAX_LINE_LEN,
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> StreamChannel<R, W> {
    /// Skip input through the next newline
    fn discard_rest_of_line(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> LineChannel for StreamChannel<R, W> {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.raw.clear();
        let limit = self.max_line_len as u64;
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut self.raw)?;
        if read == 0 {
            return Ok(None);
        }

        if !self.raw.ends_with(b"\n") && read as u64 == limit {
            self.discard_rest_of_line()?;
            self.raw.clear();
            return Err(Error::protocol(format!(
                "line longer than {} bytes",
                self.max_line_len
            )));
        }

        while matches!(self.raw.last(), Some(b'\n' | b'\r')) {
            self.raw.pop();
        }
        let line = match std::str::from_utf8(&self.raw) {
            Ok(text) => text.trim().to_string(),
            Err(_) => {
                self.raw.clear();
                return Err(Error::protocol("line is not valid UTF-8"));
            }
        };
        trace!("<- {}", line);
        Ok(Some(line))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        trace!("-> {}", line);
        self.write_raw(line.as_bytes())
    }

    fn echo_last(&mut self) -> Result<()> {
        let raw = std::mem::take(&mut self.raw);
        let result = self.write_raw(&raw);
        self.raw = raw;
        result
    }
}

/// Read a line that must be there; end of input is a protocol error
pub fn expect_line<C: LineChannel + ?Sized>(channel: &mut C, waiting_for: &str) -> Result<String> {
    channel
        .read_line()?
        .ok_or_else(|| Error::protocol(format!("connection closed while waiting for {}", waiting_for)))
}

/// Parse an acknowledgment line: `12` or `ack 12`
pub fn parse_ack(line: &str) -> Result<usize> {
    let count = line.strip_prefix("ack").unwrap_or(line).trim();
    count
        .parse()
        .map_err(|_| Error::protocol(format!("ack_num not parsed correctly: '{}'", line)))
}

/// Send `values` as lines of `chunk_size`, waiting for a cumulative ack after each
pub fn send_chunked<C, T>(channel: &mut C, values: &[T], chunk_size: usize) -> Result<()>
where
    C: LineChannel + ?Sized,
    T: Display,
{
    if chunk_size == 0 {
        return Err(Error::protocol("chunk size must be at least 1"));
    }

    let mut sent = 0;
    let mut line = String::new();
    for chunk in values.chunks(chunk_size) {
        line.clear();
        for (i, value) in chunk.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&value.to_string());
        }
        channel.write_line(&line)?;
        sent += chunk.len();

        let ack = expect_line(channel, "ack")?;
        let acked = parse_ack(&ack)?;
        if acked != sent {
            return Err(Error::protocol(format!(
                "ack_num mismatch: expected {}, got {}",
                sent, acked
            )));
        }
    }
    Ok(())
}

/// Receive exactly `len` byte values sent `chunk_size` per line (last line may be short)
pub fn recv_chunked<C: LineChannel + ?Sized>(
    channel: &mut C,
    len: usize,
    chunk_size: usize,
    echo: bool,
) -> Result<Vec<u8>> {
    if chunk_size == 0 {
        return Err(Error::protocol("chunk size must be at least 1"));
    }

    let mut values = try_with_capacity(len, "recv_buffer")?;
    while values.len() < len {
        let want = chunk_size.min(len - values.len());
        let line = expect_line(channel, "data line")?;
        if echo {
            channel.echo_last()?;
        }

        let before = values.len();
        for token in line.split_whitespace() {
            let value: u8 = token.parse().map_err(|_| {
                Error::protocol(format!("value '{}' is not a byte (line '{}')", token, line))
            })?;
            values.push(value);
            if values.len() - before > want {
                break;
            }
        }

        let got = values.len() - before;
        if got != want {
            return Err(Error::protocol(format!(
                "expected {} values on line, got {}{}",
                want,
                got,
                if got > want { " or more" } else { "" }
            )));
        }
    }
    Ok(values)
}
