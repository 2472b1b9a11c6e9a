//! # Request Session
//!
//! Framing loop around the dispatcher.
//!
//! ```text
//! host                              node
//!  begin <seq> <op> <params>  ──>
//!                             <──   ack_begin <seq>
//!  ... operation body (chunked data, acks, status lines) ...
//!  end <seq>                  ──>
//!                             <──   ack_end <seq>
//! ```
//!
//! Any failure is reported as one `<prefix>: <message>` line. What happens next
//! depends on [`FailurePolicy`]:
//! - `halt`: the session returns the error and the caller stops serving
//! - `continue`: input is discarded up to and including the failed request's
//!   `end` line, then the next request is served

use tracing::{debug, error, info, warn};

use edgeset_core::config::FailurePolicy;
use edgeset_core::error::{Error, Result};
use edgeset_storage::PersistentDevice;

use crate::command::Command;
use crate::dispatcher::Dispatcher;
use crate::protocol::{expect_line, LineChannel};

/// Counters for one served connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub completed: usize,
    pub failed: usize,
}

/// Framing progress of the request in flight, used to resynchronise after errors
#[derive(Debug, Default)]
struct InFlight {
    seq: Option<i64>,
    end_seen: bool,
}

/// `begin <seq> <name> [params...]` split into its parts
fn parse_begin(line: &str) -> Result<(i64, &str, &str)> {
    let rest = line
        .strip_prefix("begin ")
        .ok_or_else(|| Error::protocol("missing begin"))?
        .trim_start();

    let (seq, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let seq = seq
        .parse()
        .map_err(|_| Error::protocol("seq_num not parsed correctly"))?;

    let rest = rest.trim_start();
    if rest.is_empty() {
        return Err(Error::protocol("command_name not parsed correctly"));
    }
    let (name, params) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Ok((seq, name, params.trim()))
}

fn parse_end(line: &str) -> Result<i64> {
    let rest = line
        .strip_prefix("end")
        .filter(|r| r.starts_with(char::is_whitespace))
        .ok_or_else(|| Error::protocol("missing end"))?;
    rest.trim()
        .parse()
        .map_err(|_| Error::protocol("seq_num not parsed correctly in end statement"))
}

pub struct Session<'a, D: PersistentDevice> {
    dispatcher: &'a mut Dispatcher<D>,
    policy: FailurePolicy,
    default_chunk_size: usize,
}

impl<'a, D: PersistentDevice> Session<'a, D> {
    pub fn new(dispatcher: &'a mut Dispatcher<D>) -> Self {
        let protocol = &dispatcher.node().config().protocol;
        let policy = protocol.on_error;
        let default_chunk_size = protocol.default_chunk_size;
        Self {
            dispatcher,
            policy,
            default_chunk_size,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Serve requests until the peer closes the channel.
    ///
    /// Returns an error when a request fails under `halt`, or when the transport
    /// itself fails.
    pub fn serve<C: LineChannel + ?Sized>(&mut self, channel: &mut C) -> Result<SessionStats> {
        let mut stats = SessionStats::default();

        loop {
            let line = match channel.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) if e.is_transport_failure() => return Err(e),
                Err(e) => {
                    self.fail(channel, e, &InFlight::default(), &mut stats)?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let mut in_flight = InFlight::default();
            match self.handle_request(&line, channel, &mut in_flight) {
                Ok(()) => stats.completed += 1,
                Err(e) if e.is_transport_failure() => return Err(e),
                Err(e) => self.fail(channel, e, &in_flight, &mut stats)?,
            }
        }

        info!(
            "Session closed: {} requests completed, {} failed",
            stats.completed, stats.failed
        );
        Ok(stats)
    }

    /// Report `e` to the host, then halt or resynchronise
    fn fail<C: LineChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        e: Error,
        in_flight: &InFlight,
        stats: &mut SessionStats,
    ) -> Result<()> {
        stats.failed += 1;
        error!(code = e.error_code(), "request failed: {}", e);
        channel.write_line(&e.wire_line())?;

        match self.policy {
            FailurePolicy::Halt => Err(e),
            FailurePolicy::Continue => self.resync(channel, in_flight),
        }
    }

    fn handle_request<C: LineChannel + ?Sized>(
        &mut self,
        line: &str,
        channel: &mut C,
        in_flight: &mut InFlight,
    ) -> Result<()> {
        let (seq, name, params) = parse_begin(line)?;
        in_flight.seq = Some(seq);

        let command = Command::parse(name, params, self.default_chunk_size)?;
        channel.write_line(&format!("ack_begin {}", seq))?;
        debug!("Request {}: {}", seq, command.name());

        self.dispatcher.execute(&command, channel)?;

        let end = expect_line(channel, "end")?;
        in_flight.end_seen = true;
        let end_seq = parse_end(&end)?;
        if end_seq != seq {
            return Err(Error::protocol(
                "seq_num not matching seq_number from begin statement",
            ));
        }

        channel.write_line(&format!("ack_end {}", seq))
    }

    /// Drop input through the `end` line of the failed request
    fn resync<C: LineChannel + ?Sized>(&mut self, channel: &mut C, in_flight: &InFlight) -> Result<()> {
        let seq = match (in_flight.seq, in_flight.end_seen) {
            (Some(seq), false) => seq,
            _ => return Ok(()),
        };

        let mut dropped = 0usize;
        loop {
            let line = match channel.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) if e.is_transport_failure() => return Err(e),
                Err(_) => {
                    dropped += 1;
                    continue;
                }
            };
            if parse_end(&line).ok() == Some(seq) {
                warn!("Resynchronised after request {} ({} lines dropped)", seq, dropped);
                return Ok(());
            }
            dropped += 1;
        }
        warn!("Channel closed while resynchronising after request {}", seq);
        Ok(())
    }
}
