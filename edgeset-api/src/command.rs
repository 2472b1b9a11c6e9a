//! Host operations and their parameter parsing.
//!
//! Parameters are whitespace separated (commas are accepted as separators too).
//! Every operation also answers to the name older host scripts use, e.g.
//! `write_ram_buffer` for `write-volatile-record`.

use std::fmt;
use std::str::FromStr;

use edgeset_core::error::{Error, Result};
use edgeset_core::{ExampleIndex, SelectionMode};

/// Where a persistent-tier request points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistentTarget {
    /// Slot number within the persistent tier (0 is the first persistent example)
    Slot(usize),
    /// Raw device address of a record's first byte, given as `0x...`
    Address(u32),
}

impl fmt::Display for PersistentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistentTarget::Slot(slot) => write!(f, "slot {}", slot),
            PersistentTarget::Address(addr) => write!(f, "address {:#010x}", addr),
        }
    }
}

/// One parsed host request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WriteVolatile { index: ExampleIndex, chunk_size: usize },
    ReadVolatile { index: ExampleIndex, chunk_size: usize },
    WritePersistent { target: PersistentTarget, chunk_size: usize },
    ReadPersistent { target: PersistentTarget, chunk_size: usize },
    ReadLabels { chunk_size: usize },
    ComputeDistances,
    ReadDistances { chunk_size: usize },
    SelectSubset { mode: SelectionMode, chunk_size: usize },
    Reseed { seed: u64 },
}

/// Operation names as the host sends them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    WriteVolatile,
    ReadVolatile,
    WritePersistent,
    ReadPersistent,
    ReadLabels,
    ComputeDistances,
    ReadDistances,
    SelectSubset,
    Reseed,
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let op = match name {
            "write-volatile-record" | "write_ram_buffer" => Operation::WriteVolatile,
            "read-volatile-record" | "read_ram_buffer" => Operation::ReadVolatile,
            "write-persistent-record" | "write_eeprom" => Operation::WritePersistent,
            "read-persistent-record" | "read_eeprom" => Operation::ReadPersistent,
            "read-labels" | "read_labels_buffer" => Operation::ReadLabels,
            "compute-distance-matrix" | "compute_dist_matrix" => Operation::ComputeDistances,
            "read-distance-matrix" | "read_dist_matrix" => Operation::ReadDistances,
            "select-subset" | "rand_subset_selection" => Operation::SelectSubset,
            "reseed" | "set_random_seed" => Operation::Reseed,
            other => {
                return Err(Error::UnknownOperation {
                    name: other.to_string(),
                })
            }
        };
        Ok(op)
    }
}

/// Cursor over one request's parameter tokens
struct Params<'a> {
    operation: &'a str,
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Params<'a> {
    fn new(operation: &'a str, params: &'a str) -> Self {
        let tokens = params
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            operation,
            tokens,
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::param(self.operation, message)
    }

    fn next_token(&mut self, what: &str) -> Result<&'a str> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(format!("missing {}", what)))?;
        self.pos += 1;
        Ok(token)
    }

    fn parse_next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {} '{}'", what, token)))
    }

    fn chunk_size(&mut self, default: usize) -> Result<usize> {
        let size = if self.pos < self.tokens.len() {
            self.parse_next("chunk size")?
        } else {
            default
        };
        if size == 0 {
            return Err(self.error("chunk size must be at least 1"));
        }
        Ok(size)
    }

    fn persistent_target(&mut self) -> Result<PersistentTarget> {
        let token = self.next_token("example number or address")?;
        match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16)
                .map(PersistentTarget::Address)
                .map_err(|_| self.error(format!("invalid address '{}'", token))),
            None => token
                .parse()
                .map(PersistentTarget::Slot)
                .map_err(|_| self.error(format!("invalid example number '{}'", token))),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.tokens.get(self.pos) {
            Some(extra) => Err(self.error(format!("unexpected parameter '{}'", extra))),
            None => Ok(()),
        }
    }
}

impl Command {
    /// Parse an operation name and its parameter string.
    ///
    /// `default_chunk_size` applies when a request leaves the chunk size out.
    pub fn parse(name: &str, params: &str, default_chunk_size: usize) -> Result<Self> {
        let op: Operation = name.parse()?;
        let mut p = Params::new(name, params);

        let command = match op {
            Operation::WriteVolatile => Command::WriteVolatile {
                index: p.parse_next("example number")?,
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::ReadVolatile => Command::ReadVolatile {
                index: p.parse_next("example number")?,
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::WritePersistent => Command::WritePersistent {
                target: p.persistent_target()?,
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::ReadPersistent => Command::ReadPersistent {
                target: p.persistent_target()?,
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::ReadLabels => Command::ReadLabels {
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::ComputeDistances => Command::ComputeDistances,
            Operation::ReadDistances => Command::ReadDistances {
                chunk_size: p.chunk_size(default_chunk_size)?,
            },
            Operation::SelectSubset => {
                let token = p.next_token("selection mode")?;
                let mode = token
                    .parse::<SelectionMode>()
                    .map_err(|_| p.error(format!("unknown selection mode '{}'", token)))?;
                Command::SelectSubset {
                    mode,
                    chunk_size: p.chunk_size(default_chunk_size)?,
                }
            }
            Operation::Reseed => Command::Reseed {
                seed: p.parse_next("seed")?,
            },
        };

        p.finish()?;
        Ok(command)
    }

    /// Canonical operation name
    pub fn name(&self) -> &'static str {
        match self {
            Command::WriteVolatile { .. } => "write-volatile-record",
            Command::ReadVolatile { .. } => "read-volatile-record",
            Command::WritePersistent { .. } => "write-persistent-record",
            Command::ReadPersistent { .. } => "read-persistent-record",
            Command::ReadLabels { .. } => "read-labels",
            Command::ComputeDistances => "compute-distance-matrix",
            Command::ReadDistances { .. } => "read-distance-matrix",
            Command::SelectSubset { .. } => "select-subset",
            Command::Reseed { .. } => "reseed",
        }
    }
}
