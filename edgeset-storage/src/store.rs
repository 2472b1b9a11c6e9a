//! # Tiered Example Store
//!
//! Owns the example records of both tiers and hides where they live.
//!
//! ## Write Path
//!
//! ```text
//! volatile:    record ──> slot copy
//!
//! persistent:  read whole sector ──> scratch buffer
//!              erase sector
//!              patch record bytes inside scratch
//!              write whole scratch back
//! ```
//!
//! Erasing destroys the full sector, so the other records sharing it are carried
//! through the scratch buffer. A device failure part-way through leaves the sector
//! in an undefined state; the error is reported and nothing is retried.

use tracing::{debug, trace};

use edgeset_core::error::{Error, Result, ResultExt};
use edgeset_core::utils::try_alloc;
use edgeset_core::{ExampleIndex, GeometryConfig, Location};

use crate::device::PersistentDevice;
use crate::layout::locate;

/// Example records split across a RAM array and an erase-sector device
pub struct ExampleStore<D: PersistentDevice> {
    geometry: GeometryConfig,
    /// `volatile_capacity` records, back to back
    volatile: Vec<u8>,
    device: D,
    /// One sector, reused by every persistent write
    sector_buf: Vec<u8>,
}

impl<D: PersistentDevice> ExampleStore<D> {
    /// Create a store over `device`. Volatile slots start zeroed.
    pub fn new(geometry: GeometryConfig, device: D) -> Result<Self> {
        geometry.validate()?;

        if device.sector_size() != geometry.sector_size {
            return Err(Error::Configuration {
                message: format!(
                    "device sector size {} differs from geometry sector size {}",
                    device.sector_size(),
                    geometry.sector_size
                ),
            });
        }
        if device.base_address() != geometry.base_address {
            return Err(Error::Configuration {
                message: format!(
                    "device base {:#010x} differs from geometry base {:#010x}",
                    device.base_address(),
                    geometry.base_address
                ),
            });
        }
        if device.capacity() < geometry.persistent_span() {
            return Err(Error::Configuration {
                message: format!(
                    "device holds {} bytes, persistent tier needs {}",
                    device.capacity(),
                    geometry.persistent_span()
                ),
            });
        }

        let volatile = try_alloc(
            geometry.volatile_capacity * geometry.record_size(),
            0u8,
            "ram_buffer",
        )?;
        let sector_buf = try_alloc(geometry.sector_size, 0u8, "eeprom_sector_buffer")?;

        debug!(
            "ExampleStore: {} volatile + {} persistent records of {} bytes ({} per sector)",
            geometry.volatile_capacity,
            geometry.persistent_capacity,
            geometry.record_size(),
            geometry.examples_per_sector()
        );

        Ok(Self {
            geometry,
            volatile,
            device,
            sector_buf,
        })
    }

    pub fn geometry(&self) -> &GeometryConfig {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.geometry.total_examples()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_size(&self) -> usize {
        self.geometry.record_size()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Borrow a volatile record without copying
    pub fn volatile_record(&self, slot: usize) -> Result<&[u8]> {
        if slot >= self.geometry.volatile_capacity {
            return Err(Error::range(format!(
                "volatile slot {} out of range (capacity {})",
                slot, self.geometry.volatile_capacity
            )));
        }
        let size = self.record_size();
        Ok(&self.volatile[slot * size..(slot + 1) * size])
    }

    /// Read a full record (features + label)
    pub fn read_record(&mut self, idx: ExampleIndex) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.record_size()];
        self.read_record_into(idx, &mut buf)?;
        Ok(buf)
    }

    /// Read a full record into `buf`, which must be exactly one record long
    pub fn read_record_into(&mut self, idx: ExampleIndex, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.record_size() {
            return Err(Error::range(format!(
                "record buffer is {} bytes, records are {}",
                buf.len(),
                self.record_size()
            )));
        }
        self.read_span(idx, 0, buf)
    }

    /// Read only the feature bytes of a record
    pub fn read_features_into(&mut self, idx: ExampleIndex, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.geometry.feature_len {
            return Err(Error::range(format!(
                "feature buffer is {} bytes, features are {}",
                buf.len(),
                self.geometry.feature_len
            )));
        }
        self.read_span(idx, 0, buf)
    }

    /// Read one byte of a record; `offset == feature_len` is the label
    pub fn read_byte(&mut self, idx: ExampleIndex, offset: usize) -> Result<u8> {
        if offset >= self.record_size() {
            return Err(Error::range(format!(
                "byte offset {} out of range (record size {})",
                offset,
                self.record_size()
            )));
        }
        let mut byte = [0u8; 1];
        self.read_span(idx, offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Read the label byte of a record
    pub fn read_label(&mut self, idx: ExampleIndex) -> Result<u8> {
        let offset = self.geometry.feature_len;
        self.read_byte(idx, offset)
    }

    fn read_span(&mut self, idx: ExampleIndex, offset: usize, buf: &mut [u8]) -> Result<()> {
        match locate(&self.geometry, idx)? {
            Location::Volatile { slot } => {
                let start = slot * self.record_size() + offset;
                buf.copy_from_slice(&self.volatile[start..start + buf.len()]);
                Ok(())
            }
            Location::Persistent { sector_address, byte_offset, .. } => {
                let address = sector_address + (byte_offset + offset) as u32;
                self.device
                    .read(address, buf)
                    .with_context(|| format!("reading example {}", idx))
            }
        }
    }

    /// Overwrite a full record
    pub fn write_record(&mut self, idx: ExampleIndex, record: &[u8]) -> Result<()> {
        if record.len() != self.record_size() {
            return Err(Error::range(format!(
                "record is {} bytes, expected {}",
                record.len(),
                self.record_size()
            )));
        }

        match locate(&self.geometry, idx)? {
            Location::Volatile { slot } => {
                let size = self.record_size();
                self.volatile[slot * size..(slot + 1) * size].copy_from_slice(record);
                trace!("wrote volatile slot {}", slot);
                Ok(())
            }
            Location::Persistent { sector, sector_address, byte_offset } => {
                self.device
                    .read(sector_address, &mut self.sector_buf)
                    .with_context(|| format!("reading sector {}", sector))?;
                self.device
                    .erase_sector(sector_address)
                    .with_context(|| format!("erasing sector {}", sector))?;
                self.sector_buf[byte_offset..byte_offset + record.len()].copy_from_slice(record);
                self.device
                    .write(sector_address, &self.sector_buf)
                    .with_context(|| format!("writing sector {}", sector))?;
                trace!(
                    "rewrote sector {} ({:#010x}) for example {}",
                    sector, sector_address, idx
                );
                Ok(())
            }
        }
    }

    /// Flush the persistent device
    pub fn sync(&mut self) -> Result<()> {
        self.device.sync()
    }
}
