//! # Persistent Tier Device
//!
//! The persistent tier sits on an erase-sector device (SPI NOR flash on the
//! reference board). The store only needs four primitives: read, sector erase,
//! write, and the geometry to address them.
//!
//! NOR semantics are modelled faithfully by [`MemoryFlash`]:
//! - erase sets every byte of a sector to `0xFF`
//! - write can only clear bits (`cell &= byte`)
//!
//! so a write that skips the erase corrupts the record exactly like the real part.

use tracing::{debug, trace};

use edgeset_core::error::{Error, Result};

/// Value of an erased byte
pub const ERASED_BYTE: u8 = 0xFF;

/// Block device backing the persistent tier
pub trait PersistentDevice {
    /// Erase granularity in bytes
    fn sector_size(&self) -> usize;

    /// Device address of the first sector
    fn base_address(&self) -> u32;

    /// Addressable bytes starting at `base_address`
    fn capacity(&self) -> usize;

    /// Read `buf.len()` bytes starting at `address`
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()>;

    /// Erase the sector starting at `sector_address`
    fn erase_sector(&mut self, sector_address: u32) -> Result<()>;

    /// Program `data` starting at `address`
    fn write(&mut self, address: u32, data: &[u8]) -> Result<()>;

    /// Flush buffered writes to the backing medium
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: PersistentDevice + ?Sized> PersistentDevice for Box<D> {
    fn sector_size(&self) -> usize {
        (**self).sector_size()
    }

    fn base_address(&self) -> u32 {
        (**self).base_address()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(address, buf)
    }

    fn erase_sector(&mut self, sector_address: u32) -> Result<()> {
        (**self).erase_sector(sector_address)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}

/// Translate a device address range into an offset into a flat byte image
pub(crate) fn image_offset(
    base_address: u32,
    capacity: usize,
    address: u32,
    len: usize,
) -> Result<usize> {
    let offset = address
        .checked_sub(base_address)
        .ok_or_else(|| Error::device(format!("address {:#010x} below device base {:#010x}", address, base_address)))?
        as usize;
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(offset),
        _ => Err(Error::device(format!(
            "access of {} bytes at {:#010x} exceeds device capacity",
            len, address
        ))),
    }
}

/// Check that `address` is the first byte of a sector
pub(crate) fn sector_offset(
    base_address: u32,
    capacity: usize,
    sector_size: usize,
    sector_address: u32,
) -> Result<usize> {
    let offset = image_offset(base_address, capacity, sector_address, sector_size)?;
    if offset % sector_size != 0 {
        return Err(Error::device(format!(
            "erase address {:#010x} is not sector aligned",
            sector_address
        )));
    }
    Ok(offset)
}

/// In-memory NOR flash
pub struct MemoryFlash {
    base_address: u32,
    sector_size: usize,
    data: Vec<u8>,
    erase_counts: Vec<u32>,
    write_protected: bool,
}

impl MemoryFlash {
    /// Create a fully erased device of `sector_count` sectors
    pub fn new(base_address: u32, sector_size: usize, sector_count: usize) -> Self {
        debug!(
            "MemoryFlash: base={:#010x}, sector_size={}, sectors={}",
            base_address, sector_size, sector_count
        );
        Self {
            base_address,
            sector_size,
            data: vec![ERASED_BYTE; sector_size * sector_count],
            erase_counts: vec![0; sector_count],
            write_protected: false,
        }
    }

    /// Sized to hold the persistent tier described by `geometry`
    pub fn for_geometry(geometry: &edgeset_core::GeometryConfig) -> Self {
        Self::new(geometry.base_address, geometry.sector_size, geometry.sector_count())
    }

    /// Reject every erase and write, e.g. to exercise device-failure paths
    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Times each sector has been erased
    pub fn erase_counts(&self) -> &[u32] {
        &self.erase_counts
    }

    pub fn total_erases(&self) -> u64 {
        self.erase_counts.iter().map(|&c| c as u64).sum()
    }

    fn check_writable(&self, op: &str, address: u32) -> Result<()> {
        if self.write_protected {
            return Err(Error::device(format!(
                "{} at {:#010x} rejected: device is write protected",
                op, address
            )));
        }
        Ok(())
    }
}

impl PersistentDevice for MemoryFlash {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn base_address(&self) -> u32 {
        self.base_address
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let offset = image_offset(self.base_address, self.data.len(), address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        trace!("flash read {} bytes at {:#010x}", buf.len(), address);
        Ok(())
    }

    fn erase_sector(&mut self, sector_address: u32) -> Result<()> {
        self.check_writable("erase", sector_address)?;
        let offset = sector_offset(self.base_address, self.data.len(), self.sector_size, sector_address)?;
        self.data[offset..offset + self.sector_size].fill(ERASED_BYTE);
        self.erase_counts[offset / self.sector_size] += 1;
        trace!("flash erase sector at {:#010x}", sector_address);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.check_writable("write", address)?;
        let offset = image_offset(self.base_address, self.data.len(), address, data.len())?;
        for (cell, &byte) in self.data[offset..offset + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        trace!("flash write {} bytes at {:#010x}", data.len(), address);
        Ok(())
    }
}
