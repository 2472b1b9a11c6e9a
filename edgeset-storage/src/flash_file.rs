//! # Memory-Mapped Flash Image
//!
//! A persistent device backed by a file, so the persistent tier survives process
//! restarts on a host build the way the SPI flash survives power cycles.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Flash Image (.img)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Header (64 bytes, little endian):                          │
//! │    magic: [u8; 8] = "EDGEFLSH"                              │
//! │    version: u32                                             │
//! │    sector_size: u32                                         │
//! │    sector_count: u32                                        │
//! │    base_address: u32                                        │
//! │    padding: [u8; 40]                                        │
//! │                                                             │
//! │  Sectors (sector_size bytes each, erased = 0xFF):           │
//! │    [sector 0][sector 1]...[sector n-1]                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fs::OpenOptions;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info};

use edgeset_core::error::{Error, Result};
use edgeset_core::GeometryConfig;

use crate::device::{image_offset, sector_offset, PersistentDevice, ERASED_BYTE};

const MAGIC: &[u8; 8] = b"EDGEFLSH";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 64;

/// Header for the flash image file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlashImageHeader {
    version: u32,
    sector_size: u32,
    sector_count: u32,
    base_address: u32,
}

impl FlashImageHeader {
    fn to_bytes(self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        std::io::Write::write_all(&mut cursor, MAGIC)?;
        cursor.write_u32::<LittleEndian>(self.version)?;
        cursor.write_u32::<LittleEndian>(self.sector_size)?;
        cursor.write_u32::<LittleEndian>(self.sector_count)?;
        cursor.write_u32::<LittleEndian>(self.base_address)?;
        Ok(buf)
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::device("flash image header too small"));
        }
        if &buf[0..8] != MAGIC {
            return Err(Error::device("invalid flash image magic"));
        }
        let mut cursor = Cursor::new(&buf[8..HEADER_SIZE]);
        let header = Self {
            version: cursor.read_u32::<LittleEndian>()?,
            sector_size: cursor.read_u32::<LittleEndian>()?,
            sector_count: cursor.read_u32::<LittleEndian>()?,
            base_address: cursor.read_u32::<LittleEndian>()?,
        };
        if header.version != VERSION {
            return Err(Error::device(format!(
                "unsupported flash image version: {}",
                header.version
            )));
        }
        Ok(header)
    }
}

/// File-backed NOR flash
pub struct FileFlash {
    path: PathBuf,
    header: FlashImageHeader,
    mmap: MmapMut,
}

impl FileFlash {
    /// Create or open an image sized for `geometry`.
    ///
    /// A new file is fully erased. An existing file must have been created for the
    /// same sector size, sector count and base address.
    pub fn open(path: impl AsRef<Path>, geometry: &GeometryConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let expected = FlashImageHeader {
            version: VERSION,
            sector_size: geometry.sector_size as u32,
            sector_count: geometry.sector_count() as u32,
            base_address: geometry.base_address,
        };
        let image_len = HEADER_SIZE + geometry.persistent_span();

        let exists = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::Device {
                message: format!("failed to open flash image {:?}", path),
                source: Some(e),
            })?;

        let existing_len = file
            .metadata()
            .map_err(|e| Error::Device {
                message: format!("failed to stat flash image {:?}", path),
                source: Some(e),
            })?
            .len();
        let fresh = !exists || existing_len == 0;
        if fresh {
            file.set_len(image_len as u64).map_err(|e| Error::Device {
                message: "failed to size flash image".to_string(),
                source: Some(e),
            })?;
        } else if existing_len != image_len as u64 {
            return Err(Error::device(format!(
                "flash image {:?} is {} bytes, geometry needs {}",
                path, existing_len, image_len
            )));
        }

        let mut mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|e| Error::Device {
            message: "mmap of flash image failed".to_string(),
            source: Some(e),
        })?;

        if fresh {
            mmap[..HEADER_SIZE].copy_from_slice(&expected.to_bytes()?);
            mmap[HEADER_SIZE..].fill(ERASED_BYTE);
            mmap.flush().map_err(|e| Error::Device {
                message: "failed to initialise flash image".to_string(),
                source: Some(e),
            })?;
            info!(
                "Created flash image {:?}: {} sectors of {} bytes",
                path, expected.sector_count, expected.sector_size
            );
        } else {
            let header = FlashImageHeader::from_bytes(&mmap[..HEADER_SIZE])?;
            if header != expected {
                return Err(Error::device(format!(
                    "flash image {:?} geometry mismatch: file has {:?}, requested {:?}",
                    path, header, expected
                )));
            }
            debug!("Opened flash image {:?}", path);
        }

        Ok(Self {
            path,
            header: expected,
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn body(&self) -> &[u8] {
        &self.mmap[HEADER_SIZE..]
    }

    fn body_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[HEADER_SIZE..]
    }
}

impl PersistentDevice for FileFlash {
    fn sector_size(&self) -> usize {
        self.header.sector_size as usize
    }

    fn base_address(&self) -> u32 {
        self.header.base_address
    }

    fn capacity(&self) -> usize {
        self.body().len()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let offset = image_offset(self.base_address(), self.capacity(), address, buf.len())?;
        buf.copy_from_slice(&self.body()[offset..offset + buf.len()]);
        Ok(())
    }

    fn erase_sector(&mut self, sector_address: u32) -> Result<()> {
        let sector_size = self.sector_size();
        let offset = sector_offset(self.base_address(), self.capacity(), sector_size, sector_address)?;
        self.body_mut()[offset..offset + sector_size].fill(ERASED_BYTE);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let offset = image_offset(self.base_address(), self.capacity(), address, data.len())?;
        for (cell, &byte) in self.body_mut()[offset..offset + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.mmap.flush().map_err(|e| Error::Device {
            message: format!("flush of {:?} failed", self.path),
            source: Some(e),
        })
    }
}

impl Drop for FileFlash {
    fn drop(&mut self) {
        self.sync().ok();
    }
}
