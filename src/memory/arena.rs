//! Memory-mapped arena

use std::{
    ffi::CString,
    fs::{File, OpenOptions},
    os::fd::OwnedFd,
    os::unix::fs::OpenOptionsExt,
    ptr::NonNull,
};

use log::debug;
use memmap2::{MmapMut, MmapOptions};
#[cfg(target_os = "linux")]
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};

use crate::error::{ChunkSchemaError, Result};

use super::config::{BackingType, StoreConfig};

/// One contiguous mapping that chunk storage is carved from
///
/// The arena hands out raw addresses; keeping concurrent writers apart
/// is the job of whoever owns the offsets (the chunk service).
#[derive(Debug)]
pub struct BackingArena {
    name: String,
    backing_type: BackingType,
    mmap: MmapMut,
    base: NonNull<u8>,
    _file: Option<File>,
    _owned_fd: Option<OwnedFd>,
}

impl BackingArena {
    /// Map a new arena as described by `config`
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let (file, owned_fd, mut mmap) = match config.backing_type {
            BackingType::Anonymous => {
                let mmap = MmapOptions::new()
                    .len(config.capacity)
                    .map_anon()
                    .map_err(|e| ChunkSchemaError::from_io(e, "Failed to map anonymous arena"))?;
                (None, None, mmap)
            }
            BackingType::FileBacked => {
                let file = Self::open_file(config)?;
                let mmap = unsafe {
                    MmapOptions::new()
                        .len(config.capacity)
                        .map_mut(&file)
                        .map_err(|e| ChunkSchemaError::from_io(e, "Failed to map arena file"))?
                };
                (Some(file), None, mmap)
            }
            #[cfg(target_os = "linux")]
            BackingType::MemFd => {
                let fd = Self::create_memfd(config)?;
                let mmap = unsafe {
                    MmapOptions::new()
                        .len(config.capacity)
                        .map_mut(&fd)
                        .map_err(|e| ChunkSchemaError::from_io(e, "Failed to map memfd arena"))?
                };
                (None, Some(fd), mmap)
            }
        };

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| ChunkSchemaError::memory("Arena mapping has a null base"))?;

        debug!(
            "mapped {} arena {} ({} bytes)",
            config.backing_type.name(),
            config.name,
            config.capacity
        );

        Ok(Self {
            name: config.name.clone(),
            backing_type: config.backing_type,
            mmap,
            base,
            _file: file,
            _owned_fd: owned_fd,
        })
    }

    fn open_file(config: &StoreConfig) -> Result<File> {
        let path = config.default_file_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create)
            .truncate(false)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| ChunkSchemaError::from_io(e, "Failed to create/open arena file"))?;

        let len = file
            .metadata()
            .map_err(|e| ChunkSchemaError::from_io(e, "Failed to stat arena file"))?
            .len();
        if len < config.capacity as u64 {
            file.set_len(config.capacity as u64)
                .map_err(|e| ChunkSchemaError::from_io(e, "Failed to set arena file size"))?;
        }
        Ok(file)
    }

    #[cfg(target_os = "linux")]
    fn create_memfd(config: &StoreConfig) -> Result<OwnedFd> {
        let name = CString::new(config.name.clone())
            .map_err(|_| ChunkSchemaError::invalid_argument("name", "Name contains null bytes"))?;
        let fd = memfd_create(&name, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| ChunkSchemaError::memory(format!("Failed to create memfd: {}", e)))?;

        let file = File::from(fd);
        file.set_len(config.capacity as u64)
            .map_err(|e| ChunkSchemaError::from_io(e, "Failed to set memfd size"))?;
        Ok(OwnedFd::from(file))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backing_type(&self) -> BackingType {
        self.backing_type
    }

    /// Arena size in bytes
    pub fn capacity(&self) -> usize {
        self.mmap.len()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(ChunkSchemaError::invalid_argument(
                "range",
                format!(
                    "{}..+{} is outside the {} byte arena",
                    offset,
                    len,
                    self.capacity()
                ),
            )),
        }
    }

    /// Address of `offset` inside the mapping
    pub fn ptr_at(&self, offset: usize) -> Result<NonNull<u8>> {
        self.check_range(offset, 0)?;
        // SAFETY: offset is within (or one past) the mapping
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
    }

    /// Copy bytes out of the arena
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy bytes into the arena
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }

    /// Set a range to one byte value
    pub fn fill(&self, offset: usize, len: usize, byte: u8) -> Result<()> {
        self.check_range(offset, len)?;
        unsafe {
            std::ptr::write_bytes(self.base.as_ptr().add(offset), byte, len);
        }
        Ok(())
    }

    /// Flush changes to the backing file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| ChunkSchemaError::from_io(e, "Failed to flush arena"))
    }
}

unsafe impl Send for BackingArena {}
unsafe impl Sync for BackingArena {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_read_write() {
        let arena = BackingArena::new(&StoreConfig::new("anon", 4096)).unwrap();
        assert_eq!(arena.capacity(), 4096);

        arena.write(100, b"chunk").unwrap();
        let mut buf = [0u8; 5];
        arena.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"chunk");

        arena.fill(100, 5, 0).unwrap();
        arena.read(100, &mut buf).unwrap();
        assert_eq!(buf, [0; 5]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let arena = BackingArena::new(&StoreConfig::new("anon", 64)).unwrap();
        assert!(arena.write(60, &[0; 8]).is_err());
        assert!(arena.read(usize::MAX, &mut [0; 1]).is_err());
        assert!(arena.ptr_at(64).is_ok());
        assert!(arena.ptr_at(65).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memfd_arena() {
        let config = StoreConfig::new("memfd_arena", 8192).with_backing_type(BackingType::MemFd);
        let arena = BackingArena::new(&config).unwrap();
        arena.write(0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        arena.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }
}
