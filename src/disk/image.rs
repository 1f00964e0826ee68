use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap::{Mmap, MmapMut, MmapOptions};

use crate::disk::error::DiskError;

/// A disk image file mapped into memory.
pub enum Image {
    ReadOnlyMap(Mmap),
    ReadWriteMap(MmapMut),
}

impl Image {
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> io::Result<Image> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Empty files cannot be mapped.
            return Err(DiskError::UnknownFormat.into());
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Image::ReadOnlyMap(mmap))
    }

    /// Create (or truncate) a file of exactly `length` bytes and map it for
    /// writing.  With `create_new`, an existing file is an error.
    pub fn create<P: AsRef<Path>>(path: P, length: usize, create_new: bool) -> io::Result<Image> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let file = options.open(path)?;
        file.set_len(length as u64)?;
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Image::ReadWriteMap(mmap))
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Image::ReadOnlyMap(mmap) => &mmap[..],
            Image::ReadWriteMap(mmap) => &mmap[..],
        }
    }

    pub fn as_mut_slice(&mut self) -> io::Result<&mut [u8]> {
        match self {
            Image::ReadOnlyMap(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "disk image is mapped read-only",
            )),
            Image::ReadWriteMap(mmap) => Ok(&mut mmap[..]),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Image::ReadOnlyMap(_) => Ok(()),
            Image::ReadWriteMap(mmap) => mmap.flush(),
        }
    }
}
