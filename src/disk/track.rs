use std::io::{self, Write};

use crate::disk::bam::BamEntry;
use crate::disk::block::{Location, Sector, BLOCK_SIZE};
use crate::disk::error::DiskError;
use crate::util::Buffer;

/// One physical track: a fixed number of sectors, each with its contents,
/// an occupancy flag, and a read error code (0 when the sector reads fine).
#[derive(Clone, Debug)]
pub struct Track {
    sectors: Vec<Sector>,
    free: Vec<bool>,
    errors: Vec<u8>,
    blocks_free: usize,
}

impl Track {
    /// Create a blank track where every sector is free and unwritten.
    pub fn new(sectors: u8) -> Track {
        let count = sectors as usize;
        Track {
            sectors: vec![Sector::Empty; count],
            free: vec![true; count],
            errors: vec![0; count],
            blocks_free: count,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    #[inline]
    pub fn blocks_free(&self) -> usize {
        self.blocks_free
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.blocks_free == 0
    }

    #[inline]
    fn check(&self, sector: u8) -> io::Result<usize> {
        let index = sector as usize;
        if index < self.len() {
            Ok(index)
        } else {
            Err(DiskError::OutOfRange.into())
        }
    }

    pub fn is_free(&self, sector: u8) -> io::Result<bool> {
        let index = self.check(sector)?;
        Ok(self.free[index])
    }

    pub fn mark_used(&mut self, sector: u8) -> io::Result<()> {
        let index = self.check(sector)?;
        if self.free[index] {
            self.free[index] = false;
            self.blocks_free -= 1;
        }
        Ok(())
    }

    pub fn mark_free(&mut self, sector: u8) -> io::Result<()> {
        let index = self.check(sector)?;
        if !self.free[index] {
            self.free[index] = true;
            self.blocks_free += 1;
        }
        Ok(())
    }

    pub fn set_error(&mut self, sector: u8, code: u8) -> io::Result<()> {
        let index = self.check(sector)?;
        self.errors[index] = code;
        Ok(())
    }

    pub fn error(&self, sector: u8) -> io::Result<u8> {
        let index = self.check(sector)?;
        Ok(self.errors[index])
    }

    #[inline]
    pub fn is_ok(&self, sector: u8) -> io::Result<bool> {
        Ok(self.error(sector)? == 0)
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| *e != 0)
    }

    /// Return the lowest free sector, if any.
    pub fn first_free(&self) -> Option<u8> {
        self.free.iter().position(|f| *f).map(|s| s as u8)
    }

    /// Scan circularly for a free sector beginning at `start`, skipping
    /// `ignore`.  A start at or past the end of the track wraps around, and
    /// steps back by one when it does not land on sector 0.
    pub fn next_free(&self, start: usize, ignore: Option<u8>) -> Option<u8> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let mut sector = start;
        if sector >= len {
            sector %= len;
            if sector > 0 {
                sector -= 1;
            }
        }
        let first = sector;
        loop {
            if self.free[sector] && ignore != Some(sector as u8) {
                return Some(sector as u8);
            }
            sector = (sector + 1) % len;
            if sector == first {
                return None;
            }
        }
    }

    /// Store a full sector.  The sector is marked used when `mark_used` is
    /// set, and its error code is replaced with `error`.
    pub fn write(&mut self, sector: u8, data: &[u8], mark_used: bool, error: u8) -> io::Result<()> {
        let index = self.check(sector)?;
        if data.len() != BLOCK_SIZE {
            return Err(DiskError::InvalidBlockLength.into());
        }
        self.sectors[index] = Sector::from_bytes(data);
        self.errors[index] = error;
        if mark_used {
            self.mark_used(sector)?;
        }
        Ok(())
    }

    pub fn read(&self, sector: u8) -> io::Result<&Sector> {
        let index = self.check(sector)?;
        match self.errors[index] {
            0 => Ok(&self.sectors[index]),
            code => Err(DiskError::SectorReadError(code).into()),
        }
    }

    /// Return a sector's contents regardless of its error code.
    pub fn contents(&self, sector: u8) -> io::Result<&Sector> {
        let index = self.check(sector)?;
        Ok(&self.sectors[index])
    }

    /// Forget a sector's contents and mark it free.  The error code is kept.
    pub fn release(&mut self, sector: u8) -> io::Result<()> {
        let index = self.check(sector)?;
        self.sectors[index] = Sector::Empty;
        self.mark_free(sector)
    }

    pub fn bam_entry(&self) -> BamEntry {
        let sector_map = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, free)| **free)
            .fold(0u64, |map, (sector, _)| map | (1u64 << sector));
        BamEntry {
            free_sectors: self.blocks_free as u8,
            sector_map,
        }
    }

    /// Replace the occupancy flags with those of a decoded BAM entry.
    pub fn apply_bam_entry(&mut self, entry: &BamEntry) {
        for sector in 0..self.len() {
            self.free[sector] = entry.sector_map & (1u64 << sector) != 0;
        }
        self.blocks_free = self.free.iter().filter(|f| **f).count();
    }

    /// Append the free count followed by a `size`-byte bitmap.
    pub fn encode_bam(&self, buffer: &mut Buffer, size: usize) {
        let entry = self.bam_entry();
        buffer.append_byte(entry.free_sectors);
        entry.append_bitmap(buffer, size);
    }

    pub fn output<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for sector in &self.sectors {
            out.write_all(sector.as_bytes())?;
        }
        Ok(())
    }

    pub fn output_errors<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.errors)
    }
}

/// Read a block from a 1-indexed track list, checking both coordinates.
pub(crate) fn read_block(tracks: &[Track], location: Location) -> io::Result<&[u8]> {
    match tracks.get(location.0 as usize) {
        Some(track) if location.0 > 0 => Ok(track.read(location.1)?.as_bytes()),
        _ => Err(DiskError::OutOfRange.into()),
    }
}
