//! Structs and functions for building and parsing disk images.

mod bam;
mod block;
mod chain;
mod error;
mod image;
mod track;
mod validation;

pub mod directory;
pub mod layout;

use std::fmt::{self, Write as FmtWrite};
use std::io::{self, Write};
use std::path::Path;

use log::{debug, warn};

use crate::disk::chain::{encode_chain_block, ChainIterator, ChainLink, CHAIN_PAYLOAD_SIZE};
use crate::disk::directory::{
    check_filename_validity, encode_directory_block, DirectoryIterator, ENTRIES_PER_BLOCK,
    LAST_DIRECTORY_LINK,
};
use crate::disk::image::Image;
use crate::util::{hexdump, petscii_lossy};

pub use self::bam::{BamMap, DISK_ID_SIZE, DISK_NAME_SIZE};
pub use self::block::{Location, LocationIterator, Sector, BLOCK_SIZE};
pub use self::directory::{DirectoryEntry, FileAttributes, FileType};
pub use self::error::DiskError;
pub use self::layout::{Layout, D64_LAYOUT, D71_LAYOUT, D81_LAYOUT};
pub use self::track::Track;
pub use self::validation::ValidationError;

const PADDING_BYTE: u8 = 0xA0;
const SHORT_ID_SIZE: usize = 2;

/// Disk image types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskType {
    /// A 1541 disk image in "D64" format.
    D64,
    /// A 1571 disk image in "D71" format.
    D71,
    /// A 1581 disk image in "D81" format.
    D81,
}

impl DiskType {
    pub fn from_name(name: &str) -> Option<DiskType> {
        match name.to_lowercase().as_str() {
            "d64" => Some(DiskType::D64),
            "d71" => Some(DiskType::D71),
            "d81" => Some(DiskType::D81),
            _ => None,
        }
    }

    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<DiskType> {
        path.as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .and_then(DiskType::from_name)
    }

    pub fn layout(&self) -> &'static Layout {
        match self {
            DiskType::D64 => &D64_LAYOUT,
            DiskType::D71 => &D71_LAYOUT,
            DiskType::D81 => &D81_LAYOUT,
        }
    }
}

/// Expand a disk id the way the header stores it.  Ids of up to two bytes
/// are padded with spaces and followed by 0xA0 and the DOS type; longer ids
/// are taken as given.
fn expand_id(layout: &Layout, id: &[u8]) -> io::Result<Vec<u8>> {
    if id.len() > DISK_ID_SIZE {
        return Err(DiskError::NameTooLong.into());
    }
    if id.len() > SHORT_ID_SIZE {
        return Ok(id.to_vec());
    }
    let mut expanded = id.to_vec();
    expanded.resize(SHORT_ID_SIZE, b' ');
    expanded.push(PADDING_BYTE);
    expanded.extend_from_slice(&layout.dos_type);
    Ok(expanded)
}

/// An in-memory disk image.  Files are added through `add_file` and friends;
/// the directory and BAM are only rendered into sectors when the image is
/// written out with `output`.
pub struct Disk {
    layout: &'static Layout,
    /// Indexed by track number.  Track 0 does not exist and has no sectors.
    tracks: Vec<Track>,
    name: Vec<u8>,
    id: Vec<u8>,
    directory: Vec<DirectoryEntry>,
    /// Header, BAM, and directory blocks owned by the disk itself.
    system_blocks: Vec<Location>,
}

impl Disk {
    /// Create a blank disk in the given layout, with every sector free.
    pub fn new(layout: &'static Layout) -> Disk {
        let mut tracks = Vec::with_capacity(layout.tracks() + 1);
        tracks.push(Track::new(0));
        for zone in layout.zones {
            for _ in 0..zone.tracks {
                tracks.push(Track::new(zone.sectors));
            }
        }
        Disk {
            layout,
            tracks,
            name: vec![],
            // Cannot fail for an empty id.
            id: expand_id(layout, &[]).unwrap_or_default(),
            directory: vec![],
            system_blocks: vec![],
        }
    }

    /// Create a blank disk from a layout tag ("d64", "d71", or "d81").
    pub fn create(disk_type: &str, name: &[u8], id: &[u8]) -> io::Result<Disk> {
        let layout = Layout::find_by_name(disk_type).ok_or(DiskError::InvalidGeometry)?;
        let mut disk = Disk::new(layout);
        disk.set_name(name, id)?;
        Ok(disk)
    }

    /// Reconstruct a disk from a raw image.  The layout is chosen by the image
    /// size alone.  Sector occupancy is not derived from the BAM; call
    /// `read_bam` for that.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Disk> {
        let (layout, with_error_table) =
            Layout::find_by_size(bytes.len()).ok_or(DiskError::UnknownFormat)?;
        debug!(
            "detected {} layout ({} bytes, error table: {})",
            layout.name,
            bytes.len(),
            with_error_table
        );
        if with_error_table {
            warn!("disk image carries an error table");
        }

        let error_table_offset = layout.sectors() * BLOCK_SIZE;
        let mut disk = Disk::new(layout);
        for (index, location) in LocationIterator::new(layout).enumerate() {
            let offset = index * BLOCK_SIZE;
            let error = if with_error_table {
                bytes[error_table_offset + index]
            } else {
                0
            };
            disk.tracks[location.0 as usize].write(
                location.1,
                &bytes[offset..offset + BLOCK_SIZE],
                false,
                error,
            )?;
        }

        let (name, id) = bam::decode_header(layout.bam, &disk.tracks)?;
        disk.name = name;
        disk.id = id;
        disk.directory = DirectoryIterator::new(&disk.tracks, layout.first_directory_location())
            .collect::<io::Result<Vec<_>>>()?;
        debug!("parsed {} directory entries", disk.directory.len());
        Ok(disk)
    }

    /// Open a disk image file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Disk> {
        let image = Image::open_read_only(path)?;
        Disk::from_bytes(image.as_slice())
    }

    /// Write the disk image to a file.  With `create_new`, an existing file
    /// is an error; otherwise it is replaced.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, create_new: bool) -> io::Result<()> {
        let bytes = self.to_bytes()?;
        let mut image = Image::create(path, bytes.len(), create_new)?;
        image.as_mut_slice()?.copy_from_slice(&bytes);
        image.flush()
    }

    /// Set the disk name (up to 16 bytes) and id (up to 5 bytes).
    pub fn set_name(&mut self, name: &[u8], id: &[u8]) -> io::Result<()> {
        if name.len() > DISK_NAME_SIZE {
            return Err(DiskError::NameTooLong.into());
        }
        let id = expand_id(self.layout, id)?;
        self.name = name.to_vec();
        self.id = id;
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[inline]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    #[inline]
    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Add a PRG file.
    pub fn add_file(&mut self, filename: &[u8], data: &[u8]) -> io::Result<()> {
        self.add_typed_file(filename, data, FileType::PRG)
    }

    /// Add a file of the given type.  The data is stored as a chain of
    /// blocks; a zero-length file still occupies one block.  If the disk
    /// fills up part way through, no blocks remain allocated.
    pub fn add_typed_file(
        &mut self,
        filename: &[u8],
        data: &[u8],
        file_type: FileType,
    ) -> io::Result<()> {
        check_filename_validity(filename)?;
        if !file_type.is_linear() {
            return Err(DiskError::NonLinearFile.into());
        }
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(CHAIN_PAYLOAD_SIZE).collect()
        };

        let first = self
            .layout
            .first_free_block(&self.tracks)
            .ok_or(DiskError::DiskFull)?;
        let mut written: Vec<Location> = Vec::with_capacity(chunks.len());
        let mut location = first;
        for (index, chunk) in chunks.iter().enumerate() {
            self.tracks[location.0 as usize].mark_used(location.1)?;
            written.push(location);
            let link = if index + 1 < chunks.len() {
                match self.layout.next_free_block(&self.tracks, location) {
                    Some(next) => ChainLink::Next(next),
                    None => {
                        self.release_blocks(&written)?;
                        return Err(DiskError::DiskFull.into());
                    }
                }
            } else {
                ChainLink::tail_for_payload(chunk.len())
            };
            let block = encode_chain_block(link, chunk);
            self.tracks[location.0 as usize].write(location.1, &block, true, 0)?;
            if let ChainLink::Next(next) = link {
                location = next;
            }
        }

        debug!(
            "added \"{}\" ({} bytes, {} blocks) at {}",
            petscii_lossy(filename),
            data.len(),
            written.len(),
            first
        );
        self.directory.push(DirectoryEntry::new(
            filename,
            file_type,
            first,
            written.len() as u16,
        )?);
        Ok(())
    }

    /// Add a name-only DEL entry.  No blocks are allocated.
    pub fn add_del(&mut self, filename: &[u8]) -> io::Result<()> {
        let entry = DirectoryEntry::new(filename, FileType::DEL, Location(0, 0), 0)?;
        self.directory.push(entry);
        Ok(())
    }

    /// Write one raw 256-byte block at a caller-chosen location and mark it
    /// used.  The block must not be in use already.
    pub fn add_block(&mut self, location: Location, data: &[u8]) -> io::Result<()> {
        let track = self.track_mut(location.0)?;
        if !track.is_free(location.1)? {
            return Err(DiskError::DuplicateAllocation.into());
        }
        track.write(location.1, data, true, 0)
    }

    fn release_blocks(&mut self, locations: &[Location]) -> io::Result<()> {
        for location in locations {
            self.tracks[location.0 as usize].release(location.1)?;
        }
        Ok(())
    }

    fn release_system_blocks(&mut self) -> io::Result<()> {
        let blocks = std::mem::take(&mut self.system_blocks);
        self.release_blocks(&blocks)
    }

    fn reserve_system_block(&mut self, location: Location) -> io::Result<()> {
        self.tracks[location.0 as usize].mark_used(location.1)?;
        self.system_blocks.push(location);
        Ok(())
    }

    /// Place the directory chain and return its block locations.
    fn allocate_directory(&mut self) -> io::Result<Vec<Location>> {
        let pages = ((self.directory.len() + ENTRIES_PER_BLOCK - 1) / ENTRIES_PER_BLOCK).max(1);
        let mut location = self.layout.first_directory_location();
        if !self.tracks[location.0 as usize].is_free(location.1)? {
            return Err(DiskError::DuplicateAllocation.into());
        }
        let mut locations = Vec::with_capacity(pages);
        loop {
            self.reserve_system_block(location)?;
            locations.push(location);
            if locations.len() == pages {
                return Ok(locations);
            }
            location = self
                .layout
                .next_free_directory_block(&self.tracks, location)
                .ok_or(DiskError::DirectoryFull)?;
        }
    }

    fn encode_system_blocks(&mut self) -> io::Result<()> {
        for location in self.layout.bam.system_locations() {
            if !self.tracks[location.0 as usize].is_free(location.1)? {
                return Err(DiskError::DuplicateAllocation.into());
            }
            self.reserve_system_block(location)?;
        }

        let locations = self.allocate_directory()?;
        debug!(
            "directory of {} entries at {}",
            self.directory.len(),
            Location::format_locations(&locations)
        );
        let mut pages: Vec<&[DirectoryEntry]> = self.directory.chunks(ENTRIES_PER_BLOCK).collect();
        if pages.is_empty() {
            pages.push(&[]);
        }
        let blocks: Vec<(Location, Vec<u8>)> = pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let link = locations.get(index + 1).copied().unwrap_or(LAST_DIRECTORY_LINK);
                (locations[index], encode_directory_block(link, page))
            })
            .collect();

        let bam_blocks = bam::encode(self.layout, &self.tracks, &self.name, &self.id);
        for (location, data) in blocks.into_iter().chain(bam_blocks) {
            self.tracks[location.0 as usize].write(location.1, &data, true, 0)?;
        }
        Ok(())
    }

    /// Render the directory and BAM, then write every sector in image order,
    /// followed by an error table if any sector carries an error code.  This
    /// may be called repeatedly; blocks rendered by an earlier call are
    /// released first.
    pub fn output<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.release_system_blocks()?;
        if let Err(e) = self.encode_system_blocks() {
            self.release_system_blocks()?;
            return Err(e);
        }

        for track in self.tracks.iter().skip(1) {
            track.output(out)?;
        }
        if self.has_errors() {
            for track in self.tracks.iter().skip(1) {
                track.output_errors(out)?;
            }
        }
        Ok(())
    }

    /// Render the whole image into a byte vector.
    pub fn to_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.layout.size(self.has_errors()));
        self.output(&mut bytes)?;
        Ok(bytes)
    }

    /// Return true if any sector carries a nonzero error code.
    pub fn has_errors(&self) -> bool {
        self.tracks.iter().any(|t| t.has_errors())
    }

    /// The directory entries in chain order.
    #[inline]
    pub fn directory(&self) -> &[DirectoryEntry] {
        &self.directory
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<DirectoryEntry> {
        self.directory.iter()
    }

    /// Locate a directory entry based on its filename.
    pub fn find_directory_entry(&self, filename: &[u8]) -> io::Result<&DirectoryEntry> {
        self.directory
            .iter()
            .find(|entry| entry.filename == filename)
            .ok_or_else(|| DiskError::NotFound.into())
    }

    /// Read a file's contents by following its chain.
    pub fn read_file(&self, filename: &[u8]) -> io::Result<Vec<u8>> {
        let entry = self.find_directory_entry(filename)?;
        if !entry.has_chain() {
            return Ok(vec![]);
        }
        ChainIterator::new(&self.tracks, entry.first_sector).read_all()
    }

    /// Return the locations of a file's blocks in chain order.
    pub fn file_blocks(&self, filename: &[u8]) -> io::Result<Vec<Location>> {
        let entry = self.find_directory_entry(filename)?;
        if !entry.has_chain() {
            return Ok(vec![]);
        }
        ChainIterator::new(&self.tracks, entry.first_sector).locations()
    }

    /// Read a specific block from the disk, given its track and sector
    /// location.
    pub fn read_sector(&self, location: Location) -> io::Result<&[u8]> {
        track::read_block(&self.tracks, location)
    }

    pub fn set_error(&mut self, location: Location, code: u8) -> io::Result<()> {
        self.track_mut(location.0)?.set_error(location.1, code)
    }

    pub fn error(&self, location: Location) -> io::Result<u8> {
        self.track(location.0)?.error(location.1)
    }

    pub fn track(&self, track: u8) -> io::Result<&Track> {
        match self.tracks.get(track as usize) {
            Some(t) if track > 0 => Ok(t),
            _ => Err(DiskError::OutOfRange.into()),
        }
    }

    fn track_mut(&mut self, track: u8) -> io::Result<&mut Track> {
        match self.tracks.get_mut(track as usize) {
            Some(t) if track > 0 => Ok(t),
            _ => Err(DiskError::OutOfRange.into()),
        }
    }

    #[inline]
    pub(crate) fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn system_blocks(&self) -> &[Location] {
        &self.system_blocks
    }

    /// Return the number of free blocks outside the directory tracks, as
    /// shown at the bottom of a directory listing.
    pub fn blocks_free(&self) -> usize {
        self.tracks
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(number, _)| !self.layout.is_directory_track(*number as u8))
            .map(|(_, track)| track.blocks_free())
            .sum()
    }

    /// Restore sector occupancy from the BAM stored on the disk, and adopt
    /// the header, BAM, and directory blocks as system blocks so that the
    /// disk can be extended and written out again.
    pub fn read_bam(&mut self) -> io::Result<()> {
        let entries = bam::decode(self.layout.bam, &self.tracks)?;
        let directory_blocks =
            ChainIterator::directory(&self.tracks, self.layout.first_directory_location())
                .locations()?;

        for (index, entry) in entries.iter().enumerate() {
            let number = index + 1;
            let track = &mut self.tracks[number];
            let bitmap_free = entry.bitmap_free(track.len());
            if bitmap_free != entry.free_sectors as usize {
                warn!(
                    "track {}: BAM free count {} disagrees with bitmap ({})",
                    number, entry.free_sectors, bitmap_free
                );
            }
            track.apply_bam_entry(entry);
        }

        self.system_blocks.clear();
        for location in self
            .layout
            .bam
            .system_locations()
            .into_iter()
            .chain(directory_blocks)
        {
            self.reserve_system_block(location)?;
        }
        debug!(
            "restored BAM: {} blocks free, system blocks {}",
            self.blocks_free(),
            Location::format_locations(&self.system_blocks)
        );
        Ok(())
    }

    /// Check the consistency of the disk image.  A list of validation errors
    /// is returned.
    #[inline]
    pub fn validate(&self) -> io::Result<Vec<ValidationError>> {
        validation::validate(self)
    }

    /// A printable allocation map of every track.
    pub fn bam_map(&self) -> BamMap {
        BamMap {
            tracks: &self.tracks,
            blocks_free: self.blocks_free(),
        }
    }

    /// Write a hex dump of every written sector, followed by any nonzero
    /// error codes.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut text = String::new();
        let mut errors = vec![];
        for (index, location) in LocationIterator::new(self.layout).enumerate() {
            let track = &self.tracks[location.0 as usize];
            let error = track.error(location.1)?;
            if error != 0 {
                errors.push((location, error));
            }
            let sector = track.contents(location.1)?;
            if sector.is_empty() {
                continue;
            }
            text.clear();
            writeln!(text, "{}:", location).map_err(fmt_error)?;
            hexdump(&mut text, "  ", index * BLOCK_SIZE, sector.as_bytes()).map_err(fmt_error)?;
            writeln!(out, "{}", text)?;
        }
        if !errors.is_empty() {
            writeln!(out, "error table:")?;
            for (location, error) in errors {
                writeln!(out, "  {}: {:#04x}", location, error)?;
            }
        }
        Ok(())
    }
}

fn fmt_error(error: fmt::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error)
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0 \"{:16}\" {}",
            petscii_lossy(&self.name),
            petscii_lossy(&self.id)
        )
    }
}

impl fmt::Debug for Disk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Disk({}, {:?}, {} entries)",
            self.layout.name,
            petscii_lossy(&self.name),
            self.directory.len()
        )
    }
}

impl<'a> IntoIterator for &'a Disk {
    type Item = &'a DirectoryEntry;
    type IntoIter = std::slice::Iter<'a, DirectoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.directory.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::layout::LAYOUTS;

    fn file_data(length: usize, seed: u8) -> Vec<u8> {
        (0..length).map(|i| (i as u8).wrapping_mul(7) ^ seed).collect()
    }

    fn fill_disk(disk: &mut Disk) {
        let blocks = disk.blocks_free();
        disk.add_file(b"FILLER", &vec![0x55; blocks * CHAIN_PAYLOAD_SIZE])
            .unwrap();
        assert_eq!(disk.blocks_free(), 0);
    }

    #[test]
    fn test_create() {
        let disk = Disk::create("d64", b"GAMES", b"ab").unwrap();
        assert_eq!(disk.name(), b"GAMES");
        assert_eq!(disk.id(), b"ab\xA02A");
        assert_eq!(disk.layout().name, "d64");
        assert_eq!(disk.to_string(), "0 \"GAMES           \" ab 2A");

        let disk = Disk::create("D81", b"", b"x").unwrap();
        assert_eq!(disk.id(), b"x \xA03D");
        let disk = Disk::create("d71", b"", b"12345").unwrap();
        assert_eq!(disk.id(), b"12345");

        assert_eq!(
            Disk::create("d80", b"", b"").unwrap_err(),
            DiskError::InvalidGeometry
        );
        assert_eq!(
            Disk::create("d64", b"SEVENTEEN CHARS!!", b"").unwrap_err(),
            DiskError::NameTooLong
        );
        assert_eq!(
            Disk::create("d64", b"", b"123456").unwrap_err(),
            DiskError::NameTooLong
        );
    }

    #[test]
    fn test_disk_type() {
        assert_eq!(DiskType::from_extension("games.D64"), Some(DiskType::D64));
        assert_eq!(DiskType::from_extension("/tmp/x.d81"), Some(DiskType::D81));
        assert_eq!(DiskType::from_extension("x.prg"), None);
        assert_eq!(DiskType::from_extension("noextension"), None);
        assert_eq!(DiskType::from_name("d71").map(|t| t.layout().name), Some("d71"));
    }

    #[test]
    fn test_file_placement() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"FOUR", &file_data(254 * 3 + 10, 1)).unwrap();
        assert_eq!(
            disk.file_blocks(b"FOUR").unwrap(),
            vec![
                Location(17, 0),
                Location(17, 10),
                Location(17, 20),
                Location(17, 8)
            ]
        );
        assert_eq!(disk.find_directory_entry(b"FOUR").unwrap().file_size, 4);
        assert_eq!(disk.track(17).unwrap().blocks_free(), 17);

        // The next file starts on the first free sector of the nearest track.
        disk.add_file(b"NEXT", &[1, 2, 3]).unwrap();
        assert_eq!(disk.file_blocks(b"NEXT").unwrap(), vec![Location(17, 1)]);

        let mut disk = Disk::new(&D81_LAYOUT);
        disk.add_file(b"TWO", &file_data(300, 2)).unwrap();
        assert_eq!(
            disk.file_blocks(b"TWO").unwrap(),
            vec![Location(39, 0), Location(39, 1)]
        );
    }

    #[test]
    fn test_block_boundaries() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"EMPTY", &[]).unwrap();
        disk.add_file(b"EXACT", &file_data(254, 3)).unwrap();
        disk.add_file(b"OVER", &file_data(255, 4)).unwrap();

        let empty = disk.file_blocks(b"EMPTY").unwrap();
        assert_eq!(empty.len(), 1);
        assert_eq!(&disk.read_sector(empty[0]).unwrap()[0..2], &[0x00, 0x01]);
        assert!(disk.read_file(b"EMPTY").unwrap().is_empty());
        assert_eq!(disk.find_directory_entry(b"EMPTY").unwrap().file_size, 1);

        let exact = disk.file_blocks(b"EXACT").unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(&disk.read_sector(exact[0]).unwrap()[0..2], &[0x00, 0xFF]);
        assert_eq!(disk.read_file(b"EXACT").unwrap(), file_data(254, 3));

        let over = disk.file_blocks(b"OVER").unwrap();
        assert_eq!(over.len(), 2);
        assert_eq!(&disk.read_sector(over[1]).unwrap()[0..2], &[0x00, 0x02]);
        assert_eq!(disk.read_file(b"OVER").unwrap(), file_data(255, 4));
    }

    #[test]
    fn test_disk_full() {
        let mut disk = Disk::new(&D64_LAYOUT);
        assert_eq!(disk.blocks_free(), 664);
        let e = disk
            .add_file(b"TOO BIG", &vec![0u8; 665 * CHAIN_PAYLOAD_SIZE])
            .unwrap_err();
        assert_eq!(e, DiskError::DiskFull);
        // Nothing stays allocated after a failed add.
        assert_eq!(disk.blocks_free(), 664);
        assert!(disk.directory().is_empty());

        fill_disk(&mut disk);
        assert_eq!(disk.add_file(b"X", &[1]).unwrap_err(), DiskError::DiskFull);
        // The directory track is still available for the directory.
        assert_eq!(disk.to_bytes().unwrap().len(), D64_LAYOUT.size(false));
    }

    #[test]
    fn test_directory_tracks_not_used_for_data() {
        let mut disk = Disk::new(&D71_LAYOUT);
        fill_disk(&mut disk);
        assert_eq!(disk.track(18).unwrap().blocks_free(), 19);
        assert_eq!(disk.track(53).unwrap().blocks_free(), 19);
    }

    #[test]
    fn test_add_del_and_typed_files() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_del(b"----------").unwrap();
        disk.add_typed_file(b"NOTES", b"HELLO", FileType::SEQ).unwrap();
        assert_eq!(disk.blocks_free(), 663);

        let del = disk.find_directory_entry(b"----------").unwrap();
        assert_eq!(del.file_type(), FileType::DEL);
        assert_eq!(del.first_sector, Location(0, 0));
        assert_eq!(del.file_size, 0);
        assert!(del.file_attributes.closed_flag);
        assert!(disk.read_file(b"----------").unwrap().is_empty());

        let bytes = disk.to_bytes().unwrap();
        let parsed = Disk::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.directory(), disk.directory());
        assert_eq!(
            parsed.find_directory_entry(b"NOTES").unwrap().file_type(),
            FileType::SEQ
        );
        assert_eq!(parsed.read_file(b"NOTES").unwrap(), b"HELLO");
        assert_eq!(
            parsed.read_file(b"MISSING").unwrap_err(),
            DiskError::NotFound
        );
    }

    #[test]
    fn test_add_block() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_block(Location(1, 0), &[0xEE; BLOCK_SIZE]).unwrap();
        assert_eq!(
            disk.add_block(Location(1, 0), &[0xEE; BLOCK_SIZE])
                .unwrap_err(),
            DiskError::DuplicateAllocation
        );
        assert_eq!(
            disk.add_block(Location(36, 0), &[0; BLOCK_SIZE])
                .unwrap_err(),
            DiskError::OutOfRange
        );
        assert_eq!(
            disk.add_block(Location(1, 21), &[0; BLOCK_SIZE])
                .unwrap_err(),
            DiskError::OutOfRange
        );
        assert_eq!(
            disk.add_block(Location(1, 1), &[0; 10]).unwrap_err(),
            DiskError::InvalidBlockLength
        );
        assert_eq!(disk.read_sector(Location(1, 0)).unwrap()[255], 0xEE);
        assert!(disk.track(1).unwrap().is_free(1).unwrap());
        assert_eq!(disk.blocks_free(), 663);
    }

    #[test]
    fn test_output_lengths() {
        for layout in LAYOUTS.iter() {
            let mut disk = Disk::new(*layout);
            let bytes = disk.to_bytes().unwrap();
            assert_eq!(bytes.len() % BLOCK_SIZE, 0);
            assert_eq!(bytes.len() / BLOCK_SIZE, layout.sectors());
            let parsed = Disk::from_bytes(&bytes).unwrap();
            assert_eq!(parsed.layout().name, layout.name);
            assert!(parsed.directory().is_empty());
            assert!(!parsed.has_errors());
        }
        assert_eq!(
            Disk::from_bytes(&[0u8; 1000]).unwrap_err(),
            DiskError::UnknownFormat
        );
    }

    #[test]
    fn test_empty_directory_block() {
        let mut disk = Disk::new(&D64_LAYOUT);
        let bytes = disk.to_bytes().unwrap();
        let parsed = Disk::from_bytes(&bytes).unwrap();
        let block = parsed.read_sector(Location(18, 1)).unwrap();
        assert_eq!(&block[0..2], &[0x00, 0xFF]);
        assert!(block[2..].iter().all(|b| *b == 0));
        assert_eq!(
            disk.system_blocks(),
            &[Location(18, 0), Location(18, 1)]
        );
    }

    #[test]
    fn test_parse_zeroed_image() {
        for layout in LAYOUTS.iter() {
            let disk = Disk::from_bytes(&vec![0u8; layout.size(false)]).unwrap();
            assert_eq!(disk.layout().name, layout.name);
            assert!(disk.directory().is_empty());
        }
    }

    #[test]
    fn test_bam_location_in_use() {
        for layout in LAYOUTS.iter() {
            for location in layout.bam.system_locations() {
                let mut disk = Disk::new(*layout);
                disk.add_block(location, &[0xEE; BLOCK_SIZE]).unwrap();
                assert_eq!(
                    disk.to_bytes().unwrap_err(),
                    DiskError::DuplicateAllocation
                );
                assert!(disk.system_blocks().is_empty());
                assert!(!disk.track(location.0).unwrap().is_free(location.1).unwrap());
                assert!(disk.read_sector(location).unwrap().iter().all(|b| *b == 0xEE));

                // Blocks reserved before the clash were released again.
                let track = disk.track(location.0).unwrap();
                assert_eq!(track.blocks_free(), track.len() - 1);
            }
        }
    }

    #[test]
    fn test_non_linear_file_type() {
        let mut disk = Disk::new(&D64_LAYOUT);
        assert_eq!(
            disk.add_typed_file(b"RECORDS", &file_data(300, 1), FileType::REL)
                .unwrap_err(),
            DiskError::NonLinearFile
        );
        assert_eq!(
            disk.add_typed_file(b"ODD", &[1], FileType::Unknown(6))
                .unwrap_err(),
            DiskError::NonLinearFile
        );
        assert!(disk.directory().is_empty());
        assert_eq!(disk.blocks_free(), D64_LAYOUT.total_data_blocks());
    }

    #[test]
    fn test_name_padding() {
        let mut disk = Disk::create("d64", b"HELLO", b"64").unwrap();
        let bytes = disk.to_bytes().unwrap();
        let header = 357 * BLOCK_SIZE;
        assert_eq!(&bytes[header + 0x90..header + 0x95], b"HELLO");
        assert!(bytes[header + 0x95..header + 0xA2].iter().all(|b| *b == 0xA0));
        let parsed = Disk::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name(), b"HELLO");
        assert_eq!(parsed.id(), b"64\xA02A");
    }

    #[test]
    fn test_error_table() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"DATA", &file_data(100, 5)).unwrap();
        assert_eq!(disk.to_bytes().unwrap().len() % BLOCK_SIZE, 0);

        disk.set_error(Location(1, 0), 0x05).unwrap();
        assert!(disk.has_errors());
        assert_eq!(
            disk.read_sector(Location(1, 0)).unwrap_err(),
            DiskError::SectorReadError(0x05)
        );
        let bytes = disk.to_bytes().unwrap();
        assert_eq!(bytes.len(), D64_LAYOUT.size(true));
        let errors = &bytes[D64_LAYOUT.size(false)..];
        assert_eq!(errors[0], 0x05);
        assert!(errors[1..].iter().all(|e| *e == 0));

        let parsed = Disk::from_bytes(&bytes).unwrap();
        assert!(parsed.has_errors());
        assert_eq!(parsed.error(Location(1, 0)).unwrap(), 0x05);
        assert_eq!(parsed.read_file(b"DATA").unwrap(), file_data(100, 5));
    }

    #[test]
    fn test_read_file_through_bad_sector() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"DATA", &file_data(600, 6)).unwrap();
        disk.set_error(Location(17, 10), 0x02).unwrap();
        assert_eq!(
            disk.read_file(b"DATA").unwrap_err(),
            DiskError::SectorReadError(0x02)
        );
    }

    #[test]
    fn test_directory_full() {
        let mut disk = Disk::new(&D64_LAYOUT);
        for i in 0..144 {
            disk.add_del(format!("DEL{}", i).as_bytes()).unwrap();
        }
        let bytes = disk.to_bytes().unwrap();
        assert_eq!(Disk::from_bytes(&bytes).unwrap().directory().len(), 144);

        disk.add_del(b"ONE TOO MANY").unwrap();
        assert_eq!(disk.to_bytes().unwrap_err(), DiskError::DirectoryFull);
        // A failed output leaves no system blocks behind.
        assert!(disk.system_blocks().is_empty());
        assert_eq!(disk.track(18).unwrap().blocks_free(), 19);
    }

    #[test]
    fn test_directory_continues_on_second_side() {
        let mut disk = Disk::new(&D71_LAYOUT);
        for i in 0..150 {
            disk.add_del(format!("DEL{}", i).as_bytes()).unwrap();
        }
        let bytes = disk.to_bytes().unwrap();
        assert!(disk.system_blocks().contains(&Location(53, 1)));
        let parsed = Disk::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.directory(), disk.directory());
    }

    #[test]
    fn test_repeatable_output() {
        let mut disk = Disk::create("d64", b"TWICE", b"tw").unwrap();
        disk.add_file(b"ONE", &file_data(1000, 7)).unwrap();
        let first = disk.to_bytes().unwrap();
        let second = disk.to_bytes().unwrap();
        assert_eq!(first, second);

        disk.add_file(b"TWO", &file_data(2000, 8)).unwrap();
        let third = disk.to_bytes().unwrap();
        let parsed = Disk::from_bytes(&third).unwrap();
        assert_eq!(parsed.directory().len(), 2);
        assert_eq!(parsed.read_file(b"ONE").unwrap(), file_data(1000, 7));
        assert_eq!(parsed.read_file(b"TWO").unwrap(), file_data(2000, 8));
    }

    #[test]
    fn test_read_bam() {
        let mut disk = Disk::create("d81", b"WORK", b"wk").unwrap();
        disk.add_file(b"ONE", &file_data(5000, 9)).unwrap();
        disk.add_file(b"TWO", &file_data(100, 10)).unwrap();
        let bytes = disk.to_bytes().unwrap();

        let mut parsed = Disk::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.blocks_free(), D81_LAYOUT.total_data_blocks());
        parsed.read_bam().unwrap();
        assert_eq!(parsed.blocks_free(), disk.blocks_free());
        for number in 1..=80 {
            assert_eq!(
                parsed.track(number).unwrap().blocks_free(),
                disk.track(number).unwrap().blocks_free()
            );
        }
        assert!(parsed.validate().unwrap().is_empty());

        parsed.add_file(b"THREE", &file_data(3000, 11)).unwrap();
        let reparsed = Disk::from_bytes(&parsed.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.read_file(b"ONE").unwrap(), file_data(5000, 9));
        assert_eq!(reparsed.read_file(b"TWO").unwrap(), file_data(100, 10));
        assert_eq!(reparsed.read_file(b"THREE").unwrap(), file_data(3000, 11));
    }

    #[test]
    fn test_read_bam_directory_loop() {
        let mut disk = Disk::create("d64", b"LOOP", b"lp").unwrap();
        disk.add_file(b"ONE", &file_data(700, 3)).unwrap();
        let bytes = disk.to_bytes().unwrap();

        let mut parsed = Disk::from_bytes(&bytes).unwrap();
        let mut block = parsed.read_sector(Location(18, 1)).unwrap().to_vec();
        block[0] = 18;
        block[1] = 1;
        parsed.tracks[18].write(1, &block, false, 0).unwrap();

        assert_eq!(parsed.read_bam().unwrap_err(), DiskError::ChainLoop);
        // Nothing was restored.
        assert!(parsed.system_blocks().is_empty());
        assert_eq!(parsed.blocks_free(), D64_LAYOUT.total_data_blocks());
        assert_eq!(parsed.track(18).unwrap().blocks_free(), 19);
    }

    #[test]
    fn test_validate() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"GOOD", &file_data(600, 12)).unwrap();
        disk.to_bytes().unwrap();
        assert!(disk.validate().unwrap().is_empty());

        let bytes = disk.to_bytes().unwrap();
        let parsed = Disk::from_bytes(&bytes).unwrap();
        // Without the BAM restored, nothing is marked used.
        let errors = parsed.validate().unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::SectorMisoccupied(_, name) if name == b"GOOD")));

        // Point a second file at the same chain.
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"A", &[1, 2, 3]).unwrap();
        disk.directory.push(
            DirectoryEntry::new(b"B", FileType::PRG, Location(17, 0), 1).unwrap(),
        );
        let errors = disk.validate().unwrap();
        assert_eq!(
            errors,
            vec![ValidationError::SectorOveroccupied(
                Location(17, 0),
                b"A".to_vec(),
                b"B".to_vec()
            )]
        );

        disk.directory.push(
            DirectoryEntry::new(b"C", FileType::PRG, Location(99, 0), 1).unwrap(),
        );
        let errors = disk.validate().unwrap();
        assert_eq!(
            errors[1],
            ValidationError::FileScanError(DiskError::OutOfRange, b"C".to_vec())
        );
    }

    #[test]
    fn test_dump_and_bam_map() {
        let mut disk = Disk::new(&D64_LAYOUT);
        disk.add_file(b"X", b"ABC").unwrap();
        disk.set_error(Location(35, 16), 0x0B).unwrap();
        let mut out = vec![];
        disk.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("(17,0):\n  15000: 00 04 41 42 43"));
        assert!(text.ends_with("error table:\n  (35,16): 0x0b\n"));

        let map = disk.bam_map().to_string();
        assert!(map.contains("t17: [20/21] x...................."));
        assert!(map.ends_with("663 blocks free."));
    }
}
