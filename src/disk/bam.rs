use std::fmt::{self, Write};
use std::io;

use log::debug;

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::layout::Layout;
use crate::disk::track::{read_block, Track};
use crate::util::Buffer;

pub const DISK_NAME_SIZE: usize = 16;
pub const DISK_ID_SIZE: usize = 5;
const PADDING_BYTE: u8 = 0xA0;

/// Where the disk header (name, id, DOS version) is stored.
pub struct HeaderFormat {
    pub location: Location,
    pub disk_name_offset: usize,
    pub disk_id_offset: usize,
    /// The number of 0xA0 bytes that follow the disk id.
    pub id_filler: usize,
}

/// A 1581 partition side header: a BAM block carrying a DOS version check
/// byte pair and a copy of the disk id ahead of its entries.
pub struct SideHeaderFormat {
    pub location: Location,
    pub next: Location,
}

/// A BamFormat describes how BAM information is stored for a particular disk
/// image format.
pub struct BamFormat {
    pub header: HeaderFormat,
    /// The list of sections where BAM entries are stored.
    pub sections: &'static [BamSection],
    pub side_headers: &'static [SideHeaderFormat],
}

impl BamFormat {
    pub fn tracks(&self) -> usize {
        self.sections.iter().map(|s| s.tracks).sum()
    }

    /// All blocks the header and BAM occupy, header first.
    pub fn system_locations(&self) -> Vec<Location> {
        let mut locations = vec![self.header.location];
        let candidates = self
            .side_headers
            .iter()
            .map(|h| h.location)
            .chain(self.sections.iter().map(|s| s.bitmap_location))
            .chain(self.sections.iter().map(|s| s.free_location));
        for location in candidates {
            if !locations.contains(&location) {
                locations.push(location);
            }
        }
        locations
    }
}

/// BAM can be stored in one or more sections, depending on the disk image
/// format. Each section stores BAM entries for a particular range of tracks.
pub struct BamSection {
    /// The first track described by this section.
    pub first_track: u8,
    /// The number of tracks (and hence entries) in this section.
    pub tracks: usize,
    /// The block holding this section's bitmaps.
    pub bitmap_location: Location,
    pub bitmap_offset: usize,
    /// The size in bytes of one bitmap.  (3 for 1541/1571, 5 for 1581.)
    pub bitmap_size: usize,
    /// Distance between consecutive bitmaps.  When the free count is
    /// interleaved with the bitmaps this is one more than `bitmap_size`.
    pub bitmap_stride: usize,
    /// The block holding this section's free sector counts.
    pub free_location: Location,
    pub free_offset: usize,
    pub free_stride: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BamEntry {
    pub free_sectors: u8,
    /// Bit n is set when sector n is free.
    pub sector_map: u64,
}

impl BamEntry {
    pub fn from_bytes(free_sectors: u8, bitmap: &[u8]) -> BamEntry {
        let sector_map = bitmap
            .iter()
            .rev()
            .fold(0u64, |map, byte| (map << 8) | *byte as u64);
        BamEntry {
            free_sectors,
            sector_map,
        }
    }

    pub fn write_bitmap(&self, bitmap: &mut [u8]) {
        let mut sector_map = self.sector_map;
        for byte in bitmap.iter_mut() {
            *byte = (sector_map & 0xFF) as u8;
            sector_map >>= 8;
        }
    }

    pub fn append_bitmap(&self, buffer: &mut Buffer, size: usize) {
        let mut bitmap = [0u8; 8];
        let size = size.min(bitmap.len());
        self.write_bitmap(&mut bitmap[..size]);
        buffer.append_bytes(&bitmap[..size]);
    }

    /// The number of free sectors according to the bitmap, which may differ
    /// from the stored count on a damaged disk.
    #[inline]
    pub fn bitmap_free(&self, sectors: usize) -> usize {
        (0..sectors)
            .filter(|s| self.sector_map & (1u64 << s) != 0)
            .count()
    }
}

/// A block under construction during BAM encoding.
struct BamBlocks(Vec<(Location, Vec<u8>)>);

impl BamBlocks {
    fn block_mut(&mut self, location: Location) -> &mut Vec<u8> {
        let index = match self.0.iter().position(|(l, _)| *l == location) {
            Some(index) => index,
            None => {
                self.0.push((location, vec![0u8; BLOCK_SIZE]));
                self.0.len() - 1
            }
        };
        &mut self.0[index].1
    }
}

fn encode_header(layout: &Layout, name: &[u8], id: &[u8]) -> Vec<u8> {
    let header = &layout.bam.header;
    let first_directory = layout.first_directory_location();
    let double_sided_flag = if layout.is_double_sided() { 0x80 } else { 0x00 };

    let mut buffer = Buffer::with_capacity(BLOCK_SIZE);
    buffer
        .append_bytes(&[first_directory.0, first_directory.1])
        .append_byte(layout.dos_version())
        .append_byte(double_sided_flag)
        .pad_to(header.disk_name_offset, 0)
        .append_padded(name, DISK_NAME_SIZE, PADDING_BYTE)
        .append_bytes(&[PADDING_BYTE, PADDING_BYTE])
        .pad_to(header.disk_id_offset, 0)
        .append_padded(id, DISK_ID_SIZE, PADDING_BYTE)
        .append_padded(&[], header.id_filler, PADDING_BYTE)
        .pad_to(BLOCK_SIZE, 0);
    buffer.into_vec()
}

fn encode_side_header(layout: &Layout, side: &SideHeaderFormat, id: &[u8]) -> Vec<u8> {
    const IO_BYTE: u8 = 0xC0;
    const ENTRIES_OFFSET: usize = 0x10;
    let version = layout.dos_version();
    let mut buffer = Buffer::with_capacity(BLOCK_SIZE);
    buffer
        .append_bytes(&[side.next.0, side.next.1])
        .append_byte(version)
        .append_byte(version ^ 0xFF)
        .append_padded(id, 2, b' ')
        .append_byte(IO_BYTE)
        .append_byte(0x00)
        .pad_to(ENTRIES_OFFSET, 0)
        .pad_to(BLOCK_SIZE, 0);
    buffer.into_vec()
}

/// Render the header and BAM blocks for the current track occupancy.  The
/// caller is expected to have marked the system blocks as used already.
pub fn encode(layout: &Layout, tracks: &[Track], name: &[u8], id: &[u8]) -> Vec<(Location, Vec<u8>)> {
    let format = layout.bam;
    let mut blocks = BamBlocks(vec![]);
    *blocks.block_mut(format.header.location) = encode_header(layout, name, id);
    for side in format.side_headers {
        *blocks.block_mut(side.location) = encode_side_header(layout, side, id);
    }

    for section in format.sections {
        for i in 0..section.tracks {
            let track = section.first_track as usize + i;
            let entry = tracks[track].bam_entry();

            let offset = section.bitmap_offset + i * section.bitmap_stride;
            let block = blocks.block_mut(section.bitmap_location);
            entry.write_bitmap(&mut block[offset..offset + section.bitmap_size]);

            let offset = section.free_offset + i * section.free_stride;
            blocks.block_mut(section.free_location)[offset] = entry.free_sectors;
        }
    }

    debug!(
        "encoded BAM into {}",
        Location::format_locations(&blocks.0.iter().map(|(l, _)| *l).collect::<Vec<_>>())
    );
    blocks.0
}

/// Read the BAM entries for every track, in track order.
pub fn decode(format: &BamFormat, tracks: &[Track]) -> io::Result<Vec<BamEntry>> {
    let mut entries = Vec::with_capacity(format.tracks());
    for section in format.sections {
        let free_counts = read_block(tracks, section.free_location)?;
        let bitmaps = read_block(tracks, section.bitmap_location)?;
        for i in 0..section.tracks {
            let free_sectors = free_counts[section.free_offset + i * section.free_stride];
            let offset = section.bitmap_offset + i * section.bitmap_stride;
            entries.push(BamEntry::from_bytes(
                free_sectors,
                &bitmaps[offset..offset + section.bitmap_size],
            ));
        }
    }
    Ok(entries)
}

fn strip_padding(bytes: &[u8]) -> Vec<u8> {
    let end = bytes
        .iter()
        .rposition(|b| *b != PADDING_BYTE)
        .map_or(0, |p| p + 1);
    bytes[..end].to_vec()
}

/// Read the disk name and id from the header block.
pub fn decode_header(format: &BamFormat, tracks: &[Track]) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let header = &format.header;
    let block = read_block(tracks, header.location)?;
    let name = &block[header.disk_name_offset..header.disk_name_offset + DISK_NAME_SIZE];
    let id = &block[header.disk_id_offset..header.disk_id_offset + DISK_ID_SIZE];
    Ok((strip_padding(name), strip_padding(id)))
}

/// A printable allocation map: one line per track, '.' for free sectors and
/// 'x' for used ones.
pub struct BamMap<'a> {
    pub tracks: &'a [Track],
    pub blocks_free: usize,
}

impl<'a> fmt::Display for BamMap<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (number, track) in self.tracks.iter().enumerate().skip(1) {
            let entry = track.bam_entry();
            write!(
                f,
                "t{:02}: [{:02}/{:02}] ",
                number,
                entry.free_sectors,
                track.len()
            )?;
            for sector in 0..track.len() {
                let c = if entry.sector_map & (1u64 << sector) != 0 {
                    '.'
                } else {
                    'x'
                };
                f.write_char(c)?;
            }
            f.write_char('\n')?;
        }
        write!(f, "{} blocks free.", self.blocks_free)
    }
}
