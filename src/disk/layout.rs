use log::trace;

use crate::disk::bam::{BamFormat, BamSection, HeaderFormat, SideHeaderFormat};
use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::directory::ENTRY_SIZE;
use crate::disk::track::Track;

// The "next block" routines follow the CBM DOS habit of growing files away
// from the directory track, one interleave step at a time.

/// A contiguous run of tracks that share the same number of sectors.
pub struct Zone {
    pub tracks: u8,
    pub sectors: u8,
}

/// A `Layout` is the static description of one disk format: its zoned
/// geometry, where the directory and BAM live, and the interleave used when
/// extending chains.
pub struct Layout {
    /// The short tag used to select this layout ("d64", "d71", "d81").
    pub name: &'static str,
    /// Zones in image order.  Track numbers start at 1.
    pub zones: &'static [Zone],
    /// Tracks holding directory blocks.  The first is the primary directory
    /// track, which also holds the disk header.
    pub directory_tracks: &'static [u8],
    /// The sector of the first directory block on the primary directory
    /// track.
    pub first_directory_sector: u8,
    /// The two-byte DOS type written next to the disk id (e.g. "2A").
    pub dos_type: [u8; 2],
    /// Sector step used when extending a file chain.
    pub interleave: u8,
    /// Sector step used when extending the directory chain.
    pub directory_interleave: u8,
    /// Where the header and BAM live for this format.
    pub bam: &'static BamFormat,
}

static CBM_1541_ZONES: [Zone; 4] = [
    Zone { tracks: 17, sectors: 21 },
    Zone { tracks: 7, sectors: 19 },
    Zone { tracks: 6, sectors: 18 },
    Zone { tracks: 5, sectors: 17 },
];

// The 1571 repeats the 1541 zoning on its second side.
static CBM_1571_ZONES: [Zone; 8] = [
    Zone { tracks: 17, sectors: 21 },
    Zone { tracks: 7, sectors: 19 },
    Zone { tracks: 6, sectors: 18 },
    Zone { tracks: 5, sectors: 17 },
    Zone { tracks: 17, sectors: 21 },
    Zone { tracks: 7, sectors: 19 },
    Zone { tracks: 6, sectors: 18 },
    Zone { tracks: 5, sectors: 17 },
];

static CBM_1581_ZONES: [Zone; 1] = [Zone { tracks: 80, sectors: 40 }];

static D64_BAM_FORMAT: BamFormat = BamFormat {
    header: HeaderFormat {
        location: Location(18, 0),
        disk_name_offset: 0x90,
        disk_id_offset: 0xA2,
        id_filler: 4,
    },
    sections: &[BamSection {
        first_track: 1,
        tracks: 35,
        bitmap_location: Location(18, 0),
        bitmap_offset: 0x05,
        bitmap_size: 3,
        bitmap_stride: 4,
        free_location: Location(18, 0),
        free_offset: 0x04,
        free_stride: 4,
    }],
    side_headers: &[],
};

static D71_BAM_FORMAT: BamFormat = BamFormat {
    header: HeaderFormat {
        location: Location(18, 0),
        disk_name_offset: 0x90,
        disk_id_offset: 0xA2,
        id_filler: 4,
    },
    sections: &[
        BamSection {
            first_track: 1,
            tracks: 35,
            bitmap_location: Location(18, 0),
            bitmap_offset: 0x05,
            bitmap_size: 3,
            bitmap_stride: 4,
            free_location: Location(18, 0),
            free_offset: 0x04,
            free_stride: 4,
        },
        BamSection {
            first_track: 36,
            tracks: 35,
            bitmap_location: Location(53, 0),
            bitmap_offset: 0x00,
            bitmap_size: 3,
            bitmap_stride: 3,
            free_location: Location(18, 0),
            free_offset: 0xDD,
            free_stride: 1,
        },
    ],
    side_headers: &[],
};

static D81_BAM_FORMAT: BamFormat = BamFormat {
    header: HeaderFormat {
        location: Location(40, 0),
        disk_name_offset: 0x04,
        disk_id_offset: 0x16,
        id_filler: 2,
    },
    sections: &[
        BamSection {
            first_track: 1,
            tracks: 40,
            bitmap_location: Location(40, 1),
            bitmap_offset: 0x11,
            bitmap_size: 5,
            bitmap_stride: 6,
            free_location: Location(40, 1),
            free_offset: 0x10,
            free_stride: 6,
        },
        BamSection {
            first_track: 41,
            tracks: 40,
            bitmap_location: Location(40, 2),
            bitmap_offset: 0x11,
            bitmap_size: 5,
            bitmap_stride: 6,
            free_location: Location(40, 2),
            free_offset: 0x10,
            free_stride: 6,
        },
    ],
    side_headers: &[
        SideHeaderFormat {
            location: Location(40, 1),
            next: Location(40, 2),
        },
        SideHeaderFormat {
            location: Location(40, 2),
            next: Location(0, 0xFF),
        },
    ],
};

/// 1541 disk image, 35 tracks.
pub static D64_LAYOUT: Layout = Layout {
    name: "d64",
    zones: &CBM_1541_ZONES,
    directory_tracks: &[18],
    first_directory_sector: 1,
    dos_type: [b'2', b'A'],
    interleave: 10,
    directory_interleave: 3,
    bam: &D64_BAM_FORMAT,
};

/// 1571 disk image, 70 tracks on two sides.
pub static D71_LAYOUT: Layout = Layout {
    name: "d71",
    zones: &CBM_1571_ZONES,
    directory_tracks: &[18, 53],
    first_directory_sector: 1,
    dos_type: [b'2', b'A'],
    interleave: 6,
    directory_interleave: 3,
    bam: &D71_BAM_FORMAT,
};

/// 1581 disk image, 80 tracks of 40 sectors.
pub static D81_LAYOUT: Layout = Layout {
    name: "d81",
    zones: &CBM_1581_ZONES,
    directory_tracks: &[40],
    first_directory_sector: 3,
    dos_type: [b'3', b'D'],
    interleave: 1,
    directory_interleave: 1,
    bam: &D81_BAM_FORMAT,
};

/// The layout catalog, in the order used for size detection.
pub static LAYOUTS: [&Layout; 3] = [&D64_LAYOUT, &D71_LAYOUT, &D81_LAYOUT];

impl Layout {
    /// Look up a layout by its tag.
    pub fn find_by_name(name: &str) -> Option<&'static Layout> {
        let name = name.to_lowercase();
        LAYOUTS.iter().find(|layout| layout.name == name).copied()
    }

    /// Given a disk image size, return the first matching layout along with
    /// whether the image carries a trailing error table.
    pub fn find_by_size(size: usize) -> Option<(&'static Layout, bool)> {
        let (blocks, with_error_table) = if size % BLOCK_SIZE == 0 {
            (size / BLOCK_SIZE, false)
        } else if size % (BLOCK_SIZE + 1) == 0 {
            (size / (BLOCK_SIZE + 1), true)
        } else {
            return None;
        };
        LAYOUTS
            .iter()
            .find(|layout| layout.sectors() == blocks)
            .map(|layout| (*layout, with_error_table))
    }

    /// The total number of tracks.
    pub fn tracks(&self) -> usize {
        self.zones.iter().map(|z| z.tracks as usize).sum()
    }

    /// The total number of sectors.
    pub fn sectors(&self) -> usize {
        self.zones
            .iter()
            .map(|z| z.tracks as usize * z.sectors as usize)
            .sum()
    }

    /// Return the number of bytes used to represent a disk image in this
    /// layout, optionally with an error table attached.
    pub fn size(&self, with_error_table: bool) -> usize {
        if with_error_table {
            self.sectors() * (BLOCK_SIZE + 1)
        } else {
            self.sectors() * BLOCK_SIZE
        }
    }

    /// Return the number of sectors in the given track, or None if the track
    /// does not exist.
    pub fn sectors_in_track(&self, track: u8) -> Option<u8> {
        if track == 0 {
            return None;
        }
        let mut first_track = 1usize;
        for zone in self.zones {
            let next_track = first_track + zone.tracks as usize;
            if (track as usize) < next_track {
                return Some(zone.sectors);
            }
            first_track = next_track;
        }
        None
    }

    #[inline]
    pub fn directory_track(&self) -> u8 {
        self.directory_tracks[0]
    }

    #[inline]
    pub fn is_directory_track(&self, track: u8) -> bool {
        self.directory_tracks.contains(&track)
    }

    #[inline]
    pub fn first_directory_location(&self) -> Location {
        Location(self.directory_track(), self.first_directory_sector)
    }

    /// The DOS version byte stored in the header, e.g. 'A' for "2A".
    #[inline]
    pub fn dos_version(&self) -> u8 {
        self.dos_type[1]
    }

    #[inline]
    pub fn is_double_sided(&self) -> bool {
        self.tracks() == 70
    }

    /// Return the maximum number of directory entries this layout can hold
    /// once the header and BAM sectors are reserved.
    pub fn max_directory_entries(&self) -> usize {
        let reserved = self.bam.system_locations().len();
        let sectors: usize = self
            .directory_tracks
            .iter()
            .map(|t| self.sectors_in_track(*t).unwrap_or(0) as usize)
            .sum();
        (sectors - reserved) * BLOCK_SIZE / ENTRY_SIZE
    }

    /// Return the number of blocks available for file data on a blank disk.
    pub fn total_data_blocks(&self) -> usize {
        (1..=self.tracks() as u8)
            .filter(|t| !self.is_directory_track(*t))
            .map(|t| self.sectors_in_track(t).unwrap_or(0) as usize)
            .sum()
    }

    /// Find the first block of a new file: search outward from the primary
    /// directory track, alternating below and above it, and take the first
    /// free sector of the first track that has one.
    pub fn first_free_block(&self, tracks: &[Track]) -> Option<Location> {
        let directory_track = self.directory_track() as usize;
        let last_track = tracks.len() - 1;
        let mut distance = 1;
        while distance < directory_track || directory_track + distance <= last_track {
            if distance < directory_track {
                let track = directory_track - distance;
                if let Some(location) = self.first_free_on_track(tracks, track) {
                    return Some(location);
                }
            }
            if directory_track + distance <= last_track {
                let track = directory_track + distance;
                if let Some(location) = self.first_free_on_track(tracks, track) {
                    return Some(location);
                }
            }
            distance += 1;
        }
        None
    }

    fn first_free_on_track(&self, tracks: &[Track], track: usize) -> Option<Location> {
        if self.is_directory_track(track as u8) {
            return None;
        }
        tracks[track]
            .first_free()
            .map(|sector| Location(track as u8, sector))
    }

    /// Find the block that follows `previous` in a file chain.  The walk
    /// starts on the previous block's track and moves away from the
    /// directory track; when it runs off the disk it turns around once and
    /// continues on the other side of the directory track.
    pub fn next_free_block(&self, tracks: &[Track], previous: Location) -> Option<Location> {
        let directory_track = self.directory_track() as isize;
        let last_track = (tracks.len() - 1) as isize;
        let start_track = previous.0 as isize;
        let mut direction: isize = if start_track < directory_track { -1 } else { 1 };
        let mut changed_direction = false;

        let mut track = start_track;
        loop {
            if !self.is_directory_track(track as u8) {
                let ignore = if track == start_track {
                    Some(previous.1)
                } else {
                    None
                };
                let start = previous.1 as usize + self.interleave as usize;
                if let Some(sector) = tracks[track as usize].next_free(start, ignore) {
                    trace!("next block after {} -> ({},{})", previous, track, sector);
                    return Some(Location(track as u8, sector));
                }
            }
            track += direction;
            if track < 1 || track > last_track {
                if changed_direction {
                    return None;
                }
                changed_direction = true;
                direction = -direction;
                track = directory_track + direction;
                if track < 1 || track > last_track {
                    return None;
                }
            }
        }
    }

    /// Find the block that follows `previous` in the directory chain.  Unlike
    /// file chains, the directory only ever moves forward through the list of
    /// directory tracks.
    pub fn next_free_directory_block(
        &self,
        tracks: &[Track],
        previous: Location,
    ) -> Option<Location> {
        let index = self
            .directory_tracks
            .iter()
            .position(|t| *t == previous.0)?;
        for track in &self.directory_tracks[index..] {
            let ignore = if *track == previous.0 {
                Some(previous.1)
            } else {
                None
            };
            let start = previous.1 as usize + self.directory_interleave as usize;
            if let Some(sector) = tracks[*track as usize].next_free(start, ignore) {
                trace!("next directory block after {} -> ({},{})", previous, track, sector);
                return Some(Location(*track, sector));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_tracks(layout: &Layout) -> Vec<Track> {
        let mut tracks = vec![Track::new(0)];
        for zone in layout.zones {
            for _ in 0..zone.tracks {
                tracks.push(Track::new(zone.sectors));
            }
        }
        tracks
    }

    #[test]
    fn test_geometry() {
        assert_eq!(D64_LAYOUT.tracks(), 35);
        assert_eq!(D64_LAYOUT.sectors(), 683);
        assert_eq!(D71_LAYOUT.tracks(), 70);
        assert_eq!(D71_LAYOUT.sectors(), 1366);
        assert_eq!(D81_LAYOUT.tracks(), 80);
        assert_eq!(D81_LAYOUT.sectors(), 3200);
        assert_eq!(D64_LAYOUT.size(false), 174848);
        assert_eq!(D64_LAYOUT.size(true), 175531);
        assert!(D71_LAYOUT.is_double_sided());
        assert!(!D64_LAYOUT.is_double_sided());
        assert!(!D81_LAYOUT.is_double_sided());
    }

    #[test]
    fn test_sectors_in_track() {
        assert_eq!(D64_LAYOUT.sectors_in_track(0), None);
        assert_eq!(D64_LAYOUT.sectors_in_track(1), Some(21));
        assert_eq!(D64_LAYOUT.sectors_in_track(17), Some(21));
        assert_eq!(D64_LAYOUT.sectors_in_track(18), Some(19));
        assert_eq!(D64_LAYOUT.sectors_in_track(25), Some(18));
        assert_eq!(D64_LAYOUT.sectors_in_track(31), Some(17));
        assert_eq!(D64_LAYOUT.sectors_in_track(35), Some(17));
        assert_eq!(D64_LAYOUT.sectors_in_track(36), None);
        assert_eq!(D71_LAYOUT.sectors_in_track(36), Some(21));
        assert_eq!(D71_LAYOUT.sectors_in_track(53), Some(19));
        assert_eq!(D81_LAYOUT.sectors_in_track(80), Some(40));
    }

    #[test]
    fn test_find_layout() {
        assert_eq!(Layout::find_by_name("d64").map(|l| l.name), Some("d64"));
        assert_eq!(Layout::find_by_name("D81").map(|l| l.name), Some("d81"));
        assert!(Layout::find_by_name("d80").is_none());

        let (layout, errors) = Layout::find_by_size(174848).unwrap();
        assert_eq!(layout.name, "d64");
        assert!(!errors);
        let (layout, errors) = Layout::find_by_size(175531).unwrap();
        assert_eq!(layout.name, "d64");
        assert!(errors);
        let (layout, _) = Layout::find_by_size(1366 * 256).unwrap();
        assert_eq!(layout.name, "d71");
        let (layout, errors) = Layout::find_by_size(3200 * 257).unwrap();
        assert_eq!(layout.name, "d81");
        assert!(errors);
        assert!(Layout::find_by_size(174848 + 256).is_none());
        assert!(Layout::find_by_size(12345).is_none());
    }

    #[test]
    fn test_capacity() {
        assert_eq!(D64_LAYOUT.max_directory_entries(), 144);
        assert_eq!(D81_LAYOUT.max_directory_entries(), 296);
        assert_eq!(D64_LAYOUT.total_data_blocks(), 664);
        assert_eq!(D71_LAYOUT.total_data_blocks(), 1328);
        assert_eq!(D81_LAYOUT.total_data_blocks(), 3160);
    }

    #[test]
    fn test_first_free_block() {
        let mut tracks = blank_tracks(&D64_LAYOUT);
        assert_eq!(D64_LAYOUT.first_free_block(&tracks), Some(Location(17, 0)));
        for sector in 0..21 {
            tracks[17].mark_used(sector).unwrap();
        }
        assert_eq!(D64_LAYOUT.first_free_block(&tracks), Some(Location(19, 0)));

        let tracks = blank_tracks(&D81_LAYOUT);
        assert_eq!(D81_LAYOUT.first_free_block(&tracks), Some(Location(39, 0)));
    }

    #[test]
    fn test_next_free_block_interleave() {
        let mut tracks = blank_tracks(&D64_LAYOUT);
        let mut location = Location(17, 0);
        let mut chain = vec![location];
        for _ in 0..4 {
            let next = D64_LAYOUT.next_free_block(&tracks, location).unwrap();
            tracks[location.0 as usize].mark_used(location.1).unwrap();
            chain.push(next);
            location = next;
        }
        assert_eq!(
            chain,
            vec![
                Location(17, 0),
                Location(17, 10),
                Location(17, 20),
                // 30 wraps to 9, then steps back one sector.
                Location(17, 8),
                Location(17, 18),
            ]
        );
    }

    #[test]
    fn test_next_free_block_changes_direction() {
        let mut tracks = blank_tracks(&D64_LAYOUT);
        // Fill the whole bottom half except the previous block itself.
        for track in 1..18 {
            for sector in 0..21 {
                tracks[track].mark_used(sector).unwrap();
            }
        }
        let next = D64_LAYOUT.next_free_block(&tracks, Location(1, 3)).unwrap();
        assert_eq!(next.0, 19);

        let next = D64_LAYOUT.next_free_block(&tracks, Location(35, 0)).unwrap();
        assert_eq!(next, Location(35, 10));
    }

    #[test]
    fn test_next_free_block_disk_full() {
        let mut tracks = blank_tracks(&D64_LAYOUT);
        for track in 1..=35 {
            for sector in 0..D64_LAYOUT.sectors_in_track(track as u8).unwrap() {
                tracks[track].mark_used(sector).unwrap();
            }
        }
        assert_eq!(D64_LAYOUT.first_free_block(&tracks), None);
        assert_eq!(D64_LAYOUT.next_free_block(&tracks, Location(17, 0)), None);
    }

    #[test]
    fn test_d71_skips_second_directory_track() {
        let mut tracks = blank_tracks(&D71_LAYOUT);
        for sector in 0..21 {
            tracks[52].mark_used(sector).unwrap();
        }
        let next = D71_LAYOUT.next_free_block(&tracks, Location(52, 0)).unwrap();
        assert_eq!(next.0, 54);
    }

    #[test]
    fn test_directory_chain() {
        let mut tracks = blank_tracks(&D64_LAYOUT);
        tracks[18].mark_used(0).unwrap();
        let mut location = D64_LAYOUT.first_directory_location();
        let mut sectors = vec![location.1];
        while let Some(next) = D64_LAYOUT.next_free_directory_block(&tracks, location) {
            tracks[18].mark_used(location.1).unwrap();
            sectors.push(next.1);
            location = next;
        }
        assert_eq!(
            sectors,
            vec![1, 4, 7, 10, 13, 16, 2, 5, 8, 11, 14, 17, 3, 6, 9, 12, 15, 18]
        );
    }
}
