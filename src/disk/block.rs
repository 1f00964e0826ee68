use std::fmt;

use crate::disk::layout::Layout;

pub const BLOCK_SIZE: usize = 256;

/// A block of all zeros, which is what an unwritten sector reads as.
static EMPTY_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct Location(pub u8, pub u8); // Track and sector

impl Location {
    #[inline]
    pub fn new(track: u8, sector: u8) -> Location {
        Location(track, sector)
    }

    pub fn from_bytes(bytes: &[u8]) -> Location {
        assert!(bytes.len() >= 2);
        Location(bytes[0], bytes[1])
    }

    pub fn write_bytes(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= 2);
        bytes[0] = self.0;
        bytes[1] = self.1;
    }

    pub fn format_locations(locations: &[Location]) -> String {
        locations
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// The contents of one sector slot on a track.  A sector that was never
/// written holds no data at all, and is emitted as zeros.
#[derive(Clone, PartialEq)]
pub enum Sector {
    Empty,
    Occupied(Box<[u8; BLOCK_SIZE]>),
}

impl Sector {
    pub fn from_bytes(bytes: &[u8]) -> Sector {
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let mut block = Box::new([0u8; BLOCK_SIZE]);
        block.copy_from_slice(bytes);
        Sector::Occupied(block)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Sector::Empty)
    }

    /// Return the 256 bytes of this sector.  Empty sectors read as zeros.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Sector::Empty => &EMPTY_BLOCK[..],
            Sector::Occupied(block) => &block[..],
        }
    }
}

impl fmt::Debug for Sector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sector::Empty => write!(f, "Empty"),
            Sector::Occupied(block) => write!(f, "Occupied({:02x} {:02x} ..)", block[0], block[1]),
        }
    }
}

/// Iterate over every location of a layout in image order: ascending
/// tracks, and ascending sectors within each track.
pub struct LocationIterator {
    layout: &'static Layout,
    next: Option<Location>,
}

impl LocationIterator {
    pub fn new(layout: &'static Layout) -> LocationIterator {
        const FIRST_TRACK: u8 = 1;
        LocationIterator {
            layout,
            next: Some(Location::new(FIRST_TRACK, 0)),
        }
    }
}

impl Iterator for LocationIterator {
    type Item = Location;

    fn next(&mut self) -> Option<Location> {
        let location = self.next?;

        let mut next_location = location;
        next_location.1 += 1;
        if next_location.1 >= self.layout.sectors_in_track(next_location.0).unwrap_or(0) {
            next_location.0 += 1;
            next_location.1 = 0;
            if next_location.0 as usize > self.layout.tracks() {
                self.next = None;
                return Some(location);
            }
        }
        self.next = Some(next_location);
        Some(location)
    }
}
