use std::collections::HashSet;
use std::io;

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::error::DiskError;
use crate::disk::track::{read_block, Track};

/// The number of payload bytes a chained block carries after its link.
pub const CHAIN_PAYLOAD_SIZE: usize = BLOCK_SIZE - 2;

/// The first two bytes of a chained block: either the location of the next
/// block, or the marker of the last block along with how many bytes of it
/// are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    Next(Location),
    Tail(usize), // used bytes, counting the link itself
}

impl ChainLink {
    #[inline]
    pub fn new(block: &[u8]) -> io::Result<ChainLink> {
        if block[0] == 0x00 {
            // The link bytes themselves always count as used.
            if block[1] < 1 {
                return Err(DiskError::InvalidChainLink.into());
            }
            Ok(ChainLink::Tail(block[1] as usize + 1)) // 2..=256
        } else {
            Ok(ChainLink::Next(Location::new(block[0], block[1])))
        }
    }

    /// The tail link for a last block holding `payload` data bytes.
    #[inline]
    pub fn tail_for_payload(payload: usize) -> ChainLink {
        ChainLink::Tail(payload + 2)
    }

    #[inline]
    pub fn to_bytes(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= 2);
        match self {
            ChainLink::Next(location) => location.write_bytes(bytes),
            ChainLink::Tail(size) => {
                assert!(*size >= 2 && *size <= BLOCK_SIZE);
                bytes[0] = 0x00;
                bytes[1] = (*size - 1) as u8;
            }
        }
    }
}

/// Build one 256-byte chained block from a link and up to 254 payload bytes.
pub fn encode_chain_block(link: ChainLink, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= CHAIN_PAYLOAD_SIZE);
    let mut block = vec![0u8; BLOCK_SIZE];
    link.to_bytes(&mut block);
    block[2..2 + payload.len()].copy_from_slice(payload);
    block
}

/// One block of a chain: where it was read from, and the bytes it uses
/// (including the two-byte link).
pub struct ChainSector {
    pub location: Location,
    pub data: Vec<u8>,
}

impl ChainSector {
    /// The data bytes, without the link.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[2..]
    }
}

/// Walk a chain of blocks from its first location, yielding each block in
/// order.  A block that is reached twice ends the walk with `ChainLoop`.
pub struct ChainIterator<'a> {
    tracks: &'a [Track],
    next_sector: Option<Location>,
    visited_sectors: HashSet<Location>,
    whole_blocks: bool,
}

impl<'a> ChainIterator<'a> {
    pub fn new(tracks: &'a [Track], start: Location) -> ChainIterator<'a> {
        ChainIterator {
            tracks,
            next_sector: Some(start),
            visited_sectors: HashSet::new(),
            whole_blocks: false,
        }
    }

    /// Walk a directory chain.  Any link with a zero track ends the chain,
    /// and the last block is yielded whole whatever its second link byte.
    pub fn directory(tracks: &'a [Track], start: Location) -> ChainIterator<'a> {
        ChainIterator {
            whole_blocks: true,
            ..ChainIterator::new(tracks, start)
        }
    }

    /// Read the entire chain and return a list of locations.
    pub fn locations(self) -> io::Result<Vec<Location>> {
        self.map(|r| r.map(|cs| cs.location)).collect()
    }

    /// Read the entire chain and return the concatenated payload.
    pub fn read_all(self) -> io::Result<Vec<u8>> {
        let mut data = vec![];
        for sector in self {
            data.extend_from_slice(sector?.payload());
        }
        Ok(data)
    }
}

impl<'a> Iterator for ChainIterator<'a> {
    type Item = io::Result<ChainSector>;

    fn next(&mut self) -> Option<io::Result<ChainSector>> {
        let location = self.next_sector.take()?;

        if !self.visited_sectors.insert(location) {
            return Some(Err(DiskError::ChainLoop.into()));
        }

        let block = match read_block(self.tracks, location) {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };

        if self.whole_blocks && block[0] == 0x00 {
            return Some(Ok(ChainSector {
                location,
                data: block.to_vec(),
            }));
        }

        let size = match ChainLink::new(block) {
            Ok(ChainLink::Next(next)) => {
                self.next_sector = Some(next);
                BLOCK_SIZE
            }
            Ok(ChainLink::Tail(size)) => size,
            Err(e) => return Some(Err(e)),
        };

        Some(Ok(ChainSector {
            location,
            data: block[..size].to_vec(),
        }))
    }
}
