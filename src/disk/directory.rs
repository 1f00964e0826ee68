//! CBM DOS directories

use std::fmt;
use std::io;

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::chain::ChainIterator;
use crate::disk::error::DiskError;
use crate::disk::track::Track;
use crate::util::{petscii_lossy, Buffer, ByteOrder};

const FILE_TYPE_DEL: u8 = 0x00;
const FILE_TYPE_SEQ: u8 = 0x01;
const FILE_TYPE_PRG: u8 = 0x02;
const FILE_TYPE_USR: u8 = 0x03;
const FILE_TYPE_REL: u8 = 0x04;
const FILE_ATTRIB_FILE_TYPE_MASK: u8 = 0x07;
const FILE_ATTRIB_LOCKED_MASK: u8 = 0x40;
const FILE_ATTRIB_CLOSED_MASK: u8 = 0x80;

pub const ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;
pub const FILENAME_SIZE: usize = 16;
const ENTRY_FILE_ATTRIBUTE_OFFSET: usize = 0x02;
const ENTRY_FIRST_SECTOR_OFFSET: usize = 0x03;
const ENTRY_FILENAME_OFFSET: usize = 0x05;
const EXTRA_SIZE: usize = 9;
const ENTRY_FILE_SIZE_OFFSET: usize = 0x1E;
const PADDING_BYTE: u8 = 0xA0;

/// The link written into the last block of the directory chain.
pub const LAST_DIRECTORY_LINK: Location = Location(0x00, 0xFF);

/// A directory entry categorizes files as SEQ, PRG, USR, or REL, along with a
/// pseudo-file-type of DEL to indicate deleted files.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FileType {
    DEL,
    SEQ,
    PRG,
    USR,
    REL,
    Unknown(u8),
}

impl FileType {
    pub fn from_string(string: &str) -> Option<FileType> {
        match string.to_uppercase().as_str() {
            "DEL" => Some(FileType::DEL),
            "SEQ" => Some(FileType::SEQ),
            "PRG" => Some(FileType::PRG),
            "USR" => Some(FileType::USR),
            "REL" => Some(FileType::REL),
            _ => None,
        }
    }

    /// Return true for the types whose contents are a single plain block
    /// chain.  REL files also need side sectors and a record length.
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            FileType::DEL | FileType::SEQ | FileType::PRG | FileType::USR
        )
    }

    fn from_code(code: u8) -> FileType {
        match code {
            FILE_TYPE_DEL => FileType::DEL,
            FILE_TYPE_SEQ => FileType::SEQ,
            FILE_TYPE_PRG => FileType::PRG,
            FILE_TYPE_USR => FileType::USR,
            FILE_TYPE_REL => FileType::REL,
            b => FileType::Unknown(b),
        }
    }

    fn code(&self) -> u8 {
        match *self {
            FileType::DEL => FILE_TYPE_DEL,
            FileType::SEQ => FILE_TYPE_SEQ,
            FileType::PRG => FILE_TYPE_PRG,
            FileType::USR => FILE_TYPE_USR,
            FileType::REL => FILE_TYPE_REL,
            FileType::Unknown(b) => b & FILE_ATTRIB_FILE_TYPE_MASK,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FileType::DEL => "del",
            FileType::SEQ => "seq",
            FileType::PRG => "prg",
            FileType::USR => "usr",
            FileType::REL => "rel",
            FileType::Unknown(_) => "unk",
        })
    }
}

/// The full 8-bit type field of a directory entry: the file type in the low
/// bits and the flags in the high bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub file_type: FileType,
    /// Bit 6, shown as "<" in directory listings.
    pub locked_flag: bool,
    /// Bit 7.  Unclosed files are shown with a "*" ("splat files").
    pub closed_flag: bool,
}

impl FileAttributes {
    /// Attributes of a normal, closed and unlocked file.
    pub fn closed(file_type: FileType) -> FileAttributes {
        FileAttributes {
            file_type,
            locked_flag: false,
            closed_flag: true,
        }
    }

    pub fn from_byte(byte: u8) -> FileAttributes {
        FileAttributes {
            file_type: FileType::from_code(byte & FILE_ATTRIB_FILE_TYPE_MASK),
            locked_flag: byte & FILE_ATTRIB_LOCKED_MASK != 0,
            closed_flag: byte & FILE_ATTRIB_CLOSED_MASK != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = self.file_type.code();
        if self.locked_flag {
            byte |= FILE_ATTRIB_LOCKED_MASK;
        }
        if self.closed_flag {
            byte |= FILE_ATTRIB_CLOSED_MASK;
        }
        byte
    }
}

impl fmt::Display for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.closed_flag { ' ' } else { '*' },
            self.file_type,
            if self.locked_flag { "<" } else { " " },
        )
    }
}

/// A CBM DOS directory entry.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The filename without its 0xA0 padding.
    pub filename: Vec<u8>,
    pub file_attributes: FileAttributes,
    /// The first block of the file's chain, or (0,0) when it has none.
    pub first_sector: Location,
    /// The length of the file in blocks.
    pub file_size: u16,
}

impl DirectoryEntry {
    pub fn new(
        filename: &[u8],
        file_type: FileType,
        first_sector: Location,
        file_size: u16,
    ) -> io::Result<DirectoryEntry> {
        check_filename_validity(filename)?;
        Ok(DirectoryEntry {
            filename: filename.to_vec(),
            file_attributes: FileAttributes::closed(file_type),
            first_sector,
            file_size,
        })
    }

    /// Parse a 32-byte directory slot.  The first two bytes belong to the
    /// directory block rather than the entry and are ignored.
    pub fn from_bytes(bytes: &[u8]) -> DirectoryEntry {
        assert_eq!(bytes.len(), ENTRY_SIZE);
        let filename = &bytes[ENTRY_FILENAME_OFFSET..ENTRY_FILENAME_OFFSET + FILENAME_SIZE];
        let end = filename
            .iter()
            .rposition(|b| *b != PADDING_BYTE)
            .map_or(0, |p| p + 1);
        DirectoryEntry {
            filename: filename[..end].to_vec(),
            file_attributes: FileAttributes::from_byte(bytes[ENTRY_FILE_ATTRIBUTE_OFFSET]),
            first_sector: Location::from_bytes(&bytes[ENTRY_FIRST_SECTOR_OFFSET..]),
            file_size: ((bytes[ENTRY_FILE_SIZE_OFFSET + 1] as u16) << 8)
                | (bytes[ENTRY_FILE_SIZE_OFFSET] as u16),
        }
    }

    /// Append the 30 bytes that follow the slot's link position.
    pub fn encode(&self, buffer: &mut Buffer) {
        buffer
            .append_byte(self.file_attributes.to_byte())
            .append_bytes(&[self.first_sector.0, self.first_sector.1])
            .append_padded(&self.filename, FILENAME_SIZE, PADDING_BYTE)
            .append_zeros(EXTRA_SIZE)
            .append_int(self.file_size as u64, 2, ByteOrder::LittleEndian);
    }

    #[inline]
    pub fn file_type(&self) -> FileType {
        self.file_attributes.file_type
    }

    /// Return true if this entry has a chain to follow.
    #[inline]
    pub fn has_chain(&self) -> bool {
        self.first_sector.0 != 0
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:<4} {:18}{}",
            self.file_size,
            format!("\"{}\"", petscii_lossy(&self.filename)),
            self.file_attributes
        )?;
        if f.alternate() {
            write!(f, " {}", self.first_sector)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "\"{}\",{},{} @ {}",
            petscii_lossy(&self.filename),
            self.file_size,
            self.file_attributes.file_type,
            self.first_sector
        )
    }
}

/// Confirm that the specified filename fits in a directory entry.
pub fn check_filename_validity(filename: &[u8]) -> io::Result<()> {
    if filename.len() > FILENAME_SIZE {
        return Err(DiskError::NameTooLong.into());
    }
    Ok(())
}

/// Render one directory block: the chain link in slot 0's first two bytes,
/// then up to eight entries, with unused slots left zero.
pub fn encode_directory_block(link: Location, entries: &[DirectoryEntry]) -> Vec<u8> {
    assert!(entries.len() <= ENTRIES_PER_BLOCK);
    let mut buffer = Buffer::with_capacity(BLOCK_SIZE);
    for slot in 0..ENTRIES_PER_BLOCK {
        if slot == 0 {
            buffer.append_bytes(&[link.0, link.1]);
        } else {
            buffer.append_zeros(2);
        }
        match entries.get(slot) {
            Some(entry) => entry.encode(&mut buffer),
            None => {
                buffer.append_zeros(ENTRY_SIZE - 2);
            }
        }
    }
    buffer.into_vec()
}

/// Iterate over the entries of a directory chain.  Slots whose type byte is
/// zero are empty and are skipped.
pub struct DirectoryIterator<'a> {
    chain: ChainIterator<'a>,
    entries: std::vec::IntoIter<DirectoryEntry>,
}

impl<'a> DirectoryIterator<'a> {
    pub fn new(tracks: &'a [Track], start: Location) -> DirectoryIterator<'a> {
        DirectoryIterator {
            chain: ChainIterator::directory(tracks, start),
            entries: vec![].into_iter(),
        }
    }
}

impl<'a> Iterator for DirectoryIterator<'a> {
    type Item = io::Result<DirectoryEntry>;

    fn next(&mut self) -> Option<io::Result<DirectoryEntry>> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some(Ok(entry));
            }
            let block = match self.chain.next()? {
                Ok(block) => block,
                Err(e) => return Some(Err(e)),
            };
            self.entries = block
                .data
                .chunks(ENTRY_SIZE)
                .filter(|chunk| chunk[ENTRY_FILE_ATTRIBUTE_OFFSET] != 0)
                .map(DirectoryEntry::from_bytes)
                .collect::<Vec<_>>()
                .into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_attributes() {
        let attributes = FileAttributes::from_byte(0x82);
        assert_eq!(attributes.file_type, FileType::PRG);
        assert!(attributes.closed_flag);
        assert!(!attributes.locked_flag);
        assert_eq!(attributes.to_byte(), 0x82);

        let attributes = FileAttributes::from_byte(0xC1);
        assert_eq!(attributes.file_type, FileType::SEQ);
        assert!(attributes.locked_flag);
        assert_eq!(attributes.to_string(), " seq<");

        // Only the low three bits carry the type.
        assert_eq!(FileAttributes::from_byte(0x8B).file_type, FileType::USR);
        assert_eq!(FileAttributes::from_byte(0x06).file_type, FileType::Unknown(6));
        assert_eq!(FileAttributes::from_byte(0x02).to_string(), "*prg ");
    }

    #[test]
    fn test_file_type_names() {
        assert_eq!(FileType::from_string("prg"), Some(FileType::PRG));
        assert_eq!(FileType::from_string("Usr"), Some(FileType::USR));
        assert_eq!(FileType::from_string("exe"), None);
        assert_eq!(FileType::SEQ.to_string(), "seq");
        assert!(FileType::USR.is_linear());
        assert!(!FileType::REL.is_linear());
        assert!(!FileType::Unknown(5).is_linear());
    }

    #[test]
    fn test_directory_entry() {
        // 00016620: 5347 8211 0541 5343 4949 2043 4f44 4553  SG...ASCII CODES
        // 00016630: a0a0 a0a0 a000 0000 0000 0000 0000 0600  ................
        static BUFFER: [u8; ENTRY_SIZE] = [
            0x53, 0x47, 0x82, 0x11, 0x05, 0x41, 0x53, 0x43, 0x49, 0x49, 0x20, 0x43, 0x4f, 0x44,
            0x45, 0x53, 0xa0, 0xa0, 0xa0, 0xa0, 0xa0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x06, 0x00,
        ];
        let entry = DirectoryEntry::from_bytes(&BUFFER);
        assert_eq!(entry.file_type(), FileType::PRG);
        assert!(entry.file_attributes.closed_flag);
        assert_eq!(entry.first_sector, Location(0x11, 0x05));
        assert_eq!(entry.filename, b"ASCII CODES");
        assert_eq!(entry.file_size, 6);
        assert_eq!(entry.to_string(), "6    \"ASCII CODES\"      prg ");

        let mut buffer = Buffer::new();
        entry.encode(&mut buffer);
        assert_eq!(buffer.as_slice(), &BUFFER[2..]);
    }

    #[test]
    fn test_filename_length() {
        assert!(DirectoryEntry::new(b"SIXTEEN CHARS!!!", FileType::PRG, Location(1, 0), 1).is_ok());
        let e = DirectoryEntry::new(b"SEVENTEEN CHARS!!", FileType::PRG, Location(1, 0), 1);
        assert_eq!(e.unwrap_err(), DiskError::NameTooLong);
    }

    #[test]
    fn test_directory_block() {
        let entries = vec![
            DirectoryEntry::new(b"ONE", FileType::PRG, Location(17, 0), 3).unwrap(),
            DirectoryEntry::new(b"TWO", FileType::SEQ, Location(17, 10), 300).unwrap(),
        ];
        let block = encode_directory_block(Location(18, 4), &entries);
        assert_eq!(block.len(), BLOCK_SIZE);
        assert_eq!(&block[0..5], &[18, 4, 0x82, 17, 0]);
        assert_eq!(&block[5..9], b"ONE\xA0");
        assert_eq!(&block[0x1E..0x20], &[3, 0]);
        assert_eq!(&block[0x20..0x25], &[0, 0, 0x81, 17, 10]);
        assert_eq!(&block[0x3E..0x40], &[0x2C, 0x01]);
        assert!(block[0x40..].iter().all(|b| *b == 0));

        let block = encode_directory_block(LAST_DIRECTORY_LINK, &[]);
        assert_eq!(&block[0..2], &[0x00, 0xFF]);
        assert!(block[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_directory_iterator() {
        let mut tracks = vec![Track::new(0), Track::new(4)];
        let names: Vec<Vec<u8>> = (0..10).map(|i| format!("FILE{}", i).into_bytes()).collect();
        let entries: Vec<DirectoryEntry> = names
            .iter()
            .map(|n| DirectoryEntry::new(n, FileType::PRG, Location(1, 3), 1).unwrap())
            .collect();
        let first = encode_directory_block(Location(1, 2), &entries[..8]);
        let second = encode_directory_block(LAST_DIRECTORY_LINK, &entries[8..]);
        tracks[1].write(1, &first, true, 0).unwrap();
        tracks[1].write(2, &second, true, 0).unwrap();

        let listed = DirectoryIterator::new(&tracks, Location(1, 1))
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(listed, entries);
    }

    #[test]
    fn test_directory_iterator_tail_links() {
        let mut tracks = vec![Track::new(0), Track::new(4)];
        let entries: Vec<DirectoryEntry> = (0..8)
            .map(|i| {
                let name = format!("FILE{}", i).into_bytes();
                DirectoryEntry::new(&name, FileType::SEQ, Location(1, 0), 2).unwrap()
            })
            .collect();

        // Any zero track ends the walk, and all eight slots are still read.
        for tail in &[Location(0, 0), Location(0, 0x1F), LAST_DIRECTORY_LINK] {
            tracks[1].write(1, &encode_directory_block(*tail, &entries), true, 0).unwrap();
            let listed = DirectoryIterator::new(&tracks, Location(1, 1))
                .collect::<io::Result<Vec<_>>>()
                .unwrap();
            assert_eq!(listed, entries);
        }

        // A zeroed block is an empty directory.
        assert_eq!(DirectoryIterator::new(&tracks, Location(1, 2)).count(), 0);
    }
}
