//! This is a Rust library for building and parsing the disk images used by
//! Commodore Business Machines (CBM) disk drives of the 1980's: the 1541
//! (D64), the double-sided 1571 (D71), and the 3.5" 1581 (D81).
//!
//! Features:
//!
//! * Assemble a disk image in memory from a list of files, laid out the way
//! CBM DOS lays them out: zoned track geometry, interleaved sector chains,
//! and directory blocks on the directory track.
//! * Render the Block Availability Map (BAM) and disk header for each format.
//! * Place raw blocks at fixed locations (e.g. boot sectors) before adding
//! files.
//! * Parse an existing image, including images with a trailing error table,
//! and read files back out of it.
//! * Optionally restore sector occupancy from the on-disk BAM so a parsed
//! image can be extended and written again.
//! * Validate the consistency of a disk image.
//! * A sample `cdisk` program for building and inspecting D64/D71/D81 images.
//!
//! Current shortcomings:
//!
//! * Files cannot be deleted or renamed once added.
//! * Relative (REL) files and GEOS structures are not interpreted.
//! * Error tables are carried through, but not used for anything useful.
//!
//! # Example
//!
//! The following example builds a D64 image holding one program, writes it
//! out, and reads the program back from the raw bytes:
//!
//! ```
//! use std::io;
//! use cbmdisk::disk::Disk;
//! # fn build() -> io::Result<()> {
//!
//! let mut disk = Disk::create("d64", b"GAMES", b"ab")?;
//! disk.add_file(b"HELLO", &[0x01, 0x08, 0x0b, 0x08])?;
//! let bytes = disk.to_bytes()?;
//! assert_eq!(bytes.len(), 174848);
//!
//! let parsed = Disk::from_bytes(&bytes)?;
//! assert_eq!(parsed.read_file(b"HELLO")?, vec![0x01, 0x08, 0x0b, 0x08]);
//! # Ok(())
//! # }
//! # build().unwrap();
//! ```

pub mod disk;
mod util;
