use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;

use thiserror::Error;

use crate::disk::chain::ChainIterator;
use crate::disk::error::DiskError;
use crate::disk::Disk;
use crate::disk::Location;
use crate::util::petscii_lossy;

/// The owner name used for header, BAM, and directory blocks.
static SYSTEM_OWNER: &[u8] = b"CBM DOS";

/// A validation error represents an inconsistency in the disk image found by
/// `Disk::validate()`.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Sector {0} occupied by {name:?} but not marked used", name = petscii_lossy(.1))]
    SectorMisoccupied(Location, Vec<u8>),
    #[error(
        "Sector {0} occupied by multiple files, including at least: {first:?} {second:?}",
        first = petscii_lossy(.1),
        second = petscii_lossy(.2)
    )]
    SectorOveroccupied(Location, Vec<u8>, Vec<u8>),
    #[error("Error scanning {name:?}: {0}", name = petscii_lossy(.1))]
    FileScanError(DiskError, Vec<u8>),
}

/// Check that every block reachable from the directory is marked used and
/// belongs to exactly one owner.  This is a read-only operation.
pub fn validate(disk: &Disk) -> io::Result<Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = vec![];
    let mut owners: HashMap<Location, Vec<u8>> = HashMap::new();

    for location in disk.system_blocks() {
        owners.insert(*location, SYSTEM_OWNER.to_vec());
    }

    for entry in disk.iter().filter(|e| e.has_chain()) {
        let locations = match ChainIterator::new(disk.tracks(), entry.first_sector).locations() {
            Ok(locations) => locations,
            Err(e) => match DiskError::from_io_error(&e) {
                Some(e) => {
                    errors.push(ValidationError::FileScanError(e, entry.filename.clone()));
                    continue;
                }
                None => return Err(e),
            },
        };
        for location in locations {
            match owners.entry(location) {
                Entry::Occupied(owner) => {
                    errors.push(ValidationError::SectorOveroccupied(
                        location,
                        owner.get().clone(),
                        entry.filename.clone(),
                    ));
                }
                Entry::Vacant(v) => {
                    v.insert(entry.filename.clone());
                }
            }
        }
    }

    let mut occupied: Vec<(&Location, &Vec<u8>)> = owners.iter().collect();
    occupied.sort();
    for (location, owner) in occupied {
        if disk.tracks()[location.0 as usize].is_free(location.1)? {
            errors.push(ValidationError::SectorMisoccupied(*location, owner.clone()));
        }
    }

    Ok(errors)
}
