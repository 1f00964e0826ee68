use std::io;

use thiserror::Error;

/// Errors that can be returned from disk image operations.  These are
/// generally converted into `io::Error`.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DiskError {
    /// Unknown error
    #[error("unknown error")]
    Unknown,
    /// The requested disk type is not part of the layout catalog
    #[error("unknown disk type")]
    InvalidGeometry,
    /// The image size does not match any known layout
    #[error("unable to determine disk format from image size")]
    UnknownFormat,
    /// Bad track or sector
    #[error("bad track or sector")]
    OutOfRange,
    /// Block data is not exactly one sector long
    #[error("block data must be 256 bytes")]
    InvalidBlockLength,
    /// Disk name, disk id, or filename exceeds its field width
    #[error("name exceeds maximum length")]
    NameTooLong,
    /// No free block left for file data
    #[error("disk is full")]
    DiskFull,
    /// No free block left on the directory tracks
    #[error("directory is full")]
    DirectoryFull,
    /// The sector carries a nonzero error code
    #[error("sector has read error {0:#04x}")]
    SectorReadError(u8),
    /// File not found
    #[error("file not found")]
    NotFound,
    /// The block is already in use
    #[error("block already used")]
    DuplicateAllocation,
    /// Chain loop detected
    #[error("chain loop detected")]
    ChainLoop,
    /// Invalid chain link
    #[error("invalid chain link")]
    InvalidChainLink,
    /// The file type needs more structure than a plain block chain
    #[error("file type cannot be stored as a linear file")]
    NonLinearFile,
}

impl From<DiskError> for io::Error {
    fn from(error: DiskError) -> io::Error {
        use self::DiskError::*;
        use std::io::ErrorKind::*;
        let kind = match error {
            Unknown => Other,
            InvalidGeometry => InvalidInput,
            UnknownFormat => InvalidData,
            OutOfRange => InvalidInput,
            InvalidBlockLength => InvalidInput,
            NameTooLong => InvalidInput,
            DiskFull => Other,
            DirectoryFull => Other,
            SectorReadError(_) => InvalidData,
            self::DiskError::NotFound => io::ErrorKind::NotFound,
            DuplicateAllocation => InvalidInput,
            ChainLoop => InvalidData,
            InvalidChainLink => InvalidData,
            NonLinearFile => InvalidInput,
        };
        io::Error::new(kind, error)
    }
}

impl From<io::Error> for DiskError {
    fn from(error: io::Error) -> DiskError {
        DiskError::from_io_error(&error).unwrap_or(DiskError::Unknown)
    }
}

impl DiskError {
    /// If the provided `io::Error` contains a `DiskError`, return the
    /// underlying `DiskError`.  If not, return None.
    pub fn from_io_error(error: &io::Error) -> Option<DiskError> {
        error
            .get_ref()
            .and_then(|e| e.downcast_ref::<DiskError>())
            .cloned()
    }

    /// This is sometimes useful instead of .into() when the compiler doesn't
    /// have enough information to perform type inference.
    pub fn to_io_error(&self) -> io::Error {
        self.clone().into()
    }
}

impl PartialEq<io::Error> for DiskError {
    fn eq(&self, other: &io::Error) -> bool {
        matches!(DiskError::from_io_error(other), Some(ref e) if e == self)
    }
}

impl PartialEq<DiskError> for io::Error {
    fn eq(&self, other: &DiskError) -> bool {
        matches!(DiskError::from_io_error(self), Some(ref e) if e == other)
    }
}
