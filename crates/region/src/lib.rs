//! On-disk region container for classic chunk documents.
//!
//! A region file aggregates up to 1024 chunks (a 32x32 grid) behind an
//! 8 KiB header of sector locations and timestamps; each stored chunk is
//! a compressed tag-tree document. [`RegionFile`] owns the sector
//! bookkeeping, the compression scheme dispatch, and the decode cache;
//! the in-memory block model lives in `quarry-world`.
//!
//! All I/O is blocking and stream-scoped: the caller owns the stream and
//! must guarantee exclusive access for the span of a single load or save
//! call -- nothing here retains it.

use thiserror::Error;

mod region;
mod schema;

pub use region::{LoadApproach, RegionFile, REGION_CHUNKS, REGION_SIZE};

/// Malformed on-disk structure. Section-level malformations abort the
/// whole chunk decode; a missing *optional* array is not an error.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("section Y index {0} outside 0..16")]
    BadSectionY(u8),
    #[error("section {y} is missing its block id array")]
    MissingBlockArray { y: u8 },
    #[error("section {y} array {field:?} has length {actual}, expected {expected}")]
    BadArrayLength {
        y: u8,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported compression scheme {0}")]
    UnsupportedCompression(u8),
    #[error("unsupported data version {0} (paletted era)")]
    UnsupportedDataVersion(i32),
    #[error("chunk payload length {len} does not fit its {sectors} allocated sectors")]
    PayloadOverrun { len: u32, sectors: u8 },
    #[error("chunk document compresses to {sectors} sectors, more than a slot can address")]
    OversizedChunk { sectors: usize },
}

/// Any failure surfaced by region load, decode, or save.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("chunk document: {0}")]
    Nbt(#[from] fastnbt::error::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
}
