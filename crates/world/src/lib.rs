//! In-memory voxel chunk model: bit-packed cell storage, the classic
//! (block-id era) chunk format, and per-column height maps.
//!
//! This crate is pure data manipulation -- no I/O, no locking. Callers
//! needing concurrency serialize access externally; the companion
//! `quarry-region` crate layers the on-disk region container on top.

pub mod bits;
pub mod block;
pub mod chunk;
pub mod heightmap;

pub use block::ClassicBlock;
pub use chunk::{Chunk, ClassicChunk};
pub use heightmap::{HeightMap, HeightMapChannel, HeightMapError};
