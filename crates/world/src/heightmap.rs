use std::collections::HashMap;

use thiserror::Error;

use crate::bits::PackedArray;
use crate::chunk::{
    cell_index, Chunk, ClassicChunk, ClassicSection, SECTION_SIZE, SECTIONS_PER_CHUNK,
};

/// Columns in one chunk footprint (16 x 16).
const COLUMNS: usize = SECTION_SIZE * SECTION_SIZE;

/// Bits per column in a typed channel; heights 0..=256 need 9.
const CHANNEL_CELL_WIDTH: usize = 9;

/// Named channels of the typed (post-classic) height map era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeightMapChannel {
    MotionBlocking,
    MotionBlockingNoLeaves,
    OceanFloor,
    WorldSurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeightMapError {
    /// The map is a derived cache; it holds nothing until calculated.
    #[error("height map has not been calculated")]
    NotComputed,
    /// Scalar accessor against a typed-storage map.
    #[error("scalar accessor used on a typed height map")]
    LegacyAccessorOnTyped,
    /// Channel accessor against a legacy-storage map.
    #[error("channel accessor used on a legacy height map")]
    ChannelAccessorOnLegacy,
    #[error("channel {0:?} not present in this height map")]
    MissingChannel(HeightMapChannel),
}

/// Cached top-of-column heights for one chunk.
///
/// The two storage forms are format-locked: classic chunks always
/// produce the legacy scalar form, newer eras carry named channels.
/// The accessors never convert between them -- asking a legacy map for
/// a channel (or vice versa) is an error, not a fallback.
#[derive(Clone, Default)]
pub struct HeightMap {
    storage: Option<Storage>,
}

#[derive(Clone)]
enum Storage {
    /// One scalar height per column, any block counts.
    Legacy(Box<[u16; COLUMNS]>),
    /// One bit-packed array per named channel.
    Typed(HashMap<HeightMapChannel, PackedArray>),
}

impl HeightMap {
    /// An empty, not-yet-calculated map.
    pub fn new() -> Self {
        Self { storage: None }
    }

    /// A typed-era map over decoded channel words.
    ///
    /// Panics if a channel's word buffer holds fewer than 256 cells.
    pub fn from_channels(
        channels: impl IntoIterator<Item = (HeightMapChannel, Vec<u64>)>,
    ) -> Self {
        let channels: HashMap<_, _> = channels
            .into_iter()
            .map(|(channel, words)| (channel, PackedArray::from_words(words, CHANNEL_CELL_WIDTH)))
            .collect();
        for array in channels.values() {
            assert!(array.len() >= COLUMNS, "channel shorter than 256 columns");
        }
        Self {
            storage: Some(Storage::Typed(channels)),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.storage.is_some()
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.storage, Some(Storage::Legacy(_)))
    }

    pub fn is_typed(&self) -> bool {
        matches!(self.storage, Some(Storage::Typed(_)))
    }

    /// Recompute from the chunk's current blocks. A classic chunk locks
    /// the map into legacy storage.
    ///
    /// Full rescan, not incremental: every column starts in the topmost
    /// allocated section and walks world-Y downward, stopping at the
    /// first non-air block; an entirely air column is height 0.
    pub fn calculate(&mut self, chunk: &Chunk) {
        match chunk {
            Chunk::Classic(chunk) => self.calculate_classic(chunk),
        }
    }

    /// Classic-chunk form of [`HeightMap::calculate`].
    pub fn calculate_classic(&mut self, chunk: &ClassicChunk) {
        *self = Self::of_classic_sections(chunk.sections_raw());
    }

    pub(crate) fn of_classic_sections(
        sections: &[Option<ClassicSection>; SECTIONS_PER_CHUNK],
    ) -> Self {
        let mut heights = Box::new([0u16; COLUMNS]);
        for z in 0..SECTION_SIZE {
            for x in 0..SECTION_SIZE {
                heights[z * SECTION_SIZE + x] = column_height(sections, x, z);
            }
        }
        Self {
            storage: Some(Storage::Legacy(heights)),
        }
    }

    /// Height of column `(x, z)` in a legacy map. Coordinates are masked
    /// to the chunk footprint.
    pub fn get_at(&self, x: usize, z: usize) -> Result<u16, HeightMapError> {
        match &self.storage {
            None => Err(HeightMapError::NotComputed),
            Some(Storage::Legacy(heights)) => Ok(heights[(z & 15) * SECTION_SIZE + (x & 15)]),
            Some(Storage::Typed(_)) => Err(HeightMapError::LegacyAccessorOnTyped),
        }
    }

    /// Height of column `(x, z)` in the given channel of a typed map.
    pub fn get_at_channel(
        &self,
        x: usize,
        z: usize,
        channel: HeightMapChannel,
    ) -> Result<u16, HeightMapError> {
        match &self.storage {
            None => Err(HeightMapError::NotComputed),
            Some(Storage::Legacy(_)) => Err(HeightMapError::ChannelAccessorOnLegacy),
            Some(Storage::Typed(channels)) => channels
                .get(&channel)
                .map(|array| array.get((z & 15) * SECTION_SIZE + (x & 15)) as u16)
                .ok_or(HeightMapError::MissingChannel(channel)),
        }
    }
}

/// Top non-air Y of one column, scanning occupied sections top-down with
/// early exit at the first hit.
fn column_height(
    sections: &[Option<ClassicSection>; SECTIONS_PER_CHUNK],
    x: usize,
    z: usize,
) -> u16 {
    for sy in (0..SECTIONS_PER_CHUNK).rev() {
        let Some(section) = &sections[sy] else {
            continue;
        };
        for local_y in (0..SECTION_SIZE).rev() {
            if section.block_at(cell_index(x, local_y, z)).id != 0 {
                return ((sy << 4) | local_y) as u16;
            }
        }
    }
    0
}
