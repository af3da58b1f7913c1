use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use quarry_world::chunk::Chunk;

use crate::schema;
use crate::{FormatError, RegionError};

/// Chunks along each region axis.
pub const REGION_SIZE: usize = 32;
/// Chunk slots per region (32 x 32).
pub const REGION_CHUNKS: usize = REGION_SIZE * REGION_SIZE;
/// Bytes per payload sector; payloads are zero-padded up to this.
const SECTOR_BYTES: usize = 4096;
/// Locations block plus timestamps block, one sector each.
const HEADER_SECTORS: u32 = 2;

/// Compression scheme tags stored ahead of each payload.
const SCHEME_GZIP: u8 = 1;
const SCHEME_ZLIB: u8 = 2;

/// Decode policy for [`RegionFile::from_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadApproach {
    /// Decode every stored chunk while the stream is at hand.
    InMemory,
    /// Keep compressed payloads; decode a slot on its first access.
    OnDemand,
}

/// One slot of the 32x32 chunk grid.
#[derive(Default)]
struct Slot {
    /// Sector offset and count from the header; (0, 0) means empty.
    location: (u32, u8),
    /// Last-write time, epoch seconds.
    timestamp: u32,
    /// Compressed payload captured at load; dropped once decoded.
    raw: Option<RawPayload>,
    /// The decoded chunk, at most one per slot.
    chunk: Option<Chunk>,
}

struct RawPayload {
    scheme: u8,
    bytes: Vec<u8>,
}

/// A 32x32 aggregate of chunk documents behind a sector table.
///
/// Slots are addressed by `cz * 32 + cx` (see [`RegionFile::chunk_index`]).
/// A slot with nothing stored yields no chunk on lookup -- that is a
/// normal state, not an error.
pub struct RegionFile {
    region_x: i32,
    region_z: i32,
    slots: Vec<Slot>,
}

impl RegionFile {
    /// An empty region with no stored chunks.
    pub fn new(region_x: i32, region_z: i32) -> Self {
        let mut slots = Vec::with_capacity(REGION_CHUNKS);
        slots.resize_with(REGION_CHUNKS, Slot::default);
        Self {
            region_x,
            region_z,
            slots,
        }
    }

    /// Linear slot index for local chunk coordinates, both in `[0, 32)`.
    pub fn chunk_index(cx: usize, cz: usize) -> usize {
        assert!(cx < REGION_SIZE && cz < REGION_SIZE, "local chunk ({cx}, {cz}) out of range");
        cz * REGION_SIZE + cx
    }

    pub fn region_x(&self) -> i32 {
        self.region_x
    }

    pub fn region_z(&self) -> i32 {
        self.region_z
    }

    /// Parse a region from `stream`.
    ///
    /// The stream is used only for the span of this call: the header and
    /// every present slot's compressed payload are read into memory, and
    /// `approach` decides whether the decompress-and-parse step happens
    /// now (`InMemory`) or on each slot's first access (`OnDemand`).
    /// Slots with a zeroed location are missing, not errors.
    pub fn from_stream<S: Read + Seek>(
        stream: &mut S,
        region_x: i32,
        region_z: i32,
        approach: LoadApproach,
    ) -> Result<Self, RegionError> {
        let mut region = Self::new(region_x, region_z);

        stream.seek(SeekFrom::Start(0))?;
        let mut locations = [0u32; REGION_CHUNKS];
        for location in &mut locations {
            *location = stream.read_u32::<BigEndian>()?;
        }
        for slot in &mut region.slots {
            slot.timestamp = stream.read_u32::<BigEndian>()?;
        }

        let mut stored = 0usize;
        for (index, &location) in locations.iter().enumerate() {
            let (offset, count) = (location >> 8, (location & 0xff) as u8);
            if offset == 0 || count == 0 {
                continue;
            }
            stream.seek(SeekFrom::Start(offset as u64 * SECTOR_BYTES as u64))?;
            let len = stream.read_u32::<BigEndian>()?;
            if len == 0 || len as usize > count as usize * SECTOR_BYTES {
                return Err(FormatError::PayloadOverrun { len, sectors: count }.into());
            }
            let scheme = stream.read_u8()?;
            // The length field counts the scheme byte plus the payload.
            let mut bytes = vec![0u8; len as usize - 1];
            stream.read_exact(&mut bytes)?;

            let slot = &mut region.slots[index];
            slot.location = (offset, count);
            slot.raw = Some(RawPayload { scheme, bytes });
            stored += 1;
        }
        tracing::debug!(region_x, region_z, stored, "region header parsed");

        if approach == LoadApproach::InMemory {
            for index in 0..REGION_CHUNKS {
                region.decode_slot(index)?;
            }
        }
        Ok(region)
    }

    /// The chunk stored in `index`, decoding and caching it on first
    /// access under [`LoadApproach::OnDemand`]. `Ok(None)` when the slot
    /// holds nothing.
    pub fn chunk_data(&mut self, index: usize) -> Result<Option<&mut Chunk>, RegionError> {
        assert!(index < REGION_CHUNKS, "slot index {index} out of range");
        if self.slots[index].chunk.is_none() {
            self.decode_slot(index)?;
        }
        Ok(self.slots[index].chunk.as_mut())
    }

    /// Install `chunk` into slot `index`, replacing anything there.
    pub fn put_chunk(&mut self, index: usize, chunk: Chunk) {
        assert!(index < REGION_CHUNKS, "slot index {index} out of range");
        let slot = &mut self.slots[index];
        slot.raw = None;
        slot.chunk = Some(chunk);
    }

    /// Whether slot `index` currently holds a decoded chunk.
    pub fn has_chunk(&self, index: usize) -> bool {
        self.slots[index].chunk.is_some()
    }

    /// Last-write timestamp recorded for slot `index`, epoch seconds.
    pub fn timestamp(&self, index: usize) -> u32 {
        self.slots[index].timestamp
    }

    /// Decoded chunks currently resident, in slot order.
    pub fn resident_chunks(&self) -> impl Iterator<Item = (usize, &Chunk)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.chunk.as_ref().map(|chunk| (index, chunk)))
    }

    /// Decompress and parse slot `index` if a payload is waiting.
    fn decode_slot(&mut self, index: usize) -> Result<(), RegionError> {
        let Some(raw) = &self.slots[index].raw else {
            return Ok(());
        };
        let document = decompress(raw.scheme, &raw.bytes)?;
        let doc: schema::ChunkDoc = fastnbt::from_bytes(&document)?;
        let chunk = schema::chunk_from_doc(&doc)?;
        tracing::debug!(index, "decoded chunk");

        let slot = &mut self.slots[index];
        slot.raw = None;
        slot.chunk = Some(Chunk::Classic(chunk));
        Ok(())
    }

    /// Serialize every resident chunk back into container layout.
    ///
    /// Payload sectors are laid out append-at-end in slot order starting
    /// right after the header -- no reuse of a prior layout's sectors, so
    /// there is no free-list to maintain. Every written slot's timestamp
    /// is refreshed to now; slots without a resident chunk are written
    /// empty. Callers are responsible for committing dirty chunks first.
    pub fn save_to_stream<S: Write + Seek>(&mut self, stream: &mut S) -> Result<(), RegionError> {
        let now = epoch_seconds();
        let mut locations = [0u32; REGION_CHUNKS];
        let mut timestamps = [0u32; REGION_CHUNKS];
        let mut payloads: Vec<(usize, Vec<u8>)> = Vec::new();
        let mut next_sector = HEADER_SECTORS;

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(chunk) = &slot.chunk else {
                continue;
            };
            let (cx, cz) = (index % REGION_SIZE, index / REGION_SIZE);
            let doc = match chunk {
                Chunk::Classic(classic) => schema::doc_from_chunk(
                    classic,
                    self.region_x * REGION_SIZE as i32 + cx as i32,
                    self.region_z * REGION_SIZE as i32 + cz as i32,
                ),
            };
            let document = fastnbt::to_bytes(&doc)?;
            let compressed = compress(&document)?;

            let sectors = (4 + 1 + compressed.len()).div_ceil(SECTOR_BYTES);
            if sectors > u8::MAX as usize {
                return Err(FormatError::OversizedChunk { sectors }.into());
            }
            locations[index] = (next_sector << 8) | sectors as u32;
            timestamps[index] = now;
            next_sector += sectors as u32;
            payloads.push((index, compressed));
        }

        stream.seek(SeekFrom::Start(0))?;
        for &location in &locations {
            stream.write_u32::<BigEndian>(location)?;
        }
        for &timestamp in &timestamps {
            stream.write_u32::<BigEndian>(timestamp)?;
        }
        let zeros = [0u8; SECTOR_BYTES];
        for (_, compressed) in &payloads {
            stream.write_u32::<BigEndian>(compressed.len() as u32 + 1)?;
            stream.write_u8(SCHEME_ZLIB)?;
            stream.write_all(compressed)?;
            let written = 4 + 1 + compressed.len();
            stream.write_all(&zeros[..written.next_multiple_of(SECTOR_BYTES) - written])?;
        }

        for (index, _) in &payloads {
            let slot = &mut self.slots[*index];
            slot.location = (locations[*index] >> 8, (locations[*index] & 0xff) as u8);
            slot.timestamp = now;
        }
        tracing::debug!(
            region_x = self.region_x,
            region_z = self.region_z,
            chunks = payloads.len(),
            "region saved"
        );
        Ok(())
    }
}

fn epoch_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress(scheme: u8, data: &[u8]) -> Result<Vec<u8>, RegionError> {
    let mut out = Vec::new();
    match scheme {
        SCHEME_GZIP => GzDecoder::new(data).read_to_end(&mut out)?,
        SCHEME_ZLIB => ZlibDecoder::new(data).read_to_end(&mut out)?,
        other => return Err(FormatError::UnsupportedCompression(other).into()),
    };
    Ok(out)
}
