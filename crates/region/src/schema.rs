//! Typed views over the chunk document, read and written through the
//! external tag-tree codec.

use fastnbt::ByteArray;
use serde::{Deserialize, Serialize};

use quarry_world::bits::PackedNibbles;
use quarry_world::chunk::{ClassicChunk, ClassicSection, SECTION_VOLUME, SECTIONS_PER_CHUNK};

use crate::FormatError;

/// First paletted-era data version (the flattening). Documents at or past
/// it no longer carry block-id sections and are outside this container's
/// supported eras.
const FIRST_PALETTED_DATA_VERSION: i32 = 1451;

/// Section `Y` value meaning "ignore this entry"; not a format error.
const SECTION_SKIP_SENTINEL: u8 = 255;

/// Nibble arrays pack two cells per byte.
const NIBBLE_ARRAY_BYTES: usize = SECTION_VOLUME / 2;

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct ChunkDoc {
    #[serde(rename = "DataVersion", skip_serializing_if = "Option::is_none")]
    pub data_version: Option<i32>,
    #[serde(rename = "Level")]
    pub level: LevelDoc,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct LevelDoc {
    #[serde(rename = "xPos", default)]
    pub x_pos: i32,
    #[serde(rename = "zPos", default)]
    pub z_pos: i32,
    #[serde(rename = "Sections", default)]
    pub sections: Vec<SectionDoc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct SectionDoc {
    #[serde(rename = "Y")]
    pub y: i8,
    #[serde(rename = "Blocks", skip_serializing_if = "Option::is_none")]
    pub blocks: Option<ByteArray>,
    #[serde(rename = "Add", skip_serializing_if = "Option::is_none")]
    pub add: Option<ByteArray>,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    pub data: Option<ByteArray>,
}

/// Decode a parsed document into a classic chunk.
///
/// Dispatches on the format marker first: a paletted-era `DataVersion`
/// is unsupported, never coerced. Any malformed section fails the whole
/// chunk -- there is no partial recovery.
pub(crate) fn chunk_from_doc(doc: &ChunkDoc) -> Result<ClassicChunk, FormatError> {
    if let Some(version) = doc.data_version {
        if version >= FIRST_PALETTED_DATA_VERSION {
            return Err(FormatError::UnsupportedDataVersion(version));
        }
    }

    let mut chunk = ClassicChunk::new();
    for section in &doc.level.sections {
        let sy = section.y as u8;
        if sy == SECTION_SKIP_SENTINEL {
            continue;
        }
        if sy as usize >= SECTIONS_PER_CHUNK {
            return Err(FormatError::BadSectionY(sy));
        }

        let blocks = section
            .blocks
            .as_ref()
            .ok_or(FormatError::MissingBlockArray { y: sy })?;
        if blocks.len() != SECTION_VOLUME {
            return Err(FormatError::BadArrayLength {
                y: sy,
                field: "Blocks",
                expected: SECTION_VOLUME,
                actual: blocks.len(),
            });
        }
        let mut ids = Box::new([0u8; SECTION_VOLUME]);
        for (dst, src) in ids.iter_mut().zip(blocks.iter()) {
            *dst = *src as u8;
        }

        let add = section
            .add
            .as_ref()
            .map(|array| nibbles_from_doc(sy, "Add", array))
            .transpose()?;
        let data = section
            .data
            .as_ref()
            .map(|array| nibbles_from_doc(sy, "Data", array))
            .transpose()?;

        chunk.insert_section(sy as usize, ClassicSection::from_parts(ids, add, data));
    }
    Ok(chunk)
}

fn nibbles_from_doc(
    y: u8,
    field: &'static str,
    array: &ByteArray,
) -> Result<PackedNibbles, FormatError> {
    if array.len() != NIBBLE_ARRAY_BYTES {
        return Err(FormatError::BadArrayLength {
            y,
            field,
            expected: NIBBLE_ARRAY_BYTES,
            actual: array.len(),
        });
    }
    let bytes: Vec<u8> = array.iter().map(|&b| b as u8).collect();
    Ok(PackedNibbles::from_bytes(&bytes))
}

/// Encode a chunk's committed state as a document. Only allocated
/// sections are written; absent nibble arrays stay absent.
pub(crate) fn doc_from_chunk(chunk: &ClassicChunk, x_pos: i32, z_pos: i32) -> ChunkDoc {
    let sections = chunk
        .sections()
        .map(|(sy, section)| SectionDoc {
            y: sy as i8,
            blocks: Some(ByteArray::new(
                section.blocks().iter().map(|&b| b as i8).collect(),
            )),
            add: section.add().map(nibbles_to_doc),
            data: section.data().map(nibbles_to_doc),
        })
        .collect();

    ChunkDoc {
        // Classic chunks predate the version marker.
        data_version: None,
        level: LevelDoc {
            x_pos,
            z_pos,
            sections,
        },
    }
}

fn nibbles_to_doc(nibbles: &PackedNibbles) -> ByteArray {
    ByteArray::new(nibbles.to_bytes().into_iter().map(|b| b as i8).collect())
}
