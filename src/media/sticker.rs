//! Sticker pack metadata embedded as an `EXIF` chunk in WebP stickers.
//!
//! The chunk payload is a one-entry little-endian TIFF directory whose single
//! tag (0x5741) of type UNDEFINED points at a JSON document describing the
//! pack. The JSON starts right after the 22-byte header.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use super::riff::{self, ContainerError};

/// Chunk id used for the metadata.
pub const EXIF_CHUNK_ID: [u8; 4] = *b"EXIF";

/// Length of the TIFF header preceding the JSON.
pub const EXIF_HEADER_LEN: usize = 22;

/// Custom tag carrying the pack JSON.
pub const STICKER_PACK_TAG: u16 = 0x5741;

const TIFF_LITTLE_ENDIAN: &[u8; 2] = b"II";
const TIFF_MAGIC: u16 = 0x2A;
const FIRST_IFD_OFFSET: u32 = 8;
const TIFF_TYPE_UNDEFINED: u16 = 7;

const PACK_ID_LEN: usize = 32;

/// JSON record describing the pack a sticker belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerPackMetadata {
    #[serde(rename = "sticker-pack-id")]
    pub pack_id: String,
    #[serde(rename = "sticker-pack-name")]
    pub name: String,
    #[serde(rename = "sticker-pack-publisher")]
    pub publisher: String,
    pub emojis: Vec<String>,
}

impl StickerPackMetadata {
    /// Build a record with a fresh random pack id. Missing categories become a
    /// single empty string.
    pub fn new(name: Option<&str>, author: Option<&str>, categories: Option<&[String]>) -> Self {
        Self {
            pack_id: random_pack_id(),
            name: name.unwrap_or_default().to_string(),
            publisher: author.unwrap_or_default().to_string(),
            emojis: categories
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| vec![String::new()]),
        }
    }

    /// Header followed by the UTF-8 JSON.
    pub fn to_exif(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(encode_exif(&json))
    }
}

fn random_pack_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PACK_ID_LEN)
        .map(char::from)
        .collect()
}

/// Write the 22-byte TIFF header declaring `json.len()` bytes of data at offset 22,
/// then the JSON itself.
pub fn encode_exif(json: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXIF_HEADER_LEN + json.len());
    // Writing into a Vec cannot fail.
    let _ = write_exif(&mut out, json);
    out
}

fn write_exif<W: Write>(out: &mut W, json: &[u8]) -> std::io::Result<()> {
    out.write_all(TIFF_LITTLE_ENDIAN)?;
    out.write_u16::<LittleEndian>(TIFF_MAGIC)?;
    out.write_u32::<LittleEndian>(FIRST_IFD_OFFSET)?;
    // one IFD entry
    out.write_u16::<LittleEndian>(1)?;
    out.write_u16::<LittleEndian>(STICKER_PACK_TAG)?;
    out.write_u16::<LittleEndian>(TIFF_TYPE_UNDEFINED)?;
    out.write_u32::<LittleEndian>(json.len() as u32)?;
    out.write_u32::<LittleEndian>(EXIF_HEADER_LEN as u32)?;
    out.write_all(json)
}

/// Extract the JSON bytes from an EXIF payload written by [`encode_exif`].
pub fn decode_exif(exif: &[u8]) -> Option<&[u8]> {
    if exif.len() < EXIF_HEADER_LEN || &exif[..2] != TIFF_LITTLE_ENDIAN {
        return None;
    }

    let mut cursor = Cursor::new(&exif[2..]);
    let magic = cursor.read_u16::<LittleEndian>().ok()?;
    let _ifd_offset = cursor.read_u32::<LittleEndian>().ok()?;
    let entries = cursor.read_u16::<LittleEndian>().ok()?;
    let tag = cursor.read_u16::<LittleEndian>().ok()?;
    let kind = cursor.read_u16::<LittleEndian>().ok()?;
    let len = cursor.read_u32::<LittleEndian>().ok()? as usize;
    let offset = cursor.read_u32::<LittleEndian>().ok()? as usize;

    if magic != TIFF_MAGIC
        || entries != 1
        || tag != STICKER_PACK_TAG
        || kind != TIFF_TYPE_UNDEFINED
    {
        return None;
    }

    exif.get(offset..offset.checked_add(len)?)
}

/// Find and parse the pack metadata of a sticker, if it carries one.
pub fn read_sticker_metadata(webp: &[u8]) -> Option<StickerPackMetadata> {
    let chunks = riff::parse_chunks(webp).ok()?;
    let exif = chunks.iter().find(|chunk| chunk.id == EXIF_CHUNK_ID)?;
    serde_json::from_slice(decode_exif(exif.data)?).ok()
}

/// Error returned when metadata cannot be embedded.
#[derive(Debug, thiserror::Error)]
pub enum StickerError {
    #[error("invalid sticker container: {0}")]
    Container(#[from] ContainerError),
    #[error("failed to serialize sticker metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Embed pack metadata into a WebP sticker.
///
/// Returns the input unchanged when neither a name nor an author is given.
pub fn inject_sticker_metadata(
    webp: &[u8],
    name: Option<&str>,
    author: Option<&str>,
    categories: Option<&[String]>,
) -> Result<Vec<u8>, StickerError> {
    let blank = |value: Option<&str>| value.map_or(true, str::is_empty);
    if blank(name) && blank(author) {
        return Ok(webp.to_vec());
    }

    let exif = StickerPackMetadata::new(name, author, categories).to_exif()?;
    Ok(riff::append_chunk(webp, EXIF_CHUNK_ID, &exif)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::riff::{encoded_chunk_len, parse_chunks, RiffHeader};

    fn sample_webp() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&18u32.to_le_bytes());
        data.extend_from_slice(b"WEBP");
        data.extend_from_slice(b"VP8L");
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 4, 5, 0]);
        data
    }

    #[test]
    fn test_header_layout() {
        let exif = encode_exif(b"{}");
        assert_eq!(
            &exif[..EXIF_HEADER_LEN],
            &[
                0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x41, 0x57, 0x07, 0x00,
                0x02, 0x00, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00,
            ]
        );
        assert_eq!(&exif[EXIF_HEADER_LEN..], b"{}");
    }

    #[test]
    fn test_noop_without_name_or_author() {
        let webp = sample_webp();
        assert_eq!(inject_sticker_metadata(&webp, None, None, None).unwrap(), webp);
        assert_eq!(
            inject_sticker_metadata(&webp, Some(""), Some(""), None).unwrap(),
            webp
        );
        // even garbage passes through untouched when there is nothing to embed
        assert_eq!(
            inject_sticker_metadata(b"xyz", None, None, None).unwrap(),
            b"xyz"
        );
    }

    #[test]
    fn test_injected_metadata_round_trips() {
        let webp = sample_webp();
        let categories = vec!["😀".to_string(), "🎉".to_string()];
        let out =
            inject_sticker_metadata(&webp, Some("My Pack"), Some("Ana"), Some(categories.as_slice()))
                .unwrap();

        let header = RiffHeader::parse(&out).unwrap();
        assert_eq!(header.declared_size as usize, out.len() - 8);

        let chunks = parse_chunks(&out).unwrap();
        let exif = chunks.iter().find(|c| c.id == EXIF_CHUNK_ID).unwrap();
        assert_eq!(out.len(), webp.len() + encoded_chunk_len(exif.data.len()));

        let meta = read_sticker_metadata(&out).unwrap();
        assert_eq!(meta.name, "My Pack");
        assert_eq!(meta.publisher, "Ana");
        assert_eq!(meta.emojis, categories);
        assert_eq!(meta.pack_id.len(), 32);
        assert!(meta.pack_id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_json_survives_chunk_round_trip() {
        let meta = StickerPackMetadata {
            pack_id: "A".repeat(32),
            name: "pack".into(),
            publisher: String::new(),
            emojis: vec![String::new()],
        };
        let json = serde_json::to_vec(&meta).unwrap();
        let exif = meta.to_exif().unwrap();
        let out = riff::append_chunk(&sample_webp(), EXIF_CHUNK_ID, &exif).unwrap();

        let chunks = parse_chunks(&out).unwrap();
        assert_eq!(decode_exif(chunks[1].data), Some(json.as_slice()));
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"sticker-pack-id":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA","sticker-pack-name":"pack","sticker-pack-publisher":"","emojis":[""]}"#
        );
    }

    #[test]
    fn test_default_categories() {
        let meta = StickerPackMetadata::new(Some("n"), None, None);
        assert_eq!(meta.emojis, vec![String::new()]);
        assert_eq!(meta.publisher, "");
    }

    #[test]
    fn test_pack_ids_are_random() {
        let a = StickerPackMetadata::new(Some("n"), None, None);
        let b = StickerPackMetadata::new(Some("n"), None, None);
        assert_ne!(a.pack_id, b.pack_id);
    }

    #[test]
    fn test_invalid_container_is_rejected() {
        assert!(matches!(
            inject_sticker_metadata(b"not a webp", Some("n"), None, None),
            Err(StickerError::Container(ContainerError::TooShort(10)))
        ));
    }
}
