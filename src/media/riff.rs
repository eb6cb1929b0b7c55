//! RIFF container chunk encoding.
//!
//! Layout handled here (all integers little-endian):
//!
//! ```text
//! offset 0   "RIFF"
//! offset 4   u32 total length - 8
//! offset 8   form type, e.g. "WEBP"
//! offset 12  chunks: [id: 4 ASCII bytes][len: u32][payload][pad byte if len is odd]
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Length of the outer `RIFF` header.
pub const RIFF_HEADER_LEN: usize = 12;

/// Length of a chunk header (id + length).
pub const CHUNK_HEADER_LEN: usize = 8;

/// Byte offset of the outer size field.
pub const RIFF_SIZE_OFFSET: usize = 4;

const RIFF_MAGIC: &[u8; 4] = b"RIFF";

/// Errors while reading or patching a container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// Fewer bytes than the 12-byte header
    #[error("container too short: {0} bytes")]
    TooShort(usize),
    /// The first four bytes are not `RIFF`
    #[error("not a RIFF container: {:?}", String::from_utf8_lossy(.0))]
    BadMagic([u8; 4]),
    /// A chunk header or payload runs past the end of the data
    #[error("chunk truncated at offset {offset}")]
    Truncated { offset: usize },
    /// Payload or container larger than a u32 length can describe
    #[error("length {0} exceeds u32 range")]
    TooLarge(usize),
}

/// A chunk borrowed from a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Bytes the chunk occupies in the container, header and padding included.
    pub fn encoded_len(&self) -> usize {
        encoded_chunk_len(self.data.len())
    }
}

/// Bytes a chunk with `payload_len` bytes of payload occupies on disk.
pub fn encoded_chunk_len(payload_len: usize) -> usize {
    CHUNK_HEADER_LEN + payload_len + (payload_len % 2)
}

/// Parsed outer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffHeader {
    /// Value of the size field (total length - 8 when consistent)
    pub declared_size: u32,
    pub form_type: [u8; 4],
}

impl RiffHeader {
    pub fn parse(container: &[u8]) -> Result<Self, ContainerError> {
        if container.len() < RIFF_HEADER_LEN {
            return Err(ContainerError::TooShort(container.len()));
        }

        let mut cursor = Cursor::new(container);
        let mut magic = [0u8; 4];
        read_exact(&mut cursor, &mut magic, 0)?;
        if &magic != RIFF_MAGIC {
            return Err(ContainerError::BadMagic(magic));
        }

        let declared_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ContainerError::Truncated { offset: 4 })?;
        let mut form_type = [0u8; 4];
        read_exact(&mut cursor, &mut form_type, 8)?;

        Ok(Self {
            declared_size,
            form_type,
        })
    }
}

/// Parse every chunk following the outer header.
pub fn parse_chunks(container: &[u8]) -> Result<Vec<Chunk<'_>>, ContainerError> {
    RiffHeader::parse(container)?;

    let mut chunks = Vec::new();
    let mut offset = RIFF_HEADER_LEN;

    while offset < container.len() {
        if container.len() - offset < CHUNK_HEADER_LEN {
            return Err(ContainerError::Truncated { offset });
        }

        let mut cursor = Cursor::new(&container[offset..]);
        let mut id = [0u8; 4];
        read_exact(&mut cursor, &mut id, offset)?;
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ContainerError::Truncated { offset })? as usize;

        let data_start = offset + CHUNK_HEADER_LEN;
        let data_end = data_start
            .checked_add(len)
            .filter(|end| *end <= container.len())
            .ok_or(ContainerError::Truncated { offset })?;

        chunks.push(Chunk {
            id,
            data: &container[data_start..data_end],
        });

        // The final pad byte may be missing in files written by sloppy encoders.
        offset = (data_end + len % 2).min(container.len());
    }

    Ok(chunks)
}

/// Append a chunk after the existing chunks and patch the outer size field.
pub fn append_chunk(
    container: &[u8],
    id: [u8; 4],
    payload: &[u8],
) -> Result<Vec<u8>, ContainerError> {
    RiffHeader::parse(container)?;

    let payload_len =
        u32::try_from(payload.len()).map_err(|_| ContainerError::TooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(container.len() + encoded_chunk_len(payload.len()));
    out.extend_from_slice(container);
    write_chunk(&mut out, id, payload_len, payload);

    patch_riff_size(&mut out)?;
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, id: [u8; 4], payload_len: u32, payload: &[u8]) {
    // Writing into a Vec cannot fail.
    let _ = out.write_all(&id);
    let _ = out.write_u32::<LittleEndian>(payload_len);
    let _ = out.write_all(payload);
    if payload.len() % 2 != 0 {
        let _ = out.write_u8(0);
    }
}

/// Rewrite the outer size field to `len - 8`.
pub fn patch_riff_size(container: &mut [u8]) -> Result<(), ContainerError> {
    if container.len() < RIFF_HEADER_LEN {
        return Err(ContainerError::TooShort(container.len()));
    }
    let size = u32::try_from(container.len() - 8)
        .map_err(|_| ContainerError::TooLarge(container.len()))?;
    let mut field = &mut container[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4];
    field
        .write_u32::<LittleEndian>(size)
        .map_err(|_| ContainerError::Truncated {
            offset: RIFF_SIZE_OFFSET,
        })
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], offset: usize) -> Result<(), ContainerError> {
    reader
        .read_exact(buf)
        .map_err(|_| ContainerError::Truncated { offset })
}
