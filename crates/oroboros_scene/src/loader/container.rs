//! Binary container (GLB) splitting.
//!
//! ```text
//! ┌───────┬─────────┬────────┬──────────┬──────┬──────────────┬──────────┬──────┬──────────┐
//! │ glTF  │ version │ length │ json_len │ JSON │ json (pad 4) │ bin_len  │ BIN\0│ payload  │
//! └───────┴─────────┴────────┴──────────┴──────┴──────────────┴──────────┴──────┴──────────┘
//!    0        4         8        12        16        20        20+align4(json_len)
//! ```

use oroboros_memory::align_up;

use crate::error::{SceneError, SceneResult};

/// Leading magic of a binary container.
pub const GLB_MAGIC: [u8; 4] = *b"glTF";
/// Supported container version.
pub const GLB_VERSION: u32 = 2;
/// Tag of the JSON chunk.
pub const CHUNK_JSON: [u8; 4] = *b"JSON";
/// Tag of the binary chunk.
pub const CHUNK_BIN: [u8; 4] = *b"BIN\0";

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// The JSON document and, for binary containers, the embedded payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Container<'a> {
    /// JSON document bytes.
    pub json: &'a [u8],
    /// Binary chunk payload.
    pub bin: Option<&'a [u8]>,
}

/// Returns whether `data` starts with the binary container magic.
#[must_use]
pub fn is_glb(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == GLB_MAGIC
}

/// Splits `data` into its JSON document and optional binary chunk.
///
/// Plain JSON passes through untouched.
///
/// # Errors
///
/// Returns `Container` for a bad header or chunk tag and `ChunkSizeMismatch`
/// when a length disagrees with the bytes present.
pub fn split(data: &[u8]) -> SceneResult<Container<'_>> {
    if !is_glb(data) {
        return Ok(Container { json: data, bin: None });
    }
    if data.len() < HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(SceneError::Container(format!("{} bytes is too short for a container header", data.len())));
    }

    let version = read_u32(data, 4);
    if version != GLB_VERSION {
        return Err(SceneError::Container(format!("unsupported container version {version}")));
    }
    let total = read_u32(data, 8) as usize;
    if total != data.len() {
        return Err(SceneError::ChunkSizeMismatch { declared: total, actual: data.len() });
    }

    let json_len = read_u32(data, 12) as usize;
    if data[16..20] != CHUNK_JSON {
        return Err(SceneError::Container("first chunk is not JSON".to_string()));
    }
    let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
    if json_start + json_len > total {
        return Err(SceneError::ChunkSizeMismatch { declared: json_len, actual: total - json_start });
    }
    let json = &data[json_start..json_start + json_len];

    // The JSON chunk is padded to 4 bytes even when its declared length is not.
    let bin_header = json_start + align_up(json_len, 4);
    if bin_header >= total {
        return Ok(Container { json, bin: None });
    }
    if bin_header + CHUNK_HEADER_LEN > total {
        return Err(SceneError::ChunkSizeMismatch { declared: CHUNK_HEADER_LEN, actual: total - bin_header });
    }
    let bin_len = read_u32(data, bin_header) as usize;
    if data[bin_header + 4..bin_header + 8] != CHUNK_BIN {
        return Err(SceneError::Container("second chunk is not BIN".to_string()));
    }
    let bin_start = bin_header + CHUNK_HEADER_LEN;
    if bin_start + bin_len > total {
        return Err(SceneError::ChunkSizeMismatch { declared: bin_len, actual: total - bin_start });
    }

    tracing::debug!("container: json {} bytes, bin {} bytes at {}", json_len, bin_len, bin_start);
    Ok(Container { json, bin: Some(&data[bin_start..bin_start + bin_len]) })
}

/// Wraps a JSON document and optional payload into a binary container.
#[must_use]
pub fn build(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
    let json_padded = align_up(json.len(), 4);
    let bin_padded = bin.map_or(0, |bin| CHUNK_HEADER_LEN + align_up(bin.len(), 4));
    let total = HEADER_LEN + CHUNK_HEADER_LEN + json_padded + bin_padded;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC);
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_padded as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON);
    out.extend_from_slice(json);
    out.resize(HEADER_LEN + CHUNK_HEADER_LEN + json_padded, b' ');
    if let Some(bin) = bin {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN);
        out.extend_from_slice(bin);
        out.resize(total, 0);
    }
    out
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_passes_through() {
        let container = split(b"{}").unwrap();
        assert_eq!(container.json, b"{}");
        assert!(container.bin.is_none());
    }

    #[test]
    fn test_build_then_split() {
        let glb = build(br#"{"a":1}"#, Some(&[1, 2, 3]));
        assert_eq!(glb.len() % 4, 0);
        let container = split(&glb).unwrap();
        assert_eq!(container.json, b"{\"a\":1} ");
        assert_eq!(container.bin, Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_short_declared_json_length() {
        let mut glb = build(br#"{"a":1}"#, Some(&[9; 4]));
        // Declare the unpadded length; the bin chunk still sits at the padded offset.
        glb[12..16].copy_from_slice(&7u32.to_le_bytes());
        let container = split(&glb).unwrap();
        assert_eq!(container.json, br#"{"a":1}"#);
        assert_eq!(container.bin, Some(&[9u8; 4][..]));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let mut glb = build(b"{}  ", None);
        glb[4] = 1;
        assert!(matches!(split(&glb), Err(SceneError::Container(_))));

        let mut glb = build(b"{}  ", None);
        glb[8..12].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(split(&glb), Err(SceneError::ChunkSizeMismatch { declared: 999, .. })));

        let mut glb = build(b"{}  ", None);
        glb[16] = b'X';
        assert!(matches!(split(&glb), Err(SceneError::Container(_))));
        assert!(matches!(split(b"glTF"), Err(SceneError::Container(_))));
    }

    #[test]
    fn test_bin_length_past_end() {
        let mut glb = build(b"{}  ", Some(&[0; 4]));
        let at = HEADER_LEN + CHUNK_HEADER_LEN + 4;
        glb[at..at + 4].copy_from_slice(&64u32.to_le_bytes());
        assert!(matches!(split(&glb), Err(SceneError::ChunkSizeMismatch { declared: 64, .. })));
    }
}
