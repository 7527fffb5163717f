//! Length-prefixed binary encoding of [`GeometryBuffer`]s.
//!
//! ```text
//! +----------------------------------------------------------+
//! | header: 5 x (len_lo: u16, len_hi: u16), 20 bytes          |
//! |   vertices, normals, texcoords, materials, indices        |
//! +----------------------------------------------------------+
//! | vertices  : len x i16                                     |
//! | normals   : len x i16                                     |
//! | texcoords : len x i16                                     |
//! | materials : len x u16  (len 0 when absent)                |
//! | indices   : len x u32                                     |
//! +----------------------------------------------------------+
//! ```
//!
//! All values are little-endian. Lengths count elements, not bytes, and are
//! split into two 16-bit words so arrays longer than 65535 survive the header.
//! Float arrays are truncated to integers; normals therefore keep only the
//! integer part of each unit component. Values outside the `i16` range are
//! an encode error.

use strata_mesh::GeometryBuffer;

/// Number of length-prefixed arrays in a payload.
const ARRAY_COUNT: usize = 5;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = ARRAY_COUNT * 2 * 2;

/// Errors that can occur while encoding or decoding a payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// The buffer is shorter than the length header.
    #[error("payload of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated {
        /// Actual buffer length.
        len: usize,
    },

    /// A declared array runs past the end of the buffer.
    #[error("{array} array needs bytes {start}..{end} but payload has {len}")]
    SliceOutOfBounds {
        /// Which array overflowed.
        array: &'static str,
        /// Byte offset the array starts at.
        start: usize,
        /// Byte offset the array would end at.
        end: usize,
        /// Actual buffer length.
        len: usize,
    },

    /// Bytes remain after the last declared array.
    #[error("{extra} unexpected trailing bytes after payload")]
    TrailingBytes {
        /// Number of unread bytes.
        extra: usize,
    },

    /// An array is too long for a 32-bit length.
    #[error("{array} array has {len} elements, more than a 32-bit length can hold")]
    ArrayTooLong {
        /// Which array overflowed.
        array: &'static str,
        /// Its element count.
        len: usize,
    },

    /// A float value has no 16-bit integer encoding.
    #[error("{array} value {value} does not fit in a 16-bit integer")]
    ValueOutOfRange {
        /// Which array held the value.
        array: &'static str,
        /// The offending value.
        value: f32,
    },
}

/// Splits a 32-bit length into `(low, high)` 16-bit words.
fn split_len(len: u32) -> [u16; 2] {
    [(len & 0xFFFF) as u16, (len >> 16) as u16]
}

fn checked_len(array: &'static str, len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::ArrayTooLong { array, len })
}

fn checked_i16(array: &'static str, value: f32) -> Result<i16, CodecError> {
    let truncated = value.trunc();
    if truncated.is_finite() && (f32::from(i16::MIN)..=f32::from(i16::MAX)).contains(&truncated) {
        Ok(truncated as i16)
    } else {
        Err(CodecError::ValueOutOfRange { array, value })
    }
}

/// Encode a geometry buffer into the wire format.
///
/// Fails rather than clamping when a float does not fit in an `i16`.
pub fn encode(geometry: &GeometryBuffer) -> Result<Vec<u8>, CodecError> {
    let lens = [
        checked_len("vertices", geometry.positions.len())?,
        checked_len("normals", geometry.normals.len())?,
        checked_len("texcoords", geometry.texcoords.len())?,
        checked_len("materials", geometry.materials.len())?,
        checked_len("indices", geometry.indices.len())?,
    ];

    let body_len = 2 * (geometry.positions.len()
        + geometry.normals.len()
        + geometry.texcoords.len()
        + geometry.materials.len())
        + 4 * geometry.indices.len();
    let mut out = Vec::with_capacity(HEADER_LEN + body_len);

    for len in lens {
        for word in split_len(len) {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    let floats = [
        ("vertices", &geometry.positions),
        ("normals", &geometry.normals),
        ("texcoords", &geometry.texcoords),
    ];
    for (array, values) in floats {
        for &v in values.iter() {
            out.extend_from_slice(&checked_i16(array, v)?.to_le_bytes());
        }
    }
    for &m in &geometry.materials {
        out.extend_from_slice(&m.to_le_bytes());
    }
    for &i in &geometry.indices {
        out.extend_from_slice(&i.to_le_bytes());
    }

    Ok(out)
}

/// Sequential reader over the payload body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, array: &'static str, len: usize, width: usize) -> Result<&'a [u8], CodecError> {
        let start = self.pos;
        let end = len
            .checked_mul(width)
            .and_then(|bytes| start.checked_add(bytes))
            .filter(|&end| end <= self.buf.len())
            .ok_or(CodecError::SliceOutOfBounds {
                array,
                start,
                end: start.saturating_add(len.saturating_mul(width)),
                len: self.buf.len(),
            })?;
        self.pos = end;
        Ok(&self.buf[start..end])
    }

    fn floats(&mut self, array: &'static str, len: usize) -> Result<Vec<f32>, CodecError> {
        Ok(self
            .take(array, len, 2)?
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32)
            .collect())
    }
}

/// Decode a payload produced by [`encode`].
pub fn decode(buf: &[u8]) -> Result<GeometryBuffer, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::Truncated { len: buf.len() });
    }

    let mut lens = [0usize; ARRAY_COUNT];
    for (i, len) in lens.iter_mut().enumerate() {
        let at = i * 4;
        let lo = u16::from_le_bytes([buf[at], buf[at + 1]]) as u32;
        let hi = u16::from_le_bytes([buf[at + 2], buf[at + 3]]) as u32;
        *len = (lo | (hi << 16)) as usize;
    }
    let [n_verts, n_normals, n_tex, n_mats, n_indices] = lens;

    let mut reader = Reader {
        buf,
        pos: HEADER_LEN,
    };
    let positions = reader.floats("vertices", n_verts)?;
    let normals = reader.floats("normals", n_normals)?;
    let texcoords = reader.floats("texcoords", n_tex)?;
    let materials = reader
        .take("materials", n_mats, 2)?
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    let indices = reader
        .take("indices", n_indices, 4)?
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if reader.pos != buf.len() {
        return Err(CodecError::TrailingBytes {
            extra: buf.len() - reader.pos,
        });
    }

    Ok(GeometryBuffer {
        positions,
        normals,
        texcoords,
        materials,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integer-valued geometry where every array holds `len` elements.
    fn geometry_of_len(len: usize) -> GeometryBuffer {
        GeometryBuffer {
            positions: (0..len).map(|i| (i % 4001) as f32 - 2000.0).collect(),
            normals: (0..len).map(|i| (i % 3) as f32 - 1.0).collect(),
            texcoords: (0..len).map(|i| (i % 33) as f32).collect(),
            materials: (0..len).map(|i| (i % 7) as u16 + 1).collect(),
            indices: (0..len).map(|i| (i as u32).wrapping_mul(2_654_435_761)).collect(),
        }
    }

    #[test]
    fn test_roundtrip_across_16_bit_boundary() {
        for len in [0, 1, 65535, 65536, 131072] {
            let geometry = geometry_of_len(len);
            let bytes = encode(&geometry).unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + len * (2 * 4 + 4));
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded, geometry, "roundtrip failed for length {len}");
        }
    }

    #[test]
    fn test_values_beyond_16_bits_are_rejected() {
        let mut geometry = GeometryBuffer::new();
        geometry.positions = vec![40000.0, 0.0, -40000.0];
        let err = encode(&geometry).unwrap_err();
        assert_eq!(
            err,
            CodecError::ValueOutOfRange {
                array: "vertices",
                value: 40000.0
            }
        );

        geometry.positions = vec![0.0; 3];
        geometry.texcoords = vec![f32::NAN];
        let err = encode(&geometry).unwrap_err();
        assert!(matches!(err, CodecError::ValueOutOfRange { array: "texcoords", .. }));
    }

    #[test]
    fn test_i16_limits_still_encode() {
        let mut geometry = GeometryBuffer::new();
        geometry.positions = vec![32767.9, -32768.0, -0.5];
        let decoded = decode(&encode(&geometry).unwrap()).unwrap();
        assert_eq!(decoded.positions, vec![32767.0, -32768.0, 0.0]);
    }

    #[test]
    fn test_header_splits_low_and_high_words() {
        let mut geometry = GeometryBuffer::new();
        geometry.positions = vec![1.0; 65536];
        geometry.indices = vec![0; 65537];
        let bytes = encode(&geometry).unwrap();
        // vertices: lo = 0, hi = 1
        assert_eq!(&bytes[0..4], &[0, 0, 1, 0]);
        // indices: lo = 1, hi = 1
        assert_eq!(&bytes[16..20], &[1, 0, 1, 0]);
    }

    #[test]
    fn test_empty_geometry_is_header_only() {
        let bytes = encode(&GeometryBuffer::new()).unwrap();
        assert_eq!(bytes, vec![0u8; HEADER_LEN]);
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_absent_materials_stay_absent() {
        let mut geometry = geometry_of_len(12);
        geometry.materials.clear();
        let decoded = decode(&encode(&geometry).unwrap()).unwrap();
        assert!(decoded.materials.is_empty());
        assert_eq!(decoded.indices, geometry.indices);
    }

    #[test]
    fn test_normals_are_truncated() {
        let mut geometry = GeometryBuffer::new();
        geometry.normals = vec![0.577, -0.577, 1.0, -0.999];
        let decoded = decode(&encode(&geometry).unwrap()).unwrap();
        assert_eq!(decoded.normals, vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_short_buffer_is_truncated_error() {
        let err = decode(&[0u8; HEADER_LEN - 1]).unwrap_err();
        assert_eq!(err, CodecError::Truncated { len: HEADER_LEN - 1 });
    }

    #[test]
    fn test_declared_length_past_end() {
        let mut bytes = encode(&geometry_of_len(3)).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = decode(&bytes).unwrap_err();
        assert!(
            matches!(err, CodecError::SliceOutOfBounds { array: "indices", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_huge_declared_length_does_not_panic() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::SliceOutOfBounds { array: "vertices", .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&geometry_of_len(2)).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes).unwrap_err(), CodecError::TrailingBytes { extra: 1 });
    }
}
