//! On-disk cache entry codec.
//!
//! Layout: `VLF1` magic, tensor count, frames, bins (u32 LE each),
//! little-endian f32 payload, then a sha256 digest of the payload. All
//! tensors of one entry share a shape; the digest makes a truncated or
//! bit-flipped entry detectable on read.

use sha2::{Digest, Sha256};

use voxlid_features::FeatureTensor;

const MAGIC: &[u8; 4] = b"VLF1";
const HEADER_LEN: usize = 4 + 4 * 3;
const DIGEST_LEN: usize = 32;

/// Decode failure detail; the caller attaches the key and maps this to
/// `CacheError::Corrupt`.
#[derive(Debug)]
pub struct CorruptEntry(pub String);

impl std::fmt::Display for CorruptEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn encode(tensors: &[FeatureTensor]) -> Vec<u8> {
    let (frames, bins) = match tensors.first() {
        Some(t) => (t.frames(), t.bins()),
        None => (0, 0),
    };
    debug_assert!(
        tensors
            .iter()
            .all(|t| t.frames() == frames && t.bins() == bins),
        "all tensors of one entry must share a shape"
    );

    let payload_len = tensors.len() * frames * bins * 4;
    let mut out = Vec::with_capacity(HEADER_LEN + payload_len + DIGEST_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(tensors.len() as u32).to_le_bytes());
    out.extend_from_slice(&(frames as u32).to_le_bytes());
    out.extend_from_slice(&(bins as u32).to_le_bytes());
    for tensor in tensors {
        for &v in tensor.data() {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    let digest = Sha256::digest(&out[HEADER_LEN..]);
    out.extend_from_slice(&digest);
    out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<FeatureTensor>, CorruptEntry> {
    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(CorruptEntry(format!("entry truncated at {} bytes", bytes.len())));
    }
    if &bytes[..4] != MAGIC {
        return Err(CorruptEntry("bad magic".into()));
    }

    let read_u32 = |off: usize| {
        u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]) as usize
    };
    let count = read_u32(4);
    let frames = read_u32(8);
    let bins = read_u32(12);

    let payload_len = count
        .checked_mul(frames)
        .and_then(|n| n.checked_mul(bins))
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| CorruptEntry("shape overflow".into()))?;
    if bytes.len() != HEADER_LEN + payload_len + DIGEST_LEN {
        return Err(CorruptEntry(format!(
            "length mismatch: header says {} payload bytes, file has {}",
            payload_len,
            bytes.len() - HEADER_LEN - DIGEST_LEN
        )));
    }

    let payload = &bytes[HEADER_LEN..HEADER_LEN + payload_len];
    let stored_digest = &bytes[HEADER_LEN + payload_len..];
    let digest = Sha256::digest(payload);
    if digest.as_slice() != stored_digest {
        return Err(CorruptEntry("payload digest mismatch".into()));
    }

    if count == 0 {
        return Ok(Vec::new());
    }
    if bins == 0 {
        return Err(CorruptEntry("zero bins with nonzero tensor count".into()));
    }

    let mut tensors = Vec::with_capacity(count);
    let tensor_bytes = frames * bins * 4;
    for i in 0..count {
        let slice = &payload[i * tensor_bytes..(i + 1) * tensor_bytes];
        let data: Vec<f32> = slice
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let tensor = FeatureTensor::from_raw(bins, data)
            .ok_or_else(|| CorruptEntry("ragged tensor data".into()))?;
        tensors.push(tensor);
    }
    Ok(tensors)
}
