//! Bit codec for grid snapshots.
//!
//! A grid of `n` cells travels as `ceil(n / 8)` bytes. Two bit orders are
//! in use:
//!
//! ```text
//! MSB-first (socket, base64):   byte[k/8] >> (7 - k%8)
//! LSB-first (legacy HTTP, hex): byte[k/8] >> (k%8)
//!
//!   byte 0 = 0b1000_0001
//!   MSB-first → [1,0,0,0,0,0,0,1]
//!   LSB-first → [1,0,0,0,0,0,0,1]   (palindrome; 0b1100_0000 differs)
//! ```
//!
//! The bit functions are total: empty input yields empty output. Only the
//! text layer ([`SnapshotFormat`]) can fail.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Bit packing convention inside each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    /// Bit `k` is `(byte[k/8] >> (7 - k%8)) & 1`.
    #[default]
    MsbFirst,
    /// Bit `k` is `(byte[k/8] >> (k%8)) & 1`.
    LsbFirst,
}

impl BitOrder {
    #[inline(always)]
    fn shift(self, k: usize) -> u32 {
        match self {
            BitOrder::MsbFirst => 7 - (k % 8) as u32,
            BitOrder::LsbFirst => (k % 8) as u32,
        }
    }
}

/// Unpack `bytes` into `bytes.len() * 8` booleans.
pub fn decode_bits(bytes: &[u8], order: BitOrder) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for (i, byte) in bytes.iter().enumerate() {
        for j in 0..8 {
            let k = i * 8 + j;
            bits.push((byte >> order.shift(k)) & 1 == 1);
        }
    }
    bits
}

/// Pack `bits` into `ceil(bits.len() / 8)` bytes.
///
/// Unused trailing bits of the final byte are zero.
pub fn encode_bits(bits: &[bool], order: BitOrder) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (k, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[k / 8] |= 1 << order.shift(k);
        }
    }
    bytes
}

/// Number of bytes a grid of `cell_count` cells occupies on the wire.
pub fn snapshot_len(cell_count: usize) -> usize {
    cell_count.div_ceil(8)
}

// ───────────────────────────────────────────────────────────────────
// Text layer
// ───────────────────────────────────────────────────────────────────

/// How a snapshot's bytes are rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// Standard base64, MSB-first bits. Sent over the socket.
    #[default]
    Base64,
    /// Lowercase hex, LSB-first bits. Returned by `GET /api/get`.
    Hex,
}

impl SnapshotFormat {
    /// The bit order paired with this text encoding.
    pub fn bit_order(self) -> BitOrder {
        match self {
            SnapshotFormat::Base64 => BitOrder::MsbFirst,
            SnapshotFormat::Hex => BitOrder::LsbFirst,
        }
    }

    /// Decode the text payload into raw bytes.
    pub fn decode_payload(self, text: &str) -> Result<Vec<u8>, ProtocolError> {
        let text = text.trim();
        match self {
            SnapshotFormat::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| ProtocolError::InvalidPayload(e.to_string())),
            SnapshotFormat::Hex => {
                hex::decode(text).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
            }
        }
    }

    /// Encode raw bytes as text.
    pub fn encode_payload(self, bytes: &[u8]) -> String {
        match self {
            SnapshotFormat::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
            SnapshotFormat::Hex => hex::encode(bytes),
        }
    }
}

/// Decode a text snapshot straight to cell bits.
///
/// The result has `decoded_bytes * 8` entries; callers truncate it to the
/// declared cell count.
pub fn decode_snapshot(text: &str, format: SnapshotFormat) -> Result<Vec<bool>, ProtocolError> {
    let bytes = format.decode_payload(text)?;
    Ok(decode_bits(&bytes, format.bit_order()))
}

/// Encode cell bits as a text snapshot.
pub fn encode_snapshot(bits: &[bool], format: SnapshotFormat) -> String {
    format.encode_payload(&encode_bits(bits, format.bit_order()))
}
