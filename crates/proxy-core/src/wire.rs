//! Proxy wire format — the framing spoken between the proxy and the host.
//!
//! Two framings coexist. The outer frame rides directly on the transport and
//! carries one payload for one logical port, preceded by a fixed 40-byte
//! header with a SHA-256 checksum of the payload. The inner frame rides
//! inside a single logical channel and length-prefixes one serialized
//! protobuf message.
//!
//! Every field and every size here is part of the wire format shared with
//! the host side. All types are #[repr(C, packed)] with explicit
//! little-endian integers for deterministic layout and use zerocopy derives
//! for safe, allocation-free serialization.

use sha2::{Digest, Sha256};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Maximum payload size of one outer frame.
/// Larger messages must be split by the sender before framing.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Size of the outer frame header on the wire.
pub const FRAME_HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();

/// Size of the inner protobuf header on the wire.
pub const METHOD_HEADER_SIZE: usize = std::mem::size_of::<MethodHeader>();

/// Length of the NUL-padded method-name field in [`MethodHeader`].
pub const METHOD_NAME_LEN: usize = 256;

// ── Outer frame header ───────────────────────────────────────────────────────

/// Header of one multiplexed frame.
///
/// The receiver can route and verify a frame before interpreting a single
/// byte of payload. A checksum mismatch discards the frame; the stream
/// itself stays aligned because `data_size` is honored either way.
///
/// Wire size: 40 bytes.
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Logical port this payload belongs to.
    pub port: U32<LittleEndian>,

    /// Length of the payload in bytes, not including this header.
    pub data_size: U32<LittleEndian>,

    /// SHA-256 digest of the payload bytes.
    pub checksum: [u8; 32],
}

assert_eq_size!(FrameHeader, [u8; 40]);

impl FrameHeader {
    /// Build the header for `payload` on `port`.
    pub fn new(port: u32, payload: &[u8]) -> Self {
        Self {
            port: U32::new(port),
            data_size: U32::new(payload.len() as u32),
            checksum: checksum(payload),
        }
    }

    /// Recompute the payload digest and compare against the header.
    pub fn verify(&self, payload: &[u8]) -> bool {
        checksum(payload) == self.checksum
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("port", &self.port.get())
            .field("data_size", &self.data_size.get())
            .finish()
    }
}

/// SHA-256 of `payload`, as stored in [`FrameHeader::checksum`].
pub fn checksum(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Encode one complete outer frame: header followed by payload.
///
/// The result is written to the transport with a single write so frames from
/// concurrent channels never interleave.
pub fn encode_frame(port: u32, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }

    let header = FrameHeader::new(port, payload);
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);

    Ok(frame)
}

// ── Inner protobuf header ────────────────────────────────────────────────────

/// Length prefix for one serialized protobuf message inside a channel.
///
/// The method-name field is informational and may be all zeroes; framing
/// uses only `data_size`.
///
/// Wire size: 260 bytes.
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct MethodHeader {
    /// NUL-padded method name. Not interpreted by the proxy.
    pub method: [u8; METHOD_NAME_LEN],

    /// Length of the protobuf message that follows.
    pub data_size: U32<LittleEndian>,
}

assert_eq_size!(MethodHeader, [u8; 260]);

impl MethodHeader {
    /// Header with an empty method field.
    pub fn new(data_size: u32) -> Self {
        Self {
            method: [0u8; METHOD_NAME_LEN],
            data_size: U32::new(data_size),
        }
    }

    /// Header carrying a method name. Fails if `name` does not fit.
    pub fn with_method(name: &str, data_size: u32) -> Result<Self, WireError> {
        if name.len() > METHOD_NAME_LEN {
            return Err(WireError::MethodNameTooLong(name.len()));
        }

        let mut header = Self::new(data_size);
        header.method[..name.len()].copy_from_slice(name.as_bytes());

        Ok(header)
    }

    /// The method name with NUL padding stripped. Empty if unset.
    pub fn method(&self) -> &str {
        let end = self
            .method
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(METHOD_NAME_LEN);

        std::str::from_utf8(&self.method[..end]).unwrap_or("")
    }
}

impl std::fmt::Debug for MethodHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHeader")
            .field("method", &self.method())
            .field("data_size", &self.data_size.get())
            .finish()
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when producing wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload length {0} exceeds maximum {max}", max = MAX_MESSAGE_SIZE)]
    PayloadTooLarge(usize),

    #[error("method name length {0} exceeds field size {max}", max = METHOD_NAME_LEN)]
    MethodNameTooLong(usize),
}

// ── Tests ────────────────────────────────────────────────────────────────────
