//! Wire format for lock contention messages.
//!
//! Every message exchanged between an owner and a requester is a fixed
//! 10-byte frame:
//!
//! | Offset | Size | Field                |
//! |--------|------|----------------------|
//! | 0      | 1    | protocol version     |
//! | 1      | 8    | lock id (i64, BE)    |
//! | 9      | 1    | message type ordinal |
//!
//! The codec is deliberately forgiving in one direction and strict in the
//! other: a frame carrying an unexpected protocol *version* is rejected hard
//! (we cannot know what the rest of the bytes mean), while a frame that is
//! merely *short* — written by an older sender that predates the type byte —
//! or that carries an ordinal we do not know yet decodes with
//! [`PacketType::Unknown`].
//!
//! Encoding and decoding are pure functions over byte slices; no I/O, no
//! shared state.

use thiserror::Error;

/// Version byte written at offset 0 of every frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of a full frame: version + lock id + type.
pub const PACKET_LEN: usize = 10;

/// Size of the mandatory prefix: version + lock id.
const PREFIX_LEN: usize = 9;

/// Errors raised while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The version byte did not match [`PROTOCOL_VERSION`].
    #[error("unsupported lock protocol version {actual} (expected {PROTOCOL_VERSION})")]
    UnsupportedVersion {
        /// The version byte found in the frame.
        actual: u8,
    },

    /// The payload is too short to contain even the version and lock id.
    #[error("lock packet truncated: {0} bytes, need at least {PREFIX_LEN}")]
    Truncated(usize),
}

/// Message types, in wire-ordinal order.
///
/// The discriminant *is* the wire encoding — reordering variants is a
/// protocol change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// A requester asks the owner to release the lock soon.
    UnlockRequest = 0,
    /// The owner acknowledges an unlock request.
    UnlockRequestConfirmation = 1,
    /// The owner announces that the lock has actually been released.
    LockReleaseConfirmation = 2,
    /// Decoded stand-in for short legacy frames and unrecognized ordinals.
    /// Never encoded by this crate.
    Unknown = 3,
}

impl PacketType {
    fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => Self::UnlockRequest,
            1 => Self::UnlockRequestConfirmation,
            2 => Self::LockReleaseConfirmation,
            // Forward compatibility: a newer sender may know types we don't.
            _ => Self::Unknown,
        }
    }
}

/// A decoded contention frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPacket {
    /// Identifier of the contended lock.
    pub lock_id: i64,
    /// What the sender wants.
    pub packet_type: PacketType,
}

/// Encodes a frame for `lock_id` with the given type.
///
/// Deterministic; the returned stack buffer is the only allocation.
pub fn encode(lock_id: i64, packet_type: PacketType) -> [u8; PACKET_LEN] {
    let mut frame = [0u8; PACKET_LEN];
    frame[0] = PROTOCOL_VERSION;
    frame[1..PREFIX_LEN].copy_from_slice(&lock_id.to_be_bytes());
    frame[PREFIX_LEN] = packet_type as u8;
    frame
}

/// Decodes a frame received from a peer.
///
/// Frames shorter than the 9-byte version-plus-id prefix are rejected with
/// [`ProtocolError::Truncated`]; a 9-byte frame decodes with
/// [`PacketType::Unknown`] (legacy sender). Bytes past offset 9 are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedVersion`] when the version byte does
/// not match [`PROTOCOL_VERSION`]. This is a hard failure: nothing past the
/// version byte can be trusted.
pub fn decode(payload: &[u8]) -> Result<LockPacket, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::Truncated(0));
    }
    if payload[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            actual: payload[0],
        });
    }
    if payload.len() < PREFIX_LEN {
        return Err(ProtocolError::Truncated(payload.len()));
    }

    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&payload[1..PREFIX_LEN]);
    let lock_id = i64::from_be_bytes(id_bytes);

    let packet_type = if payload.len() < PACKET_LEN {
        PacketType::Unknown
    } else {
        PacketType::from_ordinal(payload[PREFIX_LEN])
    };

    Ok(LockPacket {
        lock_id,
        packet_type,
    })
}
