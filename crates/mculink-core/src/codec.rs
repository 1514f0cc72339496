//! Packet codec boundary.
//!
//! The daemon does not interpret outbound payloads. It only needs one
//! fact about each queued frame: the declared payload length, from which
//! the wire byte count follows as `2 * L + header + terminator` (payload
//! bytes travel as two ASCII-hex characters each).
//!
//! [`PacketCodec`] is the seam; [`HexHeaderCodec`] is the default
//! implementation, reading a fixed-width ASCII-hex length header from the
//! front of the frame.

use crate::constants::{FRAME_HEADER_BYTES, FRAME_TERMINATOR_BYTES, MAX_DECLARED_LENGTH};
use crate::error::{Error, Result};

/// Decodes the declared payload length out of an outbound queue message.
pub trait PacketCodec {
    /// Declared payload length of `frame`, in pre-expansion bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the frame carries no valid header.
    fn declared_length(&self, frame: &[u8]) -> Result<usize>;
}

/// Wire byte count for a declared payload length.
///
/// Each payload byte expands to two wire bytes, preceded by the fixed
/// header and followed by one terminator byte.
///
/// # Examples
///
/// ```
/// use mculink_core::codec::wire_length;
/// use mculink_core::constants::FRAME_HEADER_BYTES;
///
/// assert_eq!(wire_length(0), FRAME_HEADER_BYTES + 1);
/// assert_eq!(wire_length(3), 2 * 3 + FRAME_HEADER_BYTES + 1);
/// ```
pub fn wire_length(declared: usize) -> usize {
    2 * declared + FRAME_HEADER_BYTES + FRAME_TERMINATOR_BYTES
}

/// Default codec: the first [`FRAME_HEADER_BYTES`] bytes of a frame are
/// ASCII hex digits giving the payload length.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexHeaderCodec;

impl PacketCodec for HexHeaderCodec {
    fn declared_length(&self, frame: &[u8]) -> Result<usize> {
        if frame.len() < FRAME_HEADER_BYTES {
            return Err(Error::Decode(format!(
                "frame of {} bytes is shorter than the {} byte header",
                frame.len(),
                FRAME_HEADER_BYTES
            )));
        }

        let header = &frame[..FRAME_HEADER_BYTES];
        let header = std::str::from_utf8(header)
            .map_err(|_| Error::Decode("length header is not ASCII".into()))?;
        let declared = usize::from_str_radix(header, 16)
            .map_err(|_| Error::Decode(format!("length header {header:?} is not hex")))?;

        if declared > MAX_DECLARED_LENGTH {
            return Err(Error::Decode(format!(
                "declared length {declared} exceeds maximum {MAX_DECLARED_LENGTH}"
            )));
        }

        Ok(declared)
    }
}

impl HexHeaderCodec {
    /// Build a frame around `payload` for queueing: hex length header,
    /// payload expanded to two hex characters per byte, trailing newline.
    /// The result is exactly [`wire_length`]`(payload.len())` bytes, the
    /// count the transmit pipeline will write. Used by tests and peer
    /// tooling.
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(wire_length(payload.len()));
        frame.extend_from_slice(format!("{:04x}", payload.len()).as_bytes());
        for byte in payload {
            frame.extend_from_slice(format!("{byte:02x}").as_bytes());
        }
        frame.push(b'\n');
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_length_zero() {
        let codec = HexHeaderCodec;
        assert_eq!(codec.declared_length(b"0000\n").unwrap(), 0);
        assert_eq!(wire_length(0), FRAME_HEADER_BYTES + 1);
    }

    #[test]
    fn declared_length_one() {
        let codec = HexHeaderCodec;
        assert_eq!(codec.declared_length(b"0001a\n").unwrap(), 1);
        assert_eq!(wire_length(1), 2 + FRAME_HEADER_BYTES + 1);
    }

    #[test]
    fn declared_length_maximum() {
        let codec = HexHeaderCodec;
        let header = format!("{MAX_DECLARED_LENGTH:04x}");
        assert_eq!(
            codec.declared_length(header.as_bytes()).unwrap(),
            MAX_DECLARED_LENGTH
        );
        assert!(wire_length(MAX_DECLARED_LENGTH) <= crate::constants::QUEUE_MESSAGE_BYTES as usize);
    }

    #[test]
    fn rejects_length_above_maximum() {
        let codec = HexHeaderCodec;
        let header = format!("{:04x}", MAX_DECLARED_LENGTH + 1);
        assert!(matches!(
            codec.declared_length(header.as_bytes()),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn rejects_short_frame() {
        let codec = HexHeaderCodec;
        assert!(matches!(
            codec.declared_length(b"00"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn rejects_non_hex_header() {
        let codec = HexHeaderCodec;
        assert!(matches!(
            codec.declared_length(b"zz00rest"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn encode_round_trips_through_declared_length() {
        let codec = HexHeaderCodec;
        let frame = HexHeaderCodec::encode(b"abc");
        assert_eq!(codec.declared_length(&frame).unwrap(), 3);
        assert_eq!(frame.len(), wire_length(3));
        assert_eq!(&frame, b"0003616263\n");
    }
}
