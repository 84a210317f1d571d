//! Length-prefixed framing for break messages.
//!
//! Each frame is a `u32` little-endian payload length followed by the
//! payload bytes. The length cap rejects corrupt or hostile prefixes before
//! any allocation happens.

use std::io::{Read, Write};

/// Largest accepted frame. Break streams are small; anything near this is
/// corruption.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors from frame reading/writing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

/// Write one frame: length prefix then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one frame, validating the length prefix before allocating.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip_single_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"hello");
    }

    #[test]
    fn test_roundtrip_multiple_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"one").unwrap();
        write_frame(&mut buf, b"").unwrap();
        write_frame(&mut buf, &[7u8; 300]).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"one");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"");
        assert_eq!(read_frame(&mut cursor).unwrap(), vec![7u8; 300]);
    }

    #[test]
    fn test_oversized_write_rejected() {
        let mut buf = Vec::new();
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            write_frame(&mut buf, &payload),
            Err(FrameError::TooLarge { .. })
        ));
        assert!(buf.is_empty(), "nothing may be written on rejection");
    }

    #[test]
    fn test_hostile_length_prefix_rejected_before_read() {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(b"abc"); // 3 of 10 promised bytes
        let mut cursor = Cursor::new(data);
        assert!(matches!(read_frame(&mut cursor), Err(FrameError::Io(_))));
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"abcd").unwrap();
        assert_eq!(&buf[0..4], &[4, 0, 0, 0]);
    }
}
