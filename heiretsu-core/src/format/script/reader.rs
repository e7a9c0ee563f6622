//! Big-endian buffer helpers.
//!
//! Every read takes an absolute offset and never moves a cursor; callers
//! advance their own position. Out-of-range reads fail with
//! [`ScriptError::UnexpectedEof`] instead of panicking.

use byteorder::{BigEndian, ByteOrder};
use heiretsu_nls::{Decoder, TextDecoder};

use crate::error::{Result, ScriptError};

#[inline]
pub fn ensure(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    match offset.checked_add(needed) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(ScriptError::UnexpectedEof {
            offset,
            needed,
            len: buf.len(),
        }),
    }
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    ensure(buf, offset, 2)?;
    Ok(BigEndian::read_u16(&buf[offset..]))
}

pub fn read_i16(buf: &[u8], offset: usize) -> Result<i16> {
    ensure(buf, offset, 2)?;
    Ok(BigEndian::read_i16(&buf[offset..]))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    ensure(buf, offset, 4)?;
    Ok(BigEndian::read_u32(&buf[offset..]))
}

pub fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    ensure(buf, offset, 4)?;
    Ok(BigEndian::read_i32(&buf[offset..]))
}

/// Read the `k`-th 32-bit word of a parameter payload.
#[inline]
pub fn read_word(payload: &[u8], k: usize) -> Result<i32> {
    read_i32(payload, k * 4)
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    ensure(buf, offset, 4)?;
    BigEndian::write_u32(&mut buf[offset..], value);
    Ok(())
}

/// Raw bytes of a length-prefixed string at `pos`, without the NUL terminator.
///
/// Returns the text bytes and the position right after the string.
pub fn read_length_prefixed_bytes(buf: &[u8], pos: usize) -> Result<(&[u8], usize)> {
    let declared = read_i32(buf, pos)?;
    if declared < 0 {
        return Err(ScriptError::MalformedHeader(format!(
            "negative string length {} at 0x{:X}",
            declared, pos
        )));
    }

    let declared = declared as usize;
    ensure(buf, pos + 4, declared)?;
    let text_len = declared.saturating_sub(1);
    Ok((&buf[pos + 4..pos + 4 + text_len], pos + 4 + declared))
}

/// Read a length-prefixed string: a 4-byte length `L` counting the trailing
/// NUL, then `L` bytes. Returns the decoded text and `pos + 4 + L`.
pub fn read_length_prefixed_string(
    buf: &[u8],
    pos: usize,
    decoder: &Decoder,
) -> Result<(String, usize)> {
    let (raw, next) = read_length_prefixed_bytes(buf, pos)?;
    Ok((decoder.decode(raw).into_owned(), next))
}

/// Encode `text` bytes back into the length-prefixed layout, terminator included.
pub fn length_prefixed(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 5);
    out.extend_from_slice(&((text.len() + 1) as u32).to_be_bytes());
    out.extend_from_slice(text);
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use heiretsu_nls::Encoding;

    #[test]
    fn reads_big_endian() {
        let buf = [0x12, 0x34, 0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(read_u16(&buf, 0).unwrap(), 0x1234);
        assert_eq!(read_i16(&buf, 2).unwrap(), -2);
        assert_eq!(read_i32(&buf, 2).unwrap(), 0xFFFE_0001u32 as i32);
    }

    #[test]
    fn short_read_is_eof() {
        let buf = [0u8; 3];
        let err = read_i32(&buf, 0).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::UnexpectedEof { offset: 0, needed: 4, len: 3 }
        ));
        assert!(read_u16(&buf, usize::MAX).is_err());
    }

    #[test]
    fn length_prefixed_string_skips_terminator() {
        let d = Decoder::new(Encoding::ShiftJis);
        let mut buf = length_prefixed(b"ROOM");
        buf.extend_from_slice(&length_prefixed(b""));

        let (s, next) = read_length_prefixed_string(&buf, 0, &d).unwrap();
        assert_eq!(s, "ROOM");
        assert_eq!(next, 4 + 5);

        let (s, next) = read_length_prefixed_string(&buf, next, &d).unwrap();
        assert_eq!(s, "");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn length_prefixed_string_past_end_fails() {
        let d = Decoder::new(Encoding::ShiftJis);
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        assert!(read_length_prefixed_string(&buf, 0, &d).is_err());
    }

    #[test]
    fn write_then_read_word() {
        let mut buf = vec![0u8; 8];
        write_u32(&mut buf, 4, 0x0000_0304).unwrap();
        assert_eq!(read_word(&buf, 1).unwrap(), 0x304);
        assert!(write_u32(&mut buf, 6, 1).is_err());
    }
}
