use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Big-endian read cursor over a frame payload.
pub(crate) struct WireCursor<'a> {
    data: &'a [u8],
}

impl<'a> WireCursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(FrameError::Truncated(what));
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take_array::<1>(what)?[0])
    }

    pub(crate) fn i8(&mut self, what: &'static str) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn i16(&mut self, what: &'static str) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn i32(&mut self, what: &'static str) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &'static str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn i64(&mut self, what: &'static str) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn f32(&mut self, what: &'static str) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array(what)?))
    }

    pub(crate) fn f64(&mut self, what: &'static str) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array(what)?))
    }

    /// Read `N` packed bits, eight per octet, low bit first.
    pub(crate) fn bits<const N: usize>(&mut self, what: &'static str) -> Result<[bool; N]> {
        let mut out = [false; N];
        let mut octet = 0u8;
        for (i, bit) in out.iter_mut().enumerate() {
            if i % 8 == 0 {
                octet = self.u8(what)?;
            }
            *bit = octet & (1 << (i % 8)) != 0;
        }
        Ok(out)
    }

    pub(crate) fn short_str(&mut self, what: &'static str) -> Result<String> {
        let len = self.u8(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8(what))
    }

    pub(crate) fn long_bytes(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let len = self.u32(what)? as usize;
        self.take(len, what)
    }

    pub(crate) fn long_str(&mut self, what: &'static str) -> Result<String> {
        let raw = self.long_bytes(what)?;
        String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8(what))
    }

    pub(crate) fn expect_end(&self, what: &'static str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(FrameError::Malformed(what))
        }
    }
}

pub(crate) fn put_short_str(dst: &mut BytesMut, value: &str) -> Result<()> {
    let len = value.len();
    if len > u8::MAX as usize {
        return Err(FrameError::ShortStringTooLong { len });
    }
    dst.put_u8(len as u8);
    dst.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn put_long_bytes(dst: &mut BytesMut, value: &[u8]) -> Result<()> {
    let len = value.len();
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst.put_u32(len as u32);
    dst.put_slice(value);
    Ok(())
}

/// Pack consecutive bit fields, eight per octet, low bit first.
pub(crate) fn put_bits(dst: &mut BytesMut, bits: &[bool]) {
    for chunk in bits.chunks(8) {
        let octet = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &set)| if set { acc | (1 << i) } else { acc });
        dst.put_u8(octet);
    }
}

/// Write a u32 length prefix, then whatever `body` writes, and patch the length.
pub(crate) fn put_length_prefixed(
    dst: &mut BytesMut,
    body: impl FnOnce(&mut BytesMut) -> Result<()>,
) -> Result<()> {
    let offset = dst.len();
    dst.put_u32(0);
    body(dst)?;
    let len = dst.len() - offset - 4;
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst[offset..offset + 4].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_share_one_octet() {
        let mut buf = BytesMut::new();
        put_bits(&mut buf, &[true, false, true, true, false]);
        assert_eq!(buf.as_ref(), &[0b0000_1101]);

        let mut cursor = WireCursor::new(&buf);
        let bits: [bool; 5] = cursor.bits("flags").unwrap();
        assert_eq!(bits, [true, false, true, true, false]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn nine_bits_spill_into_second_octet() {
        let mut buf = BytesMut::new();
        put_bits(&mut buf, &[false; 8]);
        put_bits(&mut buf, &[true]);
        let mut packed = BytesMut::new();
        let mut bits = [false; 9];
        bits[8] = true;
        put_bits(&mut packed, &bits);
        assert_eq!(packed, buf);
    }

    #[test]
    fn short_string_limit_enforced() {
        let mut buf = BytesMut::new();
        put_short_str(&mut buf, &"a".repeat(255)).unwrap();
        let err = put_short_str(&mut buf, &"a".repeat(256)).unwrap_err();
        assert!(matches!(err, FrameError::ShortStringTooLong { len: 256 }));
    }

    #[test]
    fn truncated_read_names_the_field() {
        let mut cursor = WireCursor::new(&[0x00]);
        let err = cursor.u16("reply-code").unwrap_err();
        assert!(matches!(err, FrameError::Truncated("reply-code")));
    }

    #[test]
    fn short_string_rejects_invalid_utf8() {
        let mut cursor = WireCursor::new(&[2, 0xff, 0xfe]);
        let err = cursor.short_str("queue").unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8("queue")));
    }

    #[test]
    fn length_prefix_is_patched() {
        let mut buf = BytesMut::new();
        put_length_prefixed(&mut buf, |dst| {
            dst.put_slice(b"abc");
            Ok(())
        })
        .unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 3, b'a', b'b', b'c']);
    }
}
