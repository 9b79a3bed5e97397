use bytes::Bytes;
use std::fmt;
use std::str;
use zeroize::Zeroize as _;
use crate::error::{Error, Result};

/// Default ceiling on the size of a [`WireBuf`].
pub const DEFAULT_MAX_SIZE: usize = 0x800_0000;

/// Largest payload of a `string` field that still fits the 32-bit length prefix together with
/// the prefix itself.
const MAX_STRING_LEN: usize = 0xffff_ffff - 4;

/// Growable buffer for encoding and decoding SSH messages (low level API).
///
/// The format of SSH payloads is described in RFC 4251, section 5. Values are appended to the end
/// of the buffer with the `put_*` methods and read from the front with the `get_*` methods; the
/// bytes that were read are logically removed from the buffer.
///
/// Every read funnels through [`consume()`][Self::consume()], which fails with
/// [`Error::MessageIncomplete`] when fewer bytes remain than requested, so a truncated or
/// malicious message can never make us read past the end of the data we have.
///
/// A buffer created with [`sensitive()`][Self::sensitive()] zeroes its storage when it is dropped,
/// reset or reallocated; use it for anything that holds secrets.
#[derive(Clone)]
pub struct WireBuf {
    buf: Vec<u8>,
    off: usize,
    max_size: usize,
    sensitive: bool,
}

impl WireBuf {
    /// Creates an empty buffer.
    pub fn new() -> WireBuf {
        WireBuf { buf: Vec::new(), off: 0, max_size: DEFAULT_MAX_SIZE, sensitive: false }
    }

    /// Creates an empty buffer that zeroes its contents before releasing memory.
    pub fn sensitive() -> WireBuf {
        WireBuf { buf: Vec::new(), off: 0, max_size: DEFAULT_MAX_SIZE, sensitive: true }
    }

    /// Creates a buffer that contains a copy of `data`, ready for decoding.
    pub fn from_bytes(data: &[u8]) -> WireBuf {
        WireBuf { buf: data.to_vec(), off: 0, max_size: DEFAULT_MAX_SIZE, sensitive: false }
    }

    /// Is this buffer zeroed on release?
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Number of bytes that were not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len() - self.off
    }

    /// Returns true if all bytes were consumed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes that were not yet consumed.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.off..]
    }

    /// Maximal size of the buffer.
    ///
    /// The consumed prefix counts towards the limit only until the buffer needs the space: it is
    /// reclaimed before a write is refused.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Changes the maximal size of the buffer.
    ///
    /// Fails with [`Error::NoBufferSpace`] if the buffer already holds more than `max_size` bytes.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<()> {
        if self.len() > max_size {
            return Err(Error::NoBufferSpace)
        }
        self.pack();
        self.max_size = max_size;
        Ok(())
    }

    /// Discards all data in the buffer.
    pub fn reset(&mut self) {
        if self.sensitive {
            self.buf.as_mut_slice().zeroize();
        }
        self.buf.clear();
        self.off = 0;
    }

    /// Advances the read position by `len` bytes.
    ///
    /// This is the single place that checks the bounds of every read.
    pub fn consume(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            return Err(Error::MessageIncomplete)
        }
        self.off += len;
        Ok(())
    }

    /// Fails with [`Error::TrailingData`] if any bytes were not consumed.
    ///
    /// Call this after decoding the last field of a message.
    pub fn ensure_end(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::TrailingData)
        }
    }

    /// Appends `len` zero bytes and returns them for writing.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        if self.off > 0 && self.off == self.buf.len() {
            self.reset();
        }

        let mut new_len = self.buf.len().checked_add(len).ok_or(Error::NoBufferSpace)?;
        if self.off > 0 && (new_len > self.max_size || new_len > self.buf.capacity()) {
            // reclaim the consumed prefix before refusing or reallocating
            self.pack();
            new_len = self.buf.len() + len;
        }
        if new_len > self.max_size {
            return Err(Error::NoBufferSpace)
        }

        if new_len > self.buf.capacity() {
            self.grow(new_len)?;
        }

        let start = self.buf.len();
        self.buf.resize(new_len, 0);
        Ok(&mut self.buf[start..])
    }

    fn grow(&mut self, min_capacity: usize) -> Result<()> {
        let capacity = min_capacity
            .max(self.buf.capacity().saturating_mul(2))
            .min(self.max_size.max(min_capacity));

        if !self.sensitive {
            let additional = capacity - self.buf.len();
            return self.buf.try_reserve(additional).map_err(|_| Error::AllocFail)
        }

        // never let the allocator release memory that held secrets
        let mut new_buf = Vec::new();
        new_buf.try_reserve_exact(capacity).map_err(|_| Error::AllocFail)?;
        new_buf.extend_from_slice(&self.buf);
        let mut old_buf = std::mem::replace(&mut self.buf, new_buf);
        old_buf.zeroize();
        Ok(())
    }

    fn pack(&mut self) {
        if self.off == 0 {
            return
        }
        self.buf.copy_within(self.off.., 0);
        let new_len = self.buf.len() - self.off;
        if self.sensitive {
            self.buf[new_len..].zeroize();
        }
        self.buf.truncate(new_len);
        self.off = 0;
    }

    /// Returns `len` bytes from the front without consuming them.
    pub fn peek(&self, len: usize) -> Result<&[u8]> {
        if len > self.len() {
            return Err(Error::MessageIncomplete)
        }
        Ok(&self.buf[self.off..][..len])
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let start = self.off;
        self.consume(N)?;
        let mut array = [0; N];
        array.copy_from_slice(&self.buf[start..start + N]);
        Ok(array)
    }

    /// Decode a `byte`.
    pub fn get_u8(&mut self) -> Result<u8> {
        self.get_array::<1>().map(|x| x[0])
    }

    /// Decode a `boolean`.
    pub fn get_bool(&mut self) -> Result<bool> {
        self.get_u8().map(|x| x != 0)
    }

    /// Decode a big endian `u16`.
    pub fn get_u16(&mut self) -> Result<u16> {
        self.get_array().map(u16::from_be_bytes)
    }

    /// Decode a `uint32`.
    pub fn get_u32(&mut self) -> Result<u32> {
        self.get_array().map(u32::from_be_bytes)
    }

    /// Decode a `uint64`.
    pub fn get_u64(&mut self) -> Result<u64> {
        self.get_array().map(u64::from_be_bytes)
    }

    /// Read `len` bytes directly from the buffer.
    pub fn get_raw(&mut self, len: usize) -> Result<Bytes> {
        let start = self.off;
        self.consume(len)?;
        Ok(Bytes::copy_from_slice(&self.buf[start..start + len]))
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.consume(len)
    }

    /// Look at the payload of the next `string` without consuming it.
    ///
    /// The declared length is checked against the number of remaining bytes before the payload is
    /// returned.
    pub fn peek_bytes(&self) -> Result<&[u8]> {
        let prefix = self.peek(4)?;
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if self.len() - 4 < len {
            return Err(Error::MessageIncomplete)
        }
        Ok(&self.buf[self.off + 4..][..len])
    }

    /// Decode a `string`.
    pub fn get_bytes(&mut self) -> Result<Bytes> {
        let value = Bytes::copy_from_slice(self.peek_bytes()?);
        self.consume(4 + value.len()).map_err(|_| Error::Internal("peeked string is not in buffer"))?;
        Ok(value)
    }

    /// Decode a `string` with fixed length.
    pub fn get_byte_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.peek_bytes()?;
        if bytes.len() != N {
            return Err(Error::InvalidFormat("wrong size of `string`"))
        }

        let mut array = [0; N];
        array.copy_from_slice(bytes);
        self.consume(4 + N)?;
        Ok(array)
    }

    /// Looks at the next `string` as a C string; returns the text and the encoded length.
    fn peek_cstring(&self) -> Result<(&[u8], usize)> {
        let bytes = self.peek_bytes()?;
        let text = match bytes.iter().position(|&b| b == 0) {
            Some(pos) if pos + 1 < bytes.len() =>
                return Err(Error::InvalidFormat("string contains embedded NUL")),
            Some(pos) => &bytes[..pos],
            None => bytes,
        };
        Ok((text, 4 + bytes.len()))
    }

    /// Decode a `string` that holds a C string, as raw bytes.
    ///
    /// A NUL byte is allowed only as the very last byte of the payload (some peers count the
    /// terminator into the length), and it is stripped from the result. A NUL anywhere else fails
    /// with [`Error::InvalidFormat`]. The bytes are not required to be valid UTF-8.
    pub fn get_cstring_bytes(&mut self) -> Result<Bytes> {
        let (text, encoded_len) = self.peek_cstring()?;
        let text = Bytes::copy_from_slice(text);
        self.consume(encoded_len)?;
        Ok(text)
    }

    /// Decode a `string` that holds text.
    ///
    /// Applies the NUL rule of [`get_cstring_bytes()`][Self::get_cstring_bytes()] and, in
    /// addition, fails with [`Error::InvalidFormat`] if the text is not valid UTF-8. Nothing is
    /// consumed when the string is rejected.
    pub fn get_cstring(&mut self) -> Result<String> {
        let (text, encoded_len) = self.peek_cstring()?;
        let text = str::from_utf8(text)
            .map_err(|_| Error::InvalidFormat("string is not valid utf-8"))?
            .to_string();
        self.consume(encoded_len)?;
        Ok(text)
    }

    /// Decode a `name-list`.
    pub fn get_name_list(&mut self) -> Result<Vec<String>> {
        let list = self.get_cstring()?;
        if list.is_empty() {
            return Ok(Vec::new())
        }
        Ok(list.split(',').map(|x| x.into()).collect())
    }

    /// Encode a `byte`.
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_raw(&[value])
    }

    /// Encode a `boolean`.
    pub fn put_bool(&mut self, value: bool) -> Result<()> {
        self.put_u8(value as u8)
    }

    /// Encode a big endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_raw(&value.to_be_bytes())
    }

    /// Encode a `uint32`.
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_raw(&value.to_be_bytes())
    }

    /// Encode a `uint64`.
    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put_raw(&value.to_be_bytes())
    }

    /// Append raw bytes to the buffer.
    pub fn put_raw(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Append the unconsumed bytes of another buffer.
    pub fn put_buf(&mut self, other: &WireBuf) -> Result<()> {
        self.put_raw(other.as_slice())
    }

    /// Encode a `string`.
    ///
    /// Fails with [`Error::NoBufferSpace`] if `value` does not fit into the 32-bit length prefix.
    pub fn put_bytes(&mut self, value: &[u8]) -> Result<()> {
        if value.len() > MAX_STRING_LEN {
            return Err(Error::NoBufferSpace)
        }
        let dst = self.reserve(4 + value.len())?;
        dst[..4].copy_from_slice(&(value.len() as u32).to_be_bytes());
        dst[4..].copy_from_slice(value);
        Ok(())
    }

    /// Encode a `string` that holds text (no terminator is stored).
    pub fn put_str(&mut self, value: &str) -> Result<()> {
        self.put_bytes(value.as_bytes())
    }

    /// Encode a `name-list`.
    pub fn put_name_list(&mut self, names: &[&str]) -> Result<()> {
        self.put_str(&names.join(","))
    }

    /// Append formatted text (without a length prefix).
    ///
    /// The length of the text is computed first and exactly that much space is reserved; if the
    /// second formatting pass writes a different number of bytes, the reserved space is released
    /// and [`Error::Internal`] is returned.
    pub fn put_fmt(&mut self, args: fmt::Arguments) -> Result<()> {
        let mut counter = LenCounter(0);
        fmt::write(&mut counter, args).map_err(|_| Error::InvalidArgument("could not format text"))?;
        let len = counter.0;
        if len == 0 {
            return Ok(())
        }

        let dst = self.reserve(len)?;
        let mut writer = SliceWriter { dst, written: 0 };
        let write_res = fmt::write(&mut writer, args);
        let written = writer.written;
        if write_res.is_err() || written != len {
            // `reserve()` may have moved the data, so the start is taken from the end
            let start = self.buf.len() - len;
            self.buf.truncate(start);
            return Err(Error::Internal("formatted length does not match"))
        }
        Ok(())
    }

    /// Converts the unconsumed bytes into [`Bytes`].
    ///
    /// For a sensitive buffer, the bytes are copied and the buffer itself is zeroed.
    pub fn into_bytes(mut self) -> Bytes {
        if self.sensitive {
            return Bytes::copy_from_slice(self.as_slice())
        }
        let off = self.off;
        let buf = std::mem::take(&mut self.buf);
        Bytes::from(buf).slice(off..)
    }
}

impl Default for WireBuf {
    fn default() -> Self { Self::new() }
}

impl Drop for WireBuf {
    fn drop(&mut self) {
        if self.sensitive {
            self.buf.zeroize();
        }
    }
}

impl fmt::Debug for WireBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct("WireBuf");
        s.field("len", &self.len());
        if self.sensitive {
            s.field("sensitive", &true);
        } else {
            s.field("data", &Bytes::copy_from_slice(self.as_slice()));
        }
        s.finish()
    }
}

impl From<Bytes> for WireBuf {
    fn from(data: Bytes) -> Self {
        WireBuf::from_bytes(&data)
    }
}

struct LenCounter(usize);

impl fmt::Write for LenCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

struct SliceWriter<'d> {
    dst: &'d mut [u8],
    written: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.written.checked_add(s.len()).ok_or(fmt::Error)?;
        if end > self.dst.len() {
            return Err(fmt::Error)
        }
        self.dst[self.written..end].copy_from_slice(s.as_bytes());
        self.written = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<D: AsRef<[u8]> + ?Sized>(data: &D) -> WireBuf {
        WireBuf::from_bytes(data.as_ref())
    }

    #[test]
    fn test_empty() {
        let b = WireBuf::new();
        assert!(b.is_empty());
        assert!(b.into_bytes().is_empty());
    }

    #[test]
    fn test_put_fixed_width() {
        let mut b = WireBuf::new();
        b.put_u8(0xab).unwrap();
        b.put_u16(0x1234).unwrap();
        b.put_u32(0xdeadbeef).unwrap();
        b.put_u64(0x0102030405060708).unwrap();
        assert_eq!(b.as_slice(), &[
            0xab,
            0x12,0x34,
            0xde,0xad,0xbe,0xef,
            1,2,3,4,5,6,7,8,
        ]);
    }

    #[test]
    fn test_get_fixed_width() {
        let mut d = decode(&[0xab, 0x12,0x34, 0,0,0,42, 0,0,0,0,0,0,1,0]);
        assert_eq!(d.get_u8().unwrap(), 0xab);
        assert_eq!(d.get_u16().unwrap(), 0x1234);
        assert_eq!(d.get_u32().unwrap(), 42);
        assert_eq!(d.get_u64().unwrap(), 256);
        assert!(d.is_empty());
        assert!(matches!(d.get_u8(), Err(Error::MessageIncomplete)));
    }

    #[test]
    fn test_fixed_width_roundtrip() {
        let mut b = WireBuf::new();
        for x in [0u64, 1, 0xff, 0x1_0000_0000, u64::MAX] {
            b.put_u64(x).unwrap();
            b.put_u32(x as u32).unwrap();
            b.put_u16(x as u16).unwrap();
            b.put_u8(x as u8).unwrap();
        }
        for x in [0u64, 1, 0xff, 0x1_0000_0000, u64::MAX] {
            assert_eq!(b.get_u64().unwrap(), x);
            assert_eq!(b.get_u32().unwrap(), x as u32);
            assert_eq!(b.get_u16().unwrap(), x as u16);
            assert_eq!(b.get_u8().unwrap(), x as u8);
        }
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn test_truncated_fixed_width() {
        fn check(full: &[u8], get: fn(&mut WireBuf) -> Result<()>) {
            assert!(get(&mut decode(full)).is_ok());
            for cut in 0..full.len() {
                let mut d = decode(&full[..cut]);
                assert!(matches!(get(&mut d), Err(Error::MessageIncomplete)), "cut {}", cut);
                assert_eq!(d.len(), cut, "failed read must not consume");
            }
        }

        check(&[1,2], |d| d.get_u16().map(drop));
        check(&[1,2,3,4], |d| d.get_u32().map(drop));
        check(&[1,2,3,4,5,6,7,8], |d| d.get_u64().map(drop));
        check(&[0,0,0,3, 1,2,3], |d| d.get_bytes().map(drop));
        check(&[0,0,0,2, b'a',b'b'], |d| d.get_cstring().map(drop));
    }

    #[test]
    fn test_get_bytes() {
        let mut d = decode(&[0,0,0,2, 10,20]);
        assert_eq!(d.get_bytes().unwrap().as_ref(), &[10,20]);
        assert!(d.is_empty());

        let mut d = decode(&[0,0,2]);
        assert!(matches!(d.get_bytes(), Err(Error::MessageIncomplete)));

        let mut d = decode(&[0,0,0,8, 10,20,30]);
        assert!(matches!(d.get_bytes(), Err(Error::MessageIncomplete)));
        assert_eq!(d.len(), 7);

        let mut d = decode(&[0xff,0xff,0xff,0xff, 1]);
        assert!(matches!(d.get_bytes(), Err(Error::MessageIncomplete)));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut b = WireBuf::new();
        let values: Vec<Vec<u8>> = (0..40).map(|len| (0..len).map(|x| x as u8 ^ 0x5a).collect()).collect();
        for value in values.iter() {
            b.put_bytes(value).unwrap();
        }
        for value in values.iter() {
            assert_eq!(b.get_bytes().unwrap().as_ref(), value.as_slice());
        }
        assert!(b.is_empty());
    }

    #[test]
    fn test_peek_bytes() {
        let d = decode(&[0,0,0,3, b'a',b'b',b'c', 9]);
        assert_eq!(d.peek_bytes().unwrap(), b"abc");
        assert_eq!(d.len(), 8);

        let d = decode(&[0,0,0,4, b'a',b'b',b'c']);
        assert!(matches!(d.peek_bytes(), Err(Error::MessageIncomplete)));
    }

    #[test]
    fn test_get_cstring() {
        let mut d = decode(&[0,0,0,3, b'a',b'b',0]);
        assert_eq!(d.get_cstring().unwrap(), "ab");
        assert!(d.is_empty());

        let mut d = decode(&[0,0,0,3, b'a',0,b'b']);
        assert!(matches!(d.get_cstring(), Err(Error::InvalidFormat(_))));
        assert_eq!(d.len(), 7);

        let mut d = decode(&[0,0,0,2, 0,0]);
        assert!(matches!(d.get_cstring(), Err(Error::InvalidFormat(_))));

        let mut d = decode(&[0,0,0,1, 0]);
        assert_eq!(d.get_cstring().unwrap(), "");

        let mut d = decode(&[0,0,0,2, 0xc3,0x28]);
        assert!(matches!(d.get_cstring(), Err(Error::InvalidFormat(_))));
        assert_eq!(d.len(), 6);
    }

    #[test]
    fn test_get_cstring_bytes() {
        let mut d = decode(&[0,0,0,3, 0xc3,0x28,0, 0,0,0,1, 0xff]);
        assert_eq!(d.get_cstring_bytes().unwrap().as_ref(), &[0xc3, 0x28]);
        assert_eq!(d.get_cstring_bytes().unwrap().as_ref(), &[0xff]);
        assert!(d.is_empty());

        let mut d = decode(&[0,0,0,3, 0xff,0,0xff]);
        assert!(matches!(d.get_cstring_bytes(), Err(Error::InvalidFormat(_))));
        assert_eq!(d.len(), 7);

        let mut d = decode(&[0,0,0,4, 0xff]);
        assert!(matches!(d.get_cstring_bytes(), Err(Error::MessageIncomplete)));
    }

    #[test]
    fn test_get_byte_array() {
        let mut d = decode(&[0,0,0,2, 1,2]);
        assert_eq!(d.get_byte_array::<2>().unwrap(), [1,2]);

        let mut d = decode(&[0,0,0,2, 1,2]);
        assert!(matches!(d.get_byte_array::<3>(), Err(Error::InvalidFormat(_))));
        assert_eq!(d.len(), 6);
    }

    #[test]
    fn test_name_list() {
        let mut d = decode(&b"\x00\x00\x00\x00"[..]);
        assert_eq!(d.get_name_list().unwrap(), Vec::<String>::new());

        let mut d = decode(&b"\x00\x00\x00\x09zlib,none"[..]);
        assert_eq!(d.get_name_list().unwrap(), vec!["zlib", "none"]);

        let mut d = decode(&b"\x00\x00\x00\x05zlib,"[..]);
        assert_eq!(d.get_name_list().unwrap(), vec!["zlib", ""]);

        let mut b = WireBuf::new();
        b.put_name_list(&[]).unwrap();
        b.put_name_list(&["foo", "bar"]).unwrap();
        assert_eq!(b.as_slice(), &[0,0,0,0, 0,0,0,7, b'f',b'o',b'o',b',',b'b',b'a',b'r']);
    }

    #[test]
    fn test_consume() {
        let mut d = decode(&[1,2,3]);
        d.consume(2).unwrap();
        assert_eq!(d.as_slice(), &[3]);
        assert!(matches!(d.consume(2), Err(Error::MessageIncomplete)));
        d.consume(1).unwrap();
        assert!(d.is_empty());
        d.consume(0).unwrap();
    }

    #[test]
    fn test_ensure_end() {
        let mut d = decode(&[0,0,0,1]);
        assert!(matches!(d.ensure_end(), Err(Error::TrailingData)));
        d.get_u32().unwrap();
        d.ensure_end().unwrap();
    }

    #[test]
    fn test_max_size() {
        let mut b = WireBuf::new();
        b.set_max_size(8).unwrap();
        b.put_u32(1).unwrap();
        assert!(matches!(b.put_bytes(&[1, 2]), Err(Error::NoBufferSpace)));
        assert_eq!(b.len(), 4);
        b.put_u32(2).unwrap();
        assert!(matches!(b.put_u8(3), Err(Error::NoBufferSpace)));
        assert!(b.set_max_size(4).is_err());

        // consumed bytes are reclaimed before we run out of space
        b.get_u32().unwrap();
        b.get_u32().unwrap();
        b.put_u64(42).unwrap();
        assert_eq!(b.get_u64().unwrap(), 42);
    }

    #[test]
    fn test_max_size_reclaims_partly_consumed() {
        let mut b = WireBuf::new();
        b.set_max_size(8).unwrap();
        b.put_u32(1).unwrap();
        b.put_u32(2).unwrap();
        assert_eq!(b.get_u32().unwrap(), 1);
        b.put_u32(3).unwrap();
        assert_eq!(b.len(), 8);
        assert_eq!(b.get_u32().unwrap(), 2);
        assert_eq!(b.get_u32().unwrap(), 3);

        // a long-lived buffer that is never drained does not grow without bound
        b.put_u32(0).unwrap();
        for i in 1..100u32 {
            b.put_u32(i).unwrap();
            assert_eq!(b.get_u32().unwrap(), i - 1);
        }
        assert_eq!(b.len(), 4);
        b.put_u32(100).unwrap();
        assert!(matches!(b.put_u8(0), Err(Error::NoBufferSpace)));
    }

    #[test]
    fn test_put_fmt() {
        let mut b = WireBuf::new();
        b.put_fmt(format_args!("SSH-{}-{}", "2.0", 42)).unwrap();
        b.put_fmt(format_args!("")).unwrap();
        assert_eq!(b.as_slice(), b"SSH-2.0-42");
    }

    #[test]
    fn test_put_fmt_mismatch() {
        use std::cell::Cell;

        // formats to a different length on every call
        struct Unstable(Cell<usize>);
        impl fmt::Display for Unstable {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let n = self.0.get();
                self.0.set(n + 1);
                for _ in 0..n { f.write_str("x")?; }
                Ok(())
            }
        }

        let mut b = WireBuf::new();
        b.put_u8(7).unwrap();
        let value = Unstable(Cell::new(2));
        assert!(matches!(b.put_fmt(format_args!("{}", value)), Err(Error::Internal(_))));
        assert_eq!(b.as_slice(), &[7]);
    }

    #[test]
    fn test_sensitive_grow() {
        let mut b = WireBuf::sensitive();
        for i in 0..1000u32 {
            b.put_u32(i).unwrap();
        }
        for i in 0..1000u32 {
            assert_eq!(b.get_u32().unwrap(), i);
        }
        assert!(b.is_sensitive());
        assert!(!format!("{:?}", b).contains("data"));
    }

    #[test]
    fn test_into_bytes_after_consume() {
        let mut b = WireBuf::new();
        b.put_u32(1).unwrap();
        b.put_u8(2).unwrap();
        b.get_u32().unwrap();
        assert_eq!(b.into_bytes().as_ref(), &[2]);
    }
}
