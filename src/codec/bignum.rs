use num_bigint_dig::BigUint;
use zeroize::Zeroizing;
use crate::error::{Error, Result};
use super::WireBuf;

/// Largest magnitude of a multi-precision integer that we accept from the peer, in bytes.
const MAX_BIGNUM_BYTES: usize = 16384 / 8;

/// Largest bit count of a legacy SSH1 bignum.
const MAX_BIGNUM1_BITS: usize = 16384;

impl WireBuf {
    /// Encode a `mpint` from an unsigned big endian byte string.
    ///
    /// Leading zeros are stripped and a zero byte is prepended if the most significant bit is
    /// set, so that the value is not interpreted as negative.
    pub fn put_mpint_uint_be(&mut self, value: &[u8]) -> Result<()> {
        let mut bytes = value;
        while !bytes.is_empty() && bytes[0] == 0 {
            bytes = &bytes[1..];
        }

        if !bytes.is_empty() && bytes[0] >= 0x80 {
            let dst = self.reserve(4 + 1 + bytes.len())?;
            dst[..4].copy_from_slice(&(bytes.len() as u32 + 1).to_be_bytes());
            dst[4] = 0;
            dst[5..].copy_from_slice(bytes);
            Ok(())
        } else {
            self.put_bytes(bytes)
        }
    }

    /// Encode a `mpint` from a [`BigUint`].
    pub fn put_biguint(&mut self, value: &BigUint) -> Result<()> {
        let bytes = Zeroizing::new(value.to_bytes_be());
        self.put_mpint_uint_be(&bytes)
    }

    /// Decode a non-negative `mpint` into a [`BigUint`].
    ///
    /// Negative numbers and numbers larger than 16384 bits are rejected with
    /// [`Error::InvalidFormat`]. Redundant leading zero bytes are tolerated.
    pub fn get_biguint(&mut self) -> Result<BigUint> {
        let bytes = self.peek_bytes()?;
        if bytes.first().map_or(false, |&b| b & 0x80 != 0) {
            return Err(Error::InvalidFormat("negative mpint"))
        }
        if bytes.len() > MAX_BIGNUM_BYTES + 1 || (bytes.len() == MAX_BIGNUM_BYTES + 1 && bytes[0] != 0) {
            return Err(Error::InvalidFormat("mpint is too large"))
        }

        let value = BigUint::from_bytes_be(bytes);
        let len = bytes.len();
        self.consume(4 + len)?;
        Ok(value)
    }

    /// Encode a legacy SSH1 bignum: a 16-bit count of bits followed by the magnitude.
    pub fn put_bignum1(&mut self, value: &BigUint) -> Result<()> {
        let bits = value.bits();
        if bits > MAX_BIGNUM1_BITS {
            return Err(Error::InvalidArgument("bignum is too large"))
        }
        let bytes = Zeroizing::new(if bits == 0 { Vec::new() } else { value.to_bytes_be() });
        let dst = self.reserve(2 + bytes.len())?;
        dst[..2].copy_from_slice(&(bits as u16).to_be_bytes());
        dst[2..].copy_from_slice(&bytes);
        Ok(())
    }

    /// Decode a legacy SSH1 bignum.
    pub fn get_bignum1(&mut self) -> Result<BigUint> {
        let prefix = self.peek(2)?;
        let bits = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
        if bits > MAX_BIGNUM1_BITS {
            return Err(Error::InvalidFormat("bignum is too large"))
        }

        let len = (bits + 7) / 8;
        let bytes = self.peek(2 + len)?;
        let value = BigUint::from_bytes_be(&bytes[2..]);
        self.consume(2 + len)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use super::*;

    #[test]
    fn test_put_biguint() {
        fn check(bytes: &[u8], expected: &[u8]) {
            let mut b = WireBuf::new();
            b.put_biguint(&BigUint::from_bytes_be(bytes)).unwrap();
            assert_eq!(b.as_slice(), expected);
        }

        // RFC 4251, section 5
        check(&[], &[0,0,0,0]);
        check(&hex!("09a378f9b2e332a7"), &hex!("00000008 09a378f9b2e332a7"));
        check(&hex!("80"), &hex!("00000002 0080"));
        check(&hex!("0000ff"), &hex!("00000002 00ff"));
    }

    #[test]
    fn test_put_mpint_uint_be() {
        let mut b = WireBuf::new();
        b.put_mpint_uint_be(&hex!("0000007f")).unwrap();
        b.put_mpint_uint_be(&hex!("00000000")).unwrap();
        b.put_mpint_uint_be(&hex!("ff01")).unwrap();
        assert_eq!(b.as_slice(), &hex!("00000001 7f 00000000 00000003 00ff01"));
    }

    #[test]
    fn test_get_biguint() {
        fn check(encoded: &[u8], expected: &[u8]) {
            let mut d = WireBuf::from_bytes(encoded);
            assert_eq!(d.get_biguint().unwrap(), BigUint::from_bytes_be(expected));
            assert!(d.is_empty());
        }

        check(&hex!("00000000"), &[]);
        check(&hex!("00000008 09a378f9b2e332a7"), &hex!("09a378f9b2e332a7"));
        check(&hex!("00000002 0080"), &hex!("80"));
        check(&hex!("00000003 0000ff"), &hex!("ff"));
    }

    #[test]
    fn test_get_biguint_invalid() {
        let mut d = WireBuf::from_bytes(&hex!("00000001 80"));
        assert!(matches!(d.get_biguint(), Err(Error::InvalidFormat(_))));
        assert_eq!(d.len(), 5);

        let mut d = WireBuf::from_bytes(&hex!("00000002 ff"));
        assert!(matches!(d.get_biguint(), Err(Error::MessageIncomplete)));

        let mut too_large = WireBuf::new();
        too_large.put_bytes(&[0x01; MAX_BIGNUM_BYTES + 1]).unwrap();
        assert!(matches!(too_large.get_biguint(), Err(Error::InvalidFormat(_))));

        let mut max_size = WireBuf::new();
        let mut bytes = vec![0xff; MAX_BIGNUM_BYTES + 1];
        bytes[0] = 0;
        max_size.put_bytes(&bytes).unwrap();
        assert_eq!(max_size.get_biguint().unwrap().bits(), 16384);
    }

    #[test]
    fn test_bignum1() {
        let mut b = WireBuf::new();
        b.put_bignum1(&BigUint::from(0x1234u32)).unwrap();
        b.put_bignum1(&BigUint::from(0u32)).unwrap();
        assert_eq!(b.as_slice(), &hex!("000d 1234 0000"));

        assert_eq!(b.get_bignum1().unwrap(), BigUint::from(0x1234u32));
        assert_eq!(b.get_bignum1().unwrap(), BigUint::from(0u32));
        assert!(b.is_empty());
    }

    #[test]
    fn test_get_bignum1_invalid() {
        let mut d = WireBuf::from_bytes(&hex!("0011 ffff"));
        assert!(matches!(d.get_bignum1(), Err(Error::MessageIncomplete)));
        assert_eq!(d.len(), 4);

        let mut d = WireBuf::from_bytes(&hex!("4001"));
        assert!(matches!(d.get_bignum1(), Err(Error::InvalidFormat(_))));

        let mut d = WireBuf::from_bytes(&hex!("00"));
        assert!(matches!(d.get_bignum1(), Err(Error::MessageIncomplete)));
    }
}
