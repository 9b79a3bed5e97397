//! Parser for authorized keys files with RSA keys in the legacy format.
//!
//! Every line has the form `[options] bits exponent modulus [comment]`, where the numbers are
//! decimal. Empty lines and lines starting with `#` are ignored.

use bytes::Bytes;
use num_bigint_dig::BigUint;
use std::str;
use crate::pubkey::RsaPubkey;

/// A parsed authorized keys file.
///
/// Lines that are not in the expected syntax are kept (so that they can be reported), but they
/// never produce a [`KeyRecord`].
#[derive(Debug, Clone)]
pub struct KeyFile {
    lines: Vec<LineContent>,
}

#[derive(Debug, Clone)]
enum LineContent {
    Comment,
    Record(Box<KeyRecord>),
    Error { line_i: usize, msg: &'static str },
}

/// One key in a [`KeyFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    source: String,
    line_i: usize,
    options: Option<String>,
    bits: u32,
    pubkey: RsaPubkey,
    comment: Option<String>,
}

impl KeyFile {
    /// Parses the contents of the file named `source`.
    ///
    /// This function never fails: invalid lines are skipped (and logged).
    pub fn decode(source: &str, data: Bytes) -> Self {
        let lines = data.split(|&b| b == b'\n')
            .enumerate()
            .map(|(line_i, bytes)| match decode_line(bytes) {
                Ok(None) => LineContent::Comment,
                Ok(Some(parsed)) => LineContent::Record(Box::new(KeyRecord {
                    source: source.into(),
                    line_i,
                    options: parsed.options,
                    bits: parsed.bits,
                    pubkey: parsed.pubkey,
                    comment: parsed.comment,
                })),
                Err(msg) => {
                    log::debug!("{}, line {}: non ssh1 key syntax ({})", source, line_i + 1, msg);
                    LineContent::Error { line_i, msg }
                },
            })
            .collect();
        KeyFile { lines }
    }

    /// Iterates through all keys in the file, in order.
    pub fn records(&self) -> impl Iterator<Item = &KeyRecord> {
        self.lines.iter().filter_map(|line| match line {
            LineContent::Record(record) => Some(&**record),
            LineContent::Comment | LineContent::Error { .. } => None,
        })
    }

    /// Iterates through the lines that could not be parsed, as `(line number, reason)`.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.lines.iter().filter_map(|line| match line {
            LineContent::Error { line_i, msg } => Some((line_i + 1, *msg)),
            LineContent::Comment | LineContent::Record(_) => None,
        })
    }
}

impl KeyRecord {
    /// The name of the file that contains this key.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The line number of this key in the file.
    ///
    /// Lines are counted from 1.
    pub fn line(&self) -> usize {
        self.line_i + 1
    }

    /// The unparsed options of the key, if any.
    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    /// The number of bits announced in the file.
    ///
    /// This may differ from the actual size of the modulus.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The public key.
    pub fn pubkey(&self) -> &RsaPubkey {
        &self.pubkey
    }

    /// The optional comment after the key.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

struct ParsedLine {
    options: Option<String>,
    bits: u32,
    pubkey: RsaPubkey,
    comment: Option<String>,
}

fn decode_line(mut bytes: &[u8]) -> Result<Option<ParsedLine>, &'static str> {
    if let Some(stripped) = bytes.strip_suffix(b"\r") {
        bytes = stripped;
    }

    consume_whitespace(&mut bytes);
    match bytes.first() {
        None | Some(b'#') => return Ok(None),
        _ => {},
    }

    // options come first if the line does not start with a digit
    let options = if bytes[0].is_ascii_digit() {
        None
    } else {
        let options = read_options(&mut bytes)?;
        Some(str::from_utf8(options).map_err(|_| "options are not valid utf-8")?.to_string())
    };

    let bits = read_field(&mut bytes).ok_or("expected number of bits")?;
    let bits = decode_bits(bits).ok_or("number of bits is not a valid decimal number")?;

    let e = read_field(&mut bytes).ok_or("expected public exponent")?;
    let e = decode_decimal(e).ok_or("public exponent is not a decimal number")?;
    let n = read_field(&mut bytes).ok_or("expected modulus")?;
    let n = decode_decimal(n).ok_or("modulus is not a decimal number")?;
    let pubkey = RsaPubkey::new(n, e).map_err(|_| "invalid rsa public key")?;

    consume_whitespace(&mut bytes);
    let comment = match str::from_utf8(bytes) {
        Ok(comment) if !comment.is_empty() => Some(comment.to_string()),
        _ => None,
    };

    Ok(Some(ParsedLine { options, bits, pubkey, comment }))
}

/// Reads the options field, which ends with the first whitespace outside of double quotes.
fn read_options<'b>(bytes: &mut &'b [u8]) -> Result<&'b [u8], &'static str> {
    let mut quoted = false;
    let mut len = 0;
    while len < bytes.len() {
        match bytes[len] {
            b'\\' if bytes.get(len + 1) == Some(&b'"') => len += 1,
            b'"' => quoted = !quoted,
            b if !quoted && (b == b' ' || b == b'\t') => break,
            _ => {},
        }
        len += 1;
    }
    if quoted {
        return Err("unterminated quote in options")
    }

    let options = &bytes[..len];
    *bytes = &bytes[len..];
    Ok(options)
}

fn is_decimal(field: &[u8]) -> bool {
    !field.is_empty() && field.iter().all(|b| b.is_ascii_digit())
}

fn decode_decimal(field: &[u8]) -> Option<BigUint> {
    if !is_decimal(field) {
        return None
    }
    BigUint::parse_bytes(field, 10)
}

fn decode_bits(field: &[u8]) -> Option<u32> {
    if !is_decimal(field) {
        return None
    }
    str::from_utf8(field).ok()?.parse().ok()
}

fn read_field<'b>(bytes: &mut &'b [u8]) -> Option<&'b [u8]> {
    consume_whitespace(bytes);
    if bytes.is_empty() {
        return None
    }

    let mut field_len = 1;
    while field_len < bytes.len() {
        if bytes[field_len].is_ascii_whitespace() {
            break;
        }
        field_len += 1;
    }

    let field = &bytes[..field_len];
    *bytes = &bytes[field_len..];
    Some(field)
}

fn consume_whitespace(bytes: &mut &[u8]) {
    let mut white_len = 0;
    while white_len < bytes.len() && bytes[white_len].is_ascii_whitespace() {
        white_len += 1;
    }
    *bytes = &bytes[white_len..];
}
