//! Minimal DER walker. Only low-tag-number forms are supported, which is all
//! an X.509 TBSCertificate uses.

use crate::ParseError;

pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_UTF8_STRING: u8 = 0x0c;
pub(crate) const TAG_PRINTABLE_STRING: u8 = 0x13;
pub(crate) const TAG_IA5_STRING: u8 = 0x16;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_SET: u8 = 0x31;
pub(crate) const TAG_VERSION: u8 = 0xa0;
pub(crate) const TAG_DNS_NAME: u8 = 0x82;

const CONSTRUCTED: u8 = 0x20;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn is_constructed(&self) -> bool {
        self.tag & CONSTRUCTED != 0
    }

    pub fn children(&self) -> Children<'a> {
        Children { rest: self.value }
    }
}

/// Reads one TLV from the front of `input`, returning it and the remainder.
pub(crate) fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), ParseError> {
    let (&tag, rest) = input.split_first().ok_or_else(|| ParseError::Der("empty input".into()))?;
    if tag & 0x1f == 0x1f {
        return Err(ParseError::Der(format!("high tag number form is not supported (tag {tag:#x})")));
    }
    let (&first, mut rest) = rest.split_first().ok_or_else(|| ParseError::Der("missing length".into()))?;
    let len = if first < 0x80 {
        first as usize
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 4 || rest.len() < n {
            return Err(ParseError::Der(format!("unsupported length encoding {first:#x}")));
        }
        let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        rest = &rest[n..];
        len
    };
    if rest.len() < len {
        return Err(ParseError::Der(format!("length {len} exceeds remaining {}", rest.len())));
    }
    let (value, rest) = rest.split_at(len);
    Ok((Tlv { tag, value }, rest))
}

pub(crate) fn expect_tlv(input: &[u8], tag: u8) -> Result<(Tlv<'_>, &[u8]), ParseError> {
    let (tlv, rest) = read_tlv(input)?;
    if tlv.tag != tag {
        return Err(ParseError::Der(format!("expected tag {tag:#x}, found {:#x}", tlv.tag)));
    }
    Ok((tlv, rest))
}

pub(crate) struct Children<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<Tlv<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match read_tlv(self.rest) {
            Ok((tlv, rest)) => {
                self.rest = rest;
                Some(Ok(tlv))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

/// Returns true when `input` is a complete sequence of well-formed TLVs.
pub(crate) fn is_der(input: &[u8]) -> bool {
    let mut rest = input;
    while !rest.is_empty() {
        match read_tlv(rest) {
            Ok((_, r)) => rest = r,
            Err(_) => return false,
        }
    }
    !input.is_empty()
}

/// Renders an OID, mapping the handful of X.520 attributes that appear in
/// certificate names to their short labels.
pub(crate) fn oid_label(oid: &[u8]) -> String {
    match oid {
        [0x55, 0x04, 0x03] => "CN".to_string(),
        [0x55, 0x04, 0x06] => "C".to_string(),
        [0x55, 0x04, 0x07] => "L".to_string(),
        [0x55, 0x04, 0x08] => "ST".to_string(),
        [0x55, 0x04, 0x0a] => "O".to_string(),
        [0x55, 0x04, 0x0b] => "OU".to_string(),
        other => format!("OID.{}", hex::encode(other)),
    }
}
