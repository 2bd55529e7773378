use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::der::{
    expect_tlv, is_der, oid_label, read_tlv, Tlv, TAG_DNS_NAME, TAG_IA5_STRING, TAG_INTEGER, TAG_OCTET_STRING,
    TAG_OID, TAG_PRINTABLE_STRING, TAG_SEQUENCE, TAG_SET, TAG_UTF8_STRING, TAG_VERSION,
};
use crate::{EntryParser, LogEntryType, ParseError, ParsedCertificate, RawLogEntry};

const LEAF_VERSION_V1: u8 = 0;
const LEAF_TYPE_TIMESTAMPED_ENTRY: u8 = 0;
const ENTRY_TYPE_X509: u16 = 0;
const ENTRY_TYPE_PRECERT: u16 = 1;
const ISSUER_KEY_HASH_LEN: usize = 32;

/// Parser for RFC 6962 `MerkleTreeLeaf` structures.
///
/// When `domain_suffixes` is non-empty, only certificates carrying at least
/// one DNS name under one of the suffixes are returned.
#[derive(Debug, Clone, Default)]
pub struct DerEntryParser {
    domain_suffixes: Vec<String>,
}

impl DerEntryParser {
    pub fn new(domain_suffixes: Vec<String>) -> Self {
        let domain_suffixes = domain_suffixes.into_iter().map(|s| s.trim().to_ascii_lowercase()).collect();
        Self { domain_suffixes }
    }

    fn is_interesting(&self, dns_names: &[String]) -> bool {
        self.domain_suffixes.is_empty()
            || dns_names.iter().any(|name| self.domain_suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())))
    }
}

impl EntryParser for DerEntryParser {
    fn parse(&self, entry: &RawLogEntry) -> Result<Option<ParsedCertificate>, ParseError> {
        let leaf = STANDARD
            .decode(entry.leaf_input.as_bytes())
            .map_err(|e| ParseError::Base64 { field: "leaf_input", message: e.to_string() })?;

        let mut reader = Reader::new(&leaf);
        let version = reader.u8()?;
        let leaf_type = reader.u8()?;
        if version != LEAF_VERSION_V1 || leaf_type != LEAF_TYPE_TIMESTAMPED_ENTRY {
            trace!(version, leaf_type, "Skipping unsupported leaf");
            return Ok(None);
        }
        let timestamp = reader.u64()?;
        let entry_type = reader.u16()?;

        let (entry_type, tbs, fingerprint_input) = match entry_type {
            ENTRY_TYPE_X509 => {
                let cert = reader.opaque24()?;
                let (certificate, _) = expect_tlv(cert, TAG_SEQUENCE)?;
                let (tbs, _) = expect_tlv(certificate.value, TAG_SEQUENCE)?;
                (LogEntryType::X509, tbs, cert)
            }
            ENTRY_TYPE_PRECERT => {
                reader.skip(ISSUER_KEY_HASH_LEN)?;
                let tbs_bytes = reader.opaque24()?;
                let (tbs, _) = expect_tlv(tbs_bytes, TAG_SEQUENCE)?;
                (LogEntryType::Precert, tbs, tbs_bytes)
            }
            other => {
                trace!(entry_type = other, "Skipping unknown entry type");
                return Ok(None);
            }
        };

        let fields = TbsFields::extract(tbs)?;
        let mut dns_names = Vec::new();
        collect_dns_names(tbs, &mut dns_names);
        if let Some(cn) = fields.subject_cn.as_ref() {
            push_hostname(cn, &mut dns_names);
        }

        if !self.is_interesting(&dns_names) {
            return Ok(None);
        }

        Ok(Some(ParsedCertificate {
            issuer: fields.issuer,
            serial_number: fields.serial_number,
            fingerprint: hex::encode(Sha256::digest(fingerprint_input)),
            subject: fields.subject,
            dns_names,
            entry_type,
            timestamp,
        }))
    }
}

struct TbsFields {
    serial_number: String,
    issuer: String,
    subject: String,
    subject_cn: Option<String>,
}

impl TbsFields {
    fn extract(tbs: Tlv<'_>) -> Result<Self, ParseError> {
        let mut rest = tbs.value;
        let (first, after) = read_tlv(rest)?;
        if first.tag == TAG_VERSION {
            rest = after;
        }
        let (serial, rest) = expect_tlv(rest, TAG_INTEGER)?;
        let (_signature, rest) = expect_tlv(rest, TAG_SEQUENCE)?;
        let (issuer, rest) = expect_tlv(rest, TAG_SEQUENCE)?;
        let (_validity, rest) = expect_tlv(rest, TAG_SEQUENCE)?;
        let (subject, _) = expect_tlv(rest, TAG_SEQUENCE)?;

        let issuer = name_attributes(issuer)?;
        let subject_attrs = name_attributes(subject)?;
        let subject_cn = subject_attrs.iter().find(|(label, _)| label == "CN").map(|(_, v)| v.clone());

        Ok(Self {
            serial_number: hex::encode(serial.value),
            issuer: join_attributes(&issuer),
            subject: join_attributes(&subject_attrs),
            subject_cn,
        })
    }
}

/// Flattens `Name ::= SEQUENCE OF SET OF AttributeTypeAndValue`.
fn name_attributes(name: Tlv<'_>) -> Result<Vec<(String, String)>, ParseError> {
    let mut attrs = Vec::new();
    for rdn in name.children() {
        let rdn = rdn?;
        if rdn.tag != TAG_SET {
            continue;
        }
        for atv in rdn.children() {
            let atv = atv?;
            let (oid, rest) = expect_tlv(atv.value, TAG_OID)?;
            let (value, _) = read_tlv(rest)?;
            attrs.push((oid_label(oid.value), String::from_utf8_lossy(value.value).into_owned()));
        }
    }
    Ok(attrs)
}

fn join_attributes(attrs: &[(String, String)]) -> String {
    attrs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ")
}

/// Walks every TLV under `node` looking for hostname-like strings. Extension
/// values are OCTET STRINGs wrapping more DER, so those are descended into
/// too when they parse.
fn collect_dns_names(node: Tlv<'_>, out: &mut Vec<String>) {
    for child in node.children() {
        let Ok(child) = child else { return };
        match child.tag {
            TAG_DNS_NAME | TAG_IA5_STRING | TAG_UTF8_STRING | TAG_PRINTABLE_STRING => {
                if let Ok(s) = std::str::from_utf8(child.value) {
                    push_hostname(s, out);
                }
            }
            TAG_OCTET_STRING if is_der(child.value) => {
                collect_dns_names(Tlv { tag: TAG_SEQUENCE, value: child.value }, out);
            }
            _ if child.is_constructed() => collect_dns_names(child, out),
            _ => {}
        }
    }
}

fn push_hostname(candidate: &str, out: &mut Vec<String>) {
    let name = candidate.trim().trim_end_matches('.').to_ascii_lowercase();
    let looks_like_host = name.contains('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '*' | '_'));
    if looks_like_host && !out.contains(&name) {
        out.push(name);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len()).ok_or(ParseError::Truncated(self.pos))?;
        let data = self.data;
        let out = &data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, ParseError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    fn opaque24(&mut self) -> Result<&'a [u8], ParseError> {
        let b = self.take(3)?;
        let len = ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize;
        self.take(len)
    }
}
