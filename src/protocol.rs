//! STUN message encoding and decoding.
//!
//! Implements the wire format shared by RFC 3489 and RFC 5389: a 20-byte
//! big-endian header (type, payload length, magic cookie, 12-byte
//! transaction id) followed by type/length/value attributes aligned to
//! 32-bit boundaries. The two RFCs differ in their padding discipline, so
//! every codec entry point carries an explicit [`RfcMode`] instead of
//! consulting process-wide state; packets remember the mode they were
//! built or parsed with.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::addr;
use crate::error::{StunError, StunResult};

/// STUN magic cookie (RFC 5389 section 6). Under RFC 3489 these four
/// bytes are simply part of the transaction id and carry no meaning.
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 20;

/// Largest datagram the codec accepts.
pub const MAX_MESSAGE_SIZE: usize = 65535;

// Message types (IANA STUN parameters). Only the binding family is used
// by the discovery engine; everything else round-trips as opaque values.
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;
pub const SHARED_SECRET_REQUEST: u16 = 0x0002;
pub const SHARED_SECRET_RESPONSE: u16 = 0x0102;
pub const SHARED_SECRET_ERROR_RESPONSE: u16 = 0x0112;

// Attribute types.
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_RESPONSE_ADDRESS: u16 = 0x0002;
pub const ATTR_CHANGE_REQUEST: u16 = 0x0003;
pub const ATTR_SOURCE_ADDRESS: u16 = 0x0004;
pub const ATTR_CHANGED_ADDRESS: u16 = 0x0005;
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_PASSWORD: u16 = 0x0007;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_UNKNOWN_ATTRIBUTES: u16 = 0x000A;
pub const ATTR_REFLECTED_FROM: u16 = 0x000B;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
/// Pre-standard XOR-MAPPED-ADDRESS code still emitted by some servers.
pub const ATTR_XOR_MAPPED_ADDRESS_EXP: u16 = 0x8020;
pub const ATTR_SOFTWARE: u16 = 0x8022;
pub const ATTR_ALTERNATE_SERVER: u16 = 0x8023;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_RESPONSE_ORIGIN: u16 = 0x802B;
pub const ATTR_OTHER_ADDRESS: u16 = 0x802C;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// FINGERPRINT values are CRC-32 XORed with this constant ("STUN").
const FINGERPRINT_XOR: u32 = 0x5354554E;

/// RFC 5389 section 15.10 bounds SOFTWARE to 763 bytes.
const SOFTWARE_MAX_LEN: usize = 763;

/// Name of a message type for diagnostics.
pub fn message_type_name(message_type: u16) -> &'static str {
    match message_type {
        BINDING_REQUEST => "BINDING_REQUEST",
        BINDING_RESPONSE => "BINDING_RESPONSE",
        BINDING_ERROR_RESPONSE => "BINDING_ERROR_RESPONSE",
        SHARED_SECRET_REQUEST => "SHARED_SECRET_REQUEST",
        SHARED_SECRET_RESPONSE => "SHARED_SECRET_RESPONSE",
        SHARED_SECRET_ERROR_RESPONSE => "SHARED_SECRET_ERROR_RESPONSE",
        _ => "UNKNOWN",
    }
}

/// Name of an attribute type for diagnostics.
pub fn attribute_name(kind: u16) -> &'static str {
    match kind {
        ATTR_MAPPED_ADDRESS => "MAPPED_ADDRESS",
        ATTR_RESPONSE_ADDRESS => "RESPONSE_ADDRESS",
        ATTR_CHANGE_REQUEST => "CHANGE_REQUEST",
        ATTR_SOURCE_ADDRESS => "SOURCE_ADDRESS",
        ATTR_CHANGED_ADDRESS => "CHANGED_ADDRESS",
        ATTR_USERNAME => "USERNAME",
        ATTR_PASSWORD => "PASSWORD",
        ATTR_MESSAGE_INTEGRITY => "MESSAGE_INTEGRITY",
        ATTR_ERROR_CODE => "ERROR_CODE",
        ATTR_UNKNOWN_ATTRIBUTES => "UNKNOWN_ATTRIBUTES",
        ATTR_REFLECTED_FROM => "REFLECTED_FROM",
        ATTR_XOR_MAPPED_ADDRESS | ATTR_XOR_MAPPED_ADDRESS_EXP => "XOR_MAPPED_ADDRESS",
        ATTR_SOFTWARE => "SOFTWARE",
        ATTR_ALTERNATE_SERVER => "ALTERNATE_SERVER",
        ATTR_FINGERPRINT => "FINGERPRINT",
        ATTR_RESPONSE_ORIGIN => "RESPONSE_ORIGIN",
        ATTR_OTHER_ADDRESS => "OTHER_ADDRESS",
        _ => "UNKNOWN",
    }
}

/// Padding discipline selector.
///
/// RFC 3489 has no padding: every attribute value must already be a
/// multiple of 4 bytes. RFC 5389 pads values to the next 32-bit boundary
/// while the length field keeps the semantic size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfcMode {
    #[default]
    Rfc3489,
    Rfc5389,
}

impl RfcMode {
    /// On-wire size of a value with the given semantic length.
    pub fn padded_len(self, length: usize) -> usize {
        match self {
            RfcMode::Rfc3489 => length,
            RfcMode::Rfc5389 => next_boundary(length),
        }
    }
}

/// Next multiple of 4.
pub(crate) fn next_boundary(length: usize) -> usize {
    (length + 3) & !3
}

/// CRC-32 (IEEE) over `data`, XORed with the STUN fingerprint constant.
pub fn stun_fingerprint(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize() ^ FINGERPRINT_XOR
}

/// 96-bit transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> StunResult<Self> {
        let bytes: [u8; 12] = slice.try_into().map_err(|_| {
            StunError::MalformedPacket(format!(
                "transaction id must be 12 bytes, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Decoded XOR-MAPPED-ADDRESS, keeping both the on-wire and the
/// de-obfuscated forms so callers can cross-check against MAPPED-ADDRESS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorMapped {
    pub family: u8,
    /// Address bytes exactly as carried in the attribute.
    pub raw_ip: String,
    pub raw_port: u16,
    /// Address after XOR with the cookie (and transaction id for IPv6).
    pub ip: String,
    pub port: u16,
}

/// A single typed, length-prefixed attribute.
///
/// `length` is always the semantic value size. Under RFC 5389 the stored
/// value keeps its zero padding, so `length <= value.len() <=
/// next_boundary(length)` holds in both modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    kind: u16,
    length: u16,
    value: Vec<u8>,
}

impl Attribute {
    /// Create an attribute from raw value bytes under the given mode.
    pub fn new(kind: u16, value: &[u8], mode: RfcMode) -> StunResult<Self> {
        if value.len() > MAX_MESSAGE_SIZE {
            return Err(StunError::AttributeTooLong(value.len()));
        }
        if mode == RfcMode::Rfc3489 && value.len() % 4 != 0 {
            return Err(StunError::RfcViolation(format!(
                "RFC 3489 requires 32-bit aligned attribute values, got {} bytes",
                value.len()
            )));
        }

        let mut stored = value.to_vec();
        stored.resize(mode.padded_len(value.len()), 0);

        Ok(Self {
            kind,
            length: value.len() as u16,
            value: stored,
        })
    }

    /// Build a SOFTWARE attribute.
    pub fn software(name: &str, mode: RfcMode) -> StunResult<Self> {
        if name.len() > SOFTWARE_MAX_LEN {
            return Err(StunError::MalformedAttribute(format!(
                "software name exceeds {SOFTWARE_MAX_LEN} bytes"
            )));
        }
        Self::new(ATTR_SOFTWARE, name.as_bytes(), mode)
    }

    /// Build a CHANGE-REQUEST attribute. Only bits 0x04 (change IP) and
    /// 0x02 (change port) of the last byte are meaningful.
    pub fn change_request(change_ip: bool, change_port: bool, mode: RfcMode) -> StunResult<Self> {
        let mut value = [0u8; 4];
        if change_ip {
            value[3] |= 0x04;
        }
        if change_port {
            value[3] |= 0x02;
        }
        Self::new(ATTR_CHANGE_REQUEST, &value, mode)
    }

    /// Build a FINGERPRINT attribute over the packet as serialized so
    /// far. Must be added last: the CRC covers every preceding byte.
    pub fn fingerprint(packet: &Packet) -> StunResult<Self> {
        let crc = stun_fingerprint(&packet.to_bytes());
        Self::new(ATTR_FINGERPRINT, &crc.to_be_bytes(), packet.mode())
    }

    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// Semantic value length, not counting padding.
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Value without padding.
    pub fn value(&self) -> &[u8] {
        &self.value[..self.length as usize]
    }

    /// Value as stored, including any RFC 5389 padding.
    pub fn raw_value(&self) -> &[u8] {
        &self.value
    }

    /// Parse an address-bearing attribute
    /// (`[reserved:1][family:1][port:2][ip:4|16]`).
    pub fn address(&self) -> StunResult<(u8, String, u16)> {
        let value = self.value();
        if value.len() < 4 {
            return Err(StunError::MalformedAttribute(format!(
                "address attribute needs at least 4 bytes, got {}",
                value.len()
            )));
        }
        let family = value[1];
        let port = u16::from_be_bytes([value[2], value[3]]);
        let ip = match (family, value.len() - 4) {
            (FAMILY_IPV4, 4) | (FAMILY_IPV6, 16) => addr::bytes_to_ip(&value[4..])?,
            _ => {
                return Err(StunError::MalformedAttribute(format!(
                    "address family 0x{family:02x} with {} address bytes",
                    value.len() - 4
                )))
            }
        };
        Ok((family, ip, port))
    }

    /// Parse an XOR-MAPPED-ADDRESS value. The port is XORed with the
    /// high half of the cookie; IPv4 addresses are XORed with the cookie
    /// and IPv6 addresses with cookie || transaction id.
    pub fn xor_mapped_address(&self, transaction_id: &TransactionId) -> StunResult<XorMapped> {
        let value = self.value();
        if value.len() < 4 {
            return Err(StunError::MalformedAttribute(format!(
                "XOR-mapped address needs at least 4 bytes, got {}",
                value.len()
            )));
        }
        let family = value[1];
        let raw_port = u16::from_be_bytes([value[2], value[3]]);
        let cookie = MAGIC_COOKIE.to_be_bytes();

        let xored: Vec<u8> = match (family, value.len() - 4) {
            (FAMILY_IPV4, 4) => value[4..]
                .iter()
                .zip(cookie.iter())
                .map(|(byte, key)| byte ^ key)
                .collect(),
            (FAMILY_IPV6, 16) => {
                let mut key = [0u8; 16];
                key[..4].copy_from_slice(&cookie);
                key[4..].copy_from_slice(transaction_id.as_bytes());
                value[4..]
                    .iter()
                    .zip(key.iter())
                    .map(|(byte, k)| byte ^ k)
                    .collect()
            }
            _ => {
                return Err(StunError::MalformedAttribute(format!(
                    "XOR-mapped address family 0x{family:02x} with {} address bytes",
                    value.len() - 4
                )))
            }
        };

        Ok(XorMapped {
            family,
            raw_ip: addr::bytes_to_ip(&value[4..])?,
            raw_port,
            ip: addr::bytes_to_ip(&xored)?,
            port: raw_port ^ (MAGIC_COOKIE >> 16) as u16,
        })
    }

    /// Decode a SOFTWARE value. The attribute is informational, so a
    /// bad encoding yields a diagnostic string instead of an error.
    pub fn software_text(&self) -> String {
        match std::str::from_utf8(self.value()) {
            Ok(text) => text.to_string(),
            Err(_) => "<software name is not valid UTF-8>".to_string(),
        }
    }

    /// Decode a FINGERPRINT value.
    pub fn fingerprint_value(&self) -> StunResult<u32> {
        let value: [u8; 4] = self.value().try_into().map_err(|_| {
            StunError::MalformedAttribute(format!(
                "fingerprint must be 4 bytes, got {}",
                self.length
            ))
        })?;
        Ok(u32::from_be_bytes(value))
    }

    /// Decode a CHANGE-REQUEST value into (change IP, change port).
    pub fn change_request_flags(&self) -> StunResult<(bool, bool)> {
        let value = self.value();
        if value.len() != 4 {
            return Err(StunError::MalformedAttribute(format!(
                "change request must be 4 bytes, got {}",
                value.len()
            )));
        }
        Ok((value[3] & 0x04 != 0, value[3] & 0x02 != 0))
    }

    /// Human-readable rendering for known attribute kinds.
    fn describe(&self, transaction_id: &TransactionId) -> Option<String> {
        match self.kind {
            ATTR_MAPPED_ADDRESS
            | ATTR_RESPONSE_ADDRESS
            | ATTR_SOURCE_ADDRESS
            | ATTR_CHANGED_ADDRESS
            | ATTR_ALTERNATE_SERVER
            | ATTR_RESPONSE_ORIGIN
            | ATTR_OTHER_ADDRESS => Some(match self.address() {
                Ok((family, ip, port)) => format_endpoint(family, &ip, port),
                Err(err) => format!("<{err}>"),
            }),
            ATTR_XOR_MAPPED_ADDRESS | ATTR_XOR_MAPPED_ADDRESS_EXP => {
                Some(match self.xor_mapped_address(transaction_id) {
                    Ok(xor) => format!(
                        "{} -> {}",
                        format_endpoint(xor.family, &xor.raw_ip, xor.raw_port),
                        format_endpoint(xor.family, &xor.ip, xor.port)
                    ),
                    Err(err) => format!("<{err}>"),
                })
            }
            ATTR_SOFTWARE => Some(self.software_text()),
            ATTR_FINGERPRINT => Some(match self.fingerprint_value() {
                Ok(crc) => format!("0x{crc:08x}"),
                Err(err) => format!("<{err}>"),
            }),
            ATTR_CHANGE_REQUEST => Some(match self.change_request_flags() {
                Ok((ip, port)) => format!("change ip: {ip}, change port: {port}"),
                Err(err) => format!("<{err}>"),
            }),
            _ => None,
        }
    }
}

fn format_endpoint(family: u8, ip: &str, port: u16) -> String {
    if family == FAMILY_IPV6 {
        format!("[{ip}]:{port}")
    } else {
        format!("{ip}:{port}")
    }
}

/// A STUN message: header fields plus an ordered attribute list.
///
/// Attribute order is significant; FINGERPRINT, when present, must be
/// appended last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    message_type: u16,
    length: u16,
    cookie: u32,
    transaction_id: TransactionId,
    attributes: Vec<Attribute>,
    mode: RfcMode,
}

impl Packet {
    /// Empty packet with the cookie preset and no payload.
    pub fn new(mode: RfcMode) -> Self {
        Self {
            message_type: 0,
            length: 0,
            cookie: MAGIC_COOKIE,
            transaction_id: TransactionId::default(),
            attributes: Vec::new(),
            mode,
        }
    }

    pub fn message_type(&self) -> u16 {
        self.message_type
    }

    pub fn set_type(&mut self, message_type: u16) {
        self.message_type = message_type;
    }

    /// Payload length in bytes, excluding the 20-byte header.
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    pub(crate) fn set_cookie(&mut self, cookie: u32) {
        self.cookie = cookie;
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn set_transaction_id(&mut self, transaction_id: TransactionId) {
        self.transaction_id = transaction_id;
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn mode(&self) -> RfcMode {
        self.mode
    }

    /// Append an attribute and account for its padded block size.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        debug_assert!(
            self.mode == RfcMode::Rfc5389 || attribute.length() % 4 == 0,
            "unaligned attribute under RFC 3489"
        );
        self.length += (4 + self.mode.padded_len(attribute.length() as usize)) as u16;
        self.attributes.push(attribute);
    }

    /// Serialize to wire bytes. The output is always `20 + length()`
    /// bytes long.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.length as usize);
        buf.put_u16(self.message_type);
        buf.put_u16(self.length);
        buf.put_u32(self.cookie);
        buf.put_slice(self.transaction_id.as_bytes());
        for attribute in &self.attributes {
            buf.put_u16(attribute.kind());
            buf.put_u16(attribute.length());
            buf.put_slice(attribute.raw_value());
        }
        debug_assert_eq!(buf.len(), HEADER_SIZE + self.length as usize);
        buf.to_vec()
    }

    /// Parse a datagram.
    ///
    /// The cookie is checked only under RFC 5389; RFC 3489 servers place
    /// arbitrary transaction bytes there. The attribute walk advances by
    /// the semantic length under RFC 3489 and by the padded length under
    /// RFC 5389.
    pub fn from_bytes(data: &[u8], mode: RfcMode) -> StunResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(StunError::MalformedPacket(format!(
                "{} bytes is shorter than the STUN header",
                data.len()
            )));
        }
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(StunError::MalformedPacket(format!(
                "{} bytes exceeds the maximum message size",
                data.len()
            )));
        }

        let mut header = &data[..HEADER_SIZE];
        let message_type = header.get_u16();
        let _claimed_length = header.get_u16();
        let cookie = header.get_u32();
        if mode == RfcMode::Rfc5389 && cookie != MAGIC_COOKIE {
            return Err(StunError::MalformedPacket(format!(
                "bad magic cookie 0x{cookie:08x}"
            )));
        }

        let mut packet = Packet::new(mode);
        packet.set_type(message_type);
        packet.set_cookie(cookie);
        packet.set_transaction_id(TransactionId::from_slice(&data[8..HEADER_SIZE])?);

        let mut pos = HEADER_SIZE;
        while pos < data.len() {
            if pos + 4 > data.len() {
                return Err(StunError::MalformedPacket(
                    "truncated attribute header".to_string(),
                ));
            }
            let kind = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            let value_start = pos + 4;
            let value_end = value_start + length;
            if value_end > data.len() {
                return Err(StunError::MalformedPacket(format!(
                    "attribute 0x{kind:04x} value runs past the end of the packet"
                )));
            }
            packet.add_attribute(Attribute::new(kind, &data[value_start..value_end], mode)?);
            pos = value_start + mode.padded_len(length);
        }

        Ok(packet)
    }

    /// First MAPPED-ADDRESS, as (ip text, port).
    pub fn mapped_address(&self) -> StunResult<Option<(String, u16)>> {
        self.find_address(ATTR_MAPPED_ADDRESS)
    }

    /// First SOURCE-ADDRESS, as (ip text, port).
    pub fn source_address(&self) -> StunResult<Option<(String, u16)>> {
        self.find_address(ATTR_SOURCE_ADDRESS)
    }

    /// First CHANGED-ADDRESS, as (ip text, port).
    pub fn changed_address(&self) -> StunResult<Option<(String, u16)>> {
        self.find_address(ATTR_CHANGED_ADDRESS)
    }

    /// First XOR-MAPPED-ADDRESS, accepting both the standard 0x0020 code
    /// and the pre-standard 0x8020.
    pub fn xor_mapped_address(&self) -> StunResult<Option<XorMapped>> {
        match self.attributes.iter().find(|a| {
            matches!(
                a.kind(),
                ATTR_XOR_MAPPED_ADDRESS | ATTR_XOR_MAPPED_ADDRESS_EXP
            )
        }) {
            Some(attribute) => Ok(Some(attribute.xor_mapped_address(&self.transaction_id)?)),
            None => Ok(None),
        }
    }

    fn find_address(&self, kind: u16) -> StunResult<Option<(String, u16)>> {
        match self.attributes.iter().find(|a| a.kind() == kind) {
            Some(attribute) => {
                let (_family, ip, port) = attribute.address()?;
                Ok(Some((ip, port)))
            }
            None => Ok(None),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "type: 0x{:04x} ({})",
            self.message_type,
            message_type_name(self.message_type)
        )?;
        writeln!(f, "length: {}", self.length)?;
        writeln!(f, "cookie: 0x{:08x}", self.cookie)?;
        writeln!(f, "transaction id: {}", self.transaction_id)?;
        write!(f, "attributes: {}", self.attributes.len())?;
        for attribute in &self.attributes {
            write!(
                f,
                "\n  0x{:04x} ({}), {} bytes",
                attribute.kind(),
                attribute_name(attribute.kind()),
                attribute.length()
            )?;
            if let Some(text) = attribute.describe(&self.transaction_id) {
                write!(f, ": {text}")?;
            }
        }
        Ok(())
    }
}

/// Hex dump of a wire buffer, four bytes per line, for debug traces.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    fn binding_request(mode: RfcMode) -> Packet {
        let mut packet = Packet::new(mode);
        packet.set_type(BINDING_REQUEST);
        packet.set_transaction_id(TransactionId::from_bytes(TID));
        packet
    }

    #[test]
    fn fingerprint_matches_rfc5769_vector() {
        // SOFTWARE + XOR-MAPPED-ADDRESS + MESSAGE-INTEGRITY prefix of the
        // RFC 5769 sample IPv6 response, up to its FINGERPRINT attribute.
        let prefix: [u8; 84] = [
            0x01, 0x01, 0x00, 0x48, 0x21, 0x12, 0xa4, 0x42, 0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34,
            0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae, 0x80, 0x22, 0x00, 0x0b, 0x74, 0x65, 0x73, 0x74,
            0x20, 0x76, 0x65, 0x63, 0x74, 0x6f, 0x72, 0x20, 0x00, 0x20, 0x00, 0x14, 0x00, 0x02,
            0xa1, 0x47, 0x01, 0x13, 0xa9, 0xfa, 0xa5, 0xd3, 0xf1, 0x79, 0xbc, 0x25, 0xf4, 0xb5,
            0xbe, 0xd2, 0xb9, 0xd9, 0x00, 0x08, 0x00, 0x14, 0xa3, 0x82, 0x95, 0x4e, 0x4b, 0xe6,
            0x7b, 0xf1, 0x17, 0x84, 0xc9, 0x7c, 0x82, 0x92, 0xc2, 0x75, 0xbf, 0xe3, 0xed, 0x41,
        ];

        assert_eq!(stun_fingerprint(&prefix), 0xC8FB0B4C);
        // Deterministic across calls.
        assert_eq!(stun_fingerprint(&prefix), stun_fingerprint(&prefix));
    }

    #[test]
    fn empty_packet_serializes_to_header_only() {
        let packet = binding_request(RfcMode::Rfc3489);
        let wire = packet.to_bytes();
        assert_eq!(wire.len(), HEADER_SIZE);
        assert_eq!(&wire[..2], &[0x00, 0x01]);
        assert_eq!(&wire[2..4], &[0x00, 0x00]);
        assert_eq!(&wire[4..8], &MAGIC_COOKIE.to_be_bytes());
        assert_eq!(&wire[8..20], &TID);
    }

    #[test]
    fn attribute_padding_boundaries() {
        for len in 0usize..=4 {
            let value = vec![0xabu8; len];
            let attribute = Attribute::new(0x7001, &value, RfcMode::Rfc5389).unwrap();
            assert_eq!(attribute.length() as usize, len);
            assert_eq!(attribute.raw_value().len(), next_boundary(len));
            assert_eq!(attribute.value(), &value[..]);

            let mut packet = binding_request(RfcMode::Rfc5389);
            packet.add_attribute(attribute);
            let wire = packet.to_bytes();
            assert_eq!(wire.len(), HEADER_SIZE + 4 + next_boundary(len));

            let parsed = Packet::from_bytes(&wire, RfcMode::Rfc5389).unwrap();
            assert_eq!(parsed.attributes()[0].length() as usize, len);
            assert_eq!(parsed.attributes()[0].value(), &value[..]);
        }
    }

    #[test]
    fn rfc3489_rejects_unaligned_values() {
        let err = Attribute::new(0x7001, &[1, 2, 3], RfcMode::Rfc3489).unwrap_err();
        assert!(matches!(err, StunError::RfcViolation(_)));

        // Aligned values pass.
        assert!(Attribute::new(0x7001, &[1, 2, 3, 4], RfcMode::Rfc3489).is_ok());
    }

    #[test]
    fn oversized_attribute_is_rejected() {
        let huge = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let err = Attribute::new(0x7001, &huge, RfcMode::Rfc5389).unwrap_err();
        assert!(matches!(err, StunError::AttributeTooLong(_)));
    }

    #[test]
    fn software_name_bounds() {
        assert!(Attribute::software(&"x".repeat(764), RfcMode::Rfc5389).is_err());
        let attribute = Attribute::software("TestClient01", RfcMode::Rfc3489).unwrap();
        assert_eq!(attribute.software_text(), "TestClient01");
    }

    #[test]
    fn software_decode_survives_invalid_utf8() {
        let attribute = Attribute::new(ATTR_SOFTWARE, &[0xff, 0xfe, 0x00, 0x00], RfcMode::Rfc3489)
            .unwrap();
        assert!(attribute.software_text().contains("not valid UTF-8"));
    }

    #[test]
    fn packet_round_trip_preserves_structure() {
        for mode in [RfcMode::Rfc3489, RfcMode::Rfc5389] {
            let mut packet = binding_request(mode);
            packet.add_attribute(Attribute::software("TestClient01", mode).unwrap());
            packet.add_attribute(Attribute::change_request(true, true, mode).unwrap());
            let fingerprint = Attribute::fingerprint(&packet).unwrap();
            packet.add_attribute(fingerprint);

            let wire = packet.to_bytes();
            assert_eq!(wire.len(), HEADER_SIZE + packet.length() as usize);
            assert_eq!(packet.length() % 4, 0);

            let parsed = Packet::from_bytes(&wire, mode).unwrap();
            assert_eq!(parsed, packet);
        }
    }

    #[test]
    fn header_length_counts_padded_blocks() {
        let mode = RfcMode::Rfc5389;
        let mut packet = binding_request(mode);
        packet.add_attribute(Attribute::new(0x7001, &[1], mode).unwrap());
        packet.add_attribute(Attribute::new(0x7002, &[1, 2, 3, 4, 5, 6, 7, 8], mode).unwrap());
        assert_eq!(packet.length(), (4 + 4) + (4 + 8));
    }

    #[test]
    fn fingerprint_attribute_is_last_and_checks_out() {
        let mode = RfcMode::Rfc3489;
        let mut packet = binding_request(mode);
        packet.add_attribute(Attribute::software("TestClient01", mode).unwrap());
        let prefix = packet.to_bytes();
        let fingerprint = Attribute::fingerprint(&packet).unwrap();
        packet.add_attribute(fingerprint);

        let last = packet.attributes().last().unwrap();
        assert_eq!(last.kind(), ATTR_FINGERPRINT);
        assert_eq!(last.fingerprint_value().unwrap(), stun_fingerprint(&prefix));
    }

    #[test]
    fn fingerprint_value_requires_four_bytes() {
        let attribute =
            Attribute::new(ATTR_FINGERPRINT, &[1, 2, 3, 4, 5, 6, 7, 8], RfcMode::Rfc3489).unwrap();
        assert!(matches!(
            attribute.fingerprint_value(),
            Err(StunError::MalformedAttribute(_))
        ));
    }

    #[test]
    fn change_request_flags_use_bitwise_and() {
        for (change_ip, change_port) in [(false, false), (true, false), (false, true), (true, true)]
        {
            let attribute =
                Attribute::change_request(change_ip, change_port, RfcMode::Rfc3489).unwrap();
            assert_eq!(
                attribute.change_request_flags().unwrap(),
                (change_ip, change_port)
            );
        }

        let wrong_size = Attribute::new(ATTR_CHANGE_REQUEST, &[0u8; 8], RfcMode::Rfc3489).unwrap();
        assert!(wrong_size.change_request_flags().is_err());
    }

    #[test]
    fn xor_mapped_address_returns_both_forms() {
        // Family IPv4, port 0xA147, address 225.18.164.67 on the wire.
        let attribute = Attribute::new(
            ATTR_XOR_MAPPED_ADDRESS,
            &[0x00, 0x01, 0xA1, 0x47, 0xE1, 0x12, 0xA4, 0x43],
            RfcMode::Rfc3489,
        )
        .unwrap();

        let xor = attribute
            .xor_mapped_address(&TransactionId::from_bytes(TID))
            .unwrap();
        assert_eq!(xor.family, 0x01);
        assert_eq!(xor.raw_port, 0xA147);
        assert_eq!(xor.raw_ip, "225.18.164.67");
        assert_eq!(xor.port, 0xA147 ^ 0x2112);
        assert_eq!(xor.ip, "192.0.0.1");
        assert_ne!((xor.raw_ip.as_str(), xor.raw_port), (xor.ip.as_str(), xor.port));

        // The de-XORed bytes are exactly the cookie-XOR of the stored bytes.
        let cookie = MAGIC_COOKIE.to_be_bytes();
        let expected: Vec<u8> = [0xE1, 0x12, 0xA4, 0x43]
            .iter()
            .zip(cookie.iter())
            .map(|(b, k)| b ^ k)
            .collect();
        assert_eq!(crate::addr::ip_to_bytes(&xor.ip).unwrap(), expected);
    }

    #[test]
    fn xor_mapped_address_ipv6_mixes_in_transaction_id() {
        let tid = TransactionId::from_bytes(TID);
        let ip = crate::addr::ip_to_bytes("2001:0db8:0000:0000:0000:0000:0000:0001").unwrap();
        let mut key = [0u8; 16];
        key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        key[4..].copy_from_slice(tid.as_bytes());

        let mut value = vec![0x00, 0x02];
        value.extend_from_slice(&(54321u16 ^ 0x2112).to_be_bytes());
        value.extend(ip.iter().zip(key.iter()).map(|(b, k)| b ^ k));

        let attribute = Attribute::new(ATTR_XOR_MAPPED_ADDRESS, &value, RfcMode::Rfc3489).unwrap();
        let xor = attribute.xor_mapped_address(&tid).unwrap();
        assert_eq!(xor.family, 0x02);
        assert_eq!(xor.port, 54321);
        assert_eq!(xor.ip, "2001:0db8:0000:0000:0000:0000:0000:0001");
    }

    #[test]
    fn legacy_xor_mapped_code_is_recognized() {
        let mut packet = binding_request(RfcMode::Rfc3489);
        packet.add_attribute(
            Attribute::new(
                ATTR_XOR_MAPPED_ADDRESS_EXP,
                &[0x00, 0x01, 0xA1, 0x47, 0xE1, 0x12, 0xA4, 0x43],
                RfcMode::Rfc3489,
            )
            .unwrap(),
        );
        let xor = packet.xor_mapped_address().unwrap().unwrap();
        assert_eq!(xor.ip, "192.0.0.1");
    }

    #[test]
    fn address_accessor_rejects_unknown_family() {
        let attribute = Attribute::new(
            ATTR_MAPPED_ADDRESS,
            &[0x00, 0x07, 0x00, 0x50, 1, 2, 3, 4],
            RfcMode::Rfc3489,
        )
        .unwrap();
        assert!(matches!(
            attribute.address(),
            Err(StunError::MalformedAttribute(_))
        ));
    }

    #[test]
    fn cookie_is_tolerated_under_rfc3489_only() {
        let mut wire = binding_request(RfcMode::Rfc3489).to_bytes();
        wire[4..8].copy_from_slice(&0xdeadbeefu32.to_be_bytes());

        let parsed = Packet::from_bytes(&wire, RfcMode::Rfc3489).unwrap();
        assert_eq!(parsed.cookie(), 0xdeadbeef);

        assert!(matches!(
            Packet::from_bytes(&wire, RfcMode::Rfc5389),
            Err(StunError::MalformedPacket(_))
        ));
    }

    #[test]
    fn truncated_packets_are_rejected() {
        assert!(Packet::from_bytes(&[0u8; 19], RfcMode::Rfc3489).is_err());

        // Attribute header cut off.
        let mut wire = binding_request(RfcMode::Rfc3489).to_bytes();
        wire.extend_from_slice(&[0x00, 0x01]);
        assert!(matches!(
            Packet::from_bytes(&wire, RfcMode::Rfc3489),
            Err(StunError::MalformedPacket(_))
        ));

        // Attribute value runs past the buffer.
        let mut wire = binding_request(RfcMode::Rfc3489).to_bytes();
        wire.extend_from_slice(&[0x00, 0x01, 0x00, 0x08, 0xaa, 0xbb, 0xcc, 0xdd]);
        assert!(matches!(
            Packet::from_bytes(&wire, RfcMode::Rfc3489),
            Err(StunError::MalformedPacket(_))
        ));
    }

    #[test]
    fn unknown_attribute_types_round_trip_opaquely() {
        let mode = RfcMode::Rfc5389;
        let mut packet = binding_request(mode);
        packet.add_attribute(Attribute::new(0x7f3a, &[9, 8, 7], mode).unwrap());
        let parsed = Packet::from_bytes(&packet.to_bytes(), mode).unwrap();
        assert_eq!(parsed.attributes()[0].kind(), 0x7f3a);
        assert_eq!(parsed.attributes()[0].value(), &[9, 8, 7]);
        assert_eq!(attribute_name(0x7f3a), "UNKNOWN");
    }

    #[test]
    fn query_helpers_return_first_match() {
        let mode = RfcMode::Rfc3489;
        let mut packet = binding_request(mode);
        let mut mapped = vec![0x00, 0x01];
        mapped.extend_from_slice(&4242u16.to_be_bytes());
        mapped.extend_from_slice(&[203, 0, 113, 9]);
        packet.add_attribute(Attribute::new(ATTR_MAPPED_ADDRESS, &mapped, mode).unwrap());

        let mut changed = vec![0x00, 0x01];
        changed.extend_from_slice(&3479u16.to_be_bytes());
        changed.extend_from_slice(&[203, 0, 113, 10]);
        packet.add_attribute(Attribute::new(ATTR_CHANGED_ADDRESS, &changed, mode).unwrap());

        assert_eq!(
            packet.mapped_address().unwrap(),
            Some(("203.0.113.9".to_string(), 4242))
        );
        assert_eq!(
            packet.changed_address().unwrap(),
            Some(("203.0.113.10".to_string(), 3479))
        );
        assert_eq!(packet.source_address().unwrap(), None);
        assert!(packet.xor_mapped_address().unwrap().is_none());
    }

    #[test]
    fn hex_dump_groups_four_bytes_per_line() {
        assert_eq!(hex_dump(&[0x01, 0x02, 0x03, 0x04, 0x05]), "01 02 03 04\n05");
    }
}
