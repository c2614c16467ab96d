//! Textual transport-address helpers shared by the codec and the
//! discovery engine.
//!
//! Addresses cross module boundaries as canonical strings: `"a.b.c.d:P"`
//! for IPv4 and `"[hhhh:...:hhhh]:P"` for IPv6, where every IPv6 group is
//! rendered as four lowercase hex digits. The discovery engine compares
//! mapped and local addresses as these strings, so the rendering must be
//! stable. No name resolution happens here.

use std::net::{IpAddr, SocketAddr};

use crate::error::{StunError, StunResult};

/// Split a transport address string into its IP text and port.
///
/// Accepts `"a.b.c.d:P"` or `"[h:h:h:h:h:h:h:h]:P"`; anything else is
/// rejected as `MalformedAddress`.
pub fn split_transport(transport: &str) -> StunResult<(String, u16)> {
    if let Some(rest) = transport.strip_prefix('[') {
        let (ip, port) = rest
            .split_once("]:")
            .ok_or_else(|| malformed(transport))?;
        if !is_ipv6_text(ip) {
            return Err(malformed(transport));
        }
        return Ok((ip.to_string(), parse_port(port, transport)?));
    }

    let (ip, port) = transport
        .rsplit_once(':')
        .ok_or_else(|| malformed(transport))?;
    if !is_ipv4_text(ip) {
        return Err(malformed(transport));
    }
    Ok((ip.to_string(), parse_port(port, transport)?))
}

/// Convert a textual IP address into its network-order byte form:
/// 4 bytes for IPv4, 16 bytes for IPv6.
pub fn ip_to_bytes(ip: &str) -> StunResult<Vec<u8>> {
    if ip.contains('.') {
        let mut out = Vec::with_capacity(4);
        for group in ip.split('.') {
            if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed(ip));
            }
            let value: u16 = group.parse().map_err(|_| malformed(ip))?;
            if value > 255 {
                return Err(malformed(ip));
            }
            out.push(value as u8);
        }
        if out.len() != 4 {
            return Err(malformed(ip));
        }
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(16);
        let mut groups = 0usize;
        for group in ip.split(':') {
            if !(1..=4).contains(&group.len()) || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed(ip));
            }
            let value = u16::from_str_radix(group, 16).map_err(|_| malformed(ip))?;
            out.extend_from_slice(&value.to_be_bytes());
            groups += 1;
        }
        if groups != 8 {
            return Err(malformed(ip));
        }
        Ok(out)
    }
}

/// Inverse of [`ip_to_bytes`]; the input must be exactly 4 or 16 bytes.
pub fn bytes_to_ip(bytes: &[u8]) -> StunResult<String> {
    match bytes.len() {
        4 => Ok(bytes
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(".")),
        16 => Ok(bytes
            .chunks(2)
            .map(|pair| format!("{:04x}", u16::from_be_bytes([pair[0], pair[1]])))
            .collect::<Vec<_>>()
            .join(":")),
        n => Err(StunError::MalformedAddress(format!(
            "{n} bytes do not form an IP address"
        ))),
    }
}

/// Build the canonical transport string for a validated IP text and port.
/// IPv6 addresses are wrapped in brackets.
pub fn make_transport(ip: &str, port: u16) -> StunResult<String> {
    if is_ipv4_text(ip) {
        Ok(format!("{ip}:{port}"))
    } else if is_ipv6_text(ip) {
        Ok(format!("[{ip}]:{port}"))
    } else {
        Err(malformed(ip))
    }
}

/// Canonical IP text for a resolved address. IPv6 renders as eight
/// zero-padded groups, never the compressed `::` form, so the output can
/// be compared against codec output.
pub fn ip_text(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|group| format!("{group:04x}"))
            .collect::<Vec<_>>()
            .join(":"),
    }
}

/// Canonical transport string for a bound socket address.
pub fn socket_transport(addr: &SocketAddr) -> String {
    match addr.ip() {
        IpAddr::V4(_) => format!("{}:{}", ip_text(&addr.ip()), addr.port()),
        IpAddr::V6(_) => format!("[{}]:{}", ip_text(&addr.ip()), addr.port()),
    }
}

fn parse_port(text: &str, transport: &str) -> StunResult<u16> {
    if text.is_empty() || text.len() > 5 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(transport));
    }
    text.parse().map_err(|_| malformed(transport))
}

fn is_ipv4_text(ip: &str) -> bool {
    let groups: Vec<&str> = ip.split('.').collect();
    groups.len() == 4
        && groups.iter().all(|g| {
            !g.is_empty()
                && g.len() <= 3
                && g.bytes().all(|b| b.is_ascii_digit())
                && g.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
        })
}

fn is_ipv6_text(ip: &str) -> bool {
    let groups: Vec<&str> = ip.split(':').collect();
    groups.len() == 8
        && groups
            .iter()
            .all(|g| (1..=4).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn malformed(text: &str) -> StunError {
    StunError::MalformedAddress(text.to_string())
}
