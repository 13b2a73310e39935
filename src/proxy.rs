//! PROXY-protocol v1 (text) and v2 (binary) preamble detection, grounded on
//! `original_source/common/lwan-request.c`'s `parse_proxy_protocol_v1` /
//! `parse_proxy_protocol_v2`.
//!
//! Only consulted when the connection is configured to accept the preamble
//! (`Config::allow_proxy_protocol`); an ordinary client is never trusted to
//! assert its own address.

use std::net::{Ipv4Addr, Ipv6Addr};

/// The address pair a PROXY-protocol preamble conveys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAddress {
    /// v2 LOCAL command: no real peer information (e.g. a health check from
    /// the load balancer itself).
    Unspecified,
    V4 {
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
    },
    V6 {
        src: (Ipv6Addr, u16),
        dst: (Ipv6Addr, u16),
    },
}

const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Attempts to consume a PROXY-protocol preamble at the start of `data`.
///
/// Returns `Some((address, consumed))` on a recognized and well-formed
/// preamble, `Some(None-preamble)`-equivalent `None` both when there is no
/// preamble at all (bytes don't start with either tag -- not an error, the
/// caller proceeds to parse an ordinary request) and when a preamble is
/// detected but malformed (a genuine parse failure). The two are
/// distinguished by the caller needing to know which tag matched; see
/// [`detect`].
pub fn parse(data: &[u8]) -> ProxyParseResult {
    match detect(data) {
        Tag::None => ProxyParseResult::NoPreamble,
        Tag::V1 => match parse_v1(data) {
            Some((addr, consumed)) => ProxyParseResult::Matched { addr, consumed },
            None => ProxyParseResult::Malformed,
        },
        Tag::V2 => match parse_v2(data) {
            Some((addr, consumed)) => ProxyParseResult::Matched { addr, consumed },
            None => ProxyParseResult::Malformed,
        },
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProxyParseResult {
    NoPreamble,
    Malformed,
    Matched { addr: ProxyAddress, consumed: usize },
}

enum Tag {
    None,
    V1,
    V2,
}

fn detect(data: &[u8]) -> Tag {
    if data.len() >= 4 && &data[..4] == b"PROX" {
        Tag::V1
    } else if data.len() >= 4 && data[..4] == V2_SIGNATURE[..4] {
        Tag::V2
    } else {
        Tag::None
    }
}

const V1_MAX_LINE: usize = 108;

fn parse_v1(data: &[u8]) -> Option<(ProxyAddress, usize)> {
    let window = &data[..data.len().min(V1_MAX_LINE)];
    let crlf_pos = find(window, b"\r\n")?;
    let line = std::str::from_utf8(&data[..crlf_pos]).ok()?;

    let mut tokens = line.split(' ');
    if tokens.next()? != "PROXY" {
        return None;
    }
    let proto = tokens.next()?;
    let src_addr = tokens.next()?;
    let dst_addr = tokens.next()?;
    let src_port = tokens.next()?;
    let dst_port = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let src_port: u16 = src_port.parse().ok()?;
    let dst_port: u16 = dst_port.parse().ok()?;

    let addr = match proto {
        "TCP4" => ProxyAddress::V4 {
            src: (src_addr.parse::<Ipv4Addr>().ok()?, src_port),
            dst: (dst_addr.parse::<Ipv4Addr>().ok()?, dst_port),
        },
        "TCP6" => ProxyAddress::V6 {
            src: (src_addr.parse::<Ipv6Addr>().ok()?, src_port),
            dst: (dst_addr.parse::<Ipv6Addr>().ok()?, dst_port),
        },
        _ => return None,
    };

    Some((addr, crlf_pos + 2))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

const V2_HEADER_LEN: usize = 16;
const V2_CMD_LOCAL: u8 = 0x20;
const V2_CMD_PROXY: u8 = 0x21;
const V2_FAM_TCP4: u8 = 0x11;
const V2_FAM_TCP6: u8 = 0x21;

fn parse_v2(data: &[u8]) -> Option<(ProxyAddress, usize)> {
    if data.len() < V2_HEADER_LEN {
        return None;
    }
    if data[..12] != V2_SIGNATURE {
        return None;
    }
    let cmd_ver = data[12];
    let family = data[13];
    let len = u16::from_be_bytes([data[14], data[15]]) as usize;

    let total = V2_HEADER_LEN + len;
    if total > data.len() {
        return None;
    }

    if cmd_ver == V2_CMD_LOCAL {
        return Some((ProxyAddress::Unspecified, total));
    }
    if cmd_ver != V2_CMD_PROXY {
        return None;
    }

    let payload = &data[V2_HEADER_LEN..total];
    let addr = match family {
        V2_FAM_TCP4 => {
            if payload.len() < 12 {
                return None;
            }
            let src_ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
            let dst_ip = Ipv4Addr::new(payload[4], payload[5], payload[6], payload[7]);
            let src_port = u16::from_be_bytes([payload[8], payload[9]]);
            let dst_port = u16::from_be_bytes([payload[10], payload[11]]);
            ProxyAddress::V4 {
                src: (src_ip, src_port),
                dst: (dst_ip, dst_port),
            }
        }
        V2_FAM_TCP6 => {
            if payload.len() < 36 {
                return None;
            }
            let mut src_octets = [0u8; 16];
            src_octets.copy_from_slice(&payload[0..16]);
            let mut dst_octets = [0u8; 16];
            dst_octets.copy_from_slice(&payload[16..32]);
            let src_port = u16::from_be_bytes([payload[32], payload[33]]);
            let dst_port = u16::from_be_bytes([payload[34], payload[35]]);
            ProxyAddress::V6 {
                src: (Ipv6Addr::from(src_octets), src_port),
                dst: (Ipv6Addr::from(dst_octets), dst_port),
            }
        }
        _ => return None,
    };

    Some((addr, total))
}
