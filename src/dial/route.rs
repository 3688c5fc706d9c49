//! Default-gateway lookup in the Linux IPv4 routing table (`/proc/net/route`).
use std::io::BufRead;
use std::net::Ipv4Addr;

/// Destination field of the default route.
const DEFAULT_DESTINATION: &str = "00000000";

/// Decode a kernel route address: 8 hex digits, little-endian byte order.
pub fn parse_ipv4_hex_le(field: &str) -> Option<Ipv4Addr> {
    let raw = field.as_bytes();
    // from_str_radix alone would accept a leading '+'
    if raw.len() != 8 || !raw.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let mut octets = [0u8; 4];
    for (i, pair) in raw.chunks(2).enumerate() {
        let pair = std::str::from_utf8(pair).ok()?;
        octets[3 - i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

/// Gateway of the first well-formed default route, skipping the header line.
/// Malformed lines are ignored.
pub fn parse_default_gateway<R: BufRead>(r: R) -> Option<Ipv4Addr> {
    r.lines()
        .skip(1)
        .map_while(Result::ok)
        .find_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 || fields[1] != DEFAULT_DESTINATION {
                return None;
            }
            parse_ipv4_hex_le(fields[2])
        })
}
