//! Conversion of NGAP octets into display-form identifiers
//!
//! None of these helpers fail: short, empty or filler-only inputs produce
//! degenerate strings instead of errors.

use crate::ngap::BitString;
use crate::types::PlmnId;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the UNIX epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// Length of one NTP era in seconds
const NTP_ERA_SECONDS: u64 = 1 << 32;

/// Decode a TBCD PLMN Identity (3 octets) into MCC/MNC digit strings.
///
/// Missing octets decode as `0` digits, extra octets are ignored. A filler
/// nibble (`f`) in the MNC1 position selects a 2-digit MNC.
pub fn plmn_id_from_bytes(bytes: &[u8]) -> PlmnId {
    let mut h: Vec<char> = hex::encode(&bytes[..bytes.len().min(3)]).chars().collect();
    if h.len() < 6 {
        log::debug!("Short PLMN identity [{}], padding", hex::encode(bytes));
        h.resize(6, '0');
    }

    let mcc: String = [h[1], h[0], h[3]].iter().collect();
    let mnc: String = if h[2] == 'f' {
        [h[5], h[4]].iter().collect()
    } else {
        [h[2], h[5], h[4]].iter().collect()
    };

    PlmnId { mcc, mnc }
}

/// Decode a TAC into its hex string form (`{0x00,0x00,0x02}` -> `"000002"`)
pub fn tac_from_bytes(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Render a BIT STRING as hex, truncated to the nibbles covered by `bit_length`
pub fn bit_string_to_hex(bit_string: &BitString) -> String {
    let mut hex_string = hex::encode(&bit_string.bytes);
    let hex_len = usize::try_from(bit_string.bit_length.div_ceil(4)).unwrap_or(usize::MAX);
    hex_string.truncate(hex_len);
    hex_string
}

/// Decode a Transport Layer Address into (IPv4, IPv6) strings
pub fn ip_address_to_string(ip: &BitString) -> (Option<String>, Option<String>) {
    let b = &ip.bytes;
    match ip.bit_length {
        32 if b.len() >= 4 => (Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]).to_string()), None),
        128 if b.len() >= 16 => (None, ipv6_from_slice(&b[..16])),
        160 if b.len() >= 20 => (
            Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]).to_string()),
            ipv6_from_slice(&b[4..20]),
        ),
        _ => {
            log::warn!(
                "Unsupported transport layer address [{}] ({} bits)",
                hex::encode(b),
                ip.bit_length
            );
            (None, None)
        }
    }
}

/// Decode a 2-octet port number
pub fn port_number_from_bytes(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Decode an NGAP TimeStamp (4 octets, NTP seconds) into a `SystemTime`
pub fn time_stamp_to_system_time(bytes: &[u8]) -> Option<SystemTime> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    let ntp = u32::from_be_bytes(octets) as u64;
    // Values below the UNIX epoch offset belong to NTP era 1 (after 2036)
    let unix = if ntp >= NTP_UNIX_OFFSET {
        ntp - NTP_UNIX_OFFSET
    } else {
        ntp + NTP_ERA_SECONDS - NTP_UNIX_OFFSET
    };
    UNIX_EPOCH.checked_add(Duration::from_secs(unix))
}

fn ipv6_from_slice(b: &[u8]) -> Option<String> {
    let octets: [u8; 16] = b.try_into().ok()?;
    Some(Ipv6Addr::from(octets).to_string())
}
