//! Parsing of the kernel IPv4 routing table (`/proc/net/route`).
//!
//! Rows look like:
//!
//! ```text
//! Iface  Destination  Gateway   Flags  RefCnt  Use  Metric  Mask      MTU  Window  IRTT
//! eth0   00000000     0102A8C0  0003   0       0    100     00000000  0    0       0
//! ```
//!
//! Addresses are 4 little-endian bytes, hex encoded.

use std::net::Ipv4Addr;

use crate::{Error, Result};

const DEFAULT_DESTINATION: &str = "00000000";
const MIN_FIELDS: usize = 8;

/// Pick the gateway of the default route with the highest metric.
///
/// A VPN client typically injects its own default route with a lower metric
/// (higher priority), so the highest-metric default route is the original,
/// non-VPN path. On equal metrics the first row wins.
pub fn find_non_vpn_gateway(table: &str) -> Result<Ipv4Addr> {
    let mut best: Option<(u32, &str)> = None;

    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS || fields[1] != DEFAULT_DESTINATION {
            continue;
        }

        let Ok(metric) = fields[6].parse::<u32>() else {
            tracing::debug!(line, "skipping default route with invalid metric");
            continue;
        };

        if best.map_or(true, |(highest, _)| metric > highest) {
            best = Some((metric, fields[2]));
        }
    }

    let (metric, gateway_hex) = best.ok_or(Error::GatewayNotFound)?;
    let gateway = decode_hex_ipv4(gateway_hex)?;
    tracing::debug!(%gateway, metric, "selected non-VPN default gateway");
    Ok(gateway)
}

/// Decode a little-endian hex encoded IPv4 address.
pub fn decode_hex_ipv4(field: &str) -> Result<Ipv4Addr> {
    let bytes = hex::decode(field).map_err(|e| {
        Error::InvalidGateway(field.to_string(), format!("failed to decode hex string: {}", e))
    })?;

    let octets: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
        Error::InvalidGateway(field.to_string(), format!("invalid IP length: {}", bytes.len()))
    })?;

    Ok(Ipv4Addr::new(octets[3], octets[2], octets[1], octets[0]))
}
