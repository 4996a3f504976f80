//! # Event Decoding
//!
//! Parses the fixed 40-byte records the probes push into the `events` ring
//! buffer and normalises them into a [`Flow`].
//!
//! ```text
//! offset  size  field
//!      0     1  event_id
//!      1     1  l4_protocol
//!      2     2  l3_protocol   (network order representation)
//!      4    32  addresses     v4: saddr[4] daddr[4] | v6: saddr[16] daddr[16]
//!     36     2  sport         (network order)
//!     38     2  dport         (network order)
//! ```
//!
//! The address union is reconstructed as a tagged [`AddrPair`] from the
//! `l3_protocol` discriminant. Records that cannot be decoded yield a
//! [`DecodeError`]; callers drop them and keep tracing.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::aggregator::Flow;
use crate::catalog::EventNames;
use crate::domain::{DecodeError, EventId, L3Proto, L4Proto, ProtocolError};
use crate::protocols::{ProtocolCatalog, IPV4, IPV6};

/// Size of one record on the wire
pub const RECORD_LEN: usize = 40;

const ADDRS_OFFSET: usize = 4;
const ADDRS_LEN: usize = 32;
const SPORT_OFFSET: usize = ADDRS_OFFSET + ADDRS_LEN;
const DPORT_OFFSET: usize = SPORT_OFFSET + 2;

/// One record as produced by a probe, fields still in wire representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub event_id: EventId,
    pub l4_protocol: L4Proto,
    pub l3_protocol: L3Proto,
    pub addrs: [u8; ADDRS_LEN],
    pub sport: [u8; 2],
    pub dport: [u8; 2],
}

impl RawEvent {
    /// Parse a record
    ///
    /// # Errors
    /// Returns [`DecodeError::ShortRecord`] if fewer than [`RECORD_LEN`] bytes are given
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some(bytes) = bytes.get(..RECORD_LEN) else {
            return Err(DecodeError::ShortRecord { len: bytes.len(), expected: RECORD_LEN });
        };

        let mut addrs = [0u8; ADDRS_LEN];
        addrs.copy_from_slice(&bytes[ADDRS_OFFSET..SPORT_OFFSET]);

        Ok(Self {
            event_id: EventId(bytes[0]),
            l4_protocol: L4Proto(bytes[1]),
            l3_protocol: L3Proto(u16::from_ne_bytes([bytes[2], bytes[3]])),
            addrs,
            sport: [bytes[SPORT_OFFSET], bytes[SPORT_OFFSET + 1]],
            dport: [bytes[DPORT_OFFSET], bytes[DPORT_OFFSET + 1]],
        })
    }

    /// Build an IPv4 record the way a probe would fill it
    pub fn ipv4(
        event_id: EventId,
        l4_protocol: L4Proto,
        l3_protocol: L3Proto,
        (saddr, sport): (Ipv4Addr, u16),
        (daddr, dport): (Ipv4Addr, u16),
    ) -> Self {
        let mut addrs = [0u8; ADDRS_LEN];
        addrs[..4].copy_from_slice(&saddr.octets());
        addrs[4..8].copy_from_slice(&daddr.octets());
        Self {
            event_id,
            l4_protocol,
            l3_protocol,
            addrs,
            sport: sport.to_be_bytes(),
            dport: dport.to_be_bytes(),
        }
    }

    /// Build an IPv6 record the way a probe would fill it
    pub fn ipv6(
        event_id: EventId,
        l4_protocol: L4Proto,
        l3_protocol: L3Proto,
        (saddr, sport): (Ipv6Addr, u16),
        (daddr, dport): (Ipv6Addr, u16),
    ) -> Self {
        let mut addrs = [0u8; ADDRS_LEN];
        addrs[..16].copy_from_slice(&saddr.octets());
        addrs[16..].copy_from_slice(&daddr.octets());
        Self {
            event_id,
            l4_protocol,
            l3_protocol,
            addrs,
            sport: sport.to_be_bytes(),
            dport: dport.to_be_bytes(),
        }
    }

    /// Serialise back into the wire layout
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[0] = self.event_id.0;
        bytes[1] = self.l4_protocol.0;
        bytes[2..4].copy_from_slice(&self.l3_protocol.0.to_ne_bytes());
        bytes[ADDRS_OFFSET..SPORT_OFFSET].copy_from_slice(&self.addrs);
        bytes[SPORT_OFFSET..DPORT_OFFSET].copy_from_slice(&self.sport);
        bytes[DPORT_OFFSET..].copy_from_slice(&self.dport);
        bytes
    }
}

/// Address union member selected by the L3 discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrPair {
    V4 { saddr: Ipv4Addr, daddr: Ipv4Addr },
    V6 { saddr: Ipv6Addr, daddr: Ipv6Addr },
}

impl AddrPair {
    fn v4(addrs: &[u8; ADDRS_LEN]) -> Self {
        Self::V4 { saddr: addr4_from_wire(&addrs[..4]), daddr: addr4_from_wire(&addrs[4..8]) }
    }

    fn v6(addrs: &[u8; ADDRS_LEN]) -> Self {
        let mut saddr = [0u8; 16];
        let mut daddr = [0u8; 16];
        saddr.copy_from_slice(&addrs[..16]);
        daddr.copy_from_slice(&addrs[16..]);
        Self::V6 { saddr: Ipv6Addr::from(saddr), daddr: Ipv6Addr::from(daddr) }
    }

    fn to_strings(self) -> (String, String) {
        match self {
            Self::V4 { saddr, daddr } => (saddr.to_string(), daddr.to_string()),
            Self::V6 { saddr, daddr } => (saddr.to_string(), daddr.to_string()),
        }
    }
}

/// IPv4 address from the four bytes a probe copied out of the header
///
/// The probe stores the header word as loaded, so the bytes are already in
/// network order.
pub fn addr4_from_wire(bytes: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

/// A decoded record: the flow and the function that reported it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent<'a> {
    pub flow: Flow,
    pub function: &'a str,
}

/// Record decoder holding the id → name table and the protocol tables
pub struct EventDecoder<'a> {
    events: EventNames,
    protocols: &'a ProtocolCatalog,
    ipv4: L3Proto,
    ipv6: L3Proto,
}

impl<'a> EventDecoder<'a> {
    /// Create a decoder
    ///
    /// # Errors
    /// Returns an error if the ethertypes table lacks `IPv4` or `IPv6`
    pub fn new(events: EventNames, protocols: &'a ProtocolCatalog) -> Result<Self, ProtocolError> {
        Ok(Self { ipv4: protocols.l3_id(IPV4)?, ipv6: protocols.l3_id(IPV6)?, events, protocols })
    }

    /// Decode one raw record
    ///
    /// # Errors
    /// Returns a [`DecodeError`] for short records, unknown event ids and
    /// unsupported L3 or L4 protocols
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedEvent<'_>, DecodeError> {
        self.decode_event(&RawEvent::parse(bytes)?)
    }

    /// Decode an already parsed record
    ///
    /// # Errors
    /// See [`EventDecoder::decode`]
    pub fn decode_event(&self, raw: &RawEvent) -> Result<DecodedEvent<'_>, DecodeError> {
        let function =
            self.events.resolve(raw.event_id).ok_or(DecodeError::UnknownEventId(raw.event_id))?;

        let (addrs, family) = if raw.l3_protocol == self.ipv4 {
            (AddrPair::v4(&raw.addrs), IPV4)
        } else if raw.l3_protocol == self.ipv6 {
            (AddrPair::v6(&raw.addrs), IPV6)
        } else {
            return Err(DecodeError::UnsupportedL3(raw.l3_protocol));
        };

        let l3_protocol = self.protocols.l3_name(raw.l3_protocol).unwrap_or(family);
        let l4_protocol = self
            .protocols
            .l4_name(raw.l4_protocol)
            .ok_or(DecodeError::UnsupportedL4(raw.l4_protocol))?;

        let (saddr, daddr) = addrs.to_strings();
        let flow = Flow {
            l3_protocol: l3_protocol.to_string(),
            l4_protocol: l4_protocol.to_string(),
            saddr,
            daddr,
            sport: u16::from_be_bytes(raw.sport),
            dport: u16::from_be_bytes(raw.dport),
        };

        Ok(DecodedEvent { flow, function })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::filter::encode_addr4;
    use crate::protocols::tests::sample_catalog as sample_protocols;

    fn decoder(protocols: &ProtocolCatalog) -> EventDecoder<'_> {
        EventDecoder::new(EventNames::from_catalog(&sample_catalog()), protocols).unwrap()
    }

    fn tcp4(protocols: &ProtocolCatalog, id: u8) -> RawEvent {
        RawEvent::ipv4(
            EventId(id),
            L4Proto(6),
            protocols.l3_id(IPV4).unwrap(),
            (Ipv4Addr::new(10, 0, 0, 1), 1234),
            (Ipv4Addr::new(10, 0, 0, 2), 80),
        )
    }

    #[test]
    fn test_record_layout() {
        let protocols = sample_protocols();
        let bytes = tcp4(&protocols, 3).to_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1], 6);
        assert_eq!(&bytes[2..4], &[0x08, 0x00]);
        assert_eq!(&bytes[4..8], &[10, 0, 0, 1]);
        assert_eq!(&bytes[8..12], &[10, 0, 0, 2]);
        assert_eq!(&bytes[36..40], &[0x04, 0xd2, 0x00, 0x50]);
        assert_eq!(RawEvent::parse(&bytes).unwrap(), tcp4(&protocols, 3));
    }

    #[test]
    fn test_decode_ipv4() {
        let protocols = sample_protocols();
        let decoder = decoder(&protocols);
        let event = decoder.decode(&tcp4(&protocols, 1).to_bytes()).unwrap();
        assert_eq!(event.function, "ip_rcv_finish");
        assert_eq!(
            event.flow,
            Flow {
                l3_protocol: "IPv4".into(),
                l4_protocol: "TCP".into(),
                saddr: "10.0.0.1".into(),
                daddr: "10.0.0.2".into(),
                sport: 1234,
                dport: 80,
            }
        );
    }

    #[test]
    fn test_decode_ipv6() {
        let protocols = sample_protocols();
        let decoder = decoder(&protocols);
        let saddr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let daddr: Ipv6Addr = "fe80::1ff:fe23:4567:890a".parse().unwrap();
        let raw = RawEvent::ipv6(
            EventId(0),
            L4Proto(17),
            protocols.l3_id(IPV6).unwrap(),
            (saddr, 53),
            (daddr, 40000),
        );
        let event = decoder.decode(&raw.to_bytes()).unwrap();
        assert_eq!(event.flow.l3_protocol, "IPv6");
        assert_eq!(event.flow.l4_protocol, "UDP");
        assert_eq!(event.flow.saddr, "2001:db8::1");
        assert_eq!(event.flow.daddr, "fe80::1ff:fe23:4567:890a");
        assert_eq!((event.flow.sport, event.flow.dport), (53, 40000));
    }

    #[test]
    fn test_unknown_event_id() {
        let protocols = sample_protocols();
        let err = decoder(&protocols).decode(&tcp4(&protocols, 9).to_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownEventId(EventId(9)));
    }

    #[test]
    fn test_unsupported_l3() {
        let protocols = sample_protocols();
        let mut raw = tcp4(&protocols, 0);
        raw.l3_protocol = protocols.l3_id("ARP").unwrap();
        let err = decoder(&protocols).decode_event(&raw).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedL3(raw.l3_protocol));
    }

    #[test]
    fn test_unknown_l4_is_dropped() {
        let protocols = sample_protocols();
        let mut raw = tcp4(&protocols, 0);
        raw.l4_protocol = L4Proto(132);
        let err = decoder(&protocols).decode_event(&raw).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedL4(L4Proto(132)));
    }

    #[test]
    fn test_short_record() {
        let protocols = sample_protocols();
        let err = decoder(&protocols).decode(&[0u8; 12]).unwrap_err();
        assert_eq!(err, DecodeError::ShortRecord { len: 12, expected: RECORD_LEN });
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let protocols = sample_protocols();
        let mut bytes = tcp4(&protocols, 0).to_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 8]);
        assert!(decoder(&protocols).decode(&bytes).is_ok());
    }

    #[test]
    fn test_addr4_filter_round_trip() {
        for addr in [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(192, 168, 254, 3), Ipv4Addr::BROADCAST] {
            // the probe compares the header word as loaded against the filter constant
            let loaded = encode_addr4(addr).to_ne_bytes();
            assert_eq!(addr4_from_wire(&loaded), addr);
        }
    }

    #[test]
    fn test_addr6_filter_round_trip() {
        let addr: Ipv6Addr = "2001:db8:85a3::8a2e:370:7334".parse().unwrap();
        let encoded = crate::filter::encode_addr6(&addr);
        let bytes: Vec<u8> = encoded.split(',').map(|b| b.parse().unwrap()).collect();
        let octets: [u8; 16] = bytes.try_into().unwrap();
        assert_eq!(Ipv6Addr::from(octets).to_string(), "2001:db8:85a3::8a2e:370:7334");
    }
}
