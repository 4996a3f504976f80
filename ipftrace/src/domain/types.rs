//! Domain types providing compile-time safety and self-documentation
//!
//! The probes report protocol identifiers exactly as they sit in kernel
//! memory. These wrappers keep the wire representation from being mixed up
//! with host-order numbers.

use std::fmt;

/// Event ID embedded in every probe stub
///
/// Assigned sequentially while walking the function catalog. One byte on the
/// wire, so a catalog holds at most 256 functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u8);

impl EventId {
    /// Number of distinct ids representable on the wire
    pub const SPACE: usize = u8::MAX as usize + 1;

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// L3 protocol (ethertype) in network byte order representation
///
/// This is the value a probe stores when it copies `skb->protocol` into the
/// event record, read back as a native integer. On little-endian hosts it is
/// the byte swap of the ethertype number (IPv4 `0x0800` becomes `8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct L3Proto(pub u16);

impl L3Proto {
    /// Build from the host-order ethertype number found in `/etc/ethertypes`
    pub fn from_ethertype(ethertype: u16) -> Self {
        Self(u16::from_ne_bytes(ethertype.to_be_bytes()))
    }

    /// Host-order ethertype number
    pub fn ethertype(self) -> u16 {
        u16::from_be_bytes(self.0.to_ne_bytes())
    }
}

impl fmt::Display for L3Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// L4 protocol number (single byte, no byte order transform)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct L4Proto(pub u8);

impl fmt::Display for L4Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
