//! # Filter Compilation
//!
//! Turns the operator's [`FilterSpec`] into the preprocessor symbols the probe
//! template is compiled with. Every dimension yields exactly one symbol:
//! either `<NAME>_ANY` (no constraint) or `<NAME>=<value>`, where the value is
//! encoded the way the probe sees the corresponding event field:
//!
//! | Dimension     | Encoding                                               |
//! |---------------|--------------------------------------------------------|
//! | L3 protocol   | ethertype in network order representation              |
//! | L4 protocol   | protocol number                                        |
//! | IPv4 address  | packed bytes loaded as a native `u32`                  |
//! | IPv6 address  | the 16 packed bytes as a comma separated list          |
//! | Port          | decimal, host order (the probe converts with `ntohs`)  |

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::domain::FilterError;
use crate::protocols::ProtocolCatalog;

/// Sentinel accepted by every filter dimension
pub const ANY: &str = "any";

/// One filter dimension: unconstrained or an exact value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint<T> {
    Any,
    Exact(T),
}

impl<T> Default for Constraint<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T: FromStr> FromStr for Constraint<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ANY {
            Ok(Self::Any)
        } else {
            s.parse().map(Self::Exact)
        }
    }
}

/// Operator packet filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub l3proto: Constraint<String>,
    pub l4proto: Constraint<String>,
    pub saddr4: Constraint<Ipv4Addr>,
    pub daddr4: Constraint<Ipv4Addr>,
    pub saddr6: Constraint<Ipv6Addr>,
    pub daddr6: Constraint<Ipv6Addr>,
    pub sport: Constraint<u16>,
    pub dport: Constraint<u16>,
}

/// Filter dimension, in the order symbols are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    L3Proto,
    L4Proto,
    SAddr4,
    DAddr4,
    SAddr6,
    DAddr6,
    SPort,
    DPort,
}

impl Dimension {
    /// Symbol name prefix used by the probe template
    pub fn symbol(self) -> &'static str {
        match self {
            Self::L3Proto => "L3_PROTOCOL",
            Self::L4Proto => "L4_PROTOCOL",
            Self::SAddr4 => "SADDRV4",
            Self::DAddr4 => "DADDRV4",
            Self::SAddr6 => "SADDRV6",
            Self::DAddr6 => "DADDRV6",
            Self::SPort => "SPORT",
            Self::DPort => "DPORT",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single preprocessor definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDef {
    pub dimension: Dimension,
    pub name: String,
    pub value: Option<String>,
}

impl SymbolDef {
    pub fn any(dimension: Dimension) -> Self {
        Self { dimension, name: format!("{}_ANY", dimension.symbol()), value: None }
    }

    pub fn exact(dimension: Dimension, value: impl Into<String>) -> Self {
        Self { dimension, name: dimension.symbol().to_string(), value: Some(value.into()) }
    }

    pub fn is_any(&self) -> bool {
        self.value.is_none()
    }

    /// Compiler flag form (`-DNAME` or `-DNAME=VALUE`)
    pub fn cflag(&self) -> String {
        format!("-D{self}")
    }
}

impl fmt::Display for SymbolDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={value}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Ordered symbol list holding at most one definition per dimension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSet {
    defs: Vec<SymbolDef>,
}

impl SymbolSet {
    /// Add a definition
    ///
    /// # Errors
    /// Returns [`FilterError::Conflict`] if the dimension is already defined
    pub fn define(&mut self, def: SymbolDef) -> Result<(), FilterError> {
        if let Some(existing) = self.defs.iter().find(|d| d.dimension == def.dimension) {
            return Err(FilterError::Conflict {
                dimension: def.dimension.symbol(),
                first: existing.to_string(),
                second: def.to_string(),
            });
        }
        self.defs.push(def);
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SymbolDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn cflags(&self) -> Vec<String> {
        self.defs.iter().map(SymbolDef::cflag).collect()
    }
}

impl<'a> IntoIterator for &'a SymbolSet {
    type Item = &'a SymbolDef;
    type IntoIter = std::slice::Iter<'a, SymbolDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.defs.iter()
    }
}

/// Compile a filter into its symbol set
///
/// # Errors
/// Returns an error if a protocol name is not in the protocol tables
pub fn compile(spec: &FilterSpec, protocols: &ProtocolCatalog) -> Result<SymbolSet, FilterError> {
    let mut symbols = SymbolSet::default();

    symbols.define(encode(Dimension::L3Proto, &spec.l3proto, |name| {
        protocols.l3_id(name).map(|id| id.to_string())
    })?)?;
    symbols.define(encode(Dimension::L4Proto, &spec.l4proto, |name| {
        protocols.l4_id(name).map(|id| id.to_string())
    })?)?;
    symbols.define(plain(Dimension::SAddr4, &spec.saddr4, |a| encode_addr4(*a).to_string()))?;
    symbols.define(plain(Dimension::DAddr4, &spec.daddr4, |a| encode_addr4(*a).to_string()))?;
    symbols.define(plain(Dimension::SAddr6, &spec.saddr6, encode_addr6))?;
    symbols.define(plain(Dimension::DAddr6, &spec.daddr6, encode_addr6))?;
    symbols.define(plain(Dimension::SPort, &spec.sport, u16::to_string))?;
    symbols.define(plain(Dimension::DPort, &spec.dport, u16::to_string))?;

    Ok(symbols)
}

fn encode<T, E>(
    dimension: Dimension,
    constraint: &Constraint<T>,
    value: impl FnOnce(&T) -> Result<String, E>,
) -> Result<SymbolDef, FilterError>
where
    FilterError: From<E>,
{
    match constraint {
        Constraint::Any => Ok(SymbolDef::any(dimension)),
        Constraint::Exact(v) => Ok(SymbolDef::exact(dimension, value(v)?)),
    }
}

fn plain<T>(dimension: Dimension, constraint: &Constraint<T>, value: impl FnOnce(&T) -> String) -> SymbolDef {
    match constraint {
        Constraint::Any => SymbolDef::any(dimension),
        Constraint::Exact(v) => SymbolDef::exact(dimension, value(v)),
    }
}

/// IPv4 address as the probe loads it from the packet: packed bytes read as a
/// native integer (little-endian on every supported BPF host)
pub fn encode_addr4(addr: Ipv4Addr) -> u32 {
    u32::from_ne_bytes(addr.octets())
}

/// IPv6 address as 16 network-order byte values
pub fn encode_addr6(addr: &Ipv6Addr) -> String {
    addr.octets().iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
