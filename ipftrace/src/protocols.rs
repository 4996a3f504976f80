//! # Protocol Name Tables
//!
//! Bidirectional name ↔ id tables for L3 ethertypes and L4 protocol numbers,
//! built once at startup from `/etc/ethertypes` and `/etc/protocols` and
//! shared read-only afterwards.
//!
//! L3 ids are stored in the representation the probes report (network byte
//! order, see [`L3Proto`]). L4 ids are single bytes and need no transform.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::domain::{L3Proto, L4Proto, ProtocolError};

pub const DEFAULT_ETHERTYPES: &str = "/etc/ethertypes";
pub const DEFAULT_PROTOCOLS: &str = "/etc/protocols";

/// Ethertype name of IPv4 in the ethertypes table
pub const IPV4: &str = "IPv4";
/// Ethertype name of IPv6 in the ethertypes table
pub const IPV6: &str = "IPv6";

/// Name ↔ id mapping where every name (and alias) resolves to an id and
/// every id resolves back to its first canonical name
#[derive(Debug, Clone)]
struct NameTable<Id> {
    by_name: HashMap<String, Id>,
    by_id: HashMap<Id, String>,
}

impl<Id: Copy + Eq + std::hash::Hash> NameTable<Id> {
    fn new() -> Self {
        Self { by_name: HashMap::new(), by_id: HashMap::new() }
    }

    fn insert(&mut self, display: &str, names: &[&str], id: Id) {
        for name in names {
            self.by_name.entry((*name).to_string()).or_insert(id);
        }
        self.by_id.entry(id).or_insert_with(|| display.to_string());
    }
}

/// The two protocol tables
#[derive(Debug, Clone)]
pub struct ProtocolCatalog {
    l3: NameTable<L3Proto>,
    l4: NameTable<L4Proto>,
}

impl ProtocolCatalog {
    /// Load both tables from the given system files
    ///
    /// # Errors
    /// Returns an error if either file is missing, unreadable or malformed
    pub fn load(ethertypes: &Path, protocols: &Path) -> Result<Self, ProtocolError> {
        let open = |path: &Path| {
            File::open(path)
                .map(BufReader::new)
                .map_err(|source| ProtocolError::TableUnreadable { path: path.to_path_buf(), source })
        };
        let catalog = Self::from_readers(open(ethertypes)?, open(protocols)?)?;
        debug!(
            "Loaded {} ethertypes and {} protocols",
            catalog.l3.by_id.len(),
            catalog.l4.by_id.len()
        );
        Ok(catalog)
    }

    /// Build both tables from already-opened sources
    ///
    /// # Errors
    /// Returns an error on I/O failure or a line that cannot be parsed
    pub fn from_readers(ethertypes: impl BufRead, protocols: impl BufRead) -> Result<Self, ProtocolError> {
        Ok(Self { l3: parse_ethertypes(ethertypes)?, l4: parse_protocols(protocols)? })
    }

    /// Resolve an ethertype name (or the short forms `4`/`6`)
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownL3`] if the name is not in the table
    pub fn l3_id(&self, name: &str) -> Result<L3Proto, ProtocolError> {
        let name = match name {
            "4" => IPV4,
            "6" => IPV6,
            other => other,
        };
        self.l3.by_name.get(name).copied().ok_or_else(|| ProtocolError::UnknownL3(name.to_string()))
    }

    pub fn l3_name(&self, id: L3Proto) -> Option<&str> {
        self.l3.by_id.get(&id).map(String::as_str)
    }

    /// Resolve a protocol name or alias
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownL4`] if the name is not in the table
    pub fn l4_id(&self, name: &str) -> Result<L4Proto, ProtocolError> {
        self.l4.by_name.get(name).copied().ok_or_else(|| ProtocolError::UnknownL4(name.to_string()))
    }

    pub fn l4_name(&self, id: L4Proto) -> Option<&str> {
        self.l4.by_id.get(&id).map(String::as_str)
    }
}

/// Split a table line into its fields, dropping `#` comments
fn fields(line: &str) -> Vec<&str> {
    let line = line.split_once('#').map_or(line, |(data, _)| data);
    line.split_whitespace().collect()
}

/// `/etc/ethertypes`: `NAME HEXID [ALIAS...]`
fn parse_ethertypes(reader: impl BufRead) -> Result<NameTable<L3Proto>, ProtocolError> {
    let mut table = NameTable::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let fields = fields(&line);
        let [name, hex, aliases @ ..] = fields.as_slice() else {
            if fields.is_empty() {
                continue;
            }
            return Err(malformed("ethertypes", idx, &line));
        };
        let ethertype = u16::from_str_radix(hex, 16).map_err(|_| malformed("ethertypes", idx, &line))?;

        let mut names = vec![*name];
        names.extend_from_slice(aliases);
        table.insert(name, &names, L3Proto::from_ethertype(ethertype));
    }
    Ok(table)
}

/// `/etc/protocols`: `name number [ALIAS...]`
///
/// The first alias is the display name (`tcp 6 TCP` shows as `TCP`).
/// Numbers above 255 (`mptcp 262`) cannot be reported by a probe and are skipped.
fn parse_protocols(reader: impl BufRead) -> Result<NameTable<L4Proto>, ProtocolError> {
    let mut table = NameTable::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let fields = fields(&line);
        let [name, number, aliases @ ..] = fields.as_slice() else {
            if fields.is_empty() {
                continue;
            }
            return Err(malformed("protocols", idx, &line));
        };
        let number: u32 = number.parse().map_err(|_| malformed("protocols", idx, &line))?;
        let Ok(number) = u8::try_from(number) else {
            debug!("Skipping protocol {name} ({number}): does not fit the l4 protocol field");
            continue;
        };

        let display = aliases.first().unwrap_or(name);
        let mut names = vec![*name];
        names.extend_from_slice(aliases);
        table.insert(display, &names, L4Proto(number));
    }
    Ok(table)
}

fn malformed(table: &'static str, idx: usize, line: &str) -> ProtocolError {
    ProtocolError::MalformedLine { table, line: idx + 1, content: line.to_string() }
}
