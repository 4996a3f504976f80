//! # Function Catalog
//!
//! Declarative list of the kernel functions to instrument, grouped by
//! networking layer and loaded from `conf/base/<kernel-version>.json` or
//! `conf/base/<kernel-version>.yaml`:
//!
//! ```json
//! { "functions": { "ip": [ { "name": "ip_rcv", "args": ["struct sk_buff *skb"] } ] } }
//! ```
//!
//! ```yaml
//! functions:
//!   ip:
//!     - name: ip_rcv
//!       args: ["struct sk_buff *skb"]
//! ```
//!
//! Group order and function order follow the document. [`FunctionCatalog::probe_points`]
//! is the single traversal that assigns event ids; both the probe assembler
//! and the id → name table are driven from it.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::domain::{CatalogError, EventId};

/// Directory holding one catalog per kernel version
pub const DEFAULT_CONF_DIR: &str = "conf/base";

/// Catalog file extensions, in lookup order
const CATALOG_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Register arguments available to a kprobe handler
pub const MAX_PROBE_ARGS: usize = 5;

/// Identifier the match predicate expects the packet argument to use
const SKB_ARG: &str = "skb";

/// One instrumentable kernel function
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Parameter declarations after the context handle, emitted verbatim
    #[serde(default)]
    pub args: Vec<String>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self { name: name.into(), args: args.iter().map(ToString::to_string).collect() }
    }

    fn has_skb_arg(&self) -> bool {
        self.args.iter().any(|arg| {
            arg.split_whitespace()
                .last()
                .is_some_and(|ident| ident.trim_start_matches('*') == SKB_ARG)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub functions: Vec<FunctionDecl>,
}

/// A catalog entry paired with its event id
#[derive(Debug, Clone, Copy)]
pub struct ProbePoint<'a> {
    pub id: EventId,
    pub group: &'a str,
    pub function: &'a FunctionDecl,
}

/// Validated, immutable function catalog
#[derive(Debug, Clone)]
pub struct FunctionCatalog {
    groups: Vec<Group>,
}

impl FunctionCatalog {
    /// Validate groups and build a catalog
    ///
    /// # Errors
    /// Returns an error if a function has no name, is listed twice, declares
    /// too many arguments or no `skb` argument, or the catalog exceeds the
    /// event id space
    pub fn new(groups: Vec<Group>) -> Result<Self, CatalogError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for group in &groups {
            for function in &group.functions {
                if function.name.is_empty() {
                    return Err(CatalogError::EmptyName(group.name.clone()));
                }
                if let Some(first) = seen.insert(&function.name, &group.name) {
                    return Err(CatalogError::DuplicateFunction {
                        name: function.name.clone(),
                        first: first.to_string(),
                        second: group.name.clone(),
                    });
                }
                if function.args.len() > MAX_PROBE_ARGS {
                    return Err(CatalogError::TooManyArgs {
                        name: function.name.clone(),
                        count: function.args.len(),
                        max: MAX_PROBE_ARGS,
                    });
                }
                if !function.has_skb_arg() {
                    return Err(CatalogError::MissingSkbArg(function.name.clone()));
                }
            }
        }
        if seen.len() > EventId::SPACE {
            return Err(CatalogError::TooManyFunctions(seen.len()));
        }
        Ok(Self { groups })
    }

    /// Parse a JSON catalog document
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        Self::new(file.functions.0)
    }

    /// Parse a YAML catalog document
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        Self::new(file.functions.0)
    }

    /// Load a catalog file, YAML for `.yaml`/`.yml` and JSON otherwise
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| CatalogError::Unreadable { path: path.to_path_buf(), source })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Path of the catalog for a kernel version
    ///
    /// The first existing `<version>.yaml`, `<version>.yml` or
    /// `<version>.json` wins; the JSON path is returned when none exists.
    pub fn path_for_kernel(conf_dir: &Path, kernel_version: &str) -> PathBuf {
        CATALOG_EXTENSIONS
            .iter()
            .map(|ext| conf_dir.join(format!("{kernel_version}.{ext}")))
            .find(|path| path.is_file())
            .unwrap_or_else(|| conf_dir.join(format!("{kernel_version}.json")))
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Number of instrumented functions
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.functions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk every function, groups in order then functions in order,
    /// assigning event ids from 0
    #[allow(clippy::cast_possible_truncation)]
    pub fn probe_points(&self) -> impl Iterator<Item = ProbePoint<'_>> {
        self.groups
            .iter()
            .flat_map(|group| group.functions.iter().map(move |function| (group, function)))
            .enumerate()
            .map(|(idx, (group, function))| ProbePoint {
                // count is bounded by EventId::SPACE in new()
                id: EventId(idx as u8),
                group: &group.name,
                function,
            })
    }

    /// Write the `--list` output
    ///
    /// # Errors
    /// Returns an error if writing fails
    pub fn list(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "Available groups and functions")?;
        for group in &self.groups {
            writeln!(out, "{}", group.name)?;
            for function in &group.functions {
                writeln!(out, "  {}", function.name)?;
            }
        }
        Ok(())
    }
}

/// Event id → function name, rebuilt from the catalog traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames(Vec<String>);

impl EventNames {
    pub fn from_catalog(catalog: &FunctionCatalog) -> Self {
        catalog.probe_points().map(|p| p.function.name.clone()).collect()
    }

    pub fn resolve(&self, id: EventId) -> Option<&str> {
        self.0.get(id.index()).map(String::as_str)
    }

    /// Function names in event id order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for EventNames {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    functions: OrderedGroups,
}

/// Groups in document order
struct OrderedGroups(Vec<Group>);

impl<'de> Deserialize<'de> for OrderedGroups {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupsVisitor;

        impl<'de> Visitor<'de> for GroupsVisitor {
            type Value = OrderedGroups;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of group names to function lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut groups = Vec::new();
                while let Some((name, functions)) = map.next_entry::<String, Vec<FunctionDecl>>()? {
                    groups.push(Group { name, functions });
                }
                Ok(OrderedGroups(groups))
            }
        }

        deserializer.deserialize_map(GroupsVisitor)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "functions": {
            "ip": [
                { "name": "ip_rcv", "args": ["struct sk_buff *skb", "struct net_device *dev"] },
                { "name": "ip_rcv_finish", "args": ["struct net *net", "struct sock *sk", "struct sk_buff *skb"] }
            ],
            "arp": [
                { "name": "arp_rcv", "args": ["struct sk_buff *skb"] }
            ],
            "tcp": [
                { "name": "tcp_v4_rcv", "args": ["struct sk_buff *skb"] }
            ]
        }
    }"#;

    pub(crate) fn sample_catalog() -> FunctionCatalog {
        FunctionCatalog::from_json(SAMPLE).expect("sample catalog parses")
    }

    #[test]
    fn test_groups_keep_document_order() {
        let catalog = sample_catalog();
        let names: Vec<_> = catalog.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["ip", "arp", "tcp"]);
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_probe_points_are_sequential() {
        let catalog = sample_catalog();
        let points: Vec<_> =
            catalog.probe_points().map(|p| (p.id.0, p.group, p.function.name.as_str())).collect();
        assert_eq!(
            points,
            [(0, "ip", "ip_rcv"), (1, "ip", "ip_rcv_finish"), (2, "arp", "arp_rcv"), (3, "tcp", "tcp_v4_rcv")]
        );
    }

    #[test]
    fn test_event_names_resolve() {
        let names = EventNames::from_catalog(&sample_catalog());
        assert_eq!(names.resolve(EventId(2)), Some("arp_rcv"));
        assert_eq!(names.resolve(EventId(4)), None);
    }

    #[test]
    fn test_list_output() {
        let mut out = Vec::new();
        sample_catalog().list(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Available groups and functions\nip\n  ip_rcv\n  ip_rcv_finish\narp\n"));
    }

    #[test]
    fn test_missing_skb_arg_rejected() {
        let doc = r#"{ "functions": { "ip": [ { "name": "ip_rcv", "args": ["struct net_device *dev"] } ] } }"#;
        assert!(matches!(FunctionCatalog::from_json(doc), Err(CatalogError::MissingSkbArg(n)) if n == "ip_rcv"));
    }

    #[test]
    fn test_too_many_args_rejected() {
        let function = FunctionDecl::new("f", &["struct sk_buff *skb", "int a", "int b", "int c", "int d", "int e"]);
        let result = FunctionCatalog::new(vec![Group { name: "g".into(), functions: vec![function] }]);
        assert!(matches!(result, Err(CatalogError::TooManyArgs { count: 6, .. })));
    }

    #[test]
    fn test_too_many_functions_rejected() {
        let functions =
            (0..257).map(|i| FunctionDecl::new(format!("f{i}"), &["struct sk_buff *skb"])).collect();
        let result = FunctionCatalog::new(vec![Group { name: "g".into(), functions }]);
        assert!(matches!(result, Err(CatalogError::TooManyFunctions(257))));
    }

    #[test]
    fn test_full_id_space_accepted() {
        let functions =
            (0..256).map(|i| FunctionDecl::new(format!("f{i}"), &["struct sk_buff *skb"])).collect();
        let catalog = FunctionCatalog::new(vec![Group { name: "g".into(), functions }]).unwrap();
        assert_eq!(catalog.probe_points().last().map(|p| p.id), Some(EventId(255)));
    }

    #[test]
    fn test_missing_file() {
        let path = FunctionCatalog::path_for_kernel(Path::new("/nonexistent"), "5.4.0");
        assert_eq!(path, Path::new("/nonexistent/5.4.0.json"));
        assert!(matches!(FunctionCatalog::load(&path), Err(CatalogError::Unreadable { .. })));
    }

    #[test]
    fn test_yaml_document_matches_json() {
        let doc = "\
functions:
  ip:
    - name: ip_rcv
      args: [\"struct sk_buff *skb\", \"struct net_device *dev\"]
    - name: ip_rcv_finish
      args:
        - struct net *net
        - struct sock *sk
        - struct sk_buff *skb
  arp:
    - name: arp_rcv
      args: [\"struct sk_buff *skb\"]
  tcp:
    - name: tcp_v4_rcv
      args: [\"struct sk_buff *skb\"]
";
        let catalog = FunctionCatalog::from_yaml(doc).unwrap();
        assert_eq!(catalog.groups(), sample_catalog().groups());
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let doc = r#"{ "functions": {
            "ip": [ { "name": "ip_rcv", "args": ["struct sk_buff *skb"] } ],
            "core": [ { "name": "ip_rcv", "args": ["struct sk_buff *skb"] } ]
        } }"#;
        assert!(matches!(
            FunctionCatalog::from_json(doc),
            Err(CatalogError::DuplicateFunction { name, first, second })
                if name == "ip_rcv" && first == "ip" && second == "core"
        ));
    }

    #[test]
    fn test_malformed_yaml_document() {
        assert!(matches!(FunctionCatalog::from_yaml("functions: [ip_rcv]"), Err(CatalogError::MalformedYaml(_))));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(FunctionCatalog::from_json("{\"functions\": []}"), Err(CatalogError::Malformed(_))));
    }
}
