//! CLI argument definitions

use clap::Parser;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use crate::catalog::DEFAULT_CONF_DIR;
use crate::filter::{Constraint, FilterSpec};
use crate::protocols::{DEFAULT_ETHERTYPES, DEFAULT_PROTOCOLS};
use crate::runtime::compiler::{DEFAULT_CLANG, DEFAULT_INCLUDE_DIR};

#[derive(Parser, Debug)]
#[command(
    name = "ipftrace",
    about = "Track the journey of the packets in Linux L3 layer",
    after_help = "\
EXAMPLES:
    sudo ipftrace --l4proto TCP --dport 80          HTTP traffic, all addresses
    sudo ipftrace --l3proto 6 --saddr6 2001:db8::1  IPv6 packets from one host
    ipftrace --list                                 Show traceable functions"
)]
pub struct Args {
    /// Linux kernel version selecting the function catalog (default: running kernel)
    #[arg(long)]
    pub kernel_version: Option<String>,

    /// Directory holding one function catalog per kernel version
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CONF_DIR)]
    pub conf_dir: PathBuf,

    /// Function catalog file (overrides --kernel-version lookup)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// IP version or ethertype name (4, 6, IPv4, IPv6)
    #[arg(long, default_value = "any")]
    pub l3proto: Constraint<String>,

    /// L4 protocol name from the protocols table
    #[arg(long, default_value = "any")]
    pub l4proto: Constraint<String>,

    /// IPv4 source address
    #[arg(long, default_value = "any")]
    pub saddr4: Constraint<Ipv4Addr>,

    /// IPv4 destination address
    #[arg(long, default_value = "any")]
    pub daddr4: Constraint<Ipv4Addr>,

    /// IPv6 source address
    #[arg(long, default_value = "any")]
    pub saddr6: Constraint<Ipv6Addr>,

    /// IPv6 destination address
    #[arg(long, default_value = "any")]
    pub daddr6: Constraint<Ipv6Addr>,

    /// Source port number
    #[arg(long, default_value = "any")]
    pub sport: Constraint<u16>,

    /// Destination port number
    #[arg(long, default_value = "any")]
    pub dport: Constraint<u16>,

    /// List available groups and functions
    #[arg(long)]
    pub list: bool,

    /// Print the assembled probe source and compiler symbols, then exit
    #[arg(long)]
    pub dump_probe: bool,

    /// Ethertype name table
    #[arg(long, value_name = "FILE", default_value = DEFAULT_ETHERTYPES)]
    pub ethertypes: PathBuf,

    /// Protocol name table
    #[arg(long, value_name = "FILE", default_value = DEFAULT_PROTOCOLS)]
    pub protocols: PathBuf,

    /// Compiler used to build the probe program
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CLANG)]
    pub clang: PathBuf,

    /// Header search path for vmlinux.h and libbpf headers (repeatable).
    /// Generate vmlinux.h with `cargo run -p xtask -- gen-vmlinux`
    #[arg(short = 'I', long = "include-dir", value_name = "DIR", default_value = DEFAULT_INCLUDE_DIR)]
    pub include_dirs: Vec<PathBuf>,

    /// Poll interval between table refreshes
    #[arg(long, value_name = "MS", default_value = "1000")]
    pub poll_interval_ms: u64,
}

impl Args {
    pub fn filter(&self) -> FilterSpec {
        FilterSpec {
            l3proto: self.l3proto.clone(),
            l4proto: self.l4proto.clone(),
            saddr4: self.saddr4.clone(),
            daddr4: self.daddr4.clone(),
            saddr6: self.saddr6.clone(),
            daddr6: self.daddr6.clone(),
            sport: self.sport.clone(),
            dport: self.dport.clone(),
        }
    }
}
