//! Pre-flight checks for ipftrace
//!
//! Validates system requirements before compiling and attaching probes.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Minimum kernel version for BPF ring buffer maps
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

const OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Run all pre-flight checks before loading probes
pub fn run_preflight_checks(clang: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_compiler(clang)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: ipftrace requires root privileges to attach kprobes.\n\n\
         Run with: sudo ipftrace ..."
    );
}

/// Parse the leading `major.minor.patch` of a kernel release string
///
/// `"5.15.0-91-generic"` gives `(5, 15, 0)`; a missing patch level is 0.
pub fn parse_release(release: &str) -> Option<(u32, u32, u32)> {
    let mut parts = release.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = leading_number(parts.next()?)?;
    let patch = parts.next().and_then(leading_number).unwrap_or(0);
    Some((major, minor, patch))
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Kernel version string used to select the function catalog
///
/// # Errors
/// Returns an error if the running kernel's release cannot be read or parsed
pub fn detect_kernel_version() -> Result<String> {
    let release = std::fs::read_to_string(OSRELEASE)
        .with_context(|| format!("Failed to read {OSRELEASE}"))?;
    let Some((major, minor, patch)) = parse_release(&release) else {
        bail!(
            "Couldn't guess the kernel version from {:?}.\n\n\
             Please specify it with --kernel-version",
            release.trim()
        );
    };
    Ok(format!("{major}.{minor}.{patch}"))
}

/// Check if the kernel version is sufficient for ring buffer maps
fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string(OSRELEASE)
        .with_context(|| format!("Failed to read kernel version from {OSRELEASE}"))?;

    let Some((major, minor, _)) = parse_release(&release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             ipftrace requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {}",
            major,
            minor,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release.trim()
        );
    }

    Ok(())
}

/// Check that the probe compiler can be executed
fn check_compiler(clang: &Path) -> Result<()> {
    let output = Command::new(clang).arg("--version").output().with_context(|| {
        format!(
            "Cannot run probe compiler {}\n\n\
             Install clang or point --clang at it.",
            clang.display()
        )
    })?;
    if !output.status.success() {
        bail!("Probe compiler {} exited with {}", clang.display(), output.status);
    }
    Ok(())
}
