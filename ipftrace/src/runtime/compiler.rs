//! Probe compilation with clang
//!
//! The filter symbols become `-D` flags, so the template's `#ifndef <NAME>_ANY`
//! blocks compile in only the checks the operator asked for.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use tempfile::TempDir;

use crate::domain::RuntimeError;
use crate::filter::SymbolSet;

pub const DEFAULT_CLANG: &str = "clang";

/// Directory holding `vmlinux.h`, relative to the crate root
pub const DEFAULT_INCLUDE_DIR: &str = "bpf";

const SOURCE_FILE: &str = "ipftrace.bpf.c";
const OBJECT_FILE: &str = "ipftrace.bpf.o";

/// Compiled BPF object, removed when dropped
pub struct CompiledProbe {
    _dir: TempDir,
    object: PathBuf,
}

impl CompiledProbe {
    pub fn path(&self) -> &Path {
        &self.object
    }
}

#[derive(Debug, Clone)]
pub struct ProbeCompiler {
    clang: PathBuf,
    include_dirs: Vec<PathBuf>,
}

impl ProbeCompiler {
    pub fn new(clang: impl Into<PathBuf>, include_dirs: Vec<PathBuf>) -> Self {
        Self { clang: clang.into(), include_dirs }
    }

    /// Build the clang invocation for a source/object pair
    pub fn command(&self, source: &Path, object: &Path, symbols: &SymbolSet) -> Command {
        let mut cmd = Command::new(&self.clang);
        cmd.args(["-O2", "-g", "-target", "bpf"]);
        cmd.arg(format!("-D__TARGET_ARCH_{}", target_arch()));
        cmd.args(symbols.cflags());
        for dir in &self.include_dirs {
            cmd.arg("-I").arg(dir);
        }
        cmd.arg("-c").arg(source).arg("-o").arg(object);
        cmd
    }

    /// Compile probe source into a BPF object
    ///
    /// # Errors
    /// Returns an error if clang cannot be run or reports a failure
    pub fn compile(&self, source: &str, symbols: &SymbolSet) -> Result<CompiledProbe, RuntimeError> {
        let dir = tempfile::tempdir()?;
        let source_path = dir.path().join(SOURCE_FILE);
        let object = dir.path().join(OBJECT_FILE);
        std::fs::write(&source_path, source)?;

        let mut cmd = self.command(&source_path, &object, symbols);
        debug!("Running {cmd:?}");
        let output = cmd.output().map_err(|source| RuntimeError::CompilerUnavailable {
            compiler: self.clang.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(RuntimeError::CompileFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
        }

        info!("✓ Compiled probe program ({} symbols)", symbols.len());
        Ok(CompiledProbe { _dir: dir, object })
    }
}

/// Architecture name used by libbpf's `PT_REGS` accessors
fn target_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" | "x86" => "x86",
        "aarch64" => "arm64",
        "arm" => "arm",
        "riscv64" => "riscv",
        "powerpc64" => "powerpc",
        "s390x" => "s390",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Dimension, SymbolDef};

    #[test]
    fn test_command_line() {
        let mut symbols = SymbolSet::default();
        symbols.define(SymbolDef::any(Dimension::L3Proto)).unwrap();
        symbols.define(SymbolDef::exact(Dimension::DPort, "80")).unwrap();

        let compiler = ProbeCompiler::new("/usr/bin/clang-17", vec![PathBuf::from("/opt/vmlinux")]);
        let cmd = compiler.command(Path::new("/tmp/p.c"), Path::new("/tmp/p.o"), &symbols);

        assert_eq!(cmd.get_program(), "/usr/bin/clang-17");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..4], ["-O2", "-g", "-target", "bpf"]);
        assert!(args[4].starts_with("-D__TARGET_ARCH_"));
        assert_eq!(&args[5..], ["-DL3_PROTOCOL_ANY", "-DDPORT=80", "-I", "/opt/vmlinux", "-c", "/tmp/p.c", "-o", "/tmp/p.o"]);
    }

    #[test]
    fn test_missing_compiler() {
        let compiler = ProbeCompiler::new("/nonexistent/clang", Vec::new());
        let result = compiler.compile("int x;", &SymbolSet::default());
        assert!(matches!(result, Err(RuntimeError::CompilerUnavailable { .. })));
    }
}
