use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Dump the running kernel's BTF as the vmlinux.h the probe template includes
    GenVmlinux {
        #[arg(long, default_value = "/sys/kernel/btf/vmlinux")]
        btf: PathBuf,
        #[arg(long, default_value = "ipftrace/bpf/vmlinux.h")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::GenVmlinux { btf, output } => gen_vmlinux(&btf, &output)?,
    }

    Ok(())
}

fn gen_vmlinux(btf: &Path, output: &Path) -> Result<()> {
    let header = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let status = Command::new("bpftool")
        .args(["btf", "dump", "file"])
        .arg(btf)
        .args(["format", "c"])
        .stdout(Stdio::from(header))
        .status()
        .context("Failed to run bpftool")?;

    if !status.success() {
        anyhow::bail!("bpftool failed to dump {}", btf.display());
    }

    println!("✓ vmlinux.h generated");
    println!("  BTF: {}", btf.display());
    println!("  Output: {}", output.display());
    println!("  Use with: ipftrace -I {}", output.parent().map_or(".".into(), |p| p.display().to_string()));

    Ok(())
}
