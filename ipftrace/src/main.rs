//! # ipftrace - Main Entry Point
//!
//! - `--list`: print the function catalog and exit
//! - `--dump-probe`: print the assembled probe and its symbols and exit
//! - default: attach probes and print the flow table after every poll

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::Write;
use std::time::Duration;

use ipftrace::catalog::FunctionCatalog;
use ipftrace::cli::{init_logging, Args};
use ipftrace::decoder::EventDecoder;
use ipftrace::preflight::{detect_kernel_version, run_preflight_checks};
use ipftrace::processor::{run_trace_loop, EventProcessor, ExitReason};
use ipftrace::protocols::ProtocolCatalog;
use ipftrace::runtime::{KernelRuntime, ProbeCompiler, ProbeRuntime};
use ipftrace::{filter, probe};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    init_logging();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("--kernel-version") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Load the catalog named by `--catalog`, or the one for the kernel version
fn load_catalog(args: &Args) -> Result<FunctionCatalog> {
    let path = if let Some(ref path) = args.catalog {
        path.clone()
    } else {
        let version = match args.kernel_version {
            Some(ref v) => v.clone(),
            None => detect_kernel_version()?,
        };
        FunctionCatalog::path_for_kernel(&args.conf_dir, &version)
    };

    let catalog = FunctionCatalog::load(&path)
        .with_context(|| format!("Failed to load function catalog {}", path.display()))?;
    info!("Loaded {} functions from {}", catalog.len(), path.display());
    Ok(catalog)
}

#[tokio::main(flavor = "current_thread")]
async fn run() -> Result<()> {
    let args = Args::parse();

    let catalog = load_catalog(&args)?;

    if args.list {
        let mut stdout = std::io::stdout().lock();
        catalog.list(&mut stdout)?;
        return Ok(());
    }

    let protocols = ProtocolCatalog::load(&args.ethertypes, &args.protocols)
        .context("Failed to load protocol tables")?;
    let symbols = filter::compile(&args.filter(), &protocols).context("Invalid filter")?;
    let program = probe::assemble(&catalog);

    if args.dump_probe {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", program.source)?;
        for symbol in &symbols {
            writeln!(stdout, "// {}", symbol.cflag())?;
        }
        return Ok(());
    }

    run_preflight_checks(&args.clang)?;

    let decoder = EventDecoder::new(program.events.clone(), &protocols)
        .context("Protocol tables lack IPv4/IPv6")?;
    let mut processor = EventProcessor::new(decoder);

    let runtime = KernelRuntime::new(ProbeCompiler::new(&args.clang, args.include_dirs.clone()));
    let mut channel = runtime.load(&program, &symbols).context("Failed to set up probes")?;

    println!("Trace ready!");

    let mut stdout = std::io::stdout();
    let reason = run_trace_loop(
        &mut channel,
        &mut processor,
        Duration::from_millis(args.poll_interval_ms),
        &mut stdout,
        tokio::signal::ctrl_c(),
    )
    .await?;

    if reason == ExitReason::Interrupted {
        info!("Interrupted");
    }
    processor.log_summary();

    Ok(())
}
