// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the AdrOS integrity checker.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point: attach, advance to the checkpoint, run the suite.

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{warn, LevelFilter};

use adroscheck::{
    load_layout, CheckRunner, DebugSession, GdbRemote, KernelLayout, Summary, Teardown,
    QEMU_GDB_PORT,
};

/// AdrOS integrity checker command-line arguments.
#[derive(Debug, Parser)]
#[command(
    author = "Lukas Bower",
    version,
    about = "Post-boot integrity checks against a remote AdrOS instance",
    long_about = None
)]
struct Cli {
    /// Hostname or IP address of the remote debug stub.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port of the remote debug stub.
    #[arg(long, default_value_t = QEMU_GDB_PORT)]
    port: u16,

    /// Kernel ELF image used to resolve symbol addresses.
    #[arg(long, default_value = "adros-x86.bin")]
    kernel: PathBuf,

    /// TOML file overriding the built-in kernel layout.
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Break at this symbol instead of the layout's checkpoint.
    #[arg(long)]
    checkpoint: Option<String>,

    /// Socket timeout in milliseconds for stub round trips.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Detach from the target at teardown instead of killing it.
    #[arg(long, default_value_t = false)]
    no_kill: bool,

    /// Enable verbose diagnostic logging.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Apply `ADROSCHECK_HOST`/`ADROSCHECK_PORT` when the flag sits at its default.
fn resolve_endpoint(cli: &Cli) -> (String, u16) {
    let mut host = cli.host.clone();
    if host == "127.0.0.1" {
        if let Ok(value) = env::var("ADROSCHECK_HOST") {
            if !value.trim().is_empty() {
                host = value.trim().to_owned();
            }
        }
    }
    let mut port = cli.port;
    if port == QEMU_GDB_PORT {
        if let Ok(value) = env::var("ADROSCHECK_PORT") {
            if let Ok(parsed) = value.trim().parse::<u16>() {
                port = parsed;
            }
        }
    }
    (host, port)
}

fn banner() {
    println!();
    println!("=========================================");
    println!("  AdrOS Remote Integrity Checks");
    println!("=========================================");
    println!();
}

fn run(cli: &Cli) -> Result<Summary> {
    let layout = match &cli.layout {
        Some(path) => load_layout(path)
            .with_context(|| format!("failed to load layout {}", path.display()))?,
        None => KernelLayout::default(),
    };
    let (host, port) = resolve_endpoint(cli);
    let timeout = Duration::from_millis(cli.timeout_ms);

    let target = GdbRemote::connect(&host, port, timeout)
        .with_context(|| format!("cannot attach to debug stub at {host}:{port}"))?;
    let teardown = if cli.no_kill {
        Teardown::Detach
    } else {
        Teardown::Kill
    };
    let mut session = DebugSession::attach(target, teardown);

    if let Err(err) = session.load_symbols(&cli.kernel) {
        warn!("symbols unavailable from {}: {err}", cli.kernel.display());
    }

    let checkpoint = cli.checkpoint.as_deref().unwrap_or(&layout.checkpoint);
    match session.run_to_checkpoint(checkpoint) {
        Ok(()) => {
            if let Err(err) = session.step_out() {
                warn!("could not step past {checkpoint}: {err}");
            }
        }
        Err(err) => warn!("could not reach checkpoint {checkpoint}: {err}"),
    }

    banner();
    let stdout = io::stdout();
    let mut runner = CheckRunner::new(stdout.lock());
    adroscheck::run_suite(&mut session.query(), &mut runner, &layout);
    let summary = runner.finish();

    session.terminate();
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
