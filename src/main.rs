// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! natpack - carry native Node.js addons through JavaScript bundles
//!
//! Entry point for the `natpack` CLI, which drives the plugin hooks over
//! modules on disk:
//!
//! - `natpack build <inputs..>` rewrites modules and emits their binaries
//! - `natpack transform <file>` prints one rewritten module
//! - `natpack scan [root]` lists dependencies that ship native binaries

mod cli;
mod host;

use anyhow::{Context, Result};
use clap::Parser;
use natpack_plugin::{CopyMode, LogContext, NativeOptions, NativePlugin};
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{BuildArgs, Cli, Commands, ScanArgs, TransformArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "natpack=debug,natpack_plugin=debug,natpack_npm=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Build(args) => run_build(cli, args).await,
        Commands::Transform(args) => run_transform(cli, args),
        Commands::Scan(args) => run_scan(cli, args),
    }
}

/// File and environment options, then `--set` overrides.
fn load_options(cli: &Cli) -> Result<NativeOptions> {
    let mut options = NativeOptions::load(cli.config.as_deref())?;
    for (key, value) in &cli.overrides {
        options.set(key, value);
    }
    Ok(options)
}

async fn run_build(cli: &Cli, args: &BuildArgs) -> Result<()> {
    let mut options = load_options(cli)?;
    if let Some(copy_to) = &args.copy_to {
        options.copy_to = copy_to.clone();
    }
    let plugin = NativePlugin::new(options)?;
    let manifest = host::build(&plugin, &LogContext, &args.inputs, &args.out).await?;

    for module in &manifest.modules {
        println!(
            "  {} {} ({})",
            "rewrote".green(),
            module.output.display(),
            module.idioms.join(", ").dimmed()
        );
    }
    for path in &manifest.missing {
        println!("  {} {}", "missing".yellow(), path.display());
    }
    for name in manifest.bundled.iter().chain(&manifest.mirrored) {
        println!("  {} {}", "packaged".cyan(), name);
    }
    println!(
        "{} {} modules, {} binaries -> {}",
        "Done:".bright_cyan().bold(),
        manifest.modules.len(),
        manifest.loaders.len(),
        plugin.options().copy_to.display()
    );
    Ok(())
}

fn run_transform(cli: &Cli, args: &TransformArgs) -> Result<()> {
    let mut options = load_options(cli)?;
    // Nothing is emitted, so nothing should be copied either.
    options.copy_mode = CopyMode::Deferred;
    let plugin = NativePlugin::new(options)?;

    let file = std::path::absolute(&args.file)?;
    let code = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;

    match plugin.transform(&LogContext, &code, &file.to_string_lossy())? {
        Some(output) => {
            for found in &output.matches {
                let resolved = found
                    .resolved
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                eprintln!("{} {} -> {}", "rewrote".green(), found.kind.cyan(), resolved);
            }
            print!("{}", output.code);
        }
        None => {
            eprintln!("{}", "no native-loading idioms rewritten".dimmed());
            print!("{}", code);
        }
    }
    Ok(())
}

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => load_options(cli)?.project_root(),
    };
    let packages = host::scan(&root)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }
    if packages.is_empty() {
        println!("{}", "No native dependencies found".dimmed());
        return Ok(());
    }
    for package in &packages {
        println!("{} ({} binaries)", package.name.green().bold(), package.binaries.len());
        for binary in &package.binaries {
            println!("    {}", binary.display().dimmed());
        }
    }
    Ok(())
}
