// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command line interface for natpack.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// natpack - carry native Node.js addons through JavaScript bundles
#[derive(Parser, Debug)]
#[command(name = "natpack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options file (defaults to natpack.json in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override an option, e.g. `--set platform=win32` (repeatable)
    #[arg(short = 's', long = "set", global = true, value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rewrite a set of modules and emit their native binaries
    Build(BuildArgs),

    /// Print one module with its native-loading idioms rewritten
    Transform(TransformArgs),

    /// List dependencies that ship native binaries
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Files or directories of JavaScript modules
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory rewritten modules are written to
    #[arg(short, long, default_value = "dist")]
    pub out: PathBuf,

    /// Directory binaries are copied to (overrides `copyTo`)
    #[arg(long)]
    pub copy_to: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Module to transform
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Project root (defaults to the configured root or working directory)
    pub root: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("missing option name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from([
            "natpack",
            "--set",
            "platform=win32",
            "build",
            "src",
            "lib/index.js",
            "--out",
            "bundle",
        ]);
        assert_eq!(cli.overrides, vec![("platform".to_string(), "win32".to_string())]);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.inputs, vec![PathBuf::from("src"), PathBuf::from("lib/index.js")]);
                assert_eq!(args.out, PathBuf::from("bundle"));
                assert!(args.copy_to.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_command_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["natpack", "build", "src", "-s", "arch=arm64", "-o", "bundle"]);
        assert_eq!(cli.overrides, vec![("arch".to_string(), "arm64".to_string())]);
        match cli.command {
            Commands::Build(args) => assert_eq!(args.out, PathBuf::from("bundle")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("copy-to=out/native"),
            Ok(("copy-to".to_string(), "out/native".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
