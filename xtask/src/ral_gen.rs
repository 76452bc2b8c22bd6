// Licensed under the Apache-2.0 license

//! Generates a register access layer package from a compiled register tree.

use anyhow::{bail, Context, Result};
use log::LevelFilter;
use ral_generator::{ExportConfig, HashAlgorithm};
use ral_model::World;
use simple_logger::SimpleLogger;
use std::path::{Path, PathBuf};
use std::process::Command;

pub(crate) struct RalGenArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub top: Option<&'a str>,
    pub udp: &'a [String],
    pub hide: &'a [String],
    pub hash: Option<HashAlgorithm>,
    pub asynchronous: bool,
    pub skip_tests: bool,
    pub run_tests: bool,
    pub legacy_block_access: bool,
    pub config: Option<&'a Path>,
    pub package_name: Option<&'a str>,
    pub runtime_path: Option<&'a Path>,
    pub include: &'a [PathBuf],
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = SimpleLogger::new().with_level(level).init();
}

/// File configuration first, then command line flags on top.
fn export_config(args: &RalGenArgs) -> Result<ExportConfig> {
    let mut config = match args.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::with_defaults(),
    };
    for udp in args.udp {
        config = config.add_udp(udp);
    }
    for pattern in args.hide {
        config = config.hide_pattern(pattern);
    }
    if let Some(hash) = args.hash {
        config = config.hash_algorithm(hash);
    }
    if args.asynchronous {
        config = config.asynchronous();
    }
    if args.skip_tests {
        config = config.skip_tests();
    }
    if args.legacy_block_access {
        config = config.legacy_block_access();
    }
    if let Some(name) = args.package_name {
        config = config.package_name(name);
    }
    if let Some(path) = args.runtime_path {
        config = config.runtime_path(path);
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn generate(args: &RalGenArgs) -> Result<()> {
    init_logging(args.verbose);
    if args.run_tests && args.skip_tests {
        bail!("--run-tests has nothing to run with --skip-tests");
    }

    println!("Loading register tree from: {}", args.input.display());
    for include in args.include {
        println!("Include path: {}", include.display());
    }
    let mut world = World::load(args.input)?;
    if let Some(top) = args.top {
        world.select_top(top)?;
    }
    let config = export_config(args)?;
    println!(
        "Exporting {} ({} hash)",
        world.path(world.top()),
        match config.hash_algorithm {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Fast => "fast",
        }
    );

    let summary = ral_generator::export(&world, &config, args.output)?;
    println!(
        "Output written to: {} ({} types, {} enumerations, {} files)",
        summary.package.display(),
        summary.types,
        summary.enums,
        summary.files
    );

    if args.run_tests {
        run_tests(&summary.package)?;
    }
    Ok(())
}

fn run_tests(package: &Path) -> Result<()> {
    println!("Running generated tests in {}", package.display());
    let status = Command::new(std::env::var("CARGO").unwrap_or_else(|_| "cargo".into()))
        .current_dir(package)
        .args(["test", "--quiet"])
        .status()
        .with_context(|| format!("running cargo test in {}", package.display()))?;
    if !status.success() {
        bail!("generated tests failed: {status}");
    }
    Ok(())
}
