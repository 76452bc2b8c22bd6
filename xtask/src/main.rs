// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod ral_gen;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a register access layer package from a compiled register tree
    RalGen {
        /// Compiled register tree (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory the package directory is created in
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Dotted path of the address map to export, defaults to the root
        #[arg(long)]
        top: Option<String>,

        /// User-defined property to fold into hashes and emit (repeatable)
        #[arg(long)]
        udp: Vec<String>,

        /// Regular expression over dotted paths of nodes to hide (repeatable)
        #[arg(long)]
        hide: Vec<String>,

        /// Structural hash: sha256 or fast
        #[arg(long)]
        hash: Option<ral_generator::HashAlgorithm>,

        /// Emit async accessors
        #[arg(long = "async")]
        asynchronous: bool,

        /// Do not generate test cases
        #[arg(long)]
        skip_tests: bool,

        /// Run `cargo test` in the generated package
        #[arg(long)]
        run_tests: bool,

        /// Block accessors use TypedBuffer
        #[arg(long)]
        legacy_block_access: bool,

        /// TOML export configuration, command line flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Name of the generated Cargo package
        #[arg(long)]
        package_name: Option<String>,

        /// Directory holding the runtime and sim crates, for path dependencies
        #[arg(long)]
        runtime_path: Option<PathBuf>,

        /// Include paths given to the register compiler, recorded for provenance
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,

        /// More output (-v info, -vv debug)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

fn main() {
    let cli = Xtask::parse();
    let result = match &cli.xtask {
        Commands::RalGen {
            input,
            output,
            top,
            udp,
            hide,
            hash,
            asynchronous,
            skip_tests,
            run_tests,
            legacy_block_access,
            config,
            package_name,
            runtime_path,
            include,
            verbose,
        } => ral_gen::generate(&ral_gen::RalGenArgs {
            input,
            output,
            top: top.as_deref(),
            udp,
            hide,
            hash: *hash,
            asynchronous: *asynchronous,
            skip_tests: *skip_tests,
            run_tests: *run_tests,
            legacy_block_access: *legacy_block_access,
            config: config.as_deref(),
            package_name: package_name.as_deref(),
            runtime_path: runtime_path.as_deref(),
            include,
            verbose: *verbose,
        }),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    });
}
