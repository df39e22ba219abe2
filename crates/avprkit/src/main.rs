use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use avpr_rs::Protocol;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the canonical JSON form of a protocol
    #[command(arg_required_else_help = true)]
    Show {
        /// Path to the AVPR file
        #[arg(required = true)]
        protocol_file: PathBuf,

        /// Indent the output
        #[arg(long)]
        pretty: bool,
    },
    /// Print the MD5 fingerprint of a protocol
    #[command(arg_required_else_help = true)]
    Fingerprint {
        /// Path to the AVPR file
        #[arg(required = true)]
        protocol_file: PathBuf,
    },
    /// Write every named type of a protocol to its own AVSC file
    #[command(arg_required_else_help = true)]
    Types {
        /// Path to the AVPR file
        #[arg(required = true)]
        protocol_file: PathBuf,

        /// Target folder to place the avsc schemas
        #[arg(required = false, value_parser, default_value = ".")]
        out: PathBuf,
    },
}

fn load(path: &Path) -> Result<Protocol> {
    Protocol::parse_file(path).with_context(|| format!("failed to parse {}", path.display()))
}

fn export_types(protocol: &Protocol, out: &Path) -> Result<()> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    for schema in protocol.types() {
        let name = match schema.name() {
            Some(name) => &name.name,
            None => continue,
        };
        let outpath = out.join(format!("{name}.avsc"));
        let json = serde_json::to_string_pretty(&protocol.expand(schema)?)?;
        fs::write(&outpath, json)
            .with_context(|| format!("failed to write {}", outpath.display()))?;
        tracing::info!(path = %outpath.display(), "type written");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    match args.command {
        Commands::Show {
            protocol_file,
            pretty,
        } => {
            let protocol = load(&protocol_file)?;
            println!("{}", protocol.to_json_string(pretty)?);
        }
        Commands::Fingerprint { protocol_file } => {
            let protocol = load(&protocol_file)?;
            println!("{}", protocol.fingerprint()?);
        }
        Commands::Types { protocol_file, out } => {
            let protocol = load(&protocol_file)?;
            export_types(&protocol, &out)?;
        }
    }
    Ok(())
}
