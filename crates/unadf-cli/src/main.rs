//! unadf - A tool for inspecting and converting ADF files
//!
//! Usage:
//!   unadf info <adf_file>                              - Show header and instances
//!   unadf export <adf_file> [-o out.json]              - Export instances as JSON
//!   unadf import <json> --template <adf_file> -o <out> - Rebuild an ADF from JSON
//!   unadf verify <adf_file>                            - Check decode/encode round trip

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use unadf::adf_utils::{export_json, import_json, show_info, verify_file};

#[derive(Parser)]
#[command(name = "unadf")]
#[command(version = "0.1.0")]
#[command(about = "Inspect, export and rebuild ADF files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Type library files to load before decoding
    #[arg(short, long = "types", global = true)]
    types: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show file information
    Info {
        /// Path to the .adf file
        adf_file: PathBuf,
    },
    /// Export instances to JSON
    Export {
        /// Path to the .adf file
        adf_file: PathBuf,
        /// Instance name filter (glob or substring)
        #[arg(long)]
        instance: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rebuild an ADF file from exported JSON
    Import {
        /// Path to the JSON file
        json_file: PathBuf,
        /// ADF file supplying types, names and string hashes
        #[arg(long)]
        template: PathBuf,
        /// Output ADF file
        #[arg(short, long)]
        output: PathBuf,
        /// Write a big endian file
        #[arg(long)]
        big_endian: bool,
    },
    /// Decode and re-encode a file, reporting the first differing byte
    Verify {
        /// Path to the .adf file
        adf_file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { adf_file } => {
            show_info(&adf_file, &cli.types)?;
        }
        Commands::Export {
            adf_file,
            instance,
            output,
        } => {
            export_json(&adf_file, &cli.types, instance.as_deref(), output.as_deref())?;
        }
        Commands::Import {
            json_file,
            template,
            output,
            big_endian,
        } => {
            import_json(&json_file, &template, &cli.types, &output, big_endian)?;
        }
        Commands::Verify { adf_file } => {
            verify_file(&adf_file, &cli.types)?;
        }
    }

    Ok(())
}
