//! # tensorbus CLI
//!
//! Inspection tool for the segments and messages of a tensorbus setup.
//!
//! # Usage
//!
//! ```bash
//! # List segments with writer liveness
//! tensorbus segments
//!
//! # Remove segments whose writer process is gone
//! tensorbus --config bus.toml cleanup
//!
//! # Decode wire strings
//! tensorbus decode-handle "tensorbus_812::tensorbus_812_0::float32::3,4"
//! tensorbus decode-message "const::lr::float::0.01::1"
//!
//! # Print the first values of a published tensor
//! tensorbus dump "tensorbus_812::tensorbus_812_0::float32::3,4" --limit 6
//! ```

#![deny(warnings)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tensorbus::{Dtype, MappedTensor, Message, TensorHandle};
use tensorbus_common::config::{BusConfig, LogLevel};
use tensorbus_common::logging::init_tracing;
use tensorbus_shm::SegmentDiscovery;
use tracing::{debug, error, info};

/// tensorbus - shared memory tensor bus inspection
#[derive(Parser, Debug)]
#[command(name = "tensorbus")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Inspect tensorbus segments, handles and messages")]
#[command(long_about = None)]
struct Args {
    /// Bus configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and listings in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List segment files of the configured prefix
    Segments,
    /// Remove segments whose writer process no longer runs
    Cleanup,
    /// Decode a tensor handle string
    DecodeHandle {
        /// Encoded handle
        handle: String,
    },
    /// Decode a wire message
    DecodeMessage {
        /// Raw message
        message: String,
    },
    /// Map a handle and print its values
    Dump {
        /// Encoded handle
        handle: String,
        /// Maximum number of values printed
        #[arg(short, long, default_value_t = 16)]
        limit: usize,
    },
}

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = BusConfig::load_or_default(args.config.as_deref())?;
    setup_tracing(&args, &config);
    debug!(?config, "configuration loaded");

    match args.command {
        Command::Segments => list_segments(&config, args.json),
        Command::Cleanup => {
            let discovery = SegmentDiscovery::new(&config.shm.dir, &config.shm.prefix);
            let removed = discovery.cleanup_orphaned()?;
            info!(removed, dir = %config.shm.dir.display(), "cleanup finished");
            println!("removed {removed} orphaned segment(s)");
            Ok(())
        }
        Command::DecodeHandle { handle } => {
            let handle: TensorHandle = handle.parse()?;
            println!("manager_ref: {}", handle.manager_ref);
            println!("segment_ref: {}", handle.segment_ref);
            println!("dtype:       {}", handle.dtype);
            println!("dims:        {:?}", handle.dims);
            match handle.nbytes() {
                Some(nbytes) => println!("bytes:       {nbytes}"),
                None => println!("bytes:       unknown"),
            }
            Ok(())
        }
        Command::DecodeMessage { message } => {
            println!("{:#?}", Message::decode(&message)?);
            Ok(())
        }
        Command::Dump { handle, limit } => dump(&config, &handle.parse()?, limit),
    }
}

fn setup_tracing(args: &Args, config: &BusConfig) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.shared.log_level
    };
    init_tracing(level, args.json);
}

fn list_segments(config: &BusConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = SegmentDiscovery::new(&config.shm.dir, &config.shm.prefix);
    let segments = discovery.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    println!("{:<32} {:>12} {:>8} {:>6}", "SEGMENT", "BYTES", "PID", "ALIVE");
    for status in &segments {
        println!(
            "{:<32} {:>12} {:>8} {:>6}",
            status.info.segment_ref,
            status.info.size,
            status.info.writer_pid,
            if status.writer_alive { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn dump(config: &BusConfig, handle: &TensorHandle, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut mapped = MappedTensor::attach(&config.shm.dir, handle)?;
    let values: Vec<String> = match handle.dtype {
        Dtype::Uint8 => format_values(mapped.to_vec::<u8>()?, limit),
        Dtype::Float32 => format_values(mapped.to_vec::<f32>()?, limit),
        Dtype::Int32 => format_values(mapped.to_vec::<i32>()?, limit),
        Dtype::Unknown => Vec::new(),
    };

    println!("{} {:?} {}", handle.dtype, mapped.shape(), handle.segment_ref);
    println!("[{}]", values.join(", "));
    Ok(())
}

fn format_values<T: ToString>(values: Vec<T>, limit: usize) -> Vec<String> {
    let total = values.len();
    let mut out: Vec<String> = values.iter().take(limit).map(T::to_string).collect();
    if total > limit {
        out.push(format!("... {} more", total - limit));
    }
    out
}
