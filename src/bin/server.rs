//! # Server Binary Entry Point
//!
//! Runs an endpoint that stores every block it receives.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- --port 13579 --directory ./received
//! cargo run --bin server -- --config config/server.toml
//! ```
//!
//! The server will:
//! 1. Load configuration from the TOML file (if given), then apply flag overrides
//! 2. Start the endpoint's accept and sender loops
//! 3. Log each received message and write its blocks into the output directory
//! 4. On Ctrl-C, close the endpoint and handle whatever was still queued

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::io::Write;
use std::path::{Path, PathBuf};

use json_network::common::config::load_config;
use json_network::{CloseMode, Endpoint, EndpointConfig, ErrorPolicy, RecvPackage, TextEncoding};

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about = "Receives frames and writes their blocks to disk", long_about = None)]
struct Args {
    /// Path to an endpoint configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on
    #[arg(short, long)]
    address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Chunk size for reads from incoming connections
    #[arg(short, long)]
    buffer_size: Option<usize>,

    /// Encoding of the JSON segment (utf-8, ascii, latin-1)
    #[arg(short, long)]
    encoding: Option<TextEncoding>,

    /// Text error policy (strict, replace, ignore)
    #[arg(long)]
    errors: Option<String>,

    /// Directory where received blocks are written
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// INFO by default; `RUST_LOG` overrides.
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn build_config(args: &Args) -> Result<EndpointConfig> {
    let mut config: EndpointConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => EndpointConfig {
            port: 13579,
            ..EndpointConfig::default()
        },
    };

    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(buffer_size) = args.buffer_size {
        config.buffer_size = buffer_size;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(errors) = &args.errors {
        config.errors = ErrorPolicy::from(errors.as_str());
    }
    Ok(config)
}

/// Keep only the final path component so a peer can't write outside `directory`.
fn block_path(directory: &Path, name: &str, index: usize) -> PathBuf {
    match Path::new(name).file_name() {
        Some(file_name) => directory.join(file_name),
        None => directory.join(format!("block-{}", index)),
    }
}

/// Log a received package and write each of its blocks into `directory`.
///
/// Returns the paths that were written.
async fn store_package(directory: &Path, package: RecvPackage) -> Vec<PathBuf> {
    info!(
        "📥 Received from {}: {}",
        package.address,
        serde_json::Value::Object(package.message)
    );

    let mut written = Vec::new();
    for (index, block) in package.blocks.into_iter().enumerate() {
        let path = block_path(directory, block.name(), index);
        let name = block.name().to_string();
        let size = block.size();
        match tokio::fs::write(&path, block.into_data()).await {
            Ok(()) => {
                info!("💾 Wrote block '{}' ({} bytes) to {}", name, size, path.display());
                written.push(path);
            }
            Err(e) => error!("❌ Failed to write block '{}' to {}: {}", name, path.display(), e),
        }
    }
    written
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    // Parse command-line arguments and merge them over the config file
    let args = Args::parse();
    let config = build_config(&args)?;
    tokio::fs::create_dir_all(&args.directory).await?;

    // Start the endpoint (accept loop + sender loop)
    info!("To learn how to configure the server, run with -h flag.");
    let mut endpoint = Endpoint::start(config).await?;
    if let Some(addr) = endpoint.local_addr() {
        let config = endpoint.config();
        info!(
            "🚀 Server running on {} (buffer {} bytes, {} / {})",
            addr, config.buffer_size, config.encoding, config.errors
        );
    }

    // Store packages until interrupted
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("⚠️  Interrupted, shutting down");
                break;
            }
            package = endpoint.recv() => match package {
                Some(package) => {
                    store_package(&args.directory, package).await;
                }
                None => break,
            },
        }
    }

    // Close the endpoint and store whatever was still queued
    let remaining = endpoint.close(CloseMode::Drain).await?;
    for package in remaining {
        store_package(&args.directory, package).await;
    }
    info!("👋 Server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_path_stays_in_directory() {
        let dir = Path::new("/srv/out");
        assert_eq!(block_path(dir, "photo.jpg", 0), dir.join("photo.jpg"));
        assert_eq!(block_path(dir, "../../etc/passwd", 0), dir.join("passwd"));
        assert_eq!(block_path(dir, "..", 3), dir.join("block-3"));
        assert_eq!(block_path(dir, "", 1), dir.join("block-1"));
    }

    #[tokio::test]
    async fn test_store_package_writes_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let package = RecvPackage {
            address: "127.0.0.1:5000".parse().unwrap(),
            message: json_network::Message::new(),
            blocks: vec![
                json_network::DataBlock::new("a.txt", b"alpha".to_vec(), None),
                json_network::DataBlock::new("../b.bin", vec![1, 2, 3], None),
            ],
        };

        let written = store_package(dir.path(), package).await;
        assert_eq!(written, vec![dir.path().join("a.txt"), dir.path().join("b.bin")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"alpha");
        assert_eq!(std::fs::read(&written[1]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_sample_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/server.toml");
        let args = Args::parse_from(["server", "--config", path, "--port", "0"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.log_target, "json_network::server");
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from(["server", "-p", "4000", "--errors", "bogus", "-e", "latin1"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.address, "localhost");
        assert_eq!(config.errors, ErrorPolicy::Strict);
        assert_eq!(config.encoding, TextEncoding::Latin1);
    }
}
