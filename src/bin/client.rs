//! # Client Binary Entry Point
//!
//! Sends one frame: a JSON message plus one block per file argument.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --port 13579 --json '{"op": "upload"}' photo.jpg notes.txt
//! ```
//!
//! The client will:
//! 1. Read every file into a block named after the file
//! 2. Start a local endpoint on an ephemeral port
//! 3. Queue the frame for the destination
//! 4. Close the endpoint, which waits for the send queue to empty

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;

use json_network::{
    CloseMode, DataBlock, Endpoint, EndpointConfig, ErrorPolicy, Message, TextEncoding,
};

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about = "Connects to a server and sends a message with file blocks", long_about = None)]
struct Args {
    /// Files to attach as data blocks
    files: Vec<PathBuf>,

    /// Server address
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Port number
    #[arg(short, long, default_value_t = 13579)]
    port: u16,

    /// JSON object sent as the message
    #[arg(short, long, default_value = "{}")]
    json: String,

    /// Encoding of the JSON segment (utf-8, ascii, latin-1)
    #[arg(short, long, default_value = "utf-8")]
    encoding: TextEncoding,

    /// Text error policy (strict, replace, ignore)
    #[arg(long, default_value = "strict")]
    errors: String,
}

/// Initialize the logging system with timestamp, level, and message formatting.
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

fn parse_message(json: &str) -> Result<Message> {
    match serde_json::from_str::<serde_json::Value>(json).context("--json is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--json must be a JSON object, got {}", other),
    }
}

async fn read_blocks(files: &[PathBuf]) -> Result<Vec<DataBlock>> {
    let mut blocks = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let block = DataBlock::from_file(name, path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        blocks.push(block);
    }
    Ok(blocks)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    // Parse command-line arguments
    let args = Args::parse();
    let message = parse_message(&args.json)?;

    // Load every file as a data block
    let blocks = read_blocks(&args.files).await?;

    // Local endpoint on an ephemeral port; only its sender loop is used
    let config = EndpointConfig {
        address: "127.0.0.1".to_string(),
        port: 0,
        encoding: args.encoding,
        errors: ErrorPolicy::from(args.errors.as_str()),
        ..EndpointConfig::default()
    };
    let mut endpoint = Endpoint::start(config).await?;

    endpoint.send(args.address.as_str(), args.port, &message, &blocks)?;
    info!(
        "📤 Queued message with {} blocks for {}:{}",
        blocks.len(),
        args.address,
        args.port
    );

    // Closing waits for the send queue to empty
    endpoint.close(CloseMode::Abort).await?;
    info!("✅ Send queue flushed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        let message = parse_message(r#"{"op": "upload"}"#).unwrap();
        assert_eq!(message["op"], "upload");
        assert!(parse_message("[1, 2]").is_err());
        assert!(parse_message("{oops").is_err());
    }

    #[tokio::test]
    async fn test_read_blocks_names_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let blocks = read_blocks(&[path]).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name(), "report.csv");
        assert_eq!(blocks[0].size(), 8);
    }
}
