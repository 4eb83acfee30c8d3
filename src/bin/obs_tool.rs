//! CLI entry point for obs-tool: single object operations against a bucket.

use clap::{Parser, Subcommand};
use obsbench::client::ListOptions;
use obsbench::config::Config;
use obsbench::transport::memory::MemoryTransport;
use obsbench::{ObsClient, ObsError};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "obs-tool", version, about = "Object storage command-line tool")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite file holding bucket state between invocations.
    #[arg(long, global = true)]
    state: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    PutFile { key: String, path: PathBuf },
    /// Append a local file at a position
    AppendFile {
        key: String,
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        position: u64,
    },
    /// List keys
    List {
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        start_key: String,
        #[arg(long, default_value = "/")]
        delimiter: String,
    },
    /// Print bucket capacity and object count
    StorageInfo,
    /// Delete keys (one request per 1000 keys)
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Delete every object in the bucket
    DeleteAll,
}

fn main() {
    let cli = Cli::parse();
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading config: {e:#}");
            std::process::exit(1);
        }
    };
    obsbench::init_tracing(&config.logging);
    if let Some(state) = cli.state {
        config.transport.snapshot_path = Some(state);
    }
    if let Err(e) = config.finalize() {
        eprintln!("Error: invalid configuration: {e:#}");
        std::process::exit(1);
    }

    let transport = match MemoryTransport::open(&config.transport) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("Error opening state: {e:#}");
            std::process::exit(1);
        }
    };
    transport.create_bucket(&config.endpoint.bucket_name);

    let client = match ObsClient::new(config.endpoint.clone(), transport.clone()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e.diagnostic());
            std::process::exit(1);
        }
    };

    let mut rc = match run(&client, cli.command, cli.json) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e.diagnostic());
            1
        }
    };
    client.shutdown();

    if let Some(path) = &config.transport.snapshot_path {
        if let Err(e) = transport.save_snapshot(path) {
            eprintln!("Error saving state to {path}: {e:#}");
            rc = 1;
        }
    }
    std::process::exit(rc);
}

fn run(client: &ObsClient, command: Commands, json: bool) -> Result<(), ObsError> {
    match command {
        Commands::PutFile { key, path } => {
            let size = client.put_file(&key, &path)?;
            println!("put {key} ({size} bytes)");
        }
        Commands::AppendFile {
            key,
            path,
            position,
        } => {
            let data = std::fs::read(&path)?;
            let next = client.append(&key, &data, position)?;
            println!("appended {} bytes to {key}, next position {next}", data.len());
        }
        Commands::List {
            prefix,
            start_key,
            delimiter,
        } => {
            let options = ListOptions::default()
                .with_prefix(prefix)
                .with_start_key(start_key)
                .with_delimiter(delimiter);
            let keys = client.list(&options)?;
            if json {
                println!("{}", serde_json::json!({ "count": keys.len(), "keys": keys }));
            } else {
                for key in &keys {
                    println!("{key}");
                }
                eprintln!("{} keys", keys.len());
            }
        }
        Commands::StorageInfo => {
            let info = client.get_storage_info()?;
            if json {
                println!("{}", serde_json::json!(info));
            } else {
                println!("capacity: {}", info.capacity);
                println!("object count: {}", info.object_count);
            }
        }
        Commands::Delete { keys } => {
            let report = client.delete_many(&keys);
            let batches = report.batches;
            let deleted = report.into_result()?;
            println!("deleted {deleted} keys in {batches} requests");
        }
        Commands::DeleteAll => {
            let deleted = client.delete_all()?;
            println!("deleted {deleted} keys");
        }
    }
    Ok(())
}
