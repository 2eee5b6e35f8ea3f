//! CLI for talking to a ringstore shard

use clap::{Parser, Subcommand};
use ringstore::shard::RemoteShard;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ringstore")]
#[command(about = "ringstore client CLI")]
#[command(version)]
struct Cli {
    /// Shard address (host:port)
    #[arg(long, default_value = "localhost:9000")]
    shard: String,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "2000")]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ring membership
    Members,

    /// Read a scalar key
    Get {
        key: String,

        /// Ask for a lease, with this callback address
        #[arg(long)]
        lease_callback: Option<String>,
    },

    /// Read a list key
    GetList {
        key: String,

        #[arg(long)]
        lease_callback: Option<String>,
    },

    /// Write a scalar key
    Put { key: String, value: String },

    /// Delete a scalar key
    Delete { key: String },

    /// Add an item to a list key
    Append { key: String, item: String },

    /// Remove an item from a list key
    Remove { key: String, item: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut shard =
        RemoteShard::connect(&cli.shard, Duration::from_millis(cli.connect_timeout_ms)).await?;

    match cli.command {
        Commands::Members => {
            let reply = shard.members().await?;
            println!("status: {}", reply.status);
            println!("{}", serde_json::to_string_pretty(&reply.members)?);
        }
        Commands::Get {
            key,
            lease_callback,
        } => {
            let callback = lease_callback.unwrap_or_default();
            let reply = shard.get(&key, !callback.is_empty(), &callback).await?;
            println!("status: {}", reply.status);
            println!("value: {}", reply.value);
            if reply.lease.granted {
                println!("lease: {}s", reply.lease.valid_seconds);
            }
        }
        Commands::GetList {
            key,
            lease_callback,
        } => {
            let callback = lease_callback.unwrap_or_default();
            let reply = shard.get_list(&key, !callback.is_empty(), &callback).await?;
            println!("status: {}", reply.status);
            println!("{}", serde_json::to_string_pretty(&reply.value)?);
            if reply.lease.granted {
                println!("lease: {}s", reply.lease.valid_seconds);
            }
        }
        Commands::Put { key, value } => {
            println!("status: {}", shard.put(&key, &value).await?);
        }
        Commands::Delete { key } => {
            println!("status: {}", shard.delete(&key).await?);
        }
        Commands::Append { key, item } => {
            println!("status: {}", shard.append_to_list(&key, &item).await?);
        }
        Commands::Remove { key, item } => {
            println!("status: {}", shard.remove_from_list(&key, &item).await?);
        }
    }

    Ok(())
}
