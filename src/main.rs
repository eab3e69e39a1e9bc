use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tftp_kit::client::{Client, ClientConfig};
use tftp_kit::core::{ReservationRegistry, cancel_pair};
use tftp_kit::server::{DEFAULT_BIND_PORT, FileStore, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "tftp-kit", version, about = "TFTP client and server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a file from a TFTP server
    Get {
        /// Server IP address
        server: IpAddr,
        /// File name on the server
        remote_file: String,
        /// Local path to write (defaults to the remote file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Server port
        #[arg(short, long, default_value_t = DEFAULT_BIND_PORT)]
        port: u16,
    },
    /// Upload a file to a TFTP server
    Put {
        /// Server IP address
        server: IpAddr,
        /// Local file to upload
        local_file: PathBuf,
        /// Name to store on the server (defaults to the local file name)
        #[arg(short, long)]
        remote_name: Option<String>,
        /// Server port
        #[arg(short, long, default_value_t = DEFAULT_BIND_PORT)]
        port: u16,
    },
    /// Run a TFTP server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_BIND_PORT)]
        port: u16,
        /// Directory of files to serve at startup
        #[arg(short = 'd', long)]
        preload: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let registry = ReservationRegistry::new();
    let (cancel, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    match cli.command {
        Command::Get {
            server,
            remote_file,
            output,
            port,
        } => {
            let client = Client::new(ClientConfig::new(server, port), registry);
            let contents = client.get(&remote_file, &token).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&remote_file));
            tokio::fs::write(&path, &contents)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} bytes to {}", contents.len(), path.display());
        }
        Command::Put {
            server,
            local_file,
            remote_name,
            port,
        } => {
            let contents = tokio::fs::read(&local_file)
                .await
                .with_context(|| format!("failed to read {}", local_file.display()))?;
            let remote = match remote_name {
                Some(name) => name,
                None => local_file
                    .file_name()
                    .context("local file path has no file name")?
                    .to_string_lossy()
                    .into_owned(),
            };
            let client = Client::new(ClientConfig::new(server, port), registry);
            client.put(&remote, &contents, &token).await?;
        }
        Command::Serve {
            bind,
            port,
            preload,
        } => {
            let store = FileStore::new();
            if let Some(dir) = &preload {
                preload_directory(&store, dir).await?;
            }
            let server = Server::spawn(ServerConfig::new(bind, port), registry, store).await?;
            token.cancelled().await;
            server.stop().await;
        }
    }
    Ok(())
}

/// Seed the store with every regular file in `dir`, keyed by file name.
async fn preload_directory(store: &FileStore, dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let contents = tokio::fs::read(entry.path()).await?;
        let size = contents.len();
        if store.insert_if_absent(&name, contents) {
            info!("preloaded '{name}' ({size} bytes)");
        }
    }
    Ok(())
}
