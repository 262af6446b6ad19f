//! RAX FTP Client - Entry Point
//!
//! A queued, passive-mode FTP client built on the buffered socket core.
//! Connects, logs in, prints a directory listing, and optionally fetches a
//! file into the current directory.

use env_logger;
use log::{error, info, warn};
use std::env;

use rax_ftp_client::{ClientConfig, ClientEvent, FtpClient};

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(host) = args.next() else {
        eprintln!("Usage: rax-ftp-client <host> [user] [pass] [remote-path]");
        std::process::exit(2);
    };
    let user = args.next().unwrap_or_else(|| "anonymous".to_string());
    let pass = args.next().unwrap_or_else(|| "guest@".to_string());
    let fetch = args.next();

    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Falling back to default configuration: {}", e);
            ClientConfig::default()
        }
    };
    let port = config.default_port;

    let mut client = FtpClient::new(config);
    client.connect_to_host(&host, port);
    client.login(&user, &pass);
    client.list(None);
    let get_id = fetch.as_deref().map(|path| client.get(path));
    client.close();

    info!("Contacting {}:{}...", host, port);
    let events = client.run_until_idle().await;

    let mut failed = false;
    for event in &events {
        match event {
            ClientEvent::ListEntry(entry) => {
                let marker = if entry.is_dir() {
                    'd'
                } else if entry.is_symlink() {
                    'l'
                } else {
                    '-'
                };
                println!("{} {:>10}  {}", marker, entry.size, entry.name);
            }
            ClientEvent::OperationFinished {
                id,
                error: Some(error),
                ..
            } => {
                error!("Operation {} failed: {}", id, error);
                failed = true;
            }
            ClientEvent::OperationFinished {
                id,
                error: None,
                data,
            } if Some(*id) == get_id => {
                if let Some(path) = fetch.as_deref() {
                    let local = path.rsplit('/').next().unwrap_or(path);
                    match std::fs::write(local, data) {
                        Ok(()) => info!("Saved {} ({} bytes)", local, data.len()),
                        Err(e) => {
                            error!("Failed to save {}: {}", local, e);
                            failed = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if failed {
        std::process::exit(1);
    }
}
