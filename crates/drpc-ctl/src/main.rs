//! drpc-ctl — command-line client and diagnostic server for dRPC sockets.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use drpc_core::config::DrpcConfig;

mod cmd;
mod echo;

fn print_usage() {
    println!("drpc-ctl — dRPC socket tool");
    println!();
    println!("USAGE:");
    println!("  drpc-ctl [--socket <path>] [--timeout <secs>] <command>");
    println!();
    println!("COMMANDS:");
    println!("  call <module> <method> [body]   Send one call (body as text, or hex:<bytes>)");
    println!("  serve                           Host the echo module until Ctrl-C");
    println!("  help                            Show this message");
    println!();
    println!("OPTIONS:");
    println!("  --socket <path>    Socket to dial or bind (default from config)");
    println!("  --timeout <secs>   Cancel a call after this long, 0 = never");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = DrpcConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = DrpcConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        DrpcConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--socket" => {
                i += 1;
                config.socket.path = PathBuf::from(args.get(i).context("--socket requires a value")?);
            }
            "--timeout" => {
                i += 1;
                config.client.call_timeout_secs = args
                    .get(i)
                    .context("--timeout requires a value")?
                    .parse()
                    .context("--timeout must be a number of seconds")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let timeout = Duration::from_secs(config.client.call_timeout_secs);

    match remaining.as_slice() {
        ["call", module, method] => {
            cmd::call::cmd_call(&config.socket.path, module, method, None, timeout).await
        }
        ["call", module, method, body] => {
            cmd::call::cmd_call(&config.socket.path, module, method, Some(*body), timeout).await
        }
        ["serve"] => cmd::serve::cmd_serve(&config.socket, config.echo.module_id).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
