//! factbank CLI and REST API entry point.
//!
//! Binary name: `factbank`
//!
//! Parses CLI arguments, loads configuration and wires the reconciliation
//! engine, then dispatches to the command handler or starts the REST API.

mod cli;
mod http;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use clap::Parser;

use factbank_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(filter_for_verbosity(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let show_progress = !cli.json && !cli.quiet;
    let state = AppState::init(show_progress).await?;

    match cli.command {
        Commands::Add { content } => {
            cli::memory::add(&state, &content, cli.json).await?;
        }

        Commands::Search {
            query,
            top_k,
            threshold,
        } => {
            cli::memory::search(&state, &query, top_k, threshold, cli.json).await?;
        }

        Commands::List {
            cursor,
            offset,
            limit,
        } => {
            cli::memory::list(&state, cursor, offset, limit, cli.json).await?;
        }

        Commands::Get { id } => {
            cli::memory::get(&state, &id, cli.json).await?;
        }

        Commands::Delete { id } => {
            cli::memory::delete(&state, &id, cli.json).await?;
        }

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;

            if !cli.quiet {
                println!();
                println!(
                    "  {} factbank API listening on {}",
                    console::style("◆").cyan().bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!();
            }
            tracing::info!(%addr, "REST API started");

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
///
/// If a handler cannot be installed, that signal is simply not awaited.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
