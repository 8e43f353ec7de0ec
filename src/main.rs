use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use digest_worker::{
    app::{ComponentRegistry, build_router},
    config::Config,
    pipeline::Audience,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build today's digest, push it to every subscriber and advance the watchlist
    Run,
    /// Print the digest without delivering it or touching stored state
    Preview {
        /// Render the variant sent to new followers
        #[arg(long)]
        welcome: bool,
    },
    /// Serve the webhook, subscriber count and metrics endpoints
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let cli = Cli::parse();

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let registry =
        ComponentRegistry::build(&config).context("failed to build component registry")?;

    match cli.command {
        Command::Run => {
            let report = registry
                .service()
                .run_daily(Utc::now())
                .await
                .context("digest run failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to encode run report")?
            );
        }
        Command::Preview { welcome } => {
            let audience = if welcome {
                Audience::Welcome
            } else {
                Audience::Daily
            };
            let text = registry
                .service()
                .preview(Utc::now(), audience)
                .await
                .context("digest preview failed")?;
            println!("{text}");
        }
        Command::Serve => {
            let bind_addr = config.http_bind();
            let router = build_router(registry);
            let listener = TcpListener::bind(bind_addr)
                .await
                .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

            info!(%bind_addr, "listening");

            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                warn!(error = %error, "server exited with error");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
