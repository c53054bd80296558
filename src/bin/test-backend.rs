//! Demo upstream for local runs: `/` answers after a delay, `/health` answers 200.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;

#[derive(Parser)]
#[command(name = "test-backend")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Seconds to wait before answering `/`.
    #[arg(long = "delay-secs", alias = "time", default_value_t = 2)]
    delay_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let port = cli.port;
    let delay = Duration::from_secs(cli.delay_secs);

    let app = Router::new()
        .route("/", get(move || async move {
            tokio::time::sleep(delay).await;
            format!("Response from server on port {} (delay: {:?})\n", port, delay)
        }))
        .route("/health", get(|| async { StatusCode::OK }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
