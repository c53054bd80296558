use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use dispatch_proxy::observability::status::StatusSnapshot;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Status CLI for the dispatch proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Bearer token, if the status API requires one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print counters and backends once
    Status,
    /// List backend health and connections
    Backends,
    /// Redraw a status table until interrupted
    Watch {
        /// Refresh interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Backends => {
            let res = client.get(format!("{}/admin/backends", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Watch { interval_ms } => {
            watch(&client, &cli.url, headers, Duration::from_millis(interval_ms)).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: status API returned {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn watch(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<(Instant, u64)> = None;

    loop {
        ticker.tick().await;
        let res = client.get(format!("{}/admin/status", url))
            .headers(headers.clone())
            .send()
            .await?
            .error_for_status()?;
        let snapshot: StatusSnapshot = res.json().await?;

        let now = Instant::now();
        let rps = match last {
            Some((at, requests)) => {
                let elapsed = now.duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    snapshot.total_requests.saturating_sub(requests) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        last = Some((now, snapshot.total_requests));

        // Clear screen and home the cursor.
        print!("\x1b[2J\x1b[H{}", render(&snapshot, rps));
    }
}

fn render(snapshot: &StatusSnapshot, rps: f64) -> String {
    let mut out = String::new();
    out.push_str(" Dispatch Proxy\n\n");
    out.push_str(&format!(
        "Active Connections: {}  |  Total Requests: {}  |  RPS: {:.1}\n\n",
        snapshot.total_active_connections, snapshot.total_requests, rps
    ));
    out.push_str(&format!(
        "{:<4} {:<25} {:<8} {:<6} {:<6} {:<8}\n",
        "ID", "URL", "Status", "Conn", "Max", "Load %"
    ));
    for b in &snapshot.backends {
        out.push_str(&format!(
            "{:<4} {:<25} {:<8} {:<6} {:<6} {:<8}\n",
            b.id,
            b.url,
            if b.healthy { "UP" } else { "DOWN" },
            b.active_connections,
            b.capacity,
            format!("{:.1}%", b.load_percent),
        ));
    }
    out.push_str("\nPress Ctrl+C to quit\n");
    out
}
