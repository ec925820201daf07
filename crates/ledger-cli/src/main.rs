use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the event ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a new block carrying a JSON payload
    Append {
        /// Payload as JSON, e.g. '{"event":"test"}'
        #[arg(long)]
        payload: String,
        /// Leading zero hex digits required; node default when omitted
        #[arg(long)]
        difficulty: Option<u32>,
    },
    /// List the newest blocks, oldest first
    Chain {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the newest block
    Tail,
    /// Re-verify every block and link
    Validate,
}

#[derive(Serialize)]
struct AppendIn {
    payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    difficulty: Option<u32>,
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.trim_end_matches('/');
    let res = match cli.cmd {
        Command::Append {
            payload,
            difficulty,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("--payload must be valid JSON")?;
            let body = AppendIn {
                payload,
                difficulty,
            };
            debug!(%node, "submitting payload");
            client
                .post(format!("{node}/blocks"))
                .json(&body)
                .send()
                .await?
        }
        Command::Chain { limit } => {
            let mut req = client.get(format!("{node}/chain"));
            if let Some(limit) = limit {
                req = req.query(&[("limit", limit)]);
            }
            req.send().await?
        }
        Command::Tail => client.get(format!("{node}/chain/tail")).send().await?,
        Command::Validate => client.get(format!("{node}/chain/validate")).send().await?,
    };
    print_response(res).await
}
