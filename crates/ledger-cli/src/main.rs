use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::RngCore;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the minimal ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount in whole units
        #[arg(long, value_parser = parse_amount)]
        amount: u64,
    },
    /// Show the balance of an address
    Balance { address: String },
    /// Dump the node's chain
    Chain,
    /// List the node's peers
    Peers,
    /// Register a peer with the node
    AddPeer { url: String },
    /// Ask the node to run a sync pass now
    Sync,
}

#[derive(Serialize)]
struct Tx {
    from: String,
    to: String,
    amount: u64,
}

#[derive(Serialize)]
struct NewTransaction {
    tx_id: String,
    transaction: Tx,
}

#[derive(Serialize)]
struct NewPeer {
    peer: String,
}

/// Amounts are whole units on the wire; a decimal like `2.5` gets a clear
/// refusal here instead of a 422 from the node.
fn parse_amount(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(amount) => Ok(amount),
        Err(_) if raw.parse::<f64>().is_ok_and(|v| v.fract() != 0.0) => Err(format!(
            "fractional amount {raw} is not supported; amounts are whole units"
        )),
        Err(_) if raw.parse::<f64>().is_ok_and(|v| v.is_sign_negative()) => {
            Err(format!("amount {raw} must not be negative"))
        }
        Err(e) => Err(format!("invalid amount {raw}: {e}")),
    }
}

fn new_tx_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
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
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();
    let res = match cli.cmd {
        Command::Submit { from, to, amount } => {
            let body = NewTransaction {
                tx_id: new_tx_id(),
                transaction: Tx { from, to, amount },
            };
            debug!(tx_id = %body.tx_id, "submitting transaction");
            client
                .post(format!("{node}/transactions/new"))
                .json(&body)
                .send()
                .await?
        }
        Command::Balance { address } => {
            let address = urlencoding::encode(&address);
            client.get(format!("{node}/balance/{address}")).send().await?
        }
        Command::Chain => client.get(format!("{node}/chain")).send().await?,
        Command::Peers => client.get(format!("{node}/peers")).send().await?,
        Command::AddPeer { url } => {
            client
                .post(format!("{node}/peers/add"))
                .json(&NewPeer { peer: url })
                .send()
                .await?
        }
        Command::Sync => client.post(format!("{node}/sync")).send().await?,
    };
    print_response(res).await
}
