use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "signer-cli")]
#[command(about = "Drive a running sign-orchestrator from the terminal", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8787")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session snapshot
    Status,
    /// Start a signing session from a JSON sign request
    Sign {
        /// File holding the sign request
        request: PathBuf,
        /// Use the mobile redirect flow instead of a QR code
        #[arg(long)]
        mobile: bool,
        /// Page the wallet app should return to (mobile only)
        #[arg(long)]
        return_url: Option<String>,
    },
    /// Submit acknowledgment input, e.g. '{"input":"accept","value":true}'
    Ack { input: String },
    /// Accept the terms of the pending request
    Agree,
    /// Cancel the current session
    Cancel,
    /// Try the expired or failed request again
    Restart,
    /// Set the connected account
    Account { address: String },
    /// Forget the connected account and user token
    SignOut,
    /// Simulate the wallet app returning to the page
    Return { reference: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = |path: &str| format!("{}/api/v1/{}", cli.url.trim_end_matches('/'), path);

    let res = match cli.command {
        Commands::Status => client.get(api("session")).send().await?,
        Commands::Sign {
            request,
            mobile,
            return_url,
        } => {
            let mut body: Value = serde_json::from_str(&std::fs::read_to_string(request)?)?;
            body["client"] = json!({ "mobile": mobile, "return_url": return_url });
            client.post(api("sign")).json(&body).send().await?
        }
        Commands::Ack { input } => {
            let body: Value = serde_json::from_str(&input)?;
            client.post(api("acknowledge")).json(&body).send().await?
        }
        Commands::Agree => client.post(api("agree")).send().await?,
        Commands::Cancel => client.post(api("cancel")).send().await?,
        Commands::Restart => client.post(api("restart")).send().await?,
        Commands::Account { address } => {
            client
                .post(api("account"))
                .json(&json!({ "address": address }))
                .send()
                .await?
        }
        Commands::SignOut => client.post(api("sign-out")).send().await?,
        Commands::Return { reference } => {
            client
                .get(format!("{}/return", cli.url.trim_end_matches('/')))
                .query(&[("uuid", reference)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: orchestrator returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
