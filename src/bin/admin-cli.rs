use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "admin-cli")]
#[command(about = "Management CLI for the router admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// API key sent as a bearer token.
    #[arg(short, long, env = "ROUTER_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the admin API answers
    Ping,
    /// Show process information
    Info,
    /// Show the traffic controller's state
    Server,
    /// Dump a backtrace of the admin server
    Backtraces,
    /// Inspect or change the logging configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Reopen log files after rotation
    ReopenLogs,
    /// Take over the log file from the watchdog
    ReinheritLogs,
    /// Shut the daemon down
    Shutdown,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every option with its user, default and effective value
    Get,
    /// Apply a JSON object of changes, e.g. '{"level":"debug"}'
    Set { json: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let (method, path, body) = match cli.command {
        Commands::Ping => (Method::GET, "/ping.json", None),
        Commands::Info => (Method::GET, "/info.json", None),
        Commands::Server => (Method::GET, "/server.json", None),
        Commands::Backtraces => (Method::GET, "/backtraces.txt", None),
        Commands::Config { action: ConfigAction::Get } => (Method::GET, "/config.json", None),
        Commands::Config {
            action: ConfigAction::Set { json },
        } => {
            let doc: Value = serde_json::from_str(&json)?;
            (Method::PUT, "/config.json", Some(doc))
        }
        Commands::ReopenLogs => (Method::POST, "/reopen_logs.json", None),
        Commands::ReinheritLogs => (Method::POST, "/reinherit_logs.json", None),
        Commands::Shutdown => (Method::PUT, "/shutdown.json", None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(doc) = body {
        request = request.json(&doc);
    }

    let res = request.send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("Response: {}", text.trim_end());
        if status == StatusCode::UNAUTHORIZED {
            eprintln!("Hint: pass a super API key with --key or ROUTER_ADMIN_KEY");
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => print!("{}", text),
    }
    Ok(())
}
