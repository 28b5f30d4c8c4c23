use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

// `#[zbus::proxy]` generates `RollcallProxy` (async); the daemon end of
// this interface lives in rollcalld.
#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn register(&self, name: &str, tag: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn roster(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new person from the live camera feed
    Register {
        /// Person's name (unique)
        #[arg(short, long)]
        name: String,
        /// Numeric face tag (unique, positive)
        #[arg(short, long)]
        tag: u32,
    },
    /// Show daemon status
    Status,
    /// List enrolled identities
    Roster,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is rollcalld running?)")?;
    let proxy = RollcallProxy::new(&conn).await?;

    match cli.command {
        Commands::Register { name, tag } => {
            println!("{}", proxy.register(&name, tag).await?);
        }
        Commands::Status => {
            let raw = proxy.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Roster => {
            let raw = proxy.roster().await?;
            let roster: serde_json::Value = serde_json::from_str(&raw)?;
            match roster.as_array() {
                Some(entries) if entries.is_empty() => println!("No identities enrolled"),
                Some(entries) => {
                    for entry in entries {
                        println!(
                            "{}\t{}",
                            entry["tag"],
                            entry["name"].as_str().unwrap_or("?")
                        );
                    }
                }
                None => println!("{raw}"),
            }
        }
    }

    Ok(())
}
