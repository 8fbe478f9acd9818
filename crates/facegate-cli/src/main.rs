mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1"
)]
trait Gate {
    async fn authenticate(&self, image_path: &str) -> zbus::Result<String>;
    async fn login(&self, pin: &str) -> zbus::Result<String>;
    async fn logout(&self, token: &str) -> zbus::Result<bool>;
    async fn session_active(&self, token: &str) -> zbus::Result<bool>;
    async fn change_pin(&self, token: &str, old_pin: &str, new_pin: &str) -> zbus::Result<()>;
    async fn register(
        &self,
        token: &str,
        name: &str,
        employee_id: &str,
        department: &str,
        notes: &str,
        photos: Vec<String>,
    ) -> zbus::Result<String>;
    async fn delete_user(&self, token: &str, name: &str) -> zbus::Result<bool>;
    async fn list_users(&self, token: &str, search: &str) -> zbus::Result<String>;
    async fn access_logs(&self, token: &str, limit: u32) -> zbus::Result<String>;
    async fn statistics(&self, token: &str) -> zbus::Result<String>;
    async fn rebuild(&self, token: &str) -> zbus::Result<u32>;
    async fn compare(&self, token: &str, image_a: &str, image_b: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face access control CLI")]
struct Cli {
    /// Connect to the system bus instead of the session bus
    #[arg(long, env = "FACEGATE_SYSTEM_BUS")]
    system: bool,

    /// Admin session token from `facegate login`
    #[arg(long, env = "FACEGATE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a captured image at the door
    Authenticate {
        image: PathBuf,
    },
    /// Open an admin session and print its token
    Login {
        #[arg(long, env = "FACEGATE_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Close the admin session
    Logout,
    /// Register a person from 3-7 reference photos
    Register {
        name: String,
        #[arg(long, default_value = "")]
        employee_id: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Remove a registered person
    Delete {
        name: String,
    },
    /// List registered people
    Users {
        /// Case-insensitive filter on name or employee ID
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show recent access attempts, newest first
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
        /// Print the raw JSON reply
        #[arg(long)]
        json: bool,
    },
    /// Statistics plus the latest access attempts
    Dashboard,
    /// Re-embed every reference photo
    Rebuild,
    /// Compare two photos one-to-one
    Compare {
        image_a: PathBuf,
        image_b: PathBuf,
    },
    /// Change the admin PIN
    ChangePin {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    /// Show daemon status
    Status,
}

fn absolute(path: &Path) -> Result<String> {
    let full = path
        .canonicalize()
        .with_context(|| format!("cannot open {}", path.display()))?;
    Ok(full.to_string_lossy().into_owned())
}

fn require_token(token: &Option<String>) -> Result<&str> {
    token
        .as_deref()
        .context("admin session required: run `facegate login` and export FACEGATE_TOKEN")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus (is facegated running?)")?;
    let gate = GateProxy::new(&conn).await?;
    tracing::debug!(system = cli.system, "connected");

    match cli.command {
        Commands::Authenticate { image } => {
            let reply = gate.authenticate(&absolute(&image)?).await?;
            let decision: render::Decision = serde_json::from_str(&reply)?;
            println!("{}", render::decision(&decision));
        }
        Commands::Login { pin } => {
            let token = gate.login(&pin).await?;
            println!("{token}");
            eprintln!("export FACEGATE_TOKEN={token}");
        }
        Commands::Logout => {
            let token = require_token(&cli.token)?;
            if gate.logout(token).await? {
                println!("Logged out");
            } else {
                println!("No active session");
            }
        }
        Commands::Register {
            name,
            employee_id,
            department,
            notes,
            photos,
        } => {
            let token = require_token(&cli.token)?;
            let photos = photos
                .iter()
                .map(|p| absolute(p))
                .collect::<Result<Vec<_>>>()?;
            let reply = gate
                .register(token, &name, &employee_id, &department, &notes, photos)
                .await?;
            let registered: serde_json::Value = serde_json::from_str(&reply)?;
            println!(
                "Registered {} ({} photos, {} embeddings)",
                registered["name"].as_str().unwrap_or(&name),
                registered["record"]["photo_count"],
                registered["embeddings"]
            );
            if registered["embeddings"].as_u64() == Some(0) {
                eprintln!("warning: no face found in any photo; {name} cannot be recognised yet");
            }
        }
        Commands::Delete { name } => {
            let token = require_token(&cli.token)?;
            if gate.delete_user(token, &name).await? {
                println!("Deleted {name}");
            } else {
                bail!("{name} is not registered");
            }
        }
        Commands::Users { search } => {
            let token = require_token(&cli.token)?;
            let reply = gate
                .list_users(token, search.as_deref().unwrap_or(""))
                .await?;
            let users: Vec<render::UserSummary> = serde_json::from_str(&reply)?;
            println!("{}", render::users(&users));
        }
        Commands::Logs { limit, json } => {
            let token = require_token(&cli.token)?;
            let reply = gate.access_logs(token, limit).await?;
            if json {
                println!("{reply}");
            } else {
                let entries: Vec<render::LogEntry> = serde_json::from_str(&reply)?;
                println!("{}", render::logs(&entries));
            }
        }
        Commands::Dashboard => {
            let token = require_token(&cli.token)?;
            let stats: render::Statistics = serde_json::from_str(&gate.statistics(token).await?)?;
            let entries: Vec<render::LogEntry> =
                serde_json::from_str(&gate.access_logs(token, 20).await?)?;
            println!("{}\n\n{}", render::statistics(&stats), render::logs(&entries));
        }
        Commands::Rebuild => {
            let token = require_token(&cli.token)?;
            let count = gate.rebuild(token).await?;
            println!("Rebuilt embeddings for {count} identities");
        }
        Commands::Compare { image_a, image_b } => {
            let token = require_token(&cli.token)?;
            let reply = gate
                .compare(token, &absolute(&image_a)?, &absolute(&image_b)?)
                .await?;
            let result: serde_json::Value = serde_json::from_str(&reply)?;
            if let Some(err) = result["error"].as_str() {
                bail!("comparison failed: {err}");
            }
            let verdict = if result["verified"].as_bool() == Some(true) {
                "SAME PERSON"
            } else {
                "DIFFERENT PEOPLE"
            };
            println!(
                "{verdict}\n  confidence: {:.1}%\n  distance:   {}\n  threshold:  {}",
                result["confidence"].as_f64().unwrap_or(0.0) * 100.0,
                result["distance"],
                result["threshold"]
            );
        }
        Commands::ChangePin { old, new, confirm } => {
            let token = require_token(&cli.token)?;
            if new != confirm {
                bail!("new PINs do not match");
            }
            gate.change_pin(token, &old, &new).await?;
            println!("PIN changed");
        }
        Commands::Status => {
            let reply = gate.status().await?;
            let status: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(token) = cli.token.as_deref() {
                let active = gate.session_active(token).await?;
                println!("admin session: {}", if active { "active" } else { "expired" });
            }
        }
    }

    Ok(())
}
