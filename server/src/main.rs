//! Shelf file manager server (shelfd)

use clap::{Parser, Subcommand};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod db;
mod namespace;
mod storage;

use config::Config;
use namespace::{Namespace, NamespaceError};

#[derive(Parser)]
#[command(name = "shelfd")]
#[command(about = "Shelf file manager server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (runs in background)
    Serve {
        /// Run in foreground (don't daemonize)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the server
    Down,
    /// Show server status
    Status,
    /// Copy a local folder into the configured storage backend
    Import {
        /// Folder to import
        path: String,
    },
    /// Run database migrations
    Migrate,
    /// Delete expired share links
    PurgeShares,
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create {
        /// Display name
        #[arg(long)]
        name: String,
        /// Login email
        #[arg(long)]
        email: String,
    },
    /// List all users
    List,
}

/// Location of the running server's process id
struct PidFile(PathBuf);

impl PidFile {
    fn locate() -> Self {
        let dir = dirs::runtime_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self(dir.join("shelfd.pid"))
    }

    fn record(&self, pid: u32) -> anyhow::Result<()> {
        if let Some(dir) = self.0.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.0, pid.to_string())?;
        Ok(())
    }

    fn clear(&self) {
        let _ = fs::remove_file(&self.0);
    }

    /// Pid of a live server, clearing the file when it is stale
    fn live_pid(&self) -> Option<u32> {
        let pid = fs::read_to_string(&self.0)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok());
        match pid {
            Some(pid) if process_alive(pid) => Some(pid),
            _ => {
                self.clear();
                None
            }
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // signal 0 only probes for existence
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn load_config() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Daemon control runs before logging is set up
    match &cli.command {
        Commands::Down => return stop_server(),
        Commands::Status => return show_status(),
        Commands::Serve { foreground: false } => return start_daemon(),
        _ => {}
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    match cli.command {
        Commands::Serve { .. } => run_server(config).await,
        Commands::Down | Commands::Status => Ok(()),
        Commands::Import { path } => import_folder(&config, &path).await,
        Commands::Migrate => migrate(&config).await,
        Commands::PurgeShares => purge_shares(&config).await,
        Commands::User { command } => match command {
            UserCommands::Create { name, email } => create_user(&config, &name, &email).await,
            UserCommands::List => list_users(&config).await,
        },
    }
}

fn start_daemon() -> anyhow::Result<()> {
    let pid_file = PidFile::locate();
    if let Some(pid) = pid_file.live_pid() {
        println!("shelfd already running (pid {})", pid);
        return Ok(());
    }

    // Fail here rather than in the detached child
    let config = load_config()?;

    let child = Command::new(std::env::current_exe()?)
        .args(["serve", "--foreground"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    pid_file.record(child.id())?;

    println!("shelfd serving on localhost:{} (pid {})", config.rest_port, child.id());
    Ok(())
}

fn stop_server() -> anyhow::Result<()> {
    let pid_file = PidFile::locate();
    let Some(pid) = pid_file.live_pid() else {
        println!("shelfd not running");
        return Ok(());
    };

    let mut kill = if cfg!(unix) {
        let mut cmd = Command::new("kill");
        cmd.arg(pid.to_string());
        cmd
    } else {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string(), "/F"]);
        cmd
    };
    kill.status()?;

    pid_file.clear();
    println!("shelfd stopped (pid {})", pid);
    Ok(())
}

fn show_status() -> anyhow::Result<()> {
    let config = load_config()?;
    match PidFile::locate().live_pid() {
        Some(pid) => {
            println!("shelfd running (pid {})", pid);
            println!("  api:     http://localhost:{}/api", config.rest_port);
            println!("  storage: {:?}", config.storage_backend);
        }
        None => println!("shelfd not running"),
    }
    Ok(())
}

/// Open the database, apply migrations and connect the storage backend
async fn open_state(config: &Config) -> anyhow::Result<api::AppState> {
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    tracing::debug!("database ready at {}", config.database_url);

    let backend = storage::build_backend(config).await?;
    Ok(api::AppState::new(db_pool, backend, config.clone()))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    // Foreground runs record themselves too, so `down` can find them
    let pid_file = PidFile::locate();
    pid_file.record(std::process::id())?;

    let state = open_state(&config).await?;
    tracing::info!("{} starting", config.server_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.rest_port));
    let result = api::rest::serve(addr, state).await;

    pid_file.clear();
    result
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    println!("database schema is up to date");
    Ok(())
}

async fn purge_shares(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let purged = db::shares::purge_expired(&pool).await?;
    println!("purged {} expired share links", purged);
    Ok(())
}

fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    Ok(rpassword::prompt_password(prompt)?)
}

async fn create_user(config: &Config, name: &str, email: &str) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Name cannot be empty");
    }
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        anyhow::bail!("Invalid email address: {}", email);
    }

    // SECURITY: Always prompt for password interactively
    let password = tokio::task::spawn_blocking(|| prompt_password("Password: ")).await??;
    let confirm = tokio::task::spawn_blocking(|| prompt_password("Confirm password: ")).await??;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    let password_hash = auth::hash_password(&password)?;

    let pool = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        db::create_pool(&config.database_url),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Database connection timed out"))??;
    db::run_migrations(&pool).await?;

    if db::users::get_user_by_email(&pool, &email).await?.is_some() {
        anyhow::bail!("A user with email {} already exists", email);
    }

    let user = db::users::create_user(&pool, name, &email, &password_hash).await?;
    println!("User created: {} <{}> ({})", user.name, user.email, user.id);

    Ok(())
}

async fn list_users(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_url).await?;
    let users = db::users::list_users(&pool).await?;

    if users.is_empty() {
        println!("no users");
    } else {
        for user in users {
            println!("{} - {} <{}>", user.id, user.name, user.email);
        }
    }

    Ok(())
}

/// Walk a local folder and write every file through the namespace, so the
/// same rules apply as for uploads
async fn import_folder(config: &Config, path: &str) -> anyhow::Result<()> {
    let state = open_state(config).await?;
    let namespace: Arc<Namespace> = state.namespace;

    let base_path = Path::new(path);
    if !base_path.is_dir() {
        anyhow::bail!("not a directory: {}", path);
    }

    println!("importing {}...", path);

    let mut files = 0;
    let mut skipped = 0;
    for entry in walkdir::WalkDir::new(base_path)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
    {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(base_path) else {
            continue;
        };
        let mut segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some(name) = segments.pop() else {
            continue;
        };

        if entry.file_type().is_dir() {
            match namespace.create_directory(&segments, &name).await {
                Ok(_) | Err(NamespaceError::AlreadyExists(_)) => {}
                Err(e) => return Err(anyhow::anyhow!("{}: {}", relative.display(), e)),
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let content = tokio::fs::read(entry.path()).await?;
        match namespace.create_file(&segments, &name, &content, None).await {
            Ok(item) => {
                println!("  {}", item.key);
                files += 1;
            }
            Err(e) => {
                println!("  skipped {} ({})", relative.display(), e);
                skipped += 1;
            }
        }
    }

    println!("imported {} files ({} skipped)", files, skipped);
    Ok(())
}
