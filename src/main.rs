use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cairn::auth::{TokenGenerator, TokenSubject, issue_token};
use cairn::config::{ServerConfig, ServerOverrides};
use cairn::objectstore::FilesystemObjectStore;
use cairn::registry::{RegistryClient, RegistryClientConfig, validate_provider_part};
use cairn::server::{AppState, create_router};
use cairn::store::{SqliteStore, grants, groups, resource_limits, tokens, users};
use cairn::types::{Group, GroupGrant, LimitName, Permission, User};

const ADMIN_USERNAME: &str = "admin";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "A Terraform provider registry and network mirror", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        /// Data directory for the database and objects
        #[arg(long, default_value = "./data", global = true)]
        data_dir: PathBuf,

        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file. Flags override its values.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database and objects
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Public base URL for external access (e.g., "https://registry.example.com").
        /// Presigned download URLs are built on it.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database, admin user and admin token)
    Init {
        /// TOML config file supplying default resource limits
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Manage groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Grant permissions on a group to a user
    Grant {
        username: String,
        /// Group full path, e.g. "acme/platform"
        group: String,
        /// Comma separated, e.g. "provider:write,gpg_key:read"
        permissions: String,
    },

    /// Manage resource limits
    Limit {
        #[command(subcommand)]
        command: LimitCommands,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create a group
    Create {
        name: String,
        /// Full path of the parent group. Omit for a root group.
        #[arg(long)]
        parent: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print an API token for it
    Create {
        username: String,
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum LimitCommands {
    /// Set one resource limit
    Set { name: String, value: i64 },
    /// List all resource limits
    List,
}

async fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let db_path = data_dir.join("cairn.db");
    if !db_path.exists() {
        bail!("Server not initialized. Run 'cairn admin init' first to create the database.");
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize().await?;
    Ok(store)
}

async fn run_init(data_dir: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = ServerConfig::load(
        config,
        ServerOverrides {
            data_dir: Some(data_dir.to_path_buf()),
            ..ServerOverrides::default()
        },
    )?;
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize_with_limits(&config.limits).await?;

    let token_file = config.admin_token_path();
    let generator = TokenGenerator::new();

    let tx = store.begin().await?;
    if users::has_admin(&tx)? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let admin = User {
        id: Uuid::new_v4().to_string(),
        username: ADMIN_USERNAME.to_string(),
        admin: true,
        created_at: Utc::now(),
    };
    users::insert(&tx, &admin)?;
    let (token, raw_token) = issue_token(&generator, TokenSubject::User(&admin.id), None)?;
    tokens::insert(&tx, &token)?;
    tx.commit()?;

    fs::write(&token_file, &raw_token)?;
    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    config.resolve_signing_secret()?;

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

async fn run_group_create(
    store: &SqliteStore,
    name: &str,
    parent: Option<&str>,
) -> anyhow::Result<()> {
    let name = validate_provider_part("group name", name)?;

    let tx = store.begin().await?;
    let parent = match parent {
        Some(path) => Some(
            groups::get_by_path(&tx, path)?
                .with_context(|| format!("parent group '{path}' not found"))?,
        ),
        None => None,
    };

    let group = Group {
        id: Uuid::new_v4().to_string(),
        full_path: match &parent {
            Some(p) => format!("{}/{name}", p.full_path),
            None => name.clone(),
        },
        parent_id: parent.map(|p| p.id),
        name,
        created_at: Utc::now(),
    };
    groups::insert(&tx, &group)?;
    tx.commit()?;

    println!("Created group '{}' ({})", group.full_path, group.id);
    Ok(())
}

async fn run_user_create(store: &SqliteStore, username: &str, admin: bool) -> anyhow::Result<()> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        admin,
        created_at: Utc::now(),
    };
    let (token, raw_token) =
        issue_token(&TokenGenerator::new(), TokenSubject::User(&user.id), None)?;

    let tx = store.begin().await?;
    users::insert(&tx, &user)?;
    tokens::insert(&tx, &token)?;
    tx.commit()?;

    println!("Created user '{username}' with token:");
    println!();
    println!("  {raw_token}");
    Ok(())
}

async fn run_grant(
    store: &SqliteStore,
    username: &str,
    group_path: &str,
    permissions: &str,
) -> anyhow::Result<()> {
    let names: Vec<&str> = permissions.split(',').map(str::trim).collect();
    let Some(allow_bits) = Permission::parse_many(&names) else {
        bail!("unknown permission in '{permissions}'");
    };

    let tx = store.begin().await?;
    let user = users::get_by_username(&tx, username)?
        .with_context(|| format!("user '{username}' not found"))?;
    let group = groups::get_by_path(&tx, group_path)?
        .with_context(|| format!("group '{group_path}' not found"))?;

    let now = Utc::now();
    grants::upsert(
        &tx,
        &GroupGrant {
            subject_id: user.id,
            group_id: group.id,
            allow_bits,
            deny_bits: Permission::default(),
            created_at: now,
            updated_at: now,
        },
    )?;
    tx.commit()?;

    println!("Granted {allow_bits} on '{group_path}' to '{username}'");
    Ok(())
}

async fn run_limit(store: &SqliteStore, command: LimitCommands) -> anyhow::Result<()> {
    match command {
        LimitCommands::Set { name, value } => {
            let Some(limit) = LimitName::parse(&name) else {
                bail!("unknown limit '{name}'");
            };
            if value < 0 {
                bail!("limit value must not be negative");
            }
            let tx = store.begin().await?;
            resource_limits::set(&tx, limit, value)?;
            tx.commit()?;
            println!("Set {limit} = {value}");
        }
        LimitCommands::List => {
            let tx = store.read().await?;
            for limit in resource_limits::list(&tx)? {
                println!("{} = {}", limit.name, limit.value);
            }
        }
    }
    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let token_file = config.admin_token_path();
    if !config.db_path().exists() {
        bail!(
            "Server not initialized. Run 'cairn admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize_with_limits(&config.limits).await?;

    if token_file.exists() {
        info!("Admin token available at {}", token_file.display());
    }

    let objects = Arc::new(FilesystemObjectStore::new(
        &config.data_dir,
        config.base_url(),
        config.resolve_signing_secret()?,
        config.presigned_url_ttl(),
    ));
    let registry = RegistryClient::new(RegistryClientConfig {
        scheme: config.discovery_scheme.clone(),
        tokens: config.upstream_tokens.clone(),
        timeout: config.upstream_timeout(),
    })?;

    let state = Arc::new(AppState::new(store, objects, registry));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cairn=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { data_dir, command } => match command {
            AdminCommands::Init { config } => run_init(&data_dir, config.as_deref()).await?,
            AdminCommands::Group {
                command: GroupCommands::Create { name, parent },
            } => {
                let store = open_store(&data_dir).await?;
                run_group_create(&store, &name, parent.as_deref()).await?;
            }
            AdminCommands::User {
                command: UserCommands::Create { username, admin },
            } => {
                let store = open_store(&data_dir).await?;
                run_user_create(&store, &username, admin).await?;
            }
            AdminCommands::Grant {
                username,
                group,
                permissions,
            } => {
                let store = open_store(&data_dir).await?;
                run_grant(&store, &username, &group, &permissions).await?;
            }
            AdminCommands::Limit { command } => {
                let store = open_store(&data_dir).await?;
                run_limit(&store, command).await?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let config = ServerConfig::load(
                config.as_deref(),
                ServerOverrides {
                    host,
                    port,
                    data_dir,
                    public_base_url,
                },
            )?;
            run_serve(config).await?;
        }
    }

    Ok(())
}
