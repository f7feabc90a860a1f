use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use praxis_auth::store::FileCredentialStore;
use praxis_client::config::{self, ClientConfig};
use praxis_client::{BackendMode, PraxisClient};
use praxis_core::models::document::{DocumentStatus, DocumentType};
use tracing_subscriber::EnvFilter;

mod commands;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Command-line access to Praxis clinical documentation.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend for this invocation: simulated or networked
    #[arg(long, global = true)]
    mode: Option<BackendMode>,

    /// Base URL of the networked API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Structured JSON logs on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in. Prompts for anything not given on the command line.
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
        /// Six-digit MFA code, if the account requires one
        #[arg(long)]
        code: Option<String>,
    },
    /// Sign out and clear stored credentials
    Logout,
    /// Show the signed-in user and session state
    Whoami,
    /// Show the backend mode, or save a new one
    Mode { mode: Option<BackendMode> },
    #[command(subcommand)]
    Clients(ClientsCommand),
    #[command(subcommand)]
    Docs(DocsCommand),
    /// Stream a narrative to stdout. Ctrl-C cancels.
    Narrate {
        prompt: String,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        system: Option<String>,
        /// Wait for the whole narrative instead of streaming it
        #[arg(long)]
        buffered: bool,
    },
    #[command(subcommand)]
    Settings(SettingsCommand),
}

/// Client records
#[derive(Subcommand, Debug)]
enum ClientsCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        id: Option<String>,
    },
    Rename { id: String, name: String },
    Archive { id: String },
    Unarchive { id: String },
}

/// Clinical documents
#[derive(Subcommand, Debug)]
enum DocsCommand {
    List {
        client: String,
        #[arg(long = "type")]
        document_type: Option<DocumentType>,
        #[arg(long)]
        status: Option<DocumentStatus>,
    },
    Get { client: String, id: String },
    Create {
        client: String,
        #[arg(long = "type")]
        document_type: DocumentType,
        #[arg(long)]
        status: Option<DocumentStatus>,
        /// Defaults to today
        #[arg(long)]
        date: Option<jiff::civil::Date>,
        /// Type-specific fields as a JSON object
        #[arg(long, default_value = "{}")]
        content: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Set a document's status
    Status {
        client: String,
        id: String,
        status: DocumentStatus,
    },
    Delete { client: String, id: String },
    /// Latest note, current diagnosis and active treatment plan
    Summary { client: String },
}

/// Per-user settings
#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    /// Merge a partial settings object given as JSON
    Update { json: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let saved = if config_path.exists() {
        config::load_from(&config_path)?
    } else {
        ClientConfig::default()
    };

    if let Command::Mode { mode } = &cli.command {
        return commands::mode(saved, &config_path, *mode);
    }

    let mut effective = saved.with_env_overrides()?;
    if let Some(mode) = cli.mode {
        effective.mode = mode;
    }
    if let Some(url) = &cli.api_url {
        effective.api_base_url = url.clone();
    }

    let credentials = config_path
        .parent()
        .map(|dir| dir.join(CREDENTIALS_FILE))
        .unwrap_or_else(|| PathBuf::from(CREDENTIALS_FILE));
    let store = FileCredentialStore::open(&credentials)
        .wrap_err_with(|| format!("opening credential store at {}", credentials.display()))?;
    let client = PraxisClient::from_config(&effective, Arc::new(store))?;

    match cli.command {
        Command::Login {
            username,
            password,
            code,
        } => commands::login(&client, &username, password, code).await,
        Command::Logout => commands::logout(&client).await,
        Command::Whoami => commands::whoami(&client),
        Command::Mode { .. } => Ok(()),
        Command::Clients(command) => commands::clients(&client, command).await,
        Command::Docs(command) => commands::docs(&client, command).await,
        Command::Narrate {
            prompt,
            max_tokens,
            temperature,
            system,
            buffered,
        } => {
            let request = praxis_core::models::narrative::NarrativeRequest {
                prompt,
                system_prompt: system,
                temperature,
                max_tokens,
                ..Default::default()
            };
            commands::narrate(&client, &request, buffered).await
        }
        Command::Settings(command) => commands::settings(&client, command).await,
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
