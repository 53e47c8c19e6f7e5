//! nl-iam
//!
//! Administer AWS IAM in plain English. Requests are parsed into one of a
//! fixed set of actions by an LLM, explained, confirmed and executed
//! against the IAM Query API.
//!
//! # Usage
//! ```bash
//! # Free-text request
//! nl-iam "Create a new user named john_doe"
//!
//! # Interactive prompt
//! nl-iam
//!
//! # Security audits
//! nl-iam audit mfa
//! nl-iam audit keys
//! nl-iam audit admin
//!
//! # Credentials
//! nl-iam setup
//! nl-iam config show
//! nl-iam config set aws-region eu-west-1
//! ```

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use nl_iam::config::{Settings, DEFAULT_MODEL, DEFAULT_REGION};
use nl_iam::render::{render_config, render_json, render_output, render_result};
use nl_iam::{
    Action, ActionExecutor, ActionResult, AppConfig, CompletionService, CredentialKey,
    CredentialStore, Explainer, IamClient, IdentityService, IntentResolver, OpenAiCompletion,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "nl-iam")]
#[command(about = "Natural-language interface for AWS IAM", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Skip the confirmation prompt for changes
    #[arg(short, long, global = true)]
    yes: bool,

    /// Credentials file (default: ~/.env)
    #[arg(long, env = "NL_IAM_CREDENTIALS_FILE", global = true)]
    credentials_file: Option<PathBuf>,

    /// OpenAI model used to parse and explain requests
    #[arg(long, env = "NL_IAM_OPENAI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// IAM endpoint override (IAM-compatible test servers)
    #[arg(long, env = "NL_IAM_IAM_ENDPOINT", global = true)]
    iam_endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Request in plain English; omit for interactive mode
    request: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the credential setup wizard
    Setup,

    /// Show or change stored credentials
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Run a security audit
    Audit {
        #[arg(value_enum)]
        kind: AuditKind,
    },

    /// Explain a request without executing it
    Explain {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show stored credentials (masked)
    Show,

    /// Store one credential
    Set {
        /// aws-access-key, aws-secret-key, aws-region or openai-key
        key: CredentialKey,
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AuditKind {
    /// Users without an MFA device
    Mfa,
    /// Access keys older than 90 days
    Keys,
    /// Users and roles with administrator access
    Admin,
}

impl AuditKind {
    fn action(self) -> Action {
        match self {
            AuditKind::Mfa => Action::AuditMfa,
            AuditKind::Keys => Action::AuditAccessKeys,
            AuditKind::Admin => Action::AuditAdminUsers,
        }
    }
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries results; logs go to stderr
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,nl_iam={}", level)));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !run(cli).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns `false` when the command ran but its action failed.
async fn run(cli: Cli) -> Result<bool> {
    let path = match cli.credentials_file {
        Some(path) => path,
        None => CredentialStore::default_path()?,
    };
    let mut store = CredentialStore::open(path)?;
    let settings = Settings {
        model: cli.model,
        iam_endpoint: cli.iam_endpoint,
    };

    match cli.command {
        Some(Commands::Setup) => {
            setup_wizard(&mut store)?;
            Ok(true)
        }
        Some(Commands::Config {
            action: ConfigCommand::Show,
        }) => {
            println!("{}", render_config(&store.get_all()));
            Ok(true)
        }
        Some(Commands::Config {
            action: ConfigCommand::Set { key, value },
        }) => {
            store.set(key, value.trim())?;
            println!("✅ {} saved to {}", key.cli_name(), store.path().display());
            Ok(true)
        }
        Some(Commands::Audit { kind }) => {
            let app = App::connect(&mut store, &settings, cli.json, cli.yes)?;
            app.audit(kind).await
        }
        Some(Commands::Explain { text }) => {
            let app = App::connect(&mut store, &settings, cli.json, cli.yes)?;
            let explanation = app.explainer.explain(&text.join(" ")).await;
            println!("This command will: {}", explanation);
            Ok(true)
        }
        None => {
            let app = App::connect(&mut store, &settings, cli.json, cli.yes)?;
            if cli.request.is_empty() {
                app.interactive().await
            } else {
                app.handle_request(&cli.request.join(" ")).await
            }
        }
    }
}

// ============================================================
// Setup Wizard
// ============================================================

fn setup_wizard(store: &mut CredentialStore) -> Result<()> {
    let theme = ColorfulTheme::default();

    println!("Welcome to the nl-iam setup wizard!");
    println!("We'll help you configure your AWS and OpenAI credentials.\n");

    println!("First, let's set up your AWS credentials:");
    let access_key: String = Input::with_theme(&theme)
        .with_prompt("Enter your AWS Access Key ID")
        .interact_text()?;
    let secret_key = Password::with_theme(&theme)
        .with_prompt("Enter your AWS Secret Access Key")
        .interact()?;
    let region: String = Input::with_theme(&theme)
        .with_prompt("Enter your AWS Region")
        .default(DEFAULT_REGION.to_string())
        .interact_text()?;

    println!("\nNow, let's set up your OpenAI credentials:");
    let openai_key = Password::with_theme(&theme)
        .with_prompt("Enter your OpenAI API Key")
        .interact()?;

    store.set(CredentialKey::AwsAccessKeyId, access_key.trim())?;
    store.set(CredentialKey::AwsSecretAccessKey, secret_key.trim())?;
    store.set(CredentialKey::AwsRegion, region.trim())?;
    store.set(CredentialKey::OpenAiApiKey, openai_key.trim())?;

    println!(
        "\n✅ Credentials saved successfully to {}",
        store.path().display()
    );
    Ok(())
}

// ============================================================
// Request Handling
// ============================================================

struct App {
    resolver: IntentResolver,
    explainer: Explainer,
    executor: ActionExecutor,
    json: bool,
    yes: bool,
}

impl App {
    /// Build the services, running the setup wizard first if any
    /// credential is missing.
    fn connect(
        store: &mut CredentialStore,
        settings: &Settings,
        json: bool,
        yes: bool,
    ) -> Result<Self> {
        if !store.missing().is_empty() {
            println!("No credentials found. Running setup wizard...");
            setup_wizard(store)?;
        }

        let config = AppConfig::from_store(store, settings)?;
        info!(model = %config.model, region = %config.aws_region, "🚀 nl-iam starting");

        let completion: Arc<dyn CompletionService> =
            Arc::new(OpenAiCompletion::new(&config.openai_api_key, config.model.as_str()));
        let iam: Arc<dyn IdentityService> = Arc::new(IamClient::new(&config)?);

        Ok(Self {
            resolver: IntentResolver::new(completion.clone()),
            explainer: Explainer::new(completion),
            executor: ActionExecutor::new(iam, config.user_path.as_str()),
            json,
            yes,
        })
    }

    async fn handle_request(&self, request: &str) -> Result<bool> {
        let action = match self.resolver.resolve(request).await {
            Ok(action) => action,
            Err(e) => {
                eprintln!("❌ Error: {}", e);
                return Ok(false);
            }
        };

        let explanation = self.explainer.explain(request).await;
        println!("This will: {}", explanation);

        if action.is_mutating() && !self.yes {
            let proceed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Do you want to proceed with {}?", action))
                .default(false)
                .interact()?;
            if !proceed {
                println!("Cancelled");
                return Ok(true);
            }
        }

        let result = self.executor.execute(&action).await;
        self.print(&result, false)?;
        Ok(result.is_success())
    }

    async fn audit(&self, kind: AuditKind) -> Result<bool> {
        let result = self.executor.execute(&kind.action()).await;
        self.print(&result, true)?;
        Ok(result.is_success())
    }

    /// `bare` drops the success banner (audit subcommands).
    fn print(&self, result: &ActionResult, bare: bool) -> Result<()> {
        if self.json {
            println!("{}", render_json(result)?);
            return Ok(());
        }

        match result {
            ActionResult::Success(output) if bare => println!("{}", render_output(output)),
            ActionResult::Success(_) => println!("{}", render_result(result)),
            ActionResult::Failure { .. } => eprintln!("{}", render_result(result)),
        }
        Ok(())
    }

    async fn interactive(&self) -> Result<bool> {
        println!("🤖 nl-iam interactive mode. Type 'exit' or 'quit' to leave.");
        let theme = ColorfulTheme::default();

        loop {
            let line: String = Input::with_theme(&theme)
                .with_prompt("iam")
                .allow_empty(true)
                .interact_text()?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                break;
            }

            self.handle_request(line).await?;
        }

        Ok(true)
    }
}
