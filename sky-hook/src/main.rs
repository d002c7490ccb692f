//! sky-hook - Host adapter for Skyshare
//!
//! The content host calls this tool from its lifecycle hooks: on install and
//! uninstall, when the settings form is saved, and when content is published.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libskyshare::logging::LoggingConfig;
use libskyshare::tasks::{TaskQueue, TaskStatus};
use libskyshare::{Config, Content, SettingsUpdate, SkyshareError, SkyshareService};
use secrecy::SecretString;
use tracing::error;

#[derive(Parser)]
#[command(name = "sky-hook")]
#[command(version)]
#[command(about = "Skyshare host hooks: install, configure and publish to Bluesky", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule the recurring session refresh
    Install,

    /// Cancel the recurring session refresh
    Uninstall,

    /// Save connection settings and log in when a password is given
    Configure {
        /// Service URL including http(s), e.g. https://bsky.social
        #[arg(long)]
        domain: Option<String>,

        /// Handle or email used to log in
        #[arg(long)]
        identifier: Option<String>,

        /// Read the app password from stdin (for automation/agents)
        #[arg(long, conflicts_with = "prompt")]
        stdin: bool,

        /// Prompt for the app password
        #[arg(long)]
        prompt: bool,
    },

    /// Store a published content item and queue its crosspost
    Publish {
        /// Content id
        #[arg(long)]
        id: String,

        #[arg(long)]
        title: String,

        /// Author-provided excerpt
        #[arg(long)]
        excerpt: Option<String>,

        /// Body, HTML allowed
        #[arg(long, default_value = "")]
        body: String,

        #[arg(long)]
        permalink: String,

        #[arg(long)]
        shortlink: Option<String>,

        /// Publish time as RFC 3339 (default: now)
        #[arg(long, value_name = "TIMESTAMP")]
        published_at: Option<String>,
    },

    /// Show connection status and queued tasks
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run_command(cli.command).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SkyshareError>()
        .map_or(1, SkyshareError::exit_code)
}

async fn open_service() -> Result<SkyshareService> {
    let config = Config::load()?;
    let service = SkyshareService::from_config(config)
        .await
        .context("Failed to initialize Skyshare")?;
    Ok(service)
}

async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Install => install().await,
        Commands::Uninstall => uninstall().await,
        Commands::Configure {
            domain,
            identifier,
            stdin,
            prompt,
        } => configure(domain, identifier, stdin, prompt).await,
        Commands::Publish {
            id,
            title,
            excerpt,
            body,
            permalink,
            shortlink,
            published_at,
        } => {
            let published_at = parse_timestamp(published_at.as_deref())?;
            let content = Content {
                id,
                title,
                excerpt,
                body,
                permalink,
                shortlink,
                published_at,
            };
            publish(&content).await
        }
        Commands::Status => status().await,
    }
}

async fn install() -> Result<()> {
    let service = open_service().await?;
    if service.install().await? {
        println!("✓ Scheduled recurring session refresh");
    } else {
        println!("Session refresh already scheduled");
    }
    Ok(())
}

async fn uninstall() -> Result<()> {
    let service = open_service().await?;
    if service.uninstall().await? {
        println!("✓ Cancelled recurring session refresh");
    } else {
        println!("No session refresh was scheduled");
    }
    Ok(())
}

fn read_password(use_stdin: bool, prompt: bool) -> Result<Option<SecretString>> {
    let password = if use_stdin {
        use std::io::{self, Read};
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read password from stdin")?;
        buffer.trim().to_string()
    } else if prompt {
        if !atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Not a TTY. Use --stdin to read the password from stdin.");
        }
        rpassword::prompt_password("Bluesky app password: ")
            .context("Failed to read password")?
    } else {
        return Ok(None);
    };

    if password.is_empty() {
        return Err(SkyshareError::InvalidInput("Password cannot be empty".to_string()).into());
    }
    Ok(Some(SecretString::from(password)))
}

async fn configure(
    domain: Option<String>,
    identifier: Option<String>,
    use_stdin: bool,
    prompt: bool,
) -> Result<()> {
    let password = read_password(use_stdin, prompt)?;
    let service = open_service().await?;

    let logged_in = service
        .save_settings(SettingsUpdate {
            domain,
            identifier,
            password,
        })
        .await?;

    println!("✓ Settings saved");
    if logged_in {
        println!("✓ Logged in to Bluesky");
    }
    Ok(())
}

fn parse_timestamp(input: Option<&str>) -> Result<DateTime<Utc>> {
    match input {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                SkyshareError::InvalidInput(format!(
                    "Invalid --published-at '{}': {} (expected RFC 3339, e.g. 2024-05-01T08:30:00Z)",
                    raw, e
                ))
                .into()
            }),
    }
}

async fn publish(content: &Content) -> Result<()> {
    if content.id.trim().is_empty() {
        return Err(SkyshareError::InvalidInput("Content id cannot be empty".to_string()).into());
    }

    let service = open_service().await?;
    if service.publish(content).await? {
        println!("✓ Crosspost queued for content {}", content.id);
    } else {
        println!("Content {} stored; not connected to Bluesky, nothing queued", content.id);
    }
    Ok(())
}

async fn status() -> Result<()> {
    let service = open_service().await?;
    let status = service.status().await?;
    println!("{}", status);

    let tasks = service.queue().list().await?;
    let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
    let refresh = tasks.iter().find(|t| t.recurrence.is_some());

    println!();
    println!(
        "Tasks:        {} pending, {} running, {} done, {} failed",
        count(TaskStatus::Pending),
        count(TaskStatus::Running),
        count(TaskStatus::Done),
        count(TaskStatus::Failed)
    );
    match refresh {
        Some(task) => println!("Next refresh: {}", task.run_at.to_rfc3339()),
        None => println!("Next refresh: not scheduled (run `sky-hook install`)"),
    }
    Ok(())
}
