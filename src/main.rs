//! Pushlink CLI - push token registration and reconciliation.
//!
//! This is the main binary entry point and the composition root: it loads
//! the configuration, opens the persistent store, builds the platform and
//! hands them to [`PushService`]. See the `pushlink` library for the core
//! functionality.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pushlink::platform::EventStream;
use pushlink::provider::redact;
use pushlink::{
    Config, DeviceProfile, Notice, NoticeLevel, PlatformNotification, PushService,
    StaticPlatform, UpdateStatus,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "pushlink")]
#[command(version)]
#[command(about = "Push token registration and notification routing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service; notifications read from stdin as JSON are routed
    /// to the banner until Ctrl-C
    Start,
    /// Register this device with the backend
    Register {
        /// Display name
        #[arg(long)]
        nickname: String,
        /// Device identity (a new UUID when omitted)
        #[arg(long)]
        device_id: Option<String>,
        /// Real name
        #[arg(long)]
        name: Option<String>,
        /// Email address
        #[arg(long)]
        email: Option<String>,
    },
    /// Request permission and send a fresh token to the backend
    Enable,
    /// Obtain a new token and send it to the backend
    RefreshToken,
    /// Send the current token to the backend, retrying (Ctrl-C cancels)
    UpdateToken,
    /// Ask the backend to push a test notification
    TestSend {
        /// Notification body
        #[arg(long)]
        message: Option<String>,
    },
    /// Show registration status
    Status,
    /// Print the active configuration, or persist the given settings
    Config {
        /// Backend base URL
        #[arg(long)]
        server_url: Option<String>,
        /// Project identifier used for token issuance
        #[arg(long)]
        project_id: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long)]
        request_timeout: Option<u64>,
    },
}

/// Initialise `env_logger`: `info` by default, `RUST_LOG` overrides, piped
/// to `PUSHLINK_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("PUSHLINK_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn build_service(config: Config) -> Result<(PushService, Arc<StaticPlatform>)> {
    let store = pushlink::keyring::open_default_store()?;
    PushService::host(config, store)
}

fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Info => println!("{}", notice),
        NoticeLevel::Warning | NoticeLevel::Error => eprintln!("{}", notice),
    }
}

/// Run until Ctrl-C, delivering each stdin line (a JSON notification) to the
/// foreground stream.
async fn run(service: &PushService, platform: &StaticPlatform) -> Result<()> {
    let _tap = service.router().set_tap_handler(|event| {
        println!("Tapped: {} (newsId: {:?})", event, event.news_id());
    });
    service.banner().set_press_handler(|data| {
        println!("Banner pressed: {}", serde_json::Value::Object(data.clone()));
    });

    let report = service.start().await;
    println!("Status: {}", report.status);
    match report.token_sent {
        Some(true) => println!("Push token sent to {}", service.config().server_url),
        Some(false) => println!("Push token could not be sent; it will be retried on the next start"),
        None => {}
    }

    println!("Listening for notifications on stdin. Press Ctrl-C to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<PlatformNotification>(&line) {
                    Ok(content) => {
                        platform.deliver(EventStream::Received, &content);
                        if let Some(event) = service.banner().state().current {
                            println!("Banner: {}", event);
                        }
                    }
                    Err(e) => eprintln!("Ignoring invalid notification: {e}"),
                }
            }
        }
    }

    println!("Shutting down...");
    service.shutdown().await;
    Ok(())
}

async fn update_token(service: &PushService) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let Some(report) = service.update_token(&cancel).await else {
        anyhow::bail!("Device is not registered. Run `pushlink register` first.");
    };

    match report.status {
        UpdateStatus::Succeeded => {
            println!("Push token updated after {} attempt(s)", report.attempts);
            Ok(())
        }
        UpdateStatus::Cancelled => {
            println!("Push token update cancelled after {} attempt(s)", report.attempts);
            Ok(())
        }
        UpdateStatus::Failed => {
            let reason = report
                .last_error
                .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
            anyhow::bail!(
                "Push token update failed after {} attempt(s): {reason}",
                report.attempts
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load()?;
    if pushlink::env::is_test_mode() {
        log::debug!("Running in test mode (file store)");
    }

    match cli.command {
        Commands::Config {
            server_url,
            project_id,
            request_timeout,
        } => {
            if server_url.is_none() && project_id.is_none() && request_timeout.is_none() {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }

            // Edit the file as written, without environment overrides.
            let path = Config::config_path()?;
            let mut stored = Config::load_from(&path).unwrap_or_default();
            if let Some(url) = server_url {
                stored.server_url = url;
            }
            if let Some(id) = project_id {
                stored.project_id = Some(id).filter(|p| !p.is_empty());
            }
            if let Some(secs) = request_timeout {
                stored.request_timeout_secs = secs;
            }
            stored.save()?;
            println!("Saved configuration to {}", path.display());
        }
        Commands::Start => {
            let (service, platform) = build_service(config)?;
            run(&service, &platform).await?;
        }
        Commands::Register {
            nickname,
            device_id,
            name,
            email,
        } => {
            let (service, _platform) = build_service(config)?;
            let profile = DeviceProfile {
                device_id: device_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name,
                email,
                nickname,
            };
            let record = service
                .register(&profile)
                .await
                .context("Device registration failed")?;
            println!("Registered device {}", profile.device_id);
            if let Some(id) = record.id {
                println!("Server record: {}", id);
            }
        }
        Commands::Enable => {
            let (service, _platform) = build_service(config)?;
            print_notice(&service.enable_notifications().await);
        }
        Commands::RefreshToken => {
            let (service, _platform) = build_service(config)?;
            print_notice(&service.refresh_token().await);
        }
        Commands::UpdateToken => {
            let (service, _platform) = build_service(config)?;
            update_token(&service).await?;
        }
        Commands::TestSend { message } => {
            let (service, _platform) = build_service(config)?;
            print_notice(&service.send_test_notification(message.as_deref()).await);
        }
        Commands::Status => {
            let (service, _platform) = build_service(config)?;
            println!("Status:    {}", service.registration_status());
            println!(
                "Device id: {}",
                service.device_id().as_deref().unwrap_or("(none)")
            );
            let token = service.stored_token();
            println!(
                "Token:     {}",
                token.as_deref().map_or_else(|| "(none)".to_string(), redact)
            );
            println!("Server:    {}", service.config().server_url);
        }
    }

    Ok(())
}
