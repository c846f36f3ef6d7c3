mod config;
mod pipeline;
mod schedule;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use logcheck_cloudwatch::{CloudWatchClient, caller_identity};
use logcheck_logs::{ContainerFilter, RuleMatcher};
use logcheck_report::{MailgunSender, MultiSender, SmtpSender};

use crate::config::{AppConfig, DEFAULT_REGION};
use crate::pipeline::{LogCheck, ReportOptions};

/// awslogcheck - Mail the CloudWatch log lines that no rule explains
#[derive(Parser, Debug)]
#[command(name = "awslogcheck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Named AWS profile; implies a single run
    #[arg(short, long)]
    profile: Option<String>,

    /// Check the previous hour once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let result = run(args).await;
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(&args.config).context("Cannot read configuration file")?;
    init_tracing(config.debug_level.as_deref());
    debug!(log_group = %config.log_group, "Configuration loaded");

    let sdk_config = load_aws_config(&config, args.profile.as_deref()).await;
    let identity = caller_identity(&sdk_config)
        .await
        .context("Cannot resolve AWS caller identity")?;
    info!(account = %identity.account, user_id = %identity.user_id, arn = %identity.arn, "AWS identity");

    let rules_dir = config.rules_dir().context("Cannot locate rules")?;
    let rules = RuleMatcher::load_dir(&rules_dir).context("Cannot load rules")?;
    let containers = ContainerFilter::new(&config.images_to_ignore, &config.container_names_to_ignore);
    let sender = build_sender(&config)?;
    info!(
        rules = rules.len(),
        transports = ?sender.transports(),
        log_group = %config.log_group,
        "Ready"
    );

    let check = LogCheck::new(
        Arc::new(CloudWatchClient::new(&sdk_config)),
        config.log_group.clone(),
        rules,
        containers,
        sender,
        ReportOptions {
            envelope: config.envelope(),
            max_report_size: config.max_report_size(),
            channel_capacity: config.channel_capacity(),
        },
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    if args.once || args.profile.is_some() {
        match schedule::run_once(&check, config.ingestion_delay(), &cancel).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => {
                info!("Run cancelled");
                Ok(())
            }
            Err(e) => Err(e).context("Log check failed"),
        }
    } else {
        schedule::run_scheduled(&check, config.ingestion_delay(), &cancel).await;
        Ok(())
    }
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(debug_level: Option<&str>) {
    let level = match debug_level.unwrap_or("info") {
        level @ ("trace" | "debug" | "info" | "warn" | "error") => level,
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_aws_config(config: &AppConfig, profile: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    match profile {
        Some(profile) => {
            info!(profile, "Using AWS profile");
            loader = loader.profile_name(profile);
            if let Some(region) = &config.aws_region {
                loader = loader.region(Region::new(region.clone()));
            }
        }
        None => loader = loader.region(Region::new(config.region())),
    }
    let sdk_config = loader.load().await;
    if sdk_config.region().is_none() {
        warn!(region = DEFAULT_REGION, "No region in profile, using default");
        return sdk_config
            .into_builder()
            .region(Region::new(DEFAULT_REGION))
            .build();
    }
    sdk_config
}

fn build_sender(config: &AppConfig) -> Result<MultiSender> {
    let mailgun = if config.is_mailgun_configured() {
        Some(MailgunSender::new(
            &config.mailgun.domain,
            &config.mailgun.api_key,
            config.mailgun.base_url.as_deref(),
        )?)
    } else {
        None
    };
    let smtp = if config.is_smtp_configured() {
        Some(SmtpSender::new(config.smtp_settings())?)
    } else {
        None
    };
    if mailgun.is_none() && smtp.is_none() {
        bail!("No mail transport configured, set [smtp] or [mailgun]");
    }
    Ok(MultiSender::new(mailgun, smtp)?)
}

/// Cancel the shared token on Ctrl-C or SIGTERM
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!(error = %e, "Cannot listen for SIGTERM");
                        let _ = tokio::signal::ctrl_c().await;
                        cancel.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        let _ = tokio::signal::ctrl_c().await;

        info!("Shutdown requested");
        cancel.cancel();
    });
}
