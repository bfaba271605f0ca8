//! Loadwatch - loading-state coordination for the sentiment dashboard
//!
//! CLI entry point for issuing dashboard requests under tracked operations.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use loadwatch::api::{
    self, CommentInput, CommentResponse, DashboardSession, Sentiment, SimulatedBackend, StakeholderType, WordCloud,
};
use loadwatch::boundary::ErrorBoundary;
use loadwatch::cli::{Cli, Command, OutputFormat};
use loadwatch::config::Config;
use loadwatch::loading::{Coordinator, LoadingEvent};

const SAMPLE_COMMENTS: &[(StakeholderType, &str)] = &[
    (StakeholderType::Citizen, "I love the new bike lanes, a great improvement for the city."),
    (StakeholderType::Business, "The permit process is confusing and unfair to small shops."),
    (StakeholderType::Ngo, "Clear targets for river cleanup would help everyone."),
    (StakeholderType::Academic, "The draft cites data from 2019 and should be refreshed."),
    (StakeholderType::Citizen, "Terrible consultation period, far too short."),
    (StakeholderType::Business, "Happy to support the tax credit for local hiring."),
];

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("loadwatch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(session = loadwatch::loading::session_id(), "Loadwatch loaded config");

    let format = cli.format;
    debug!(command = ?cli.command, ?format, "main: dispatching command");
    match cli.command {
        Command::Config => cmd_config(&config, format),
        Command::Demo {
            latency_ms,
            failure_rate,
            comments,
        } => {
            debug!(?latency_ms, ?failure_rate, comments, "main: matched Demo command");
            cmd_demo(&config, latency_ms, failure_rate, comments, format).await
        }
        command => {
            let session = build_session(&config, cli.simulate)?;
            let result = run_request(&session, command, format).await;
            session.coordinator().cleanup();
            result
        }
    }
}

fn build_session(config: &Config, simulate: bool) -> Result<DashboardSession> {
    debug!(simulate, "build_session: called");
    let backend = api::create_backend(&config.api, simulate).context("Failed to create backend")?;
    let coordinator = Coordinator::new(config.loading.clone());
    Ok(DashboardSession::new(coordinator, backend, config.api.clone()))
}

/// Dispatch one backend request
async fn run_request(session: &DashboardSession, command: Command, format: OutputFormat) -> Result<()> {
    debug!(?command, "run_request: called");
    match command {
        Command::Submit { stakeholder, text } => {
            let stakeholder: StakeholderType = stakeholder.parse()?;
            let input = CommentInput::new(stakeholder, text)?;
            let comment = session.submit_comment(&input).await.context("Failed to submit comment")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&comment)?),
                OutputFormat::Text => {
                    println!("{} Comment #{} analyzed", "✓".green(), comment.id);
                    print_comment(&comment);
                }
            }
        }
        Command::Comments { limit, offset } => {
            let comments = session
                .list_comments(limit, offset)
                .await
                .context("Failed to fetch comments")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&comments)?),
                OutputFormat::Text => {
                    if comments.is_empty() {
                        println!("No comments yet");
                    }
                    for comment in &comments {
                        print_comment(comment);
                    }
                }
            }
        }
        Command::Dashboard => {
            let stats = session.dashboard().await.context("Failed to fetch dashboard")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("{}", "Sentiment Dashboard".bold());
                    println!("-------------------");
                    println!("Total comments: {}", stats.total_comments);
                    println!("  Positive: {}%", format!("{:>5.1}", stats.positive_percentage).green());
                    println!("  Neutral:  {}%", format!("{:>5.1}", stats.neutral_percentage).yellow());
                    println!("  Negative: {}%", format!("{:>5.1}", stats.negative_percentage).red());
                    if !stats.recent_comments.is_empty() {
                        println!();
                        println!("{}", "Recent".bold());
                        for comment in &stats.recent_comments {
                            print_comment(comment);
                        }
                    }
                }
            }
        }
        Command::Wordcloud { sentiment, output } => {
            let sentiment: Option<Sentiment> = sentiment.as_deref().map(str::parse).transpose()?;
            let cloud = session.wordcloud(sentiment).await.context("Failed to generate word cloud")?;
            if let Some(path) = &output {
                cloud.save(path)?;
            }
            print_wordcloud(&cloud, output.as_ref(), format)?;
        }
        Command::Health => {
            let health = session.health().await.context("Health check failed")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
                OutputFormat::Text => {
                    let status = if health.is_healthy() {
                        health.status.green()
                    } else {
                        health.status.red()
                    };
                    println!("{} {}", session.backend_name().cyan(), status);
                    if let Some(version) = &health.version {
                        println!("  version: {}", version);
                    }
                    if let Some(error) = &health.error {
                        println!("  error:   {}", error.red());
                    }
                }
            }
        }
        other => return Err(eyre::eyre!("{:?} is not a backend request", other)),
    }
    Ok(())
}

fn print_comment(comment: &CommentResponse) {
    let label = match comment.sentiment_label.as_str() {
        "positive" => comment.sentiment_label.green(),
        "negative" => comment.sentiment_label.red(),
        _ => comment.sentiment_label.yellow(),
    };
    println!(
        "{} {} {} ({:.2}) {}",
        format!("#{}", comment.id).dimmed(),
        comment.stakeholder_type.cyan(),
        label,
        comment.sentiment_score,
        comment.summary
    );
}

fn print_wordcloud(cloud: &WordCloud, output: Option<&PathBuf>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "sentiment": cloud.sentiment,
                "content-type": cloud.content_type,
                "bytes": cloud.data.len(),
                "output": output,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => match output {
            Some(path) => println!("{} Word cloud written to {}", "✓".green(), path.display()),
            None if cloud.is_image() => {
                println!(
                    "Word cloud is a {} image ({} bytes), use --output to save it",
                    cloud.content_type,
                    cloud.data.len()
                );
            }
            None => println!("{}", String::from_utf8_lossy(&cloud.data)),
        },
    }
    Ok(())
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_config: called");
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}

/// One line per coordinator transition
fn render_event(event: &LoadingEvent) -> String {
    match event {
        LoadingEvent::Started {
            operation,
            timeout_ms,
            restarted,
        } => {
            let deadline = timeout_ms.map(|ms| format!("{}ms", ms)).unwrap_or_else(|| "none".to_string());
            let note = if *restarted { " (restarted)" } else { "" };
            format!("{} {} deadline {}{}", "⟳".cyan(), operation, deadline, note)
        }
        LoadingEvent::Stopped { operation, elapsed_ms } => {
            format!("{} {} {}ms", "✓".green(), operation, elapsed_ms)
        }
        LoadingEvent::TimedOut {
            operation, elapsed_ms, ..
        } => format!("{} {} timed out after {}ms", "⌛".yellow(), operation, elapsed_ms),
        LoadingEvent::Errored { operation, message } => format!(
            "{} {} {}",
            "✗".red(),
            operation.as_deref().unwrap_or("(ambient)"),
            message
        ),
        LoadingEvent::ForceStopped { operation, reason } => {
            format!("{} {} force-stopped ({})", "■".dimmed(), operation, reason)
        }
        LoadingEvent::CleanedUp { callbacks_run } => {
            format!("{} cleaned up, {} callbacks run", "■".dimmed(), callbacks_run)
        }
    }
}

/// Scripted walk through the dashboard against the simulated backend
async fn cmd_demo(
    config: &Config,
    latency_ms: Option<u64>,
    failure_rate: Option<f64>,
    comments: usize,
    format: OutputFormat,
) -> Result<()> {
    debug!(?latency_ms, ?failure_rate, comments, "cmd_demo: called");
    let mut simulated = config.api.simulated.clone();
    if let Some(ms) = latency_ms {
        simulated.latency_ms = ms;
    }
    if let Some(rate) = failure_rate {
        simulated.failure_rate = rate;
    }

    let coordinator = Coordinator::new(config.loading.clone());
    let backend = Arc::new(SimulatedBackend::new(&simulated));
    let session = DashboardSession::new(coordinator.clone(), backend, config.api.clone());
    let boundary = ErrorBoundary::attach(&coordinator);

    let printer = (format == OutputFormat::Text).then(|| {
        let mut events = coordinator.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let done = matches!(event, LoadingEvent::CleanedUp { .. });
                        println!("  {}", render_event(&event));
                        if done {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        println!("  {} {} events skipped", "…".dimmed(), skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    });

    for (stakeholder, text) in SAMPLE_COMMENTS.iter().cycle().take(comments) {
        let input = CommentInput::new(*stakeholder, *text)?;
        if session.submit_comment(&input).await.is_err() && boundary.can_reset() {
            info!(failures = boundary.failure_count(), "Demo: resetting after repeated failures");
            boundary.reset();
        }
    }

    let view = session.refresh(10).await;
    let debug_info = coordinator.get_debug_info();
    let metrics = coordinator.metrics();
    let surfaced = boundary.error().map(|record| record.message());
    let report = coordinator.cleanup();

    if let Some(printer) = printer {
        printer.await.context("Event printer failed")?;
    }

    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "dashboard": view,
                "debug": debug_info,
                "metrics": metrics,
                "boundary-error": surfaced,
                "cleanup": report,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!();
            println!("{}", "Session".bold());
            println!("  id:         {}", debug_info.session_id);
            println!("  history:    {} transitions", debug_info.history.len());
            if let Some(stats) = &view.stats {
                println!(
                    "  sentiment:  {}% positive, {}% neutral, {}% negative",
                    stats.positive_percentage, stats.neutral_percentage, stats.negative_percentage
                );
            }
            if let Some(message) = &surfaced {
                println!("  boundary:   {}", message.red());
            }
            println!();
            println!("{}", "Operations".bold());
            for op in &metrics.operations {
                println!(
                    "  {:<16} started {:>3}  done {:>3}  timeout {:>3}  error {:>3}  avg {:>7.1}ms",
                    op.operation.cyan(),
                    op.started,
                    op.completed,
                    op.timed_out,
                    op.errored,
                    op.avg_ms
                );
            }
        }
    }
    Ok(())
}
