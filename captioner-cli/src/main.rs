//! Headless host bridge: runs a [`captioner_core::Captioner`] and speaks
//! newline-delimited JSON over stdio (§6 Ambient).
//!
//! One task drains the engine's event broadcast to a plain stdout stream of
//! `HostMessage` lines — this binary has no GUI shell to emit into, only a
//! parent process reading its stdout.
//!
//! One line out per [`HostMessage`], one line in per [`HostCommand`]. Exit
//! code `0` on a clean `shutdown` command, `1` if configuration or engine
//! startup fails.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use captioner_core::{CaptionerConfig, CaptionerError, Captioner, HostCommand, HostMessage};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "captioner", about = "Headless live-captioning host bridge")]
struct Args {
    /// Path to a `captioner.toml` configuration file. Missing fields fall
    /// back to defaults; a missing file falls back to all defaults (and
    /// then fails validation unless `CAPTIONER_*` env vars supply the
    /// required `languages.*_model` entries).
    #[arg(long, default_value = "captioner.toml")]
    config: PathBuf,
}

/// Write one line of newline-delimited JSON to stdout and flush immediately
/// — the host process on the other end of the pipe is reading line-by-line.
fn emit(message: &HostMessage) {
    let line = match serde_json::to_string(message) {
        Ok(line) => line,
        Err(e) => {
            error!(error = %e, "failed to serialize host message");
            return;
        }
    };
    let mut stdout = std::io::stdout().lock();
    if writeln!(stdout, "{line}").is_ok() {
        let _ = stdout.flush();
    }
}

fn emit_error(detail: impl std::fmt::Display) {
    emit(&HostMessage::Error {
        message: detail.to_string(),
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "captioner=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!(config = ?args.config, "captioner starting");

    let config = match CaptionerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            emit_error(format!("config error: {e}"));
            std::process::exit(1);
        }
    };

    let captioner = match Captioner::new(config) {
        Ok(captioner) => Arc::new(captioner),
        Err(e) => {
            error!(error = %e, "failed to initialize engine");
            emit_error(format!("init error: {e}"));
            std::process::exit(1);
        }
    };

    if let Err(e) = captioner.start().await {
        error!(error = %e, "failed to start engine");
        emit_error(format!("start error: {e}"));
        std::process::exit(1);
    }

    emit(&HostMessage::Status {
        message: "ready".to_string(),
    });

    let forward_handle = {
        let captioner = Arc::clone(&captioner);
        tokio::spawn(async move {
            let mut events = captioner.subscribe_events();
            loop {
                match events.recv().await {
                    Ok(event) => emit(&event.into_host_message()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event consumer lagged, some captions were dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    run_command_loop(&captioner).await;

    forward_handle.abort();
    captioner.join();
    info!("captioner exited cleanly");
}

/// Read `HostCommand` lines from stdin until EOF or a `shutdown` command,
/// dispatching each to the engine's `ControlPlane` passthrough. Blocking
/// stdin reads run on a dedicated blocking thread so they never stall the
/// event-forwarding task above.
async fn run_command_loop(captioner: &Arc<Captioner>) {
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "error reading stdin");
                    break;
                }
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let command: HostCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                emit_error(format!("invalid command: {e}"));
                continue;
            }
        };

        if matches!(command, HostCommand::Shutdown) {
            if let Err(e) = captioner.shutdown() {
                emit_error(format!("shutdown error: {e}"));
            }
            break;
        }

        if let Err(e) = dispatch_command(captioner, command).await {
            emit_error(e.to_string());
        }
    }
}

async fn dispatch_command(
    captioner: &Arc<Captioner>,
    command: HostCommand,
) -> Result<(), CaptionerError> {
    match command {
        HostCommand::SetLanguages { languages } => captioner.set_active_languages(&languages),
        HostCommand::ForceLanguage { language } => captioner.force_language(&language),
        HostCommand::ResetLanguageDetection => captioner.reset_language_detection(),
        HostCommand::SelectDevice { index } => captioner.select_device(index).await,
        HostCommand::ClearHistory { language } => captioner.clear_history(language.as_ref()),
        HostCommand::SetConfidenceThreshold { threshold } => {
            captioner.set_confidence_threshold(threshold)
        }
        HostCommand::Status => {
            let status = captioner.status();
            let summary = serde_json::json!({
                "running": status.running,
                "current_device": status.current_device,
                "loaded_languages": status.loaded_languages.iter().map(|l| l.as_str().to_string()).collect::<Vec<_>>(),
                "active_languages": status.active_languages.iter().map(|l| l.as_str().to_string()).collect::<Vec<_>>(),
                "detected_language": status.detected_language.as_ref().map(|l| l.as_str().to_string()),
                "detection_confidence": status.detection_confidence,
            });
            emit(&HostMessage::Status {
                message: summary.to_string(),
            });
            Ok(())
        }
        HostCommand::Shutdown => unreachable!("handled by caller"),
    }
}
