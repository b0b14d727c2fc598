use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use live_client::{
    load_settings, ConnectionStatus, InvestigationSession, InvestigationState, Phase,
    TimelineEvent,
};
use shared::{
    domain::{TimelineStatus, TransactionId},
    investigation::Transaction,
    protocol::{Frame, FrameKind},
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Follow the live fraud-investigation feed in the terminal.
#[derive(Parser, Debug)]
#[command(name = "investigation-watch")]
struct Args {
    /// Overrides the configured endpoint; http(s) URLs are accepted.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Investigation to request once connected.
    #[arg(long)]
    transaction_id: Option<String>,
    /// JSON transaction payload, sent along with CUSTOM- ids.
    #[arg(long)]
    transaction_file: Option<PathBuf>,
    /// Keep watching after the investigation finishes.
    #[arg(long)]
    follow: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let transaction = args
        .transaction_file
        .as_deref()
        .map(read_transaction)
        .transpose()?;
    let transaction_id = args
        .transaction_id
        .map(TransactionId::new)
        .or_else(|| transaction.as_ref().map(|t| t.transaction_id.clone()));

    let session = InvestigationSession::new(&settings)?;
    let (errors_tx, mut errors) = mpsc::unbounded_channel();
    let _feed = session.subscribe(move |frame| {
        if frame.kind == FrameKind::Error {
            let _ = errors_tx.send(frame.message.clone());
        } else {
            print_feed_frame(frame);
        }
    });
    let mut status = session.watch_status();
    let mut updates = session.watch_investigation();
    let exit_on_outcome = transaction_id.is_some() && !args.follow;
    let mut pending = transaction_id.map(|id| (id, transaction));
    let mut printed = 0usize;
    let mut last_phase = Phase::Idle;
    let mut had_snapshot = false;

    info!(url = %settings.server_url, "watching investigation feed");
    session.connect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("[status] {current}");
                if current == ConnectionStatus::Connected {
                    if let Some((id, transaction)) = pending.take() {
                        if !session.investigate(id.clone(), transaction.clone()) {
                            warn!(%id, "investigate request was not sent; retrying on next connect");
                            pending = Some((id, transaction));
                        }
                    }
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.timeline().len() < printed {
                    printed = 0;
                }
                for event in &state.timeline()[printed..] {
                    print_timeline(event);
                }
                printed = state.timeline().len();

                // The first completion frame carries no snapshot; the final
                // report arrives in a later one.
                let errored = state.phase() == Phase::Errored && last_phase != Phase::Errored;
                let reported = state.has_snapshot() && !had_snapshot;
                last_phase = state.phase();
                had_snapshot = state.has_snapshot();
                if errored || reported {
                    print_outcome(&state);
                    if exit_on_outcome {
                        break;
                    }
                }
            }
            Some(message) = errors.recv() => {
                println!("[error] {}", message.as_deref().unwrap_or("server reported an error"));
                if exit_on_outcome && pending.is_none() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

fn read_transaction(path: &Path) -> Result<Transaction> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read transaction file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid transaction json in '{}'", path.display()))
}

fn print_feed_frame(frame: &Frame) {
    match frame.kind {
        FrameKind::TransactionNew => match frame.feed_transaction() {
            Some(transaction) => println!(
                "[feed] new transaction {} amount={:.2} merchant={}",
                transaction.transaction_id,
                transaction.amount,
                transaction.merchant_category.as_deref().unwrap_or("-")
            ),
            None => {
                let raw = frame.transaction.as_ref().map(ToString::to_string).unwrap_or_default();
                println!("[feed] new transaction {raw}");
            }
        },
        FrameKind::MetricsUpdate => {
            let data = frame.data.as_ref().map(ToString::to_string).unwrap_or_default();
            println!("[metrics] {data}");
        }
        _ => {}
    }
}

fn print_timeline(event: &TimelineEvent) {
    let status = match event.status {
        TimelineStatus::Started => "started",
        TimelineStatus::Completed => "completed",
        TimelineStatus::Error => "error",
    };
    let agent = event.agent.as_str();
    match &event.message {
        Some(message) => println!("{} {agent:<18} {status:<9} {message}", event.timestamp),
        None => println!("{} {agent:<18} {status}", event.timestamp),
    }
}

fn print_outcome(state: &InvestigationState) {
    let Some(investigation) = state.investigation() else {
        println!("investigation finished");
        return;
    };
    println!("transaction {}: {:?}", investigation.transaction_id, investigation.status);
    if let Some(decision) = state.final_decision() {
        println!("  decision: {decision}");
    }
    if let Some(reason) = &investigation.decision_reason {
        println!("  reason:   {reason}");
    }
    if let Some(risk) = &investigation.risk_analysis {
        println!("  risk:     {:.2}", risk.risk_score);
    }
    if let Some(error) = &investigation.error {
        println!("  error:    {error}");
    }
}
