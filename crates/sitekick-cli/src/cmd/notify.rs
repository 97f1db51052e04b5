use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Subcommand;
use uuid::Uuid;

use sitekick_core::config::Config;
use sitekick_core::gate::{NotificationGate, SendOutcome, SendRequest};
use sitekick_core::sender::{NotificationSender, OutboundEmail};
use sitekick_core::types::EventType;
use sitekick_core::SitekickError;
use sitekick_server::mailer::ResendSender;
use sitekick_server::pg::PgStore;

use crate::output::{print_json, print_table};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum NotifySubcommand {
    /// Show whether an email could be sent now
    Status {
        /// Customer id
        #[arg(long)]
        subject: Uuid,
        /// demo_ready or website_launch
        #[arg(long)]
        event: EventType,
    },

    /// Gate, send and record one lifecycle email
    Send {
        #[arg(long)]
        subject: Uuid,
        #[arg(long)]
        event: EventType,
        /// Admin recorded as the sender
        #[arg(long)]
        actor: Option<Uuid>,
    },

    /// List recorded lifecycle emails, newest first
    History {
        #[arg(long)]
        subject: Uuid,
        #[arg(long)]
        event: Option<EventType>,
    },
}

/// Sender for commands that only read; any send attempt is a bug.
struct ReadOnlySender;

#[async_trait]
impl NotificationSender for ReadOnlySender {
    async fn send(&self, _email: &OutboundEmail) -> sitekick_core::Result<String> {
        Err(SitekickError::Dispatch(
            "email delivery is not available for read-only commands".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(path: &Path, subcmd: NotifySubcommand, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let sender: Arc<dyn NotificationSender> = match &subcmd {
        NotifySubcommand::Send { .. } => Arc::new(ResendSender::from_config(&config.email)?),
        _ => Arc::new(ReadOnlySender),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let gate = open_gate(&config, sender).await?;
        match subcmd {
            NotifySubcommand::Status { subject, event } => {
                status(&gate, subject, event, json).await
            }
            NotifySubcommand::Send {
                subject,
                event,
                actor,
            } => send(&gate, subject, event, actor, json).await,
            NotifySubcommand::History { subject, event } => {
                history(&gate, subject, event, json).await
            }
        }
    })
}

async fn open_gate(
    config: &Config,
    sender: Arc<dyn NotificationSender>,
) -> anyhow::Result<NotificationGate> {
    let store = PgStore::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    Ok(NotificationGate::new(
        Arc::new(store),
        sender,
        config.branding.clone(),
        config.gate.store_timeout(),
    )
    .with_lease_timeout(config.lease_timeout()))
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn status(
    gate: &NotificationGate,
    subject: Uuid,
    event: EventType,
    json: bool,
) -> anyhow::Result<()> {
    let status = gate.status(subject, event).await?;
    if json {
        return print_json(&status);
    }

    println!("can send:   {}", if status.can_send { "yes" } else { "no" });
    println!("reason:     {}", status.reason);
    println!("duplicate:  {:?}", status.duplicate_status);
    match &status.last_email {
        Some(last) => println!("last sent:  {}", last.sent_at.to_rfc3339()),
        None => println!("last sent:  never"),
    }
    println!("state:      {}", status.current_state);
    Ok(())
}

// ---------------------------------------------------------------------------
// send
// ---------------------------------------------------------------------------

async fn send(
    gate: &NotificationGate,
    subject: Uuid,
    event: EventType,
    actor: Option<Uuid>,
    json: bool,
) -> anyhow::Result<()> {
    let outcome = gate
        .send(SendRequest {
            subject_id: subject,
            event_type: event,
            actor_id: actor,
        })
        .await?;
    let message = outcome.message(event);

    if json {
        let value = match &outcome {
            SendOutcome::Sent { record, .. } => serde_json::json!({
                "success": true,
                "message": message,
                "recordId": record.id,
            }),
            SendOutcome::NotEligible {
                reasons,
                current_state,
            } => serde_json::json!({
                "success": false,
                "error": message,
                "reasons": reasons,
                "currentState": current_state,
            }),
            SendOutcome::Duplicate {
                last_sent_at,
                current_state,
            } => serde_json::json!({
                "success": false,
                "error": message,
                "duplicate": true,
                "lastSent": last_sent_at,
                "currentState": current_state,
            }),
        };
        print_json(&value)?;
    } else {
        println!("{message}");
    }

    match outcome {
        SendOutcome::Sent { .. } => Ok(()),
        _ => anyhow::bail!("email not sent"),
    }
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

async fn history(
    gate: &NotificationGate,
    subject: Uuid,
    event: Option<EventType>,
    json: bool,
) -> anyhow::Result<()> {
    let records = gate.history(subject, event).await?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No lifecycle emails recorded.");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.event_type.to_string(),
                r.outcome.to_string(),
                r.actor_id.map(|a| a.to_string()).unwrap_or_default(),
                r.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["SENT AT", "EVENT", "OUTCOME", "ACTOR", "ERROR"], rows);
    Ok(())
}
