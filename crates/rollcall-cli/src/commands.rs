//! Subcommand implementations.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, OperationalDay, StudentNumber};
use rollcall_network::{ReaderClient, ReaderClientConfig};
use rollcall_protocol::{CardPayload, ReaderMessage};
use rollcall_reader::ReaderTransport;
use rollcall_session::Session;
use rollcall_storage::{AttendanceStore, SqliteAttendanceStore, UserStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::console;

const TRANSPORT_EVENT_CAPACITY: usize = 64;

async fn open_store(config: &Config) -> Result<SqliteAttendanceStore> {
    SqliteAttendanceStore::open(config.database_config())
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database.path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Run the transport, the session and the console until the console exits.
pub async fn serve(config: Config) -> Result<()> {
    let store = Arc::new(open_store(&config).await?);
    log_status_listing(store.as_ref()).await;

    let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
    let (session, handle) = Session::new(store.clone(), config.session_config(), events_rx);

    let process = config
        .reader_process()
        .context("Invalid reader command")?;
    let transport =
        ReaderTransport::new(config.transport_config(), process, handle.gate(), events_tx).spawn();
    let session_task = session.spawn();

    info!(addr = %config.reader.listen_addr, "Coordinator running");
    let result = console::run(handle).await;

    transport.shutdown().await;
    if let Err(e) = session_task.await {
        warn!(error = %e, "Session task ended abnormally");
    }
    store.database().close().await;
    info!("Coordinator stopped");
    result
}

async fn log_status_listing<S: AttendanceStore>(store: &S) {
    let day = match OperationalDay::current() {
        Ok(day) => day,
        Err(e) => {
            warn!(error = %e, "Could not determine the operational day");
            return;
        }
    };

    match store.list_active_users_with_status(&day).await {
        Ok(statuses) => {
            let present = statuses.iter().filter(|s| s.is_present()).count();
            info!(
                day = %day.date(),
                users = statuses.len(),
                present,
                "Loaded user status listing"
            );
            for status in &statuses {
                log_status(status);
            }
        }
        Err(e) => warn!(error = %e, "Failed to load user status listing"),
    }
}

fn log_status(status: &UserStatus) {
    info!(
        student = %status.student_number,
        name = %status.name_kanji,
        mode = %status.mode,
        since = ?status.timestamp,
        "User status"
    );
}

/// Play the reader: connect to the listener and send one card.
pub async fn simulate(
    config: &Config,
    addr: Option<SocketAddr>,
    student_number: &str,
    name_kanji: &str,
    name_kana: &str,
) -> Result<()> {
    let server_addr = addr.unwrap_or(config.reader.listen_addr);
    let mut client = ReaderClient::new(ReaderClientConfig {
        server_addr,
        timeout: Duration::from_secs(3),
    });

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to reader listener at {server_addr}"))?;
    client
        .send(ReaderMessage::Card(CardPayload::new(
            student_number,
            name_kanji,
            name_kana,
        )))
        .await
        .context("Failed to send card")?;
    client.close().await?;

    info!(student = student_number, addr = %server_addr, "Card sent");
    Ok(())
}

pub async fn logs(config: &Config, student: Option<StudentNumber>, page: u32) -> Result<()> {
    let store = open_store(config).await?;
    let entries = match &student {
        Some(student_number) => store.list_attendance_logs_for_student(student_number, page).await,
        None => store.list_recent_attendance_logs(page).await,
    }
    .context("Failed to list attendance logs")?;

    for entry in &entries {
        print_json(entry)?;
    }
    store.database().close().await;
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let day = OperationalDay::current().context("Could not determine the operational day")?;
    let statuses = store
        .list_active_users_with_status(&day)
        .await
        .context("Failed to list user statuses")?;

    for status in &statuses {
        print_json(status)?;
    }
    store.database().close().await;
    Ok(())
}

pub async fn edit_log(
    config: &Config,
    id: i64,
    mode: AttendanceMode,
    timestamp: Option<DateTime<Utc>>,
) -> Result<()> {
    let store = open_store(config).await?;
    let timestamp = timestamp.unwrap_or_else(Utc::now);
    let replacement = store
        .edit_attendance_log(id, mode, timestamp)
        .await
        .with_context(|| format!("Failed to edit attendance log {id}"))?;

    info!(old = id, new = replacement.id, mode = %mode, "Attendance log replaced");
    print_json(&replacement)?;
    store.database().close().await;
    Ok(())
}
