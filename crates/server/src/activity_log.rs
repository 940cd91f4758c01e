//! Activity log - persisted domain events
//!
//! A bus listener hands events to a bounded channel; `ActivityWriter` drains
//! it and batches inserts into SQLite via `spawn_blocking`. Stream deltas are
//! not stored.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use muxdeck_bridge::{SessionBridge, Subscription};
use muxdeck_protocol::DomainEvent;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::migration_runner::run_migrations;

const CHANNEL_CAPACITY: usize = 1000;
const BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const MAX_QUERY_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub session_name: String,
    pub event_type: &'static str,
    pub payload: String,
    pub recorded_at: String,
}

impl ActivityRecord {
    /// Build a row for `event`. Returns `None` for events that aren't persisted.
    pub fn from_event(event: &DomainEvent, recorded_at: String) -> Option<Self> {
        if matches!(event, DomainEvent::StreamDelta { .. }) {
            return None;
        }
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    component = "activity_log",
                    event = "activity.serialize_failed",
                    error = %e,
                    "Failed to serialize event"
                );
                return None;
            }
        };
        Some(Self {
            session_name: event.session_name().to_string(),
            event_type: event.kind(),
            payload,
            recorded_at,
        })
    }
}

/// One stored row, as returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    pub id: i64,
    pub session_name: String,
    pub event_type: String,
    pub payload: Value,
    pub recorded_at: String,
}

/// Cloneable handle feeding the writer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    store: ActivityStore,
    tx: mpsc::Sender<ActivityRecord>,
}

/// Read side of the activity database.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    db_path: PathBuf,
}

/// Open (and migrate) the database. Spawn `ActivityWriter::run` to start persisting.
pub fn open(db_path: &Path) -> anyhow::Result<(ActivityLog, ActivityWriter)> {
    let mut conn = Connection::open(db_path)?;
    run_migrations(&mut conn)?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let log = ActivityLog {
        store: ActivityStore {
            db_path: db_path.to_path_buf(),
        },
        tx,
    };
    let writer = ActivityWriter {
        rx,
        db_path: db_path.to_path_buf(),
        batch: Vec::with_capacity(BATCH_SIZE),
    };
    Ok((log, writer))
}

impl ActivityLog {
    /// Queue `event` for persistence. Never blocks; drops on a full channel.
    pub fn record(&self, event: &DomainEvent) {
        let Some(record) = ActivityRecord::from_event(event, iso8601_now()) else {
            return;
        };
        if let Err(e) = self.tx.try_send(record) {
            warn!(
                component = "activity_log",
                event = "activity.enqueue_failed",
                session_name = %event.session_name(),
                event_type = event.kind(),
                error = %e,
                "Dropping activity record"
            );
        }
    }

    /// Subscribe to every bridge event.
    pub fn attach(&self, bridge: &SessionBridge) -> Subscription {
        let log = self.clone();
        bridge.on(move |event| log.record(event))
    }

    pub fn store(&self) -> ActivityStore {
        self.store.clone()
    }
}

impl ActivityStore {
    /// Most recent rows for `session_name`, newest first.
    pub async fn recent(&self, session_name: &str, limit: usize) -> anyhow::Result<Vec<ActivityRow>> {
        let db_path = self.db_path.clone();
        let session_name = session_name.to_string();
        let limit = limit.clamp(1, MAX_QUERY_LIMIT);
        let rows = tokio::task::spawn_blocking(move || query_recent(&db_path, &session_name, limit))
            .await??;
        Ok(rows)
    }
}

fn query_recent(db_path: &Path, session_name: &str, limit: usize) -> anyhow::Result<Vec<ActivityRow>> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(
        "SELECT id, session_name, event_type, payload, recorded_at
         FROM activity_log
         WHERE session_name = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![session_name, limit as i64], |row| {
            let payload: String = row.get(3)?;
            Ok(ActivityRow {
                id: row.get(0)?,
                session_name: row.get(1)?,
                event_type: row.get(2)?,
                payload: serde_json::from_str(&payload).unwrap_or(Value::String(payload)),
                recorded_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drains queued records into SQLite in batches
pub struct ActivityWriter {
    rx: mpsc::Receiver<ActivityRecord>,
    db_path: PathBuf,
    batch: Vec<ActivityRecord>,
}

impl ActivityWriter {
    /// Run until every `ActivityLog` handle is dropped (call from tokio::spawn).
    pub async fn run(mut self) {
        info!(
            component = "activity_log",
            event = "activity.writer.started",
            db_path = %self.db_path.display(),
            "Activity writer started"
        );

        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(record) => {
                        self.batch.push(record);
                        if self.batch.len() >= BATCH_SIZE {
                            self.flush().await;
                        }
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }

        info!(
            component = "activity_log",
            event = "activity.writer.stopped",
            "Activity writer stopped"
        );
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        let db_path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || flush_batch(&db_path, batch)).await;

        match result {
            Ok(Ok(count)) => {
                debug!(
                    component = "activity_log",
                    event = "activity.flushed",
                    rows = count,
                    "Persisted activity rows"
                );
            }
            Ok(Err(e)) => {
                error!(
                    component = "activity_log",
                    event = "activity.flush_failed",
                    error = %e,
                    "Activity flush failed"
                );
            }
            Err(e) => {
                error!(
                    component = "activity_log",
                    event = "activity.flush_panicked",
                    error = %e,
                    "spawn_blocking panicked"
                );
            }
        }
    }
}

fn flush_batch(db_path: &Path, batch: Vec<ActivityRecord>) -> Result<usize, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO activity_log (session_name, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for record in &batch {
            match stmt.execute(params![
                record.session_name,
                record.event_type,
                record.payload,
                record.recorded_at
            ]) {
                Ok(_) => count += 1,
                Err(e) => warn!(
                    component = "activity_log",
                    event = "activity.insert_failed",
                    session_name = %record.session_name,
                    error = %e,
                    "Failed to insert activity row"
                ),
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Current time as an ISO 8601 UTC string with millisecond precision.
pub fn iso8601_now() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    iso8601_from_millis(millis)
}

pub fn iso8601_from_millis(millis: u64) -> String {
    let secs = millis / 1000;
    let days = (secs / 86_400) as i64;
    let time_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
        millis % 1000
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
