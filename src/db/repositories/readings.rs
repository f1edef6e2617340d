use anyhow::{anyhow, Context, Result};
use rusqlite::{params, types::Value, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{coerce_count, parse_datetime, to_i64},
    models::{Category, NewReading, Reading},
};
use crate::error::MonitorError;
use crate::monitor::{FetchedBatch, ReadingRepository};

/// Column values as SQLite hands them back, before any coercion.
struct RawRow {
    id: Option<i64>,
    timestamp: Value,
    count: Value,
    count_60s: Value,
    stored_count_60s: Value,
    prediction: Value,
}

fn read_raw(row: &Row) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        count: row.get(2)?,
        count_60s: row.get(3)?,
        stored_count_60s: row.get(4)?,
        prediction: row.get(5)?,
    })
}

fn malformed(id: Option<i64>, field: &'static str, err: anyhow::Error) -> MonitorError {
    MonitorError::MalformedReading {
        id,
        field,
        reason: err.to_string(),
    }
}

fn decode_row(raw: RawRow) -> Result<Reading, MonitorError> {
    let id = raw
        .id
        .ok_or_else(|| malformed(None, "id", anyhow!("is missing")))?;

    let timestamp = match &raw.timestamp {
        Value::Text(text) => parse_datetime(text, "timestamp")
            .map_err(|err| malformed(Some(id), "timestamp", err))?,
        _ => return Err(malformed(Some(id), "timestamp", anyhow!("is not text"))),
    };

    let count = coerce_count(&raw.count).map_err(|err| malformed(Some(id), "count", err))?;
    let count_60s =
        coerce_count(&raw.count_60s).map_err(|err| malformed(Some(id), "count_60s", err))?;
    let stored_count_60s = coerce_count(&raw.stored_count_60s)
        .map_err(|err| malformed(Some(id), "stored_count_60s", err))?;

    let prediction = match &raw.prediction {
        Value::Null => None,
        Value::Text(text) if text.trim().is_empty() => None,
        Value::Text(text) => Some(
            text.trim()
                .parse::<Category>()
                .map_err(|err| malformed(Some(id), "prediction", err))?,
        ),
        _ => return Err(malformed(Some(id), "prediction", anyhow!("is not text"))),
    };

    Ok(Reading {
        id,
        timestamp,
        count,
        count_60s,
        stored_count_60s,
        prediction,
    })
}

impl Database {
    pub async fn insert_reading(&self, reading: &NewReading) -> Result<i64> {
        let record = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (timestamp, count, count_60s, stored_count_60s)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.timestamp.to_rfc3339(),
                    to_i64(u64::from(record.count))?,
                    to_i64(u64::from(record.count_60s))?,
                    to_i64(u64::from(record.stored_count_60s))?,
                ],
            )
            .context("failed to insert reading")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Most recent rows, newest first. Rows that fail to decode are returned
    /// separately instead of failing the whole batch.
    pub async fn get_recent_readings(&self, limit: usize) -> Result<FetchedBatch> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, count, count_60s, stored_count_60s, prediction
                 FROM readings
                 ORDER BY julianday(timestamp) DESC, id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut batch = FetchedBatch::default();
            while let Some(row) = rows.next()? {
                match decode_row(read_raw(row)?) {
                    Ok(reading) => batch.readings.push(reading),
                    Err(err) => batch.rejected.push(err),
                }
            }

            // julianday() is NULL for unparseable text; those rows sort last.
            batch
                .readings
                .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
            Ok(batch)
        })
        .await
    }

    /// Writes `label` only if the row has no label yet. Returns whether a row
    /// changed; an already-labelled row is a successful no-op.
    pub async fn set_prediction_if_absent(&self, id: i64, label: Category) -> Result<bool> {
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE readings SET prediction = ?1 WHERE id = ?2 AND prediction IS NULL",
                    params![label.as_str(), id],
                )
                .context("failed to update prediction")?;

            if changed == 0 {
                let exists: Option<i64> = conn
                    .query_row("SELECT id FROM readings WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if exists.is_none() {
                    return Err(anyhow!("reading {id} does not exist"));
                }
            }

            Ok(changed > 0)
        })
        .await
    }
}

impl ReadingRepository for Database {
    async fn fetch_recent(&self, limit: usize) -> Result<FetchedBatch, MonitorError> {
        self.get_recent_readings(limit)
            .await
            .map_err(MonitorError::repository)
    }

    async fn update_classification(&self, id: i64, label: Category) -> Result<(), MonitorError> {
        self.set_prediction_if_absent(id, label)
            .await
            .map(|_| ())
            .map_err(|err| MonitorError::PersistenceFailure {
                id,
                reason: format!("{err:#}"),
            })
    }
}
