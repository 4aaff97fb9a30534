// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Solwatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz


//! Time-series sink writing to InfluxDB 1.x through the `influxdb` client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use influxdb::{Client, Error as InfluxError, InfluxDbWriteable, ReadQuery, Timestamp, Type, WriteQuery};
use solwatch_core::{FieldValue, NormalizedRecord, SinkError, TimeSeriesSink};
use tokio::time::timeout;

const DATABASE_NOT_FOUND: &str = "database not found";

pub struct InfluxSink {
    client: Client,
    timeout: Duration,
}

impl fmt::Debug for InfluxSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSink")
            .field("url", &self.client.database_url())
            .field("database", &self.client.database_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl InfluxSink {
    pub fn new(url: &str, database: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(url.trim_end_matches('/'), database),
            timeout,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.client = self.client.with_auth(username, password);
        self
    }

    async fn send<Q>(&self, query: Q) -> Result<String, SinkError>
    where
        Q: influxdb::Query,
    {
        match timeout(self.timeout, self.client.query(query)).await {
            Ok(result) => result.map_err(|e| into_sink_error(&e)),
            Err(_) => Err(SinkError::Transport(format!(
                "no response from InfluxDB within {:?}",
                self.timeout
            ))),
        }
    }
}

/// Builds a second-precision write for one record, or `None` when nothing is writable.
fn to_write_query(record: &NormalizedRecord) -> Option<WriteQuery> {
    let Ok(seconds) = u128::try_from(record.timestamp.timestamp()) else {
        tracing::warn!("Dropping {} record with pre-epoch timestamp {}", record.measurement, record.timestamp);
        return None;
    };

    let mut fields = record.fields.iter().filter_map(|(name, value)| match value {
        FieldValue::Number(n) if !n.is_finite() => None,
        FieldValue::Number(n) => Some((name, Type::Float(*n))),
        FieldValue::Bool(b) => Some((name, Type::Boolean(*b))),
        FieldValue::Text(s) => Some((name, Type::Text(s.clone()))),
    });

    let (first_name, first_value) = fields.next()?;
    let mut query = Timestamp::Seconds(seconds)
        .into_query(record.measurement.as_str())
        .add_field(first_name.as_str(), first_value);
    for (name, value) in fields {
        query = query.add_field(name.as_str(), value);
    }
    for (tag, value) in &record.tags {
        if !value.is_empty() {
            query = query.add_tag(tag.as_str(), value.as_str());
        }
    }
    Some(query)
}

fn into_sink_error(error: &InfluxError) -> SinkError {
    if let InfluxError::ConnectionError { error } = error {
        return SinkError::Transport(error.clone());
    }
    if let InfluxError::DatabaseError { error } = error
        && error.contains(DATABASE_NOT_FOUND)
    {
        return SinkError::MissingStorage(error.clone());
    }
    SinkError::Write(error.to_string())
}

#[async_trait]
impl TimeSeriesSink for InfluxSink {
    async fn write_batch(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        let queries: Vec<WriteQuery> = records.iter().filter_map(to_write_query).collect();
        if queries.is_empty() {
            return Ok(());
        }

        let count = queries.len();
        self.send(queries).await?;
        tracing::trace!("InfluxDB accepted {count} points");
        Ok(())
    }

    async fn create_storage(&self) -> Result<(), SinkError> {
        let database = self.client.database_name().replace('"', "\\\"");
        tracing::info!("Creating InfluxDB database {database}");
        self.send(ReadQuery::new(format!("CREATE DATABASE \"{database}\"")))
            .await
            .map(drop)
    }
}
