use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::CounterService;
use crate::domain::{Counter, CounterEvent};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub counters: Vec<Counter>,
    pub events: Vec<CounterEvent>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a CounterService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CounterService) -> Self {
        Self { service }
    }

    /// Export active counters to CSV format
    pub async fn export_counters_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let counters = self.service.list_counters().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "name", "unit", "value", "default_amount", "created_at"])?;

        let mut count = 0;
        for counter in &counters {
            csv_writer.write_record([
                counter.id.to_string(),
                counter.name.clone(),
                counter.unit.clone(),
                counter.value.to_string(),
                counter.default_amount.to_string(),
                counter.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the full event ledger to CSV format. Counter names are
    /// resolved for readability; events of deleted counters are included.
    pub async fn export_events_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let counters = self.service.all_counters().await?;
        let events = self.service.all_events().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "counter", "delta", "occurred_at", "created_at"])?;

        let mut count = 0;
        for event in &events {
            let counter_name = counters
                .iter()
                .find(|c| c.id == event.counter_id)
                .map(|c| c.name.as_str())
                .unwrap_or("?");

            csv_writer.write_record([
                event.id.to_string(),
                counter_name.to_string(),
                event.delta.to_string(),
                event.occurred_at.to_rfc3339(),
                event.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the full database (counters including deleted ones, plus all
    /// events) as JSON.
    pub async fn export_full_json<W: Write>(&self, writer: W) -> Result<DatabaseSnapshot> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            counters: self.service.all_counters().await?,
            events: self.service.all_events().await?,
        };

        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}
