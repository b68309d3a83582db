use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::CounterService;
use crate::domain::{Counter, CounterId};

/// Tally - Habit Counter Ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "A local-first habit counter backed by an append-only event ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "tally.db")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Create a new counter
    Create {
        /// Counter name (must be unique)
        name: String,

        /// Unit label for what is being counted (e.g. "glasses")
        unit: String,

        /// Amount applied when inc/dec omit an explicit amount
        #[arg(short = 'a', long, default_value = "1")]
        default_amount: i64,
    },

    /// List all counters
    List,

    /// Show detailed counter information
    Show {
        /// Counter ID
        id: String,
    },

    /// Update a counter's name, unit or default amount
    Update {
        /// Counter ID
        id: String,

        /// New counter name
        #[arg(short, long)]
        name: String,

        /// New unit label
        #[arg(short, long)]
        unit: String,

        /// New default amount
        #[arg(short = 'a', long)]
        default_amount: i64,
    },

    /// Delete a counter (its event history is retained)
    Delete {
        /// Counter ID
        id: String,
    },

    /// Increment a counter
    Inc {
        /// Counter ID
        id: String,

        /// Amount to add (defaults to the counter's default amount)
        amount: Option<i64>,

        /// Date the change occurred (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Decrement a counter
    Dec {
        /// Counter ID
        id: String,

        /// Amount to subtract (defaults to the counter's default amount)
        amount: Option<i64>,

        /// Date the change occurred (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the event history for a counter
    History {
        /// Counter ID
        id: String,
    },

    /// Verify that every counter value matches its event ledger
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: counters, events, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                CounterService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Create {
                name,
                unit,
                default_amount,
            } => {
                let service = CounterService::connect(&self.database).await?;
                let counter = service
                    .create_counter(&name, &unit, Some(default_amount))
                    .await?;
                println!(
                    "Created counter: {} ({}) [{}]",
                    counter.name, counter.unit, counter.id
                );
            }

            Commands::List => {
                let service = CounterService::connect(&self.database).await?;
                let counters = service.list_counters().await?;
                if counters.is_empty() {
                    println!("No counters found.");
                } else {
                    println!("{:<20} {:<12} {:>10}  ID", "NAME", "UNIT", "VALUE");
                    println!("{}", "-".repeat(82));
                    for counter in counters {
                        println!(
                            "{:<20} {:<12} {:>10}  {}",
                            truncate(&counter.name, 20),
                            truncate(&counter.unit, 12),
                            counter.value,
                            counter.id
                        );
                    }
                }
            }

            Commands::Show { id } => {
                let service = CounterService::connect(&self.database).await?;
                let info = service.counter_info(parse_id(&id)?).await?;
                let counter = &info.counter;

                println!("Counter: {}", counter.name);
                println!("  ID:             {}", counter.id);
                println!("  Unit:           {}", counter.unit);
                println!("  Value:          {}", counter.value);
                println!("  Default amount: {}", counter.default_amount);
                println!(
                    "  Created:        {}",
                    counter.created_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!("  Events:         {}", info.event_count);
                if let Some(last) = info.last_activity {
                    println!("  Last activity:  {}", last.format("%Y-%m-%d %H:%M:%S"));
                }
            }

            Commands::Update {
                id,
                name,
                unit,
                default_amount,
            } => {
                let service = CounterService::connect(&self.database).await?;
                let counter = service
                    .update_counter(parse_id(&id)?, &name, &unit, default_amount)
                    .await?;
                println!("Updated counter: {} ({})", counter.name, counter.unit);
            }

            Commands::Delete { id } => {
                let service = CounterService::connect(&self.database).await?;
                service.delete_counter(parse_id(&id)?).await?;
                println!("Deleted counter: {}", id);
            }

            Commands::Inc { id, amount, date } => {
                let service = CounterService::connect(&self.database).await?;
                let occurred_at = parse_optional_date(date)?;
                let counter = service
                    .increment(parse_id(&id)?, amount, occurred_at)
                    .await?;
                print_new_value(&counter);
            }

            Commands::Dec { id, amount, date } => {
                let service = CounterService::connect(&self.database).await?;
                let occurred_at = parse_optional_date(date)?;
                let counter = service
                    .decrement(parse_id(&id)?, amount, occurred_at)
                    .await?;
                print_new_value(&counter);
            }

            Commands::History { id } => {
                let service = CounterService::connect(&self.database).await?;
                let counter_id = parse_id(&id)?;
                let counter = service.get_counter(counter_id).await?;
                let events = service.counter_history(counter_id).await?;

                if events.is_empty() {
                    println!("No events recorded for '{}'.", counter.name);
                } else {
                    println!("History for '{}' ({} {}):", counter.name, counter.value, counter.unit);
                    println!("{:<22} {:>8}  RECORDED", "OCCURRED", "DELTA");
                    println!("{}", "-".repeat(54));
                    for event in events {
                        println!(
                            "{:<22} {:>+8}  {}",
                            event.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            event.delta,
                            event.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }

            Commands::Check => {
                let service = CounterService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = CounterService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_check_command(service: &CounterService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Counters: {}", report.counter_count);
    println!("Events:   {}", report.event_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &CounterService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "counters" => {
            let count = exporter.export_counters_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} counters", count);
            }
        }
        "events" => {
            let count = exporter.export_events_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} events", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} counters, {} events",
                    snapshot.counters.len(),
                    snapshot.events.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: counters, events, full",
                export_type
            );
        }
    }

    Ok(())
}

fn print_new_value(counter: &Counter) {
    println!("{}: {} {}", counter.name, counter.value, counter.unit);
}

fn parse_id(id: &str) -> Result<CounterId> {
    Uuid::parse_str(id).context("Invalid counter ID format (expected UUID)")
}

fn parse_optional_date(date: Option<String>) -> Result<Option<DateTime<Utc>>> {
    date.as_deref()
        .map(|s| {
            parse_date(s).with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", s))
        })
        .transpose()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}
