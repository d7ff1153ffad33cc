//! Output formatting for mmcd (table, json, csv)

use std::io::{self, BufRead, Write};

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
    /// Skip confirmation prompts
    pub assume_yes: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool, assume_yes: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self {
            format,
            quiet,
            assume_yes,
        }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Ask a yes/no question on the terminal, `--yes` answers for the user
    pub fn confirm(&self, question: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        eprint!("{} [y/N] ", question.bold());
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                let headers: Vec<String> =
                    T::headers().into_iter().map(|h| h.into_owned()).collect();
                let rows: Vec<Vec<String>> = data
                    .iter()
                    .map(|row| row.fields().into_iter().map(|f| f.into_owned()).collect())
                    .collect();
                print_csv(&headers, &rows);
            }
        }
    }

    /// Print a single serializable value (json) or key-value pairs (table, csv)
    pub fn print_kv<T: Serialize>(&self, pairs: &[(&str, String)], value: &T) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
                let values: Vec<String> = pairs.iter().map(|(_, v)| v.clone()).collect();
                print_csv(&keys, &[values]);
            }
        }
    }

    /// Print rows whose columns are only known at runtime
    pub fn print_grid(&self, headers: &[String], rows: &[Vec<String>]) {
        match self.format {
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(headers.iter().cloned());
                for row in rows {
                    builder.push_record(row.iter().cloned());
                }
                println!("{}", builder.build());
            }
            OutputFormat::Json => {
                let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
                    .iter()
                    .map(|row| {
                        headers
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned().map(serde_json::Value::String))
                            .collect()
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&objects).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print_csv(headers, rows),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Print data as CSV
fn print_csv(headers: &[String], rows: &[Vec<String>]) {
    let line = |fields: &[String]| {
        fields
            .iter()
            .map(|f| escape_csv(f))
            .collect::<Vec<_>>()
            .join(",")
    };
    println!("{}", line(headers));
    for row in rows {
        println!("{}", line(row));
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Sensor display for sensors command
#[derive(Debug, Tabled, Serialize)]
pub struct SensorRow {
    #[tabled(rename = "Slot")]
    pub slot: usize,
    #[tabled(rename = "Addr")]
    pub address: String,
    #[tabled(rename = "Slug")]
    pub slug: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
}

/// Fault display for dtc command
#[derive(Debug, Tabled, Serialize)]
pub struct DtcRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Active")]
    pub active: String,
    #[tabled(rename = "Stored")]
    pub stored: String,
}

/// Actuator display for test command
#[derive(Debug, Tabled, Serialize)]
pub struct ActuatorRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Cmd")]
    pub command: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Engine off")]
    pub engine_off: String,
}

/// Serial port display for ports command
#[derive(Debug, Tabled, Serialize)]
pub struct PortRow {
    #[tabled(rename = "Port")]
    pub port: String,
}
