use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use malstack_encoding::StreamFactory;
use malstack_message::Message;
use malstack_transport::{standard, TransmitError};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Printable view of a message header.
#[derive(Debug, Serialize)]
pub struct MessageSummary {
    pub from: String,
    pub to: String,
    pub interaction: String,
    pub stage: u8,
    pub transaction_id: i64,
    pub area: u16,
    pub service: u16,
    pub operation: u16,
    pub version: u8,
    pub qos: String,
    pub priority: u32,
    pub session: String,
    pub timestamp_ms: u64,
    pub is_error: bool,
    pub body_size: usize,
}

impl MessageSummary {
    pub fn new(message: &Message, factory: &StreamFactory) -> Self {
        let header = message.header();
        let fields = header.fields();
        Self {
            from: header.uri_from().to_string(),
            to: header.uri_to().to_string(),
            interaction: header.interaction_type().to_string(),
            stage: header.interaction_stage(),
            transaction_id: header.transaction_id(),
            area: fields.service_area,
            service: fields.service,
            operation: fields.operation,
            version: fields.service_version,
            qos: fields.qos_level.to_string(),
            priority: fields.priority,
            session: fields.session.to_string(),
            timestamp_ms: fields.timestamp.as_millis(),
            is_error: header.is_error(),
            body_size: message
                .encoded_body(factory)
                .map(|body| body.len())
                .unwrap_or(0),
        }
    }
}

pub fn print_message(summary: &MessageSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FROM", "TO", "INTERACTION", "TXN", "SERVICE", "BODY"])
                .add_row(vec![
                    summary.from.clone(),
                    summary.to.clone(),
                    format!("{}/{}", summary.interaction, summary.stage),
                    summary.transaction_id.to_string(),
                    format!(
                        "{}.{}.{} v{}",
                        summary.area, summary.service, summary.operation, summary.version
                    ),
                    summary.body_size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "{} -> {} {}/{} txn={} service={}.{}.{} v{} error={} body={}B",
            summary.from,
            summary.to,
            summary.interaction,
            summary.stage,
            summary.transaction_id,
            summary.area,
            summary.service,
            summary.operation,
            summary.version,
            summary.is_error,
            summary.body_size
        ),
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub transaction_id: i64,
    pub to: String,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_number: Option<u32>,
}

impl SendOutcome {
    pub fn delivered(transaction_id: i64, to: &str) -> Self {
        Self {
            transaction_id,
            to: to.to_string(),
            sent: true,
            error: None,
            error_number: None,
        }
    }

    pub fn failed(transaction_id: i64, to: &str, err: &TransmitError) -> Self {
        Self {
            transaction_id,
            to: to.to_string(),
            sent: false,
            error: Some(standard::name(err.number).to_string()),
            error_number: Some(err.number),
        }
    }
}

pub fn print_outcomes(outcomes: &[SendOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for outcome in outcomes {
                println!(
                    "{}",
                    serde_json::to_string(outcome).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TXN", "TO", "RESULT"]);
            for outcome in outcomes {
                table.add_row(vec![
                    outcome.transaction_id.to_string(),
                    outcome.to.clone(),
                    outcome.error.clone().unwrap_or_else(|| "SENT".to_string()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for outcome in outcomes {
                println!(
                    "txn={} to={} {}",
                    outcome.transaction_id,
                    outcome.to,
                    outcome.error.as_deref().unwrap_or("sent")
                );
            }
        }
    }
}
