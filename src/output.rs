use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::board::Board;
use crate::error::Result;
use crate::model::{HistoryEntry, Phase, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn phase_text(phase: Phase) -> String {
    match phase {
        Phase::Orphaned => phase.slug().red().bold().to_string(),
        Phase::Done => phase.slug().green().to_string(),
        _ => phase.slug().cyan().to_string(),
    }
}

pub fn print_property(property: &Property, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(property)?,
        Format::Pretty => {
            println!(
                "[{}] {} ({})",
                property.unique_id.bold(),
                property.address.as_deref().unwrap_or("no address"),
                phase_text(property.phase)
            );
            println!("  id: {}", property.id);
            if let Some(ref status) = property.set_up_status {
                println!("  crm status: {status}");
            }
            if let Some(ref area) = property.area {
                println!("  area: {area}");
            }
            if let Some(ref renovator) = property.renovator {
                println!("  renovator: {renovator}");
            }
            if let Some(ref constructor) = property.technical_constructor {
                println!("  technical constructor: {constructor}");
            }
            if let Some(date) = property.estimated_visit_date {
                println!("  estimated visit: {date}");
            }
        }
        Format::Minimal => println!("{}", minimal_row(property)),
    }
    Ok(())
}

fn minimal_row(property: &Property) -> String {
    format!(
        "{:12} {:24} {:20} {}",
        truncate(&property.unique_id, 12),
        property.phase.slug(),
        truncate(property.address.as_deref().unwrap_or("-"), 20),
        property.renovator.as_deref().unwrap_or("-")
    )
}

pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

pub fn print_properties(properties: &[Property], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(properties)?,
        Format::Pretty => {
            for property in properties {
                print_property(property, Format::Pretty)?;
                println!();
            }
        }
        Format::Minimal => {
            println!("{:12} {:24} {:20} RENOVATOR", "UNIQUE ID", "PHASE", "ADDRESS");
            println!("{}", "-".repeat(70));
            for property in properties {
                println!("{}", minimal_row(property));
            }
        }
    }
    Ok(())
}

pub fn print_board(board: &Board, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(board)?,
        Format::Pretty => {
            for column in &board.columns {
                println!(
                    "{} ({})",
                    column.label.bold(),
                    column.properties.len()
                );
                for property in &column.properties {
                    println!(
                        "  {}  {}",
                        property.unique_id,
                        property.address.as_deref().unwrap_or("")
                    );
                }
            }
            if !board.orphaned.is_empty() {
                println!();
                println!(
                    "{} ({})",
                    "Orphaned".red().bold(),
                    board.orphaned.len()
                );
                for property in &board.orphaned {
                    println!(
                        "  {}  status: {}",
                        property.unique_id,
                        property.set_up_status.as_deref().unwrap_or("<empty>")
                    );
                }
            }
        }
        Format::Minimal => {
            for column in &board.columns {
                println!("{:24} {}", column.phase.slug(), column.properties.len());
            }
            println!("{:24} {}", Phase::Orphaned.slug(), board.orphaned.len());
        }
    }
    Ok(())
}

pub fn print_history(unique_id: &str, entries: &[HistoryEntry], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(&serde_json::json!({
            "unique_id": unique_id,
            "history": entries,
        }))?,
        _ => {
            for entry in entries {
                let from = entry.from.map(|p| p.slug()).unwrap_or("-");
                let note = entry
                    .note
                    .as_deref()
                    .map(|n| format!("  ({n})"))
                    .unwrap_or_default();
                println!(
                    "{}  {} -> {}  [{}]{}",
                    entry.at.format("%Y-%m-%d %H:%M:%S"),
                    from,
                    entry.to.slug(),
                    entry.source,
                    note
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("SP-1", 12), "SP-1");
        assert_eq!(truncate("Calle de Alcalá 123", 10), "Calle d...");
    }
}
