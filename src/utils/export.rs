//! export.rs
//! History log written when the loop terminates.
//!
//! - Minimal: `elapsed_time,heater_command,measured_temperature,setpoint`, one row per cycle.
//! - Detailed: the minimal columns followed by both model predictions and the three
//!   cumulative error series.

use csv::Writer;
use log::info;
use serde::Serialize;
use std::{
    fs::{File, create_dir_all},
    io::{BufWriter, Write},
    path::Path,
};

use crate::control::state::{CycleRecord, History};
use crate::error::LoopResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFormat {
    #[default]
    Minimal,
    Detailed,
}

#[derive(Serialize)]
struct MinimalRow {
    elapsed_time: f64,
    heater_command: f64,
    measured_temperature: f64,
    setpoint: f64,
}

#[derive(Serialize)]
struct DetailedRow {
    elapsed_time: f64,
    heater_command: f64,
    measured_temperature: f64,
    setpoint: f64,
    energy_balance_prediction: f64,
    fopdt_prediction: f64,
    energy_balance_error: f64,
    fopdt_error: f64,
    setpoint_error: f64,
}

impl DetailedRow {
    fn new(r: CycleRecord, setpoint: f64) -> Self {
        Self {
            elapsed_time: r.elapsed_time,
            heater_command: r.heater_command,
            measured_temperature: r.measured_temperature,
            setpoint,
            energy_balance_prediction: r.energy_balance_prediction,
            fopdt_prediction: r.fopdt_prediction,
            energy_balance_error: r.energy_balance_error,
            fopdt_error: r.fopdt_error,
            setpoint_error: r.setpoint_error,
        }
    }
}

/// Serialize `history` as CSV (header included) into any writer.
pub fn write_history<W: Write>(
    out: W,
    history: &History,
    setpoint: f64,
    format: HistoryFormat,
) -> LoopResult<()> {
    let mut wtr = Writer::from_writer(out);
    for r in history.records() {
        match format {
            HistoryFormat::Minimal => wtr.serialize(MinimalRow {
                elapsed_time: r.elapsed_time,
                heater_command: r.heater_command,
                measured_temperature: r.measured_temperature,
                setpoint,
            })?,
            HistoryFormat::Detailed => wtr.serialize(DetailedRow::new(r, setpoint))?,
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Write the history file at `path`, creating parent directories as needed.
pub fn export_history(
    path: &Path,
    history: &History,
    setpoint: f64,
    format: HistoryFormat,
) -> LoopResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let file = BufWriter::new(File::create(path)?);
    write_history(file, history, setpoint, format)?;
    info!(
        "[Export] {} rows of history written to {}",
        history.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> History {
        let mut h = History::default();
        for i in 0..3 {
            h.push(CycleRecord {
                elapsed_time: i as f64,
                measured_temperature: 23.0 + i as f64,
                heater_command: 50.0,
                energy_balance_prediction: 23.5,
                fopdt_prediction: 23.25,
                energy_balance_error: 0.0,
                fopdt_error: 0.0,
                setpoint_error: 0.0,
            });
        }
        h
    }

    #[test]
    fn minimal_format_has_four_columns() {
        let mut buf = Vec::new();
        write_history(&mut buf, &history(), 34.0, HistoryFormat::Minimal).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "elapsed_time,heater_command,measured_temperature,setpoint"
        );
        assert_eq!(lines[2], "1.0,50.0,24.0,34.0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn detailed_format_appends_model_columns() {
        let mut buf = Vec::new();
        write_history(&mut buf, &history(), 34.0, HistoryFormat::Detailed).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("elapsed_time,heater_command,measured_temperature,setpoint,"));
        assert!(header.ends_with("energy_balance_error,fopdt_error,setpoint_error"));
    }

    #[test]
    fn export_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("thermal-rts-export-{}", std::process::id()));
        let path = dir.join("nested").join("history.csv");
        export_history(&path, &history(), 34.0, HistoryFormat::Minimal).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
