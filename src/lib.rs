// src/lib.rs
// DAT Parser Library - Public API

//! # DAT Parser
//!
//! Converts fixed-layout binary record files, as written by embedded
//! data-acquisition hardware, into comma-separated text tables.
//!
//! ## Features
//!
//! - Columns of 1 to 8 bytes, read as raw counters or scaled to voltages
//! - Optional byte-order swap
//! - Row decimation ("keep 1 in N") to stay under spreadsheet row limits
//! - Short final records are kept and zero-padded
//! - Cooperative cancellation; a cancelled run leaves no output behind
//! - JSON settings file with recently used paths and column layout
//!
//! ## Example
//!
//! ```no_run
//! use dat_parser::{
//!     CancelToken, Column, ColumnLayout, ColumnMode, ConversionEngine, ConversionParameters,
//! };
//!
//! let layout = ColumnLayout::new(vec![
//!     Column::new(4, ColumnMode::Counter, "Ticks"),
//!     Column::new(2, ColumnMode::Voltage, "Sensor"),
//! ])?;
//! let params = ConversionParameters {
//!     row_cap: dat_parser::ROW_LIMIT_CALC,
//!     ..ConversionParameters::default()
//! };
//!
//! let rows = ConversionEngine::new(&layout, &params)
//!     .convert_file("capture.dat", "capture.csv", &CancelToken::new())?;
//! println!("Wrote {} rows", rows);
//! # Ok::<(), dat_parser::ConversionError>(())
//! ```

mod decimator;
mod decoder;
mod engine;
mod error;
mod layout;
mod settings;

pub use decimator::{
    parse_row_limit, retained_rows, stride, ROW_LIMIT_CALC, ROW_LIMIT_EXCEL, ROW_LIMIT_NONE,
    ROW_LIMIT_PRESETS, ROW_LIMIT_QUATTRO,
};
pub use decoder::{
    check_voltage_range, decode, format_field, format_significant, max_raw, to_voltage,
    VOLTAGE_PRECISION,
};
pub use engine::{
    plan, CancelToken, ConversionEngine, ConversionParameters, RunPlan, CHECK_INTERVAL,
};
pub use error::{ConversionError, Result, SettingsError};
pub use layout::{
    sanitize_column_name, Column, ColumnLayout, ColumnMode, MAX_COLUMNS, MAX_COLUMN_BYTES,
};
pub use settings::{ColumnSettings, Settings, MAX_RECENT_PATHS};
