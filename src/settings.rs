// Persisted settings: recent paths, row limit, columns and voltage options

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::decimator::parse_row_limit;
use crate::engine::ConversionParameters;
use crate::error::{Result, SettingsError};
use crate::layout::{sanitize_column_name, Column, ColumnLayout, ColumnMode};

/// Entries kept in each recent-path list.
pub const MAX_RECENT_PATHS: usize = 10;

/// One column as stored in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSettings {
    pub name: String,
    #[serde(default = "default_column_bytes")]
    pub bytes: u8,
    /// Counter columns are written as raw integers, the rest as voltages.
    #[serde(default)]
    pub counter: bool,
}

fn default_column_bytes() -> u8 {
    1
}

impl ColumnSettings {
    fn to_column(&self) -> Column {
        let mode = if self.counter {
            ColumnMode::Counter
        } else {
            ColumnMode::Voltage
        };
        Column::new(self.bytes, mode, sanitize_column_name(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recently used input files, most recent first.
    pub input_paths: Vec<PathBuf>,
    /// Recently used output files, most recent first.
    pub output_paths: Vec<PathBuf>,
    /// Row limit text; only its leading digits count.
    pub row_limit: String,
    pub columns: Vec<ColumnSettings>,
    pub byte_swap: bool,
    pub voltage_min: f64,
    pub voltage_max: f64,
    pub write_header: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let params = ConversionParameters::default();
        Settings {
            input_paths: Vec::new(),
            output_paths: Vec::new(),
            row_limit: "0".to_string(),
            columns: Vec::new(),
            byte_swap: params.byte_swap,
            voltage_min: params.voltage_min,
            voltage_max: params.voltage_max,
            write_header: params.emit_header_row,
        }
    }
}

impl Settings {
    /// Read the settings file, writing a default one if it does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> std::result::Result<Self, SettingsError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loaded settings from {}", path.display());
                serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Settings file {} not found, creating it", path.display());
                let settings = Settings::default();
                settings.save(path)?;
                Ok(settings)
            }
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), SettingsError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn remember_input<P: Into<PathBuf>>(&mut self, path: P) {
        push_recent(&mut self.input_paths, path.into());
    }

    pub fn remember_output<P: Into<PathBuf>>(&mut self, path: P) {
        push_recent(&mut self.output_paths, path.into());
    }

    pub fn row_cap(&self) -> u64 {
        parse_row_limit(&self.row_limit)
    }

    /// Resolve the stored columns into a layout.
    pub fn layout(&self) -> Result<ColumnLayout> {
        ColumnLayout::new(self.columns.iter().map(ColumnSettings::to_column).collect())
    }

    /// Store `layout` as the column list.
    pub fn set_layout(&mut self, layout: &ColumnLayout) {
        self.columns = layout
            .columns()
            .iter()
            .map(|c| ColumnSettings {
                name: c.display_name.clone(),
                bytes: c.byte_width,
                counter: c.mode == ColumnMode::Counter,
            })
            .collect();
    }

    pub fn parameters(&self) -> ConversionParameters {
        ConversionParameters {
            row_cap: self.row_cap(),
            byte_swap: self.byte_swap,
            voltage_min: self.voltage_min,
            voltage_max: self.voltage_max,
            emit_header_row: self.write_header,
        }
    }
}

fn push_recent(list: &mut Vec<PathBuf>, path: PathBuf) {
    list.retain(|p| p != &path);
    list.insert(0, path);
    list.truncate(MAX_RECENT_PATHS);
}
