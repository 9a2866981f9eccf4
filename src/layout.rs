// Column layout of one binary record

use crate::error::{ConversionError, Result};

/// Widest column the decoder can widen into a `u64`.
pub const MAX_COLUMN_BYTES: u8 = 8;

/// Most columns a layout may describe.
pub const MAX_COLUMNS: usize = 255;

/// Characters that would break an unquoted CSV header.
const FORBIDDEN_NAME_CHARS: [char; 3] = ['\\', '"', ','];

/// How a column's raw integer is written to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnMode {
    /// Raw unsigned integer, printed verbatim.
    Counter,
    /// Raw integer mapped linearly onto the configured voltage range.
    #[default]
    Voltage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub byte_width: u8,
    pub mode: ColumnMode,
    pub display_name: String,
}

impl Column {
    pub fn new(byte_width: u8, mode: ColumnMode, display_name: impl Into<String>) -> Self {
        Column {
            byte_width,
            mode,
            display_name: display_name.into(),
        }
    }
}

/// Ordered columns of a record. Order is both byte offset order and output order.
///
/// Immutable once built; the only way to get one is through [`ColumnLayout::new`],
/// so every layout in circulation has widths in `1..=8` and at least one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
    record_size: usize,
}

impl ColumnLayout {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(ConversionError::InvalidLayout(
                "at least one column is required".to_string(),
            ));
        }
        if columns.len() > MAX_COLUMNS {
            return Err(ConversionError::InvalidLayout(format!(
                "{} columns given, at most {} are supported",
                columns.len(),
                MAX_COLUMNS
            )));
        }

        for (index, column) in columns.iter().enumerate() {
            if column.byte_width == 0 || column.byte_width > MAX_COLUMN_BYTES {
                return Err(ConversionError::InvalidLayout(format!(
                    "column {} is {} bytes wide, expected 1 to {}",
                    index + 1,
                    column.byte_width,
                    MAX_COLUMN_BYTES
                )));
            }
            if column.display_name.contains(&FORBIDDEN_NAME_CHARS[..]) {
                return Err(ConversionError::InvalidLayout(format!(
                    "column {} name {:?} contains a comma, quote or backslash",
                    index + 1,
                    column.display_name
                )));
            }
        }

        let record_size = columns.iter().map(|c| c.byte_width as usize).sum();
        Ok(ColumnLayout {
            columns,
            record_size,
        })
    }

    /// Bytes per input record.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Byte offset of each column inside a record, paired with the column.
    pub fn spans(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.columns.iter().scan(0usize, |offset, column| {
            let start = *offset;
            *offset += column.byte_width as usize;
            Some((start, column))
        })
    }

    /// Comma-joined display names, used as the header line.
    pub fn header_line(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.display_name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Strip the characters a header field may not contain and trim whitespace.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_NAME_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}
