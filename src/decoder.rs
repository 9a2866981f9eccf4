// Value decoding: raw column bytes -> u64 -> optional voltage

use crate::error::{ConversionError, Result};
use crate::layout::{Column, ColumnMode, MAX_COLUMN_BYTES};

/// Significant digits used when printing voltages.
pub const VOLTAGE_PRECISION: usize = 15;

/// Decode one column's bytes into an unsigned integer.
///
/// The bytes are placed in the low-order end of a zeroed 8-byte container.
/// Without swapping they are read least-significant first. With swapping the
/// whole container is reversed and shifted right by the unused bytes, which
/// reads the column most-significant first.
///
/// ```text
/// 000000000000AA80  wanted
/// 00000000000080AA  raw column bytes 80 AA in the container
/// AA80000000000000  after reversing all 8 bytes
/// 000000000000AA80  after shifting right (8 - 2) * 8 bits
/// ```
///
/// `raw` longer than 8 bytes is cut to its first 8.
pub fn decode(raw: &[u8], byte_swap: bool) -> u64 {
    let width = raw.len().min(MAX_COLUMN_BYTES as usize);
    if width == 0 {
        return 0;
    }

    let mut container = [0u8; 8];
    container[..width].copy_from_slice(&raw[..width]);
    let value = u64::from_le_bytes(container);

    if byte_swap {
        value.swap_bytes() >> ((8 - width) * 8)
    } else {
        value
    }
}

/// Largest raw value a column of `byte_width` bytes can hold.
pub fn max_raw(byte_width: u8) -> u64 {
    match byte_width {
        0 => 0,
        w if w >= MAX_COLUMN_BYTES => u64::MAX,
        w => (1u64 << (u32::from(w) * 8)) - 1,
    }
}

/// Map a raw value linearly from `[0, max_raw]` onto `[v_min, v_max]`.
///
/// Both ends of the raw range land exactly on the configured voltages.
pub fn to_voltage(value: u64, byte_width: u8, v_min: f64, v_max: f64) -> Result<f64> {
    check_voltage_range(v_min, v_max)?;
    if byte_width == 0 || byte_width > MAX_COLUMN_BYTES {
        return Err(ConversionError::InvalidLayout(format!(
            "column width {} outside 1 to {}",
            byte_width, MAX_COLUMN_BYTES
        )));
    }

    let max = max_raw(byte_width);
    if value == 0 {
        return Ok(v_min);
    }
    if value >= max {
        return Ok(v_max);
    }

    Ok(v_min + value as f64 * (v_max - v_min) / max as f64)
}

/// Fails unless `v_max > v_min`. NaN bounds fail too.
pub fn check_voltage_range(v_min: f64, v_max: f64) -> Result<()> {
    if v_max > v_min && v_min.is_finite() && v_max.is_finite() {
        Ok(())
    } else {
        Err(ConversionError::InvalidVoltageRange {
            min: v_min,
            max: v_max,
        })
    }
}

/// Decode a column and render it as an output field.
pub fn format_field(
    raw: &[u8],
    column: &Column,
    byte_swap: bool,
    v_min: f64,
    v_max: f64,
) -> Result<String> {
    let value = decode(raw, byte_swap);
    match column.mode {
        ColumnMode::Counter => Ok(value.to_string()),
        ColumnMode::Voltage => {
            let volts = to_voltage(value, column.byte_width, v_min, v_max)?;
            Ok(format_significant(volts, VOLTAGE_PRECISION))
        }
    }
}

/// Format `value` with at most `digits` significant digits, `%g` style.
///
/// Trailing zeros are dropped; very small or very large magnitudes switch
/// to exponent notation (`1.2345e-05`).
pub fn format_significant(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let digits = digits.max(1);

    // Let the scientific formatter do the rounding, then read the exponent back.
    let sci = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exponent < -4 || exponent >= digits as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
