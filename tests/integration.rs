// tests/integration.rs
// Integration tests for DAT Parser

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use dat_parser::{
    CancelToken, Column, ColumnLayout, ColumnMode, ConversionEngine, ConversionError,
    ConversionParameters, Settings, CHECK_INTERVAL,
};
use tempfile::tempdir;

/// Helper to write `rows` records of a 2-byte counter followed by a 2-byte sample.
fn create_test_data_file(path: &Path, rows: u16) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    for row in 0..rows {
        file.write_all(&row.to_le_bytes())?;
        let sample = row.wrapping_mul(331);
        file.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

fn counter_and_voltage() -> ColumnLayout {
    ColumnLayout::new(vec![
        Column::new(2, ColumnMode::Counter, "Index"),
        Column::new(2, ColumnMode::Voltage, "Sample"),
    ])
    .unwrap()
}

fn little_endian(row_cap: u64, header: bool) -> ConversionParameters {
    ConversionParameters {
        row_cap,
        byte_swap: false,
        voltage_min: 0.0,
        voltage_max: 5.0,
        emit_header_row: header,
    }
}

#[test]
fn test_convert_with_row_cap() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("capture.dat");
    let output = dir.path().join("capture.csv");
    create_test_data_file(&input, 200).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(50, false);
    let rows = ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .expect("conversion failed");

    assert_eq!(rows, 50);
    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 50);

    // Every 4th record, in input order
    let indices: Vec<u64> = lines
        .iter()
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect();
    let expected: Vec<u64> = (0..50).map(|i| i * 4).collect();
    assert_eq!(indices, expected);
}

#[test]
fn test_convert_with_header() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("capture.dat");
    let output = dir.path().join("capture.csv");
    create_test_data_file(&input, 100).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let rows = ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .unwrap();

    assert_eq!(rows, 101);
    let csv = fs::read_to_string(&output).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Index,Sample"));
    assert_eq!(lines.next(), Some("0,0"));
    assert_eq!(csv.lines().count(), 101);
}

#[test]
fn test_counter_and_voltage_values() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("values.dat");
    let output = dir.path().join("values.csv");
    fs::write(&input, [0xff, 0xff, 0xff, 0x7f]).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, false);
    ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .unwrap();

    let csv = fs::read_to_string(&output).unwrap();
    let fields: Vec<&str> = csv.trim_end().split(',').collect();
    assert_eq!(fields[0], "65535");

    let volts: f64 = fields[1].parse().unwrap();
    let exact = 32767.0 * 5.0 / 65535.0;
    assert!((volts - exact).abs() < 1e-14, "{} != {}", volts, exact);
    assert_ne!(fields[1], "2.5");
}

#[test]
fn test_partial_final_record() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("short.dat");
    let output = dir.path().join("short.csv");
    // One full 4-byte record and 3 bytes of a second one
    fs::write(&input, [0x01, 0x00, 0x02, 0x00, 0x05, 0x00, 0x09]).unwrap();

    let layout = ColumnLayout::new(vec![
        Column::new(2, ColumnMode::Counter, "a"),
        Column::new(2, ColumnMode::Counter, "b"),
    ])
    .unwrap();
    let params = little_endian(0, false);
    let rows = ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .unwrap();

    assert_eq!(rows, 2);
    assert_eq!(fs::read_to_string(&output).unwrap(), "1,2\n5,9\n");
}

#[test]
fn test_decimation_keeps_short_final_record() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("short.dat");
    let output = dir.path().join("short.csv");
    // Two full 4-byte records and 2 bytes of a third; cap 2 gives a stride of 2
    fs::write(&input, [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05, 0x00]).unwrap();

    let layout = ColumnLayout::new(vec![
        Column::new(2, ColumnMode::Counter, "a"),
        Column::new(2, ColumnMode::Counter, "b"),
    ])
    .unwrap();
    let params = little_endian(2, false);
    let rows = ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .unwrap();

    assert_eq!(rows, 2);
    assert_eq!(fs::read_to_string(&output).unwrap(), "1,2\n5,0\n");
}

#[test]
fn test_cancel_removes_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("big.dat");
    let output = dir.path().join("big.csv");
    create_test_data_file(&input, 5000).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();

    let result = ConversionEngine::new(&layout, &params)
        .with_progress(move |written, _| {
            if written > CHECK_INTERVAL {
                trigger.cancel();
            }
        })
        .convert_file(&input, &output, &cancel);

    assert!(matches!(result, Err(ConversionError::Cancelled)));
    assert!(!output.exists());
    assert!(input.exists());
}

#[test]
fn test_same_file_rejected_before_write() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.dat");
    create_test_data_file(&input, 10).unwrap();
    let before = fs::read(&input).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let aliased = dir.path().join(".").join("data.dat");
    let result = ConversionEngine::new(&layout, &params).convert_file(
        &input,
        &aliased,
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(ConversionError::SameFileConflict { .. })));
    assert_eq!(fs::read(&input).unwrap(), before);
}

#[cfg(unix)]
#[test]
fn test_hard_link_output_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.dat");
    let linked = dir.path().join("linked.csv");
    create_test_data_file(&input, 10).unwrap();
    fs::hard_link(&input, &linked).unwrap();
    let before = fs::read(&input).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let result =
        ConversionEngine::new(&layout, &params).convert_file(&input, &linked, &CancelToken::new());

    assert!(matches!(result, Err(ConversionError::SameFileConflict { .. })));
    assert_eq!(fs::read(&input).unwrap(), before);
    assert_eq!(fs::read(&linked).unwrap(), before);
}

#[test]
fn test_missing_input() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let result = ConversionEngine::new(&layout, &params).convert_file(
        dir.path().join("missing.dat"),
        &output,
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(ConversionError::InputUnreadable { .. })));
    assert!(!output.exists());
}

#[test]
fn test_unwritable_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.dat");
    create_test_data_file(&input, 10).unwrap();

    let layout = counter_and_voltage();
    let params = little_endian(0, true);
    let result = ConversionEngine::new(&layout, &params).convert_file(
        &input,
        dir.path().join("no_such_dir").join("out.csv"),
        &CancelToken::new(),
    );

    assert!(matches!(
        result,
        Err(ConversionError::OutputUnwritable { rows_written: 0, .. })
    ));
}

#[test]
fn test_invalid_voltage_range_creates_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.dat");
    let output = dir.path().join("out.csv");
    create_test_data_file(&input, 10).unwrap();

    let layout = counter_and_voltage();
    let mut params = little_endian(0, true);
    params.voltage_min = 5.0;
    params.voltage_max = 1.0;

    let result =
        ConversionEngine::new(&layout, &params).convert_file(&input, &output, &CancelToken::new());
    assert!(matches!(result, Err(ConversionError::InvalidVoltageRange { .. })));
    assert!(!output.exists());
}

#[test]
fn test_settings_drive_conversion() {
    let dir = tempdir().unwrap();
    let settings_path = dir.path().join("settings.json");
    let input = dir.path().join("capture.dat");
    let output = dir.path().join("capture.csv");
    // Big-endian counters: 0x0001, 0x0100
    fs::write(&input, [0x00, 0x01, 0x01, 0x00]).unwrap();

    fs::write(
        &settings_path,
        r#"{
            "row_limit": "No limit",
            "columns": [ { "name": "Ticks", "bytes": 2, "counter": true } ],
            "byte_swap": true,
            "write_header": true
        }"#,
    )
    .unwrap();

    let mut settings = Settings::load_or_create(&settings_path).unwrap();
    let layout = settings.layout().unwrap();
    let params = settings.parameters();
    let rows = ConversionEngine::new(&layout, &params)
        .convert_file(&input, &output, &CancelToken::new())
        .unwrap();

    assert_eq!(rows, 3);
    assert_eq!(fs::read_to_string(&output).unwrap(), "Ticks\n1\n256\n");

    settings.remember_input(&input);
    settings.remember_output(&output);
    settings.save(&settings_path).unwrap();
    let reloaded = Settings::load_or_create(&settings_path).unwrap();
    assert_eq!(reloaded.input_paths, vec![input.clone()]);
    assert_eq!(reloaded.output_paths, vec![output.clone()]);
}
