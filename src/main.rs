// src/main.rs
// Command-line front end for DAT Parser

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dat_parser::{
    parse_row_limit, plan, CancelToken, Column, ColumnLayout, ColumnMode, ConversionEngine,
    ConversionParameters, RunPlan, Settings, MAX_COLUMN_BYTES,
};
use log::debug;

/// Convert binary data-acquisition records to CSV.
#[derive(Parser, Debug)]
#[command(name = "dat_parser")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file holding recent paths and the last column layout.
    #[arg(short, long, global = true, default_value = "dat_parser.json")]
    settings: PathBuf,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a data file to CSV.
    Convert {
        /// Binary data file.
        input: PathBuf,
        /// CSV file to create.
        output: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Show record size, row count and decimation for a data file.
    Info {
        /// Binary data file.
        input: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
}

/// Overrides for values otherwise taken from the settings file.
#[derive(Args, Debug)]
struct RunOptions {
    /// Column as NAME:BYTES[:counter|voltage], repeat in record order.
    #[arg(short, long = "column", value_name = "COLUMN", value_parser = parse_column)]
    columns: Vec<Column>,

    /// Row limit: a number, or none, calc, excel, quattro.
    #[arg(short, long)]
    limit: Option<String>,

    /// Swap byte order of multi-byte values.
    #[arg(long, value_name = "BOOL")]
    swap: Option<bool>,

    /// Write column names as the first line.
    #[arg(long, value_name = "BOOL")]
    header: Option<bool>,

    /// Voltage at raw value 0.
    #[arg(long, allow_hyphen_values = true)]
    vmin: Option<f64>,

    /// Voltage at the column's largest raw value.
    #[arg(long, allow_hyphen_values = true)]
    vmax: Option<f64>,
}

impl RunOptions {
    /// Fold the overrides into `settings` and resolve layout and parameters.
    fn resolve(&self, settings: &mut Settings) -> Result<(ColumnLayout, ConversionParameters)> {
        if !self.columns.is_empty() {
            let layout = ColumnLayout::new(self.columns.clone())?;
            settings.set_layout(&layout);
        }
        if let Some(limit) = &self.limit {
            settings.row_limit = parse_row_limit(limit).to_string();
        }
        if let Some(swap) = self.swap {
            settings.byte_swap = swap;
        }
        if let Some(header) = self.header {
            settings.write_header = header;
        }
        if let Some(vmin) = self.vmin {
            settings.voltage_min = vmin;
        }
        if let Some(vmax) = self.vmax {
            settings.voltage_max = vmax;
        }

        let layout = settings
            .layout()
            .context("no usable columns; pass --column or store them in the settings file")?;
        let params = settings.parameters();
        params.validate()?;
        Ok((layout, params))
    }
}

fn parse_column(text: &str) -> std::result::Result<Column, String> {
    let mut parts = text.split(':');
    let name = parts.next().unwrap_or_default();
    let bytes: u8 = parts
        .next()
        .ok_or_else(|| format!("missing byte count in '{}'", text))?
        .parse()
        .map_err(|_| format!("invalid byte count in '{}'", text))?;
    if bytes == 0 || bytes > MAX_COLUMN_BYTES {
        return Err(format!("byte count must be 1 to {}", MAX_COLUMN_BYTES));
    }
    let mode = match parts.next() {
        None | Some("voltage") | Some("v") => ColumnMode::Voltage,
        Some("counter") | Some("c") => ColumnMode::Counter,
        Some(other) => return Err(format!("unknown column mode '{}'", other)),
    };
    if parts.next().is_some() {
        return Err(format!("too many fields in '{}'", text));
    }
    Ok(Column::new(bytes, mode, dat_parser::sanitize_column_name(name)))
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load_or_create(&cli.settings)?;

    match cli.command {
        Command::Convert {
            input,
            output,
            options,
        } => {
            let (layout, params) = options.resolve(&mut settings)?;
            let cancel = CancelToken::new();

            let mut engine =
                ConversionEngine::new(&layout, &params).with_progress(|written, expected| {
                    if expected > 0 {
                        debug!("{} / {} rows ({}%)", written, expected, written * 100 / expected);
                    }
                });
            let rows = engine.convert_file(&input, &output, &cancel).with_context(|| {
                format!("converting '{}' to '{}'", input.display(), output.display())
            })?;

            settings.remember_input(&input);
            settings.remember_output(&output);
            settings.save(&cli.settings)?;

            println!("Successfully converted {} to {}", input.display(), output.display());
            println!("Total rows written: {}", rows);
        }

        Command::Info { input, options } => {
            let (layout, params) = options.resolve(&mut settings)?;
            let metadata = fs::metadata(&input)
                .with_context(|| format!("Cannot open data file '{}'", input.display()))?;
            if !metadata.is_file() {
                bail!("'{}' is not a file", input.display());
            }

            let plan = plan(metadata.len(), &layout, &params);
            print_run_info(&input, &layout, &params, &plan);
        }
    }

    Ok(())
}

fn print_run_info(
    input: &Path,
    layout: &ColumnLayout,
    params: &ConversionParameters,
    plan: &RunPlan,
) {
    println!("Data File Information");
    println!("=====================");
    println!();
    println!("File: {}", input.display());
    println!("Size: {} bytes", plan.input_len);
    println!();

    println!("Record Layout ({} bytes per row):", plan.record_size);
    for (offset, column) in layout.spans() {
        let mode = match column.mode {
            ColumnMode::Counter => "counter",
            ColumnMode::Voltage => "voltage",
        };
        println!(
            "  @{:<4} {:<20} {} bytes, {}",
            offset, column.display_name, column.byte_width, mode
        );
    }
    println!();

    println!("Options:");
    println!("  Byte swap: {}", params.byte_swap);
    println!("  Header row: {}", params.emit_header_row);
    println!("  Voltage range: {} V to {} V", params.voltage_min, params.voltage_max);
    println!();

    println!("Rows:");
    println!("  Input rows: {}", plan.total_rows);
    if params.row_cap == 0 {
        println!("  Row limit: none");
    } else {
        println!("  Row limit: {}", params.row_cap);
    }
    if plan.stride > 1 {
        println!("  Keeping 1 in {} rows", plan.stride);
    }
    println!("  Output rows: {}", plan.expected_rows);
}
