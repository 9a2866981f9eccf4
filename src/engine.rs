// Conversion engine: binary records in, CSV lines out

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::decimator;
use crate::decoder;
use crate::error::{ConversionError, Result};
use crate::layout::ColumnLayout;

/// Rows between cancellation checks and progress reports.
pub const CHECK_INTERVAL: u64 = 1024;

/// Per-run options, resolved before the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParameters {
    /// Maximum output lines, header included. 0 means no limit.
    pub row_cap: u64,
    pub byte_swap: bool,
    pub voltage_min: f64,
    pub voltage_max: f64,
    pub emit_header_row: bool,
}

impl Default for ConversionParameters {
    fn default() -> Self {
        ConversionParameters {
            row_cap: decimator::ROW_LIMIT_NONE,
            byte_swap: true,
            voltage_min: 0.0,
            voltage_max: 5.0,
            emit_header_row: true,
        }
    }
}

impl ConversionParameters {
    pub fn validate(&self) -> Result<()> {
        decoder::check_voltage_range(self.voltage_min, self.voltage_max)
    }
}

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Ask the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Row accounting for one input, computed without touching the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub record_size: usize,
    pub input_len: u64,
    /// Records in the input; a short final record counts as one.
    pub total_rows: u64,
    pub stride: u64,
    /// Lines the run will write, header included.
    pub expected_rows: u64,
}

/// Work out record count, stride and output size for an input of `input_len` bytes.
pub fn plan(input_len: u64, layout: &ColumnLayout, params: &ConversionParameters) -> RunPlan {
    let record_size = layout.record_size();
    let total_rows = input_len.div_ceil(record_size as u64);
    let header_rows = u64::from(params.emit_header_row);

    // The header line takes one slot of the cap, so it joins the row count
    // the decimator sees.
    let stride = decimator::stride(total_rows.saturating_add(header_rows), params.row_cap);

    let mut expected_rows = header_rows + decimator::retained_rows(total_rows, stride);
    if params.row_cap > 0 {
        expected_rows = expected_rows.min(params.row_cap);
    }

    RunPlan {
        record_size,
        input_len,
        total_rows,
        stride,
        expected_rows,
    }
}

/// Mutable bookkeeping owned by a single `run` call.
struct RunState {
    record_size: u64,
    bytes_consumed: u64,
    /// Lines handed to the sink, header included. Drives the cap and progress.
    rows_emitted: u64,
    records_kept: u64,
    stride: u64,
    cancel: CancelToken,
}

impl RunState {
    fn read_failure(&self, rows_written: u64, source: io::Error) -> ConversionError {
        ConversionError::ReadFailure {
            row: self.bytes_consumed / self.record_size,
            rows_written,
            source,
        }
    }
}

/// Bytes collected before they are pushed to the output.
const SINK_CAPACITY: usize = 64 * 1024;

/// Line buffer in front of the output that only counts what the output accepted.
///
/// `rows_written` and `bytes_written` cover complete lines only, so after a
/// failed write they describe the longest clean prefix of the output.
struct LineSink<W: Write> {
    inner: W,
    pending: Vec<u8>,
    rows_written: u64,
    bytes_written: u64,
}

impl<W: Write> LineSink<W> {
    fn new(inner: W) -> Self {
        LineSink {
            inner,
            pending: Vec::with_capacity(SINK_CAPACITY),
            rows_written: 0,
            bytes_written: 0,
        }
    }

    fn push_line(&mut self, line: &str) -> io::Result<()> {
        self.pending.extend_from_slice(line.as_bytes());
        self.pending.push(b'\n');
        if self.pending.len() >= SINK_CAPACITY {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut accepted = 0;
        let mut result: io::Result<()> = Ok(());
        while accepted < self.pending.len() {
            match self.inner.write(&self.pending[accepted..]) {
                Ok(0) => {
                    result = Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "output accepted no more data",
                    ));
                    break;
                }
                Ok(n) => accepted += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        let delivered = &self.pending[..accepted];
        if let Some(last) = delivered.iter().rposition(|&b| b == b'\n') {
            self.rows_written += delivered[..=last].iter().filter(|&&b| b == b'\n').count() as u64;
            self.bytes_written += last as u64 + 1;
        }
        self.pending.clear();

        result?;
        self.inner.flush()
    }

    fn write_failure(&self, source: io::Error) -> ConversionError {
        ConversionError::OutputUnwritable {
            rows_written: self.rows_written,
            bytes_written: self.bytes_written,
            source,
        }
    }
}

type ProgressFn<'a> = Box<dyn FnMut(u64, u64) + 'a>;

/// Streams records from a binary input into comma-separated lines.
pub struct ConversionEngine<'a> {
    layout: &'a ColumnLayout,
    params: &'a ConversionParameters,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> ConversionEngine<'a> {
    pub fn new(layout: &'a ColumnLayout, params: &'a ConversionParameters) -> Self {
        ConversionEngine {
            layout,
            params,
            progress: None,
        }
    }

    /// Called with `(rows_written, expected_rows)` at every checkpoint.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(u64, u64) + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Convert `input` into CSV lines on `output`.
    ///
    /// Returns the number of lines written, header included. A record whose
    /// read fails is not written, and the lines before it are flushed before
    /// the error is returned. When `output` fails, the error carries the
    /// number and total length of the complete lines it accepted; anything
    /// after them is a partial line. Cancellation is checked every
    /// [`CHECK_INTERVAL`] rows, never mid-record, and drops unflushed lines.
    pub fn run<R, W>(&mut self, mut input: R, output: W, cancel: &CancelToken) -> Result<u64>
    where
        R: Read + Seek,
        W: Write,
    {
        self.params.validate()?;

        let input_len = input
            .seek(SeekFrom::End(0))
            .and_then(|len| input.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|source| ConversionError::InputUnreadable { source })?;

        let plan = plan(input_len, self.layout, self.params);
        info!(
            "Converting {} bytes: record size {}, {} rows, keeping 1 in {}",
            plan.input_len, plan.record_size, plan.total_rows, plan.stride
        );

        let mut state = RunState {
            record_size: plan.record_size as u64,
            bytes_consumed: 0,
            rows_emitted: 0,
            records_kept: 0,
            stride: plan.stride,
            cancel: cancel.clone(),
        };
        let mut sink = LineSink::new(output);

        if self.params.emit_header_row {
            let header = self.layout.header_line();
            sink.push_line(&header).map_err(|e| sink.write_failure(e))?;
            state.rows_emitted += 1;
        }

        let record_size = plan.record_size;
        let step = state.record_size.saturating_mul(state.stride);
        let mut record = vec![0u8; record_size];

        while state.bytes_consumed < input_len {
            if self.params.row_cap > 0 && state.rows_emitted >= self.params.row_cap {
                break;
            }

            if state.records_kept % CHECK_INTERVAL == 0 {
                if let Some(progress) = self.progress.as_mut() {
                    progress(state.rows_emitted, plan.expected_rows);
                }
                if state.cancel.is_cancelled() {
                    debug!("Cancelled after {} rows", state.rows_emitted);
                    return Err(ConversionError::Cancelled);
                }
            }

            // A short final record is zero-padded up to the full record size.
            let available = (input_len - state.bytes_consumed).min(record_size as u64) as usize;
            record.fill(0);
            if let Err(e) = input.read_exact(&mut record[..available]) {
                sink.flush().map_err(|w| sink.write_failure(w))?;
                return Err(state.read_failure(sink.rows_written, e));
            }

            let line = self.format_record(&record)?;
            sink.push_line(&line).map_err(|e| sink.write_failure(e))?;
            state.rows_emitted += 1;
            state.records_kept += 1;

            state.bytes_consumed = state.bytes_consumed.saturating_add(step);
            if state.stride > 1 && state.bytes_consumed < input_len {
                if let Err(e) = input.seek(SeekFrom::Start(state.bytes_consumed)) {
                    sink.flush().map_err(|w| sink.write_failure(w))?;
                    return Err(state.read_failure(sink.rows_written, e));
                }
            }
        }

        sink.flush().map_err(|e| sink.write_failure(e))?;
        if let Some(progress) = self.progress.as_mut() {
            progress(sink.rows_written, plan.expected_rows);
        }

        info!("Processing complete: {} rows written", sink.rows_written);
        Ok(sink.rows_written)
    }

    fn format_record(&self, record: &[u8]) -> Result<String> {
        let mut fields = Vec::with_capacity(self.layout.column_count());
        for (offset, column) in self.layout.spans() {
            let raw = &record[offset..offset + column.byte_width as usize];
            fields.push(decoder::format_field(
                raw,
                column,
                self.params.byte_swap,
                self.params.voltage_min,
                self.params.voltage_max,
            )?);
        }
        Ok(fields.join(","))
    }

    /// Convert the file at `input_path` into a new CSV file at `output_path`.
    ///
    /// An output that is the input file itself, under any path or hard link,
    /// is rejected before it is created. A cancelled run always removes the
    /// output. Other failures remove it when no complete line was written;
    /// otherwise the output is cut back to its last complete line.
    pub fn convert_file<P, Q>(
        &mut self,
        input_path: P,
        output_path: Q,
        cancel: &CancelToken,
    ) -> Result<u64>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        self.params.validate()?;

        let input =
            File::open(input_path).map_err(|source| ConversionError::InputUnreadable { source })?;

        if same_file(&input, input_path, output_path) {
            return Err(ConversionError::SameFileConflict {
                path: output_path.to_path_buf(),
            });
        }

        let output =
            File::create(output_path).map_err(|source| ConversionError::OutputUnwritable {
                rows_written: 0,
                bytes_written: 0,
                source,
            })?;

        let result = self.run(input, &output, cancel);
        if let Err(e) = &result {
            clean_up_output(output, output_path, e);
        }
        result
    }
}

/// True when `output_path` names the file already open as `input`.
#[cfg(unix)]
fn same_file(input: &File, _input_path: &Path, output_path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (input.metadata(), fs::metadata(output_path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

/// True when both paths resolve to the same existing file.
#[cfg(not(unix))]
fn same_file(_input: &File, input_path: &Path, output_path: &Path) -> bool {
    match (input_path.canonicalize(), output_path.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Apply the cleanup rule for a failed run to the output it was writing.
fn clean_up_output(output: File, path: &Path, err: &ConversionError) {
    match err {
        ConversionError::Cancelled => {
            warn!("Processing cancelled, removing {}", path.display());
            drop(output);
            remove_output(path);
        }
        e if e.rows_written() == 0 => {
            warn!("{}; removing empty output {}", e, path.display());
            drop(output);
            remove_output(path);
        }
        ConversionError::OutputUnwritable {
            rows_written,
            bytes_written,
            ..
        } => {
            warn!(
                "{}; keeping the first {} rows of {}",
                err,
                rows_written,
                path.display()
            );
            if let Err(e) = output.set_len(*bytes_written) {
                warn!("Could not truncate {}: {}", path.display(), e);
            }
        }
        _ => {}
    }
}

fn remove_output(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}
