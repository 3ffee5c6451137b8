use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::decode::{decode_bytes, decode_text, SampleMatrix};
use crate::error::{BinError, Result};
use crate::header::open_header;
use crate::layout::{
    self, HEX_DIGITS_PER_PAGE, LINES_PER_PAGE, MAX_DEFAULT_BLOCK_PAGES, SAMPLES_PER_PAGE,
};
use crate::lazy::VirtualAccData;
use crate::types::{
    AccData, CalibrationConstants, HeaderInfo, PageWindow, ReadWarning, SampleBlock, SampleRow,
    SampleTable,
};
use crate::utils::{find_bytes, parse_decimal, split_field, trim_bytes, trim_line_end};
use crate::window::{resolve_window, WindowSpec};

/// How page records are fetched from the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Memory-mapped when offsets are available, sequential otherwise
    #[default]
    Auto,
    /// Line-by-line scan of the text
    Sequential,
    /// Byte-offset access through a memory map, falling back to
    /// sequential reading when mapping fails
    MemoryMapped,
}

/// Keep every `factor`-th sample, starting at the 1-based `phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsample {
    pub factor: usize,
    pub phase: usize,
}

impl Downsample {
    pub fn new(factor: usize) -> Self {
        Downsample { factor, phase: 1 }
    }

    pub fn with_phase(factor: usize, phase: usize) -> Self {
        Downsample { factor, phase }
    }
}

/// Calibration values supplied by the caller instead of the header's.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualCalibration {
    /// x, y, z gains
    pub gain: Vec<f64>,
    /// x, y, z offsets
    pub offset: Vec<f64>,
    pub volts: f64,
    pub lux: f64,
}

/// Per-call read configuration.
///
/// # Examples
///
/// ```rust
/// use accbin::{AccessMode, Downsample, ReadOptions};
///
/// let options = ReadOptions::new()
///     .with_start("0.5")
///     .with_downsample(Downsample::new(10))
///     .with_blocksize(1_000)
///     .with_temperature(true)
///     .with_access_mode(AccessMode::Sequential)
///     .quiet();
/// assert!(options.calibrate);
/// assert_eq!(options.blocksize, Some(1_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub start: Option<WindowSpec>,
    pub end: Option<WindowSpec>,
    /// Number of pages to read when no end is given
    pub length: Option<usize>,
    pub downsample: Option<Downsample>,
    /// Maximum pages decoded at a time; `None` means unbounded
    pub blocksize: Option<usize>,
    pub calibrate: bool,
    /// Include the page temperature as a table column
    pub do_temp: bool,
    /// Report the battery voltage of each page
    pub do_volt: bool,
    pub manual_calibration: Option<ManualCalibration>,
    pub access_mode: AccessMode,
    /// Page offsets returned by an earlier read of the same file
    pub page_offsets: Option<Vec<u64>>,
    pub virtual_read: bool,
    /// Record warnings without logging them
    pub quiet: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            start: None,
            end: None,
            length: None,
            downsample: None,
            blocksize: None,
            calibrate: true,
            do_temp: false,
            do_volt: false,
            manual_calibration: None,
            access_mode: AccessMode::Auto,
            page_offsets: None,
            virtual_read: false,
            quiet: false,
        }
    }
}

fn numeric_or_time(spec: &str, from_number: fn(f64) -> Result<WindowSpec>) -> WindowSpec {
    match spec.trim().parse::<f64>() {
        Ok(value) => from_number(value).unwrap_or(WindowSpec::Time(spec.to_string())),
        Err(_) => WindowSpec::Time(spec.to_string()),
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window start. Strings holding a plain number are read with
    /// [`WindowSpec::from_number`]; other strings are time specifications.
    pub fn with_start<S: Into<WindowSpec>>(mut self, start: S) -> Self {
        self.start = Some(match start.into() {
            WindowSpec::Time(s) => numeric_or_time(&s, WindowSpec::from_number),
            spec => spec,
        });
        self
    }

    /// Sets the window end. Plain numbers are read with
    /// [`WindowSpec::end_from_number`], so `"1"` is the end of the recording.
    pub fn with_end<S: Into<WindowSpec>>(mut self, end: S) -> Self {
        self.end = Some(match end.into() {
            WindowSpec::Time(s) => numeric_or_time(&s, WindowSpec::end_from_number),
            spec => spec,
        });
        self
    }

    pub fn with_length(mut self, pages: usize) -> Self {
        self.length = Some(pages);
        self
    }

    pub fn with_downsample(mut self, downsample: Downsample) -> Self {
        self.downsample = Some(downsample);
        self
    }

    pub fn with_blocksize(mut self, pages: usize) -> Self {
        self.blocksize = Some(pages);
        self
    }

    pub fn with_calibration(mut self, calibration: ManualCalibration) -> Self {
        self.manual_calibration = Some(calibration);
        self
    }

    pub fn uncalibrated(mut self) -> Self {
        self.calibrate = false;
        self
    }

    pub fn with_temperature(mut self, enabled: bool) -> Self {
        self.do_temp = enabled;
        self
    }

    pub fn with_voltage(mut self, enabled: bool) -> Self {
        self.do_volt = enabled;
        self
    }

    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    pub fn with_page_offsets(mut self, offsets: Vec<u64>) -> Self {
        self.page_offsets = Some(offsets);
        self
    }

    pub fn virtual_read(mut self) -> Self {
        self.virtual_read = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Checks parameter shapes before any I/O is done.
    fn validate(&self) -> Result<()> {
        if let Some(ds) = self.downsample {
            if ds.factor == 0 || ds.phase == 0 {
                return Err(BinError::InvalidOption(format!(
                    "downsample factor and phase must be at least 1 (got {}, {})",
                    ds.factor, ds.phase
                )));
            }
        }
        if self.blocksize == Some(0) {
            return Err(BinError::InvalidOption("blocksize must be at least one page".to_string()));
        }
        if let Some(offsets) = &self.page_offsets {
            if offsets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(BinError::InvalidOption("page offsets must be strictly ascending".to_string()));
            }
        }
        if let Some(manual) = &self.manual_calibration {
            Calibrator::from_manual(manual)?;
        }
        Ok(())
    }
}

/// Raw-to-physical conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Calibrator {
    gain: [f64; 3],
    offset: [f64; 3],
    light_scale: f64,
}

impl Calibrator {
    fn from_header(calib: &CalibrationConstants) -> Result<Self> {
        let gain = [calib.x_gain as f64, calib.y_gain as f64, calib.z_gain as f64];
        if gain.contains(&0.0) || calib.volts == 0.0 {
            return Err(BinError::InvalidFormat(
                "header calibration has a zero gain or zero volts".to_string(),
            ));
        }
        Ok(Calibrator {
            gain,
            offset: [calib.x_offset as f64, calib.y_offset as f64, calib.z_offset as f64],
            light_scale: calib.lux / calib.volts,
        })
    }

    fn from_manual(manual: &ManualCalibration) -> Result<Self> {
        let triple = |name: &str, values: &[f64]| -> Result<[f64; 3]> {
            match values {
                [x, y, z] if values.iter().all(|v| v.is_finite()) => Ok([*x, *y, *z]),
                _ => Err(BinError::CalibrationInput(format!(
                    "{} needs three finite values (x, y, z), got {:?}",
                    name, values
                ))),
            }
        };
        let gain = triple("gain", &manual.gain)?;
        let offset = triple("offset", &manual.offset)?;

        if gain.contains(&0.0) {
            return Err(BinError::CalibrationInput("gain must not be zero".to_string()));
        }
        if manual.volts == 0.0 || !manual.volts.is_finite() || !manual.lux.is_finite() {
            return Err(BinError::CalibrationInput(format!(
                "volts must be non-zero and lux finite (volts {}, lux {})",
                manual.volts, manual.lux
            )));
        }

        Ok(Calibrator { gain, offset, light_scale: manual.lux / manual.volts })
    }

    fn axis(&self, axis: usize, raw: i32) -> f64 {
        (raw as f64 * 100.0 - self.offset[axis]) / self.gain[axis]
    }

    fn light(&self, raw: i32) -> f64 {
        raw as f64 * self.light_scale
    }
}

/// Carries the decimation phase across pages and blocks.
#[derive(Debug, Clone, Copy)]
struct Decimator {
    factor: usize,
    /// 0-based index, within the next run of samples, of the next kept sample
    next: usize,
}

impl Decimator {
    fn new(downsample: Downsample) -> Self {
        Decimator {
            factor: downsample.factor,
            next: (downsample.phase - 1) % downsample.factor,
        }
    }

    /// Indices kept from a run of `len` samples.
    fn take(&mut self, len: usize) -> Vec<usize> {
        let kept: Vec<usize> = (self.next..len).step_by(self.factor).collect();
        self.next = match kept.last() {
            Some(&last) => last + self.factor - len,
            None => self.next - len,
        };
        kept
    }

    /// 1-based phase for a read that continues after this one.
    fn phase(&self) -> usize {
        self.next + 1
    }
}

/// One decoded page record.
#[derive(Debug, Clone)]
struct DecodedPage {
    samples: SampleMatrix,
    temperature: f64,
    voltage: f64,
}

/// Capability shared by the sequential and random-access paths.
trait PageDecoder {
    /// Decodes pages `first..=last` (1-based) in order. Returns fewer pages
    /// than requested when the source ends early.
    fn decode_pages(&mut self, first: usize, last: usize) -> Result<Vec<DecodedPage>>;
}

/// Label-line values of one page, checked against the fixed layout.
///
/// With `expected_sequence` set, the page's `Sequence Number` must match it,
/// so an offset that lands on the wrong record is caught.
fn page_metadata(
    labels: &[&str],
    first_line: usize,
    sep: char,
    expected_sequence: Option<i64>,
) -> Result<(f64, f64)> {
    let mismatch = |offset: usize, expected: &'static str| BinError::LayoutMismatch {
        line: first_line + offset + 1,
        expected,
        found: labels.get(offset).map(|s| s.to_string()).unwrap_or_default(),
    };

    if labels.first().map(|l| l.trim()) != Some(layout::RECORDED_DATA) {
        return Err(mismatch(0, layout::RECORDED_DATA));
    }

    if let Some(expected) = expected_sequence {
        let label = layout::FIRST_PAGE_INDEX.label;
        let sequence = split_field(labels[layout::PAGE_SEQUENCE_LINE])
            .filter(|(key, _)| *key == label)
            .and_then(|(_, value)| value.parse::<i64>().ok());
        if sequence != Some(expected) {
            return Err(mismatch(layout::PAGE_SEQUENCE_LINE, label));
        }
    }

    let temperature_line = labels[layout::PAGE_TEMPERATURE_LINE];
    if !temperature_line.starts_with(layout::TEMPERATURE_LABEL) {
        return Err(mismatch(layout::PAGE_TEMPERATURE_LINE, layout::TEMPERATURE_LABEL));
    }
    let voltage_line = labels[layout::PAGE_VOLTAGE_LINE];
    if !voltage_line.starts_with(layout::VOLTAGE_LABEL) {
        return Err(mismatch(layout::PAGE_VOLTAGE_LINE, layout::VOLTAGE_LABEL));
    }

    Ok((
        parse_decimal(&temperature_line[layout::TEMPERATURE_COLUMN..], sep)?,
        parse_decimal(&voltage_line[layout::VOLTAGE_COLUMN..], sep)?,
    ))
}

fn check_page_length(samples: &SampleMatrix, page: usize) -> Result<()> {
    if samples.len() != SAMPLES_PER_PAGE {
        return Err(BinError::Decode(format!(
            "page {} holds {} samples, expected {}",
            page,
            samples.len(),
            SAMPLES_PER_PAGE
        )));
    }
    Ok(())
}

/// Reads pages line by line from the start of the data section.
struct SequentialDecoder<R> {
    reader: R,
    next_page: usize,
    header_lines: usize,
    sep: char,
    buf: Vec<u8>,
}

impl<R: BufRead> SequentialDecoder<R> {
    fn new(reader: R, header_lines: usize, sep: char) -> Result<Self> {
        let mut decoder = SequentialDecoder {
            reader,
            next_page: 1,
            header_lines,
            sep,
            buf: Vec::with_capacity(HEX_DIGITS_PER_PAGE + 2),
        };
        if !decoder.skip_lines(header_lines)? {
            return Err(BinError::InvalidFormat("file ends inside the header".to_string()));
        }
        Ok(decoder)
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(trim_line_end(line.trim_end_matches('\n')).to_string()))
    }

    /// Returns `false` when the source ended first.
    fn skip_lines(&mut self, count: usize) -> Result<bool> {
        for _ in 0..count {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<R: BufRead> PageDecoder for SequentialDecoder<R> {
    fn decode_pages(&mut self, first: usize, last: usize) -> Result<Vec<DecodedPage>> {
        if first < self.next_page {
            return Err(BinError::InvalidOption(format!(
                "sequential reader is past page {} (at page {})",
                first, self.next_page
            )));
        }
        // 跳过窗口之前的页
        if !self.skip_lines((first - self.next_page) * LINES_PER_PAGE)? {
            return Ok(Vec::new());
        }
        self.next_page = first;

        let mut pages = Vec::with_capacity(last + 1 - first);
        for page in first..=last {
            let mut lines = Vec::with_capacity(LINES_PER_PAGE);
            while lines.len() < LINES_PER_PAGE {
                match self.next_line()? {
                    Some(line) => lines.push(line),
                    None => break,
                }
            }
            if lines.len() < LINES_PER_PAGE {
                break;
            }

            let labels: Vec<&str> = lines.iter().map(String::as_str).collect();
            let first_line = self.header_lines + (page - 1) * LINES_PER_PAGE;
            let (temperature, voltage) = page_metadata(&labels, first_line, self.sep, None)?;
            let samples = decode_text(lines[layout::PAGE_DATA_LINE].trim())?;
            check_page_length(&samples, page)?;

            pages.push(DecodedPage { samples, temperature, voltage });
            self.next_page += 1;
        }

        Ok(pages)
    }
}

/// Reads pages from a memory map through a byte-offset table.
struct MappedDecoder<'m> {
    bytes: &'m [u8],
    offsets: Vec<u64>,
    header_lines: usize,
    first_page_index: i64,
    sep: char,
}

impl MappedDecoder<'_> {
    fn page_lines(&self, offset: usize) -> Vec<&[u8]> {
        let mut lines = Vec::with_capacity(LINES_PER_PAGE);
        let mut pos = offset;
        while lines.len() < LINES_PER_PAGE && pos < self.bytes.len() {
            let end = self.bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(self.bytes.len(), |i| pos + i);
            let mut line = &self.bytes[pos..end];
            while let [rest @ .., b'\r' | b' '] = line {
                line = rest;
            }
            lines.push(line);
            pos = end + 1;
        }
        lines
    }
}

impl PageDecoder for MappedDecoder<'_> {
    fn decode_pages(&mut self, first: usize, last: usize) -> Result<Vec<DecodedPage>> {
        let mut pages = Vec::with_capacity(last + 1 - first);
        for page in first..=last {
            let Some(&offset) = self.offsets.get(page - 1) else {
                break;
            };
            let offset = offset as usize;
            if offset >= self.bytes.len() {
                break;
            }

            let lines = self.page_lines(offset);
            if lines.len() < LINES_PER_PAGE {
                break;
            }

            let labels: Vec<Cow<str>> = lines[..layout::PAGE_DATA_LINE]
                .iter()
                .map(|l| String::from_utf8_lossy(l))
                .collect();
            let labels: Vec<&str> = labels.iter().map(|l| l.as_ref()).collect();
            let first_line = self.header_lines + (page - 1) * LINES_PER_PAGE;
            let sequence = self.first_page_index + page as i64 - 1;
            let (temperature, voltage) =
                page_metadata(&labels, first_line, self.sep, Some(sequence))?;
            let samples = decode_bytes(trim_bytes(lines[layout::PAGE_DATA_LINE]))?;
            check_page_length(&samples, page)?;

            pages.push(DecodedPage { samples, temperature, voltage });
        }
        Ok(pages)
    }
}

/// Finds the byte offset of every page record, starting from the first.
///
/// Each step first checks the position one nominal record length ahead and
/// only searches forward when no record starts there, so records of
/// varying length are still found. Stops after `max_pages` records or at
/// the end of the data; offsets found so far are always returned.
pub fn scan_page_offsets(bytes: &[u8], first: u64, increment: u64, max_pages: usize) -> Vec<u64> {
    let marker = layout::RECORDED_DATA.as_bytes();
    let starts_record = |pos: usize| {
        bytes.get(pos..).is_some_and(|rest| rest.starts_with(marker))
            && (pos == 0 || bytes[pos - 1] == b'\n')
    };

    let mut offsets = Vec::new();
    let mut pos = first as usize;
    if !starts_record(pos) {
        return offsets;
    }

    while offsets.len() < max_pages {
        offsets.push(pos as u64);

        let guess = pos + increment as usize;
        if increment > 0 && starts_record(guess) {
            pos = guess;
            continue;
        }
        match find_bytes(&bytes[pos + 1..], b"\nRecorded Data") {
            Some(i) => pos = pos + 1 + i + 1,
            None => break,
        }
    }

    offsets
}

fn map_file(file: &File) -> io::Result<Mmap> {
    // SAFETY: the mapping is read-only and dropped before the read returns
    unsafe { Mmap::map(file) }
}

/// Output of streaming a window through a decoder.
struct Streamed {
    data: SampleTable,
    voltages: Vec<f64>,
    decoded_pages: usize,
    next_phase: Option<usize>,
}

/// Which offset table the random-access path ended up with.
struct OffsetTable {
    offsets: Vec<u64>,
    estimated: bool,
}

/// Reader for device `.bin` recordings.
///
/// Opening a file parses its header and calibration once; each call to
/// [`AccReader::read`] then resolves a window and decodes it block by block.
///
/// # Examples
///
/// ```rust
/// use accbin::{AccReader, ReadOptions};
/// # accbin::doctest_utils::BinFixture::new().pages(4).write("recording.bin")?;
///
/// let reader = AccReader::open("recording.bin")?;
/// assert_eq!(reader.calibration().page_count, 4);
///
/// // Pages 2 and 3, calibrated
/// let data = reader.read(&ReadOptions::new().with_start(2usize).with_end(3usize))?;
/// assert_eq!(data.len(), 600);
/// assert_eq!(data.frequency, 100.0);
///
/// let first = data.data.row(0).unwrap();
/// assert_eq!(first.timestamp, data.page_timestamps[0]);
/// # std::fs::remove_file("recording.bin").ok();
/// # Ok::<(), accbin::BinError>(())
/// ```
#[derive(Clone)]
pub struct AccReader {
    path: PathBuf,
    header: HeaderInfo,
    calibration: CalibrationConstants,
    mapper: fn(&File) -> io::Result<Mmap>,
}

impl fmt::Debug for AccReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

impl AccReader {
    /// Opens a recording and parses its header.
    ///
    /// # Errors
    ///
    /// * `BinError::FileNotFound` - the file cannot be opened
    /// * `BinError::MissingSection` - a section title is absent
    /// * `BinError::LayoutMismatch` - a calibration field is not where the
    ///   page layout puts it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (header, calibration) = open_header(&path)?;
        Ok(AccReader {
            path: path.as_ref().to_path_buf(),
            header,
            calibration,
            mapper: map_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    pub fn calibration(&self) -> &CalibrationConstants {
        &self.calibration
    }

    /// Resolves the options' start/end into a page range.
    pub fn resolve(&self, options: &ReadOptions) -> Result<PageWindow> {
        resolve_window(
            options.start.as_ref(),
            options.end.as_ref(),
            options.length,
            &self.calibration,
        )
    }

    /// Resolves the window without decoding anything.
    pub fn read_virtual(&self, options: &ReadOptions) -> Result<VirtualAccData> {
        options.validate()?;
        let window = self.resolve(options)?;
        Ok(VirtualAccData::new(
            self.path.clone(),
            self.header.clone(),
            self.calibration.clone(),
            window,
            options.clone(),
        ))
    }

    /// Decodes the requested window into a sample table.
    ///
    /// # Errors
    ///
    /// * `BinError::InvalidOption` / `BinError::CalibrationInput` - bad
    ///   parameters, reported before the file is touched
    /// * `BinError::StartOutOfRange` / `BinError::NoMatchingPages` - the
    ///   window does not select any pages
    /// * `BinError::Decode` / `BinError::LayoutMismatch` - corrupt page data
    pub fn read(&self, options: &ReadOptions) -> Result<AccData> {
        options.validate()?;
        let calibrator = match (&options.manual_calibration, options.calibrate) {
            (_, false) => None,
            (Some(manual), true) => Some(Calibrator::from_manual(manual)?),
            (None, true) => Some(Calibrator::from_header(&self.calibration)?),
        };

        let window = self.resolve(options)?;
        let mut warnings = Vec::new();

        if let Some(ds) = options.downsample {
            if SAMPLES_PER_PAGE % ds.factor != 0 {
                warn(&mut warnings, options, ReadWarning::UnevenDownsample { factor: ds.factor });
            }
        }

        let block_pages = match options.blocksize {
            Some(pages) => pages,
            None => window.page_count().min(MAX_DEFAULT_BLOCK_PAGES),
        };
        log::debug!(
            "{}: reading pages {}..={} in blocks of {}",
            self.path.display(),
            window.start_page,
            window.end_page,
            block_pages
        );

        let (streamed, page_offsets) =
            self.decode_window(&window, options, calibrator.as_ref(), block_pages, &mut warnings)?;

        if streamed.decoded_pages < window.page_count() {
            warn(
                &mut warnings,
                options,
                ReadWarning::Truncated {
                    expected_pages: window.page_count(),
                    decoded_pages: streamed.decoded_pages,
                },
            );
        }

        let mut data = streamed.data;
        let frequency = match options.downsample {
            Some(_) if streamed.decoded_pages > 0 => {
                let nominal = (SAMPLES_PER_PAGE * streamed.decoded_pages) as f64;
                self.calibration.sampling_frequency * data.len() as f64 / nominal
            }
            _ => self.calibration.sampling_frequency,
        };

        if window.start_time.is_some() || window.end_time.is_some() {
            data.retain_time_range(
                window.start_time.unwrap_or(f64::NEG_INFINITY),
                window.end_time.unwrap_or(f64::INFINITY),
            );
        }

        let page_timestamps = (window.start_page..window.start_page + streamed.decoded_pages)
            .map(|p| self.calibration.page_time(p))
            .collect();

        Ok(AccData {
            header: self.header.clone(),
            calibration: self.calibration.clone(),
            data,
            page_timestamps,
            page_voltages: options.do_volt.then_some(streamed.voltages),
            frequency,
            window,
            page_offsets,
            next_downsample_phase: streamed.next_phase,
            warnings,
        })
    }

    /// Picks the decode path, falling back to sequential reading whenever
    /// random access cannot be used.
    fn decode_window(
        &self,
        window: &PageWindow,
        options: &ReadOptions,
        calibrator: Option<&Calibrator>,
        block_pages: usize,
        warnings: &mut Vec<ReadWarning>,
    ) -> Result<(Streamed, Option<Vec<u64>>)> {
        let file = File::open(&self.path)
            .map_err(|e| BinError::FileNotFound(format!("{}: {}", self.path.display(), e)))?;

        if options.access_mode != AccessMode::Sequential {
            match self.try_mapped(&file, window, options, calibrator, block_pages, warnings) {
                Ok(result) => return Ok(result),
                Err(Degraded(reason)) => {
                    let quiet_auto = options.access_mode == AccessMode::Auto
                        && self.calibration.page_count < 2
                        && options.page_offsets.is_none();
                    if !quiet_auto {
                        warn(warnings, options, ReadWarning::AccessDegraded { reason });
                    }
                }
                Err(Fatal(e)) => return Err(e),
            }
        }

        let mut decoder = SequentialDecoder::new(
            BufReader::new(file),
            self.calibration.header_line_count,
            self.header.decimal_separator,
        )?;
        let streamed = self.stream(&mut decoder, window, options, calibrator, block_pages)?;
        Ok((streamed, None))
    }

    fn try_mapped(
        &self,
        file: &File,
        window: &PageWindow,
        options: &ReadOptions,
        calibrator: Option<&Calibrator>,
        block_pages: usize,
        warnings: &mut Vec<ReadWarning>,
    ) -> std::result::Result<(Streamed, Option<Vec<u64>>), MappedFailure> {
        let map = (self.mapper)(file).map_err(|e| Degraded(format!("memory map failed: {}", e)))?;

        let table = self.offset_table(&map, window, options)?;
        let estimated = table.estimated;

        let mut decoder = MappedDecoder {
            bytes: &map,
            offsets: table.offsets,
            header_lines: self.calibration.header_line_count,
            first_page_index: self.calibration.first_page_index,
            sep: self.header.decimal_separator,
        };

        match self.stream(&mut decoder, window, options, calibrator, block_pages) {
            Ok(streamed) => {
                if estimated {
                    let pages = window.page_count();
                    warn(warnings, options, ReadWarning::EstimatedOffsets { pages });
                    return Ok((streamed, None));
                }
                Ok((streamed, Some(decoder.offsets)))
            }
            // 偏移量与页边界不符
            Err(BinError::LayoutMismatch { line, expected, .. }) => Err(Degraded(format!(
                "page offsets do not match page records (expected '{}' at line {})",
                expected, line
            ))),
            Err(e) => Err(Fatal(e)),
        }
    }

    /// Supplied table, then a scan of the whole file, then an arithmetic
    /// estimate from the nominal record length.
    fn offset_table(
        &self,
        bytes: &[u8],
        window: &PageWindow,
        options: &ReadOptions,
    ) -> std::result::Result<OffsetTable, MappedFailure> {
        if let Some(offsets) = &options.page_offsets {
            if offsets.len() >= window.end_page {
                return Ok(OffsetTable { offsets: offsets.clone(), estimated: false });
            }
            log::debug!(
                "supplied offset table covers {} pages, window ends at page {}",
                offsets.len(),
                window.end_page
            );
        }

        let (Some(first), Some(increment)) = (
            self.calibration.first_record_byte_offset,
            self.calibration.record_byte_increment,
        ) else {
            return Err(Degraded("page record offsets not found in the header".to_string()));
        };

        let scanned = scan_page_offsets(bytes, first, increment, self.calibration.page_count);
        if scanned.len() >= window.end_page {
            return Ok(OffsetTable { offsets: scanned, estimated: false });
        }
        log::debug!(
            "offset scan found {} of {} pages; estimating the rest",
            scanned.len(),
            self.calibration.page_count
        );

        // 从最后一个找到的页开始外推
        let mut offsets = scanned;
        let mut next = offsets.last().map_or(first, |&o| o + increment);
        while offsets.len() < self.calibration.page_count {
            offsets.push(next);
            next += increment;
        }
        Ok(OffsetTable { offsets, estimated: true })
    }

    /// Decodes the window block by block, calibrating and timestamping each
    /// block before the next one is fetched.
    fn stream<D: PageDecoder>(
        &self,
        decoder: &mut D,
        window: &PageWindow,
        options: &ReadOptions,
        calibrator: Option<&Calibrator>,
        block_pages: usize,
    ) -> Result<Streamed> {
        let calib = &self.calibration;
        let mut decimator = options.downsample.map(Decimator::new);
        let mut data = SampleTable::new(options.do_temp);
        let mut voltages = Vec::new();
        let mut decoded_pages = 0;

        let mut block_start = window.start_page;
        while block_start <= window.end_page {
            let block_end = block_start.saturating_add(block_pages - 1).min(window.end_page);
            let pages = decoder.decode_pages(block_start, block_end)?;
            let complete = pages.len() == block_end + 1 - block_start;

            let mut block = SampleBlock::new(options.do_temp);
            for (i, page) in pages.into_iter().enumerate() {
                let page_no = block_start + i;
                let page_time = calib.page_time(page_no);
                let kept: Vec<usize> = match decimator.as_mut() {
                    Some(d) => d.take(page.samples.len()),
                    None => (0..page.samples.len()).collect(),
                };

                for k in kept {
                    block.push(make_row(
                        &page,
                        k,
                        page_time + k as f64 * calib.sample_interval,
                        calibrator,
                        options.do_temp,
                    ));
                }
                voltages.push(page.voltage);
                decoded_pages += 1;
            }

            data.append(&mut block);
            if !complete {
                break;
            }
            block_start = block_end + 1;
        }

        Ok(Streamed {
            data,
            voltages,
            decoded_pages,
            next_phase: decimator.map(|d| d.phase()),
        })
    }
}

fn make_row(
    page: &DecodedPage,
    k: usize,
    timestamp: f64,
    calibrator: Option<&Calibrator>,
    do_temp: bool,
) -> SampleRow {
    let s = &page.samples;
    let (x, y, z, light) = match calibrator {
        Some(c) => (c.axis(0, s.x[k]), c.axis(1, s.y[k]), c.axis(2, s.z[k]), c.light(s.light[k])),
        None => (s.x[k] as f64, s.y[k] as f64, s.z[k] as f64, s.light[k] as f64),
    };
    SampleRow {
        timestamp,
        x,
        y,
        z,
        light,
        button: s.button[k] as u8,
        temperature: do_temp.then_some(page.temperature),
    }
}

enum MappedFailure {
    /// Random access unusable; sequential reading will be used instead
    Degraded(String),
    Fatal(BinError),
}

use MappedFailure::{Degraded, Fatal};

fn warn(warnings: &mut Vec<ReadWarning>, options: &ReadOptions, warning: ReadWarning) {
    if !options.quiet {
        log::warn!("{}", warning);
    }
    warnings.push(warning);
}

/// Result of [`read_bin`]: decoded data, or a descriptor for a deferred read.
#[derive(Debug, Clone)]
pub enum BinRead {
    Data(AccData),
    Virtual(VirtualAccData),
}

/// Opens `path` and reads it with `options`, returning a
/// [`VirtualAccData`] when `options.virtual_read` is set.
pub fn read_bin<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<BinRead> {
    options.validate()?;
    let reader = AccReader::open(path)?;
    if options.virtual_read {
        reader.read_virtual(options).map(BinRead::Virtual)
    } else {
        reader.read(options).map(BinRead::Data)
    }
}
