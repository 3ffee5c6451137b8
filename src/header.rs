//! Header and calibration parsing.
//!
//! The header is plain text: section titles on their own line followed by
//! `key: value` lines, then the page records. Calibration values are taken
//! from fixed line offsets (see [`crate::layout`]) rather than by label, and
//! each slot is checked against the label it must hold.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{BinError, Result};
use crate::layout::{
    self, Anchor, Slot, HEADER_SCAN_LINES, LINES_PER_PAGE, OFFSET_SCAN_BYTES, REQUIRED_SECTIONS,
};
use crate::time::{naive_to_epoch, parse_page_time, parse_time_zone, RecordingClock};
use crate::types::{CalibrationConstants, HeaderField, HeaderInfo};
use crate::utils::{field_name, find_bytes, parse_decimal, parse_integer, rfind_bytes, split_field, trim_line_end};

/// Line positions of the sections a calibration read depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionIndex {
    configuration: usize,
    calibration: usize,
    memory_status: usize,
    first_page: usize,
}

impl SectionIndex {
    fn anchor_line(&self, anchor: Anchor) -> usize {
        match anchor {
            Anchor::ConfigurationInfo => self.configuration,
            Anchor::CalibrationData => self.calibration,
            Anchor::MemoryStatus => self.memory_status,
            Anchor::FirstPage => self.first_page,
        }
    }
}

/// Reads the leading lines of a source: the scan window plus one page
/// record, so the first page's label lines are always available.
pub fn read_header_lines<R: BufRead>(source: &mut R) -> Result<Vec<String>> {
    let limit = HEADER_SCAN_LINES + LINES_PER_PAGE;
    let mut lines = Vec::with_capacity(limit);
    let mut buf = Vec::new();

    while lines.len() < limit {
        buf.clear();
        if source.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        // 非UTF-8内容（例如压缩文件）会在后续校验中被拒绝
        let line = String::from_utf8_lossy(&buf);
        lines.push(trim_line_end(line.trim_end_matches('\n')).to_string());
    }

    Ok(lines)
}

fn locate_sections(lines: &[String]) -> Result<SectionIndex> {
    let scan = &lines[..lines.len().min(HEADER_SCAN_LINES)];
    let find = |title: &'static str| {
        scan.iter()
            .position(|l| l.trim() == title)
            .ok_or(BinError::MissingSection(title))
    };

    for title in REQUIRED_SECTIONS {
        find(title)?;
    }

    let memory_status = find(layout::MEMORY_STATUS)?;
    // 跳过 "Memory Status" 之前出现的 "Recorded Data"
    let first_page = scan
        .iter()
        .enumerate()
        .skip(memory_status + 1)
        .find(|(_, l)| l.trim() == layout::RECORDED_DATA)
        .map(|(i, _)| i)
        .ok_or(BinError::MissingSection(layout::RECORDED_DATA))?;

    Ok(SectionIndex {
        configuration: find(layout::CONFIGURATION_INFO)?,
        calibration: find(layout::CALIBRATION_DATA)?,
        memory_status,
        first_page,
    })
}

fn read_slot<'a>(lines: &'a [String], index: &SectionIndex, slot: Slot) -> Result<&'a str> {
    let line_no = index.anchor_line(slot.anchor) + slot.offset;
    let line = lines.get(line_no).ok_or_else(|| BinError::LayoutMismatch {
        line: line_no + 1,
        expected: slot.label,
        found: "<end of file>".to_string(),
    })?;

    match split_field(line) {
        Some((label, value)) if label.eq_ignore_ascii_case(slot.label) => Ok(value),
        _ => Err(BinError::LayoutMismatch {
            line: line_no + 1,
            expected: slot.label,
            found: line.clone(),
        }),
    }
}

/// Parses the header fields and detects the decimal separator.
///
/// Fails with [`BinError::MissingSection`] when a required section title,
/// or a `Recorded Data` line after `Memory Status`, is absent.
pub fn parse_header(lines: &[String]) -> Result<HeaderInfo> {
    let index = locate_sections(lines)?;

    let mut fields = Vec::new();
    let mut section = String::new();
    for line in &lines[..index.first_page] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match split_field(line) {
            Some((label, value)) => fields.push(HeaderField {
                section: section.clone(),
                name: field_name(label),
                value: value.to_string(),
            }),
            None => section = line.to_string(),
        }
    }

    let mut decimal_separator = '.';
    for probe in layout::DECIMAL_PROBES {
        if read_slot(lines, &index, probe)?.contains(',') {
            decimal_separator = ',';
        }
    }

    Ok(HeaderInfo { fields, decimal_separator })
}

/// Extracts the calibration constants from the fixed layout slots.
///
/// The random-access fields are left empty; see [`locate_records`].
pub fn parse_calibration(lines: &[String], header: &HeaderInfo) -> Result<CalibrationConstants> {
    let index = locate_sections(lines)?;
    let sep = header.decimal_separator;
    let integer = |slot: Slot| read_slot(lines, &index, slot).and_then(|v| parse_integer(v, sep));
    let decimal = |slot: Slot| read_slot(lines, &index, slot).and_then(|v| parse_decimal(v, sep));

    let page_count = integer(layout::PAGE_COUNT)?;
    if page_count < 1 {
        return Err(BinError::InvalidFormat("file contains no data pages".to_string()));
    }

    let sampling_frequency = decimal(layout::FREQUENCY)?;
    if !(sampling_frequency > 0.0) {
        return Err(BinError::InvalidFormat(format!(
            "invalid measurement frequency {}",
            sampling_frequency
        )));
    }

    let time_zone = parse_time_zone(read_slot(lines, &index, layout::TIME_ZONE)?)?;
    let start_local = parse_page_time(read_slot(lines, &index, layout::START_TIME)?)?;
    let start_calendar_epoch = naive_to_epoch(start_local, time_zone);
    let clock = RecordingClock::new(start_calendar_epoch, time_zone);

    Ok(CalibrationConstants {
        x_gain: integer(layout::X_GAIN)?,
        x_offset: integer(layout::X_OFFSET)?,
        y_gain: integer(layout::Y_GAIN)?,
        y_offset: integer(layout::Y_OFFSET)?,
        z_gain: integer(layout::Z_GAIN)?,
        z_offset: integer(layout::Z_OFFSET)?,
        volts: decimal(layout::VOLTS)?,
        lux: decimal(layout::LUX)?,
        sampling_frequency,
        page_count: page_count as usize,
        first_page_index: integer(layout::FIRST_PAGE_INDEX)?,
        start_seconds_of_day: start_calendar_epoch - clock.midnight(),
        start_calendar_epoch,
        start_day_midnight_epoch: clock.midnight(),
        sample_interval: 1.0 / sampling_frequency,
        time_zone,
        header_line_count: index.first_page,
        first_record_byte_offset: None,
        record_byte_increment: None,
    })
}

/// Finds the byte offset of the first page record and the byte length of
/// one record in the leading bytes of a file.
///
/// Returns `None` when either cannot be determined, e.g. for a compressed
/// file or a recording with a single page.
pub fn locate_records(prefix: &[u8]) -> Option<(u64, u64)> {
    let prefix = &prefix[..prefix.len().min(OFFSET_SCAN_BYTES)];
    let marker = layout::RECORDED_DATA.as_bytes();

    let memory_status = rfind_bytes(prefix, layout::MEMORY_STATUS.as_bytes())?;
    let after_status = memory_status + layout::MEMORY_STATUS.len();
    let first = after_status + find_bytes(&prefix[after_status..], marker)?;
    let after_first = first + marker.len();
    let second = after_first + find_bytes(&prefix[after_first..], marker)?;

    Some((first as u64, (second - first) as u64))
}

/// Opens a file and parses its header and calibration constants,
/// including the random-access offsets when they can be found.
///
/// # Examples
///
/// ```rust
/// use accbin::header::open_header;
/// use accbin::doctest_utils::BinFixture;
///
/// # BinFixture::new().pages(3).write("header_example.bin")?;
/// let (header, calibration) = open_header("header_example.bin")?;
/// assert_eq!(header.decimal_separator, '.');
/// assert_eq!(calibration.page_count, 3);
/// assert_eq!(calibration.sampling_frequency, 100.0);
/// assert!(calibration.supports_random_access());
/// # std::fs::remove_file("header_example.bin").ok();
/// # Ok::<(), accbin::BinError>(())
/// ```
pub fn open_header<P: AsRef<Path>>(path: P) -> Result<(HeaderInfo, CalibrationConstants)> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| BinError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let mut reader = BufReader::new(file);
    let lines = read_header_lines(&mut reader)?;
    let header = parse_header(&lines)?;
    let mut calibration = parse_calibration(&lines, &header)?;

    match read_prefix(path) {
        Ok(prefix) => {
            if let Some((first, increment)) = locate_records(&prefix) {
                calibration.first_record_byte_offset = Some(first);
                calibration.record_byte_increment = Some(increment);
            } else {
                log::debug!("{}: page record offsets not found in leading bytes", path.display());
            }
        }
        Err(e) => log::debug!("{}: byte-level header scan failed: {}", path.display(), e),
    }

    Ok((header, calibration))
}

fn read_prefix(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(OFFSET_SCAN_BYTES);
    File::open(path)?
        .take(OFFSET_SCAN_BYTES as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}
