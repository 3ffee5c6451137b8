use std::fmt;

use chrono::FixedOffset;

use crate::layout::SAMPLES_PER_PAGE;
use crate::time::RecordingClock;

/// One `key: value` line of the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    /// Title of the section the field appeared under
    pub section: String,
    /// Label with spaces replaced by underscores, e.g. `Device_Unique_Serial_Code`
    pub name: String,
    pub value: String,
}

/// Raw header fields in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderInfo {
    pub fields: Vec<HeaderField>,
    /// `.` or `,`, as used by the numeric fields of this file
    pub decimal_separator: char,
}

impl HeaderInfo {
    /// Value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Value of `name` within a specific section.
    pub fn get_in(&self, section: &str, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.section == section && f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All fields of a section.
    pub fn section<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a HeaderField> + 'a {
        self.fields.iter().filter(move |f| f.section == section)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.get("Device_Unique_Serial_Code")
    }

    pub fn device_location(&self) -> Option<&str> {
        self.get("Device_Location_Code")
    }
}

/// Constants needed to turn raw samples into calibrated, timestamped rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConstants {
    pub x_gain: i64,
    pub x_offset: i64,
    pub y_gain: i64,
    pub y_offset: i64,
    pub z_gain: i64,
    pub z_offset: i64,
    pub volts: f64,
    pub lux: f64,
    /// Samples per second
    pub sampling_frequency: f64,
    pub page_count: usize,
    /// Sequence number of the first page record
    pub first_page_index: i64,
    /// Start time as seconds after midnight, recording timezone
    pub start_seconds_of_day: f64,
    /// Start time as UTC epoch seconds
    pub start_calendar_epoch: f64,
    /// Midnight of the start day (recording timezone) as UTC epoch seconds
    pub start_day_midnight_epoch: f64,
    pub sample_interval: f64,
    pub time_zone: FixedOffset,
    /// Lines preceding the first page record
    pub header_line_count: usize,
    /// Byte offset of the first page record, when random access is possible
    pub first_record_byte_offset: Option<u64>,
    /// Byte length of one page record, when random access is possible
    pub record_byte_increment: Option<u64>,
}

impl CalibrationConstants {
    /// Seconds covered by one page.
    pub fn page_duration(&self) -> f64 {
        SAMPLES_PER_PAGE as f64 * self.sample_interval
    }

    /// Timestamp of the first sample of a 1-based page number.
    pub fn page_time(&self, page: usize) -> f64 {
        self.start_calendar_epoch + (page as f64 - 1.0) * self.page_duration()
    }

    /// Start-time table for every page in the file.
    pub fn page_times(&self) -> Vec<f64> {
        (1..=self.page_count).map(|p| self.page_time(p)).collect()
    }

    pub fn clock(&self) -> RecordingClock {
        RecordingClock::new(self.start_calendar_epoch, self.time_zone)
    }

    /// Whether byte offsets for random access were found.
    pub fn supports_random_access(&self) -> bool {
        self.first_record_byte_offset.is_some() && self.record_byte_increment.is_some()
    }
}

/// Inclusive 1-based page range resolved for one read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageWindow {
    pub start_page: usize,
    pub end_page: usize,
    /// Exact start time requested, used to trim the decoded rows
    pub start_time: Option<f64>,
    /// Exact end time requested, used to trim the decoded rows
    pub end_time: Option<f64>,
}

impl PageWindow {
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }

    pub fn contains(&self, other: &PageWindow) -> bool {
        other.start_page >= self.start_page && other.end_page <= self.end_page
    }
}

/// One output row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub light: f64,
    pub button: u8,
    pub temperature: Option<f64>,
}

/// Column-oriented table of decoded samples, in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    pub timestamp: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub light: Vec<f64>,
    pub button: Vec<u8>,
    pub temperature: Option<Vec<f64>>,
}

/// A decoded chunk of consecutive pages.
pub type SampleBlock = SampleTable;

impl SampleTable {
    pub fn new(with_temperature: bool) -> Self {
        SampleTable {
            temperature: with_temperature.then(Vec::new),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    pub fn push(&mut self, row: SampleRow) {
        self.timestamp.push(row.timestamp);
        self.x.push(row.x);
        self.y.push(row.y);
        self.z.push(row.z);
        self.light.push(row.light);
        self.button.push(row.button);
        if let Some(temperature) = self.temperature.as_mut() {
            temperature.push(row.temperature.unwrap_or(f64::NAN));
        }
    }

    pub fn row(&self, index: usize) -> Option<SampleRow> {
        if index >= self.len() {
            return None;
        }
        Some(SampleRow {
            timestamp: self.timestamp[index],
            x: self.x[index],
            y: self.y[index],
            z: self.z[index],
            light: self.light[index],
            button: self.button[index],
            temperature: self.temperature.as_ref().map(|t| t[index]),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = SampleRow> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Moves all rows of `block` to the end of this table.
    pub fn append(&mut self, block: &mut SampleBlock) {
        self.timestamp.append(&mut block.timestamp);
        self.x.append(&mut block.x);
        self.y.append(&mut block.y);
        self.z.append(&mut block.z);
        self.light.append(&mut block.light);
        self.button.append(&mut block.button);
        if let (Some(ours), Some(theirs)) = (self.temperature.as_mut(), block.temperature.as_mut()) {
            ours.append(theirs);
        }
    }

    /// Drops rows whose timestamp lies outside `[start, end]`.
    pub fn retain_time_range(&mut self, start: f64, end: f64) {
        let keep: Vec<bool> = self
            .timestamp
            .iter()
            .map(|&t| t >= start && t <= end)
            .collect();

        fn filter<T: Copy>(column: &mut Vec<T>, keep: &[bool]) {
            let mut i = 0;
            column.retain(|_| {
                i += 1;
                keep[i - 1]
            });
        }

        filter(&mut self.timestamp, &keep);
        filter(&mut self.x, &keep);
        filter(&mut self.y, &keep);
        filter(&mut self.z, &keep);
        filter(&mut self.light, &keep);
        filter(&mut self.button, &keep);
        if let Some(temperature) = self.temperature.as_mut() {
            filter(temperature, &keep);
        }
    }
}

/// Non-fatal conditions met during a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadWarning {
    /// Random access could not be used; pages were decoded sequentially.
    AccessDegraded { reason: String },
    /// Page offsets were computed from the nominal record length rather
    /// than found in the file.
    EstimatedOffsets { pages: usize },
    /// The downsampling factor does not divide the page size, so the
    /// retained samples drift relative to page boundaries.
    UnevenDownsample { factor: usize },
    /// The file ended before the page count announced in the header.
    Truncated { expected_pages: usize, decoded_pages: usize },
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadWarning::AccessDegraded { reason } => {
                write!(f, "random access unavailable ({}), falling back to sequential reading", reason)
            }
            ReadWarning::EstimatedOffsets { pages } => write!(
                f,
                "page offsets for {} pages estimated from the record length; \
                 values after variable-width fields may be unreliable",
                pages
            ),
            ReadWarning::UnevenDownsample { factor } => write!(
                f,
                "downsample factor {} does not divide {} samples per page; timestamps will drift",
                factor, SAMPLES_PER_PAGE
            ),
            ReadWarning::Truncated { expected_pages, decoded_pages } => write!(
                f,
                "file ends after {} of {} expected pages",
                decoded_pages, expected_pages
            ),
        }
    }
}

/// Result of a full read.
#[derive(Debug, Clone)]
pub struct AccData {
    pub header: HeaderInfo,
    pub calibration: CalibrationConstants,
    pub data: SampleTable,
    /// First-sample timestamp of every page in the window
    pub page_timestamps: Vec<f64>,
    /// Battery voltage per page, when requested
    pub page_voltages: Option<Vec<f64>>,
    /// Effective sampling frequency after downsampling
    pub frequency: f64,
    pub window: PageWindow,
    /// Byte offsets of every page record, when random access was used
    pub page_offsets: Option<Vec<u64>>,
    /// Phase to pass to a read of the pages that follow this window
    pub next_downsample_phase: Option<usize>,
    pub warnings: Vec<ReadWarning>,
}

impl AccData {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(t: f64) -> SampleRow {
        SampleRow {
            timestamp: t,
            x: t * 2.0,
            y: 0.0,
            z: -1.0,
            light: 10.0,
            button: 0,
            temperature: Some(20.0),
        }
    }

    #[test]
    fn test_table_append_and_rows() {
        let mut table = SampleTable::new(true);
        table.push(row(0.0));
        let mut block = SampleTable::new(true);
        block.push(row(1.0));
        block.push(row(2.0));
        table.append(&mut block);

        assert!(block.is_empty());
        assert_eq!(table.len(), 3);
        assert_eq!(table.row(2).unwrap().x, 4.0);
        assert_eq!(table.row(1).unwrap().temperature, Some(20.0));
        assert!(table.row(3).is_none());
        assert_eq!(table.rows().count(), 3);
    }

    #[test]
    fn test_retain_time_range() {
        let mut table = SampleTable::new(false);
        for t in 0..10 {
            table.push(row(t as f64));
        }
        table.retain_time_range(2.0, 5.0);
        assert_eq!(table.timestamp, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(table.x, vec![4.0, 6.0, 8.0, 10.0]);
        assert!(table.temperature.is_none());
    }

    #[test]
    fn test_header_lookup() {
        let header = HeaderInfo {
            fields: vec![
                HeaderField {
                    section: "Device Identity".to_string(),
                    name: "Device_Unique_Serial_Code".to_string(),
                    value: "012345".to_string(),
                },
                HeaderField {
                    section: "Subject Info".to_string(),
                    name: "Device_Location_Code".to_string(),
                    value: "left wrist".to_string(),
                },
            ],
            decimal_separator: '.',
        };
        assert_eq!(header.serial_number(), Some("012345"));
        assert_eq!(header.device_location(), Some("left wrist"));
        assert_eq!(header.get_in("Device Identity", "Device_Location_Code"), None);
        assert_eq!(header.section("Subject Info").count(), 1);
    }

    #[test]
    fn test_window_page_count() {
        let window = PageWindow { start_page: 3, end_page: 7, start_time: None, end_time: None };
        assert_eq!(window.page_count(), 5);
        let inner = PageWindow { start_page: 4, end_page: 7, ..window };
        assert!(window.contains(&inner));
        assert!(!inner.contains(&window));
    }
}
