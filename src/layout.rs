//! Fixed page layout of the device file format.
//!
//! Every section title, relative line offset and scan limit the parser
//! depends on lives here. A firmware change that moves a field should only
//! touch this module; all slots carry the label they are expected to hold so
//! that a moved field is reported as [`BinError::LayoutMismatch`] instead of
//! being silently misread.
//!
//! [`BinError::LayoutMismatch`]: crate::BinError::LayoutMismatch

/// Number of leading lines searched for section titles.
pub const HEADER_SCAN_LINES: usize = 300;

/// Number of leading bytes searched when locating the first page record.
pub const OFFSET_SCAN_BYTES: usize = 20_000;

/// Samples stored in one page record.
pub const SAMPLES_PER_PAGE: usize = 300;

/// Text lines making up one page record (9 label lines + 1 data line).
pub const LINES_PER_PAGE: usize = 10;

/// Hex digits per sample: x, y, z and the combined light/button field.
pub const HEX_DIGITS_PER_SAMPLE: usize = 12;

/// Hex digits in one page's data line.
pub const HEX_DIGITS_PER_PAGE: usize = SAMPLES_PER_PAGE * HEX_DIGITS_PER_SAMPLE;

/// Largest block used when the caller leaves the block size unbounded
/// but the requested range exceeds it.
pub const MAX_DEFAULT_BLOCK_PAGES: usize = 10_000;

/// Fraction of one sample interval tolerated when matching a time to a page.
pub const HALF_SAMPLE_TOLERANCE: f64 = 0.5;

/// `light/button` field: the button bit is set when `value / 4` leaves a
/// fractional part above this threshold (i.e. remainder >= 2).
pub const BUTTON_FRACTION_THRESHOLD: f64 = 0.49;

/// Files with at most this many pages report their time span in
/// "no matching pages" errors.
pub const SMALL_FILE_PAGES: usize = 1_000;

pub const DEVICE_IDENTITY: &str = "Device Identity";
pub const CONFIGURATION_INFO: &str = "Configuration Info";
pub const TRIAL_INFO: &str = "Trial Info";
pub const SUBJECT_INFO: &str = "Subject Info";
pub const CALIBRATION_DATA: &str = "Calibration Data";
pub const MEMORY_STATUS: &str = "Memory Status";
pub const RECORDED_DATA: &str = "Recorded Data";

/// Header sections that must be present, in file order.
pub const REQUIRED_SECTIONS: [&str; 6] = [
    DEVICE_IDENTITY,
    CONFIGURATION_INFO,
    TRIAL_INFO,
    SUBJECT_INFO,
    CALIBRATION_DATA,
    MEMORY_STATUS,
];

/// Where a section starts a fixed-offset slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    ConfigurationInfo,
    CalibrationData,
    MemoryStatus,
    /// The `Recorded Data` line of the first page record.
    FirstPage,
}

/// A value found at a fixed line offset from an anchor line.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub anchor: Anchor,
    pub offset: usize,
    pub label: &'static str,
}

const fn slot(anchor: Anchor, offset: usize, label: &'static str) -> Slot {
    Slot { anchor, offset, label }
}

pub const TIME_ZONE: Slot = slot(Anchor::ConfigurationInfo, 4, "Time Zone");

pub const X_GAIN: Slot = slot(Anchor::CalibrationData, 1, "x gain");
pub const X_OFFSET: Slot = slot(Anchor::CalibrationData, 2, "x offset");
pub const Y_GAIN: Slot = slot(Anchor::CalibrationData, 3, "y gain");
pub const Y_OFFSET: Slot = slot(Anchor::CalibrationData, 4, "y offset");
pub const Z_GAIN: Slot = slot(Anchor::CalibrationData, 5, "z gain");
pub const Z_OFFSET: Slot = slot(Anchor::CalibrationData, 6, "z offset");
pub const VOLTS: Slot = slot(Anchor::CalibrationData, 7, "Volts");
pub const LUX: Slot = slot(Anchor::CalibrationData, 8, "Lux");

pub const PAGE_COUNT: Slot = slot(Anchor::MemoryStatus, 1, "Number of Pages");

pub const FIRST_PAGE_INDEX: Slot = slot(Anchor::FirstPage, PAGE_SEQUENCE_LINE, "Sequence Number");
pub const START_TIME: Slot = slot(Anchor::FirstPage, PAGE_TIME_LINE, "Page Time");
pub const FIRST_TEMPERATURE: Slot = slot(Anchor::FirstPage, PAGE_TEMPERATURE_LINE, "Temperature");
pub const FIRST_VOLTAGE: Slot = slot(Anchor::FirstPage, PAGE_VOLTAGE_LINE, "Battery voltage");
pub const FREQUENCY: Slot = slot(Anchor::FirstPage, PAGE_FREQUENCY_LINE, "Measurement Frequency");

// 页内行偏移（相对于 "Recorded Data" 行）
pub const PAGE_SEQUENCE_LINE: usize = 2;
pub const PAGE_TIME_LINE: usize = 3;
pub const PAGE_TEMPERATURE_LINE: usize = 5;
pub const PAGE_VOLTAGE_LINE: usize = 6;
pub const PAGE_FREQUENCY_LINE: usize = 8;
pub const PAGE_DATA_LINE: usize = 9;

pub const TEMPERATURE_LABEL: &str = "Temperature:";
pub const VOLTAGE_LABEL: &str = "Battery voltage:";

/// Column where the temperature value starts on its page line.
pub const TEMPERATURE_COLUMN: usize = TEMPERATURE_LABEL.len();

/// Column where the battery voltage value starts on its page line.
pub const VOLTAGE_COLUMN: usize = VOLTAGE_LABEL.len();

/// The two fields inspected for a comma decimal separator.
pub const DECIMAL_PROBES: [Slot; 2] = [FIRST_TEMPERATURE, FIRST_VOLTAGE];
