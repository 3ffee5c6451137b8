//! # accbin
//!
//! A pure Rust reader for page-structured accelerometer `.bin` recordings.
//! These files are plain text: a header of titled sections followed by page
//! records of 300 samples, each sample packed as twelve hex digits holding
//! the x, y and z axes and a combined light/button field.
//!
//! ## Quick Start
//!
//! ### Reading a recording
//!
//! ```rust
//! use accbin::{AccReader, ReadOptions, Result};
//!
//! fn main() -> Result<()> {
//!     # accbin::doctest_utils::BinFixture::new().pages(10).write("quickstart.bin")?;
//!     let reader = AccReader::open("quickstart.bin")?;
//!
//!     // Header values and calibration constants
//!     println!("Serial: {:?}", reader.header().serial_number());
//!     println!("Pages: {}", reader.calibration().page_count);
//!
//!     // Read the whole file, calibrated to g and lux
//!     let data = reader.read(&ReadOptions::new())?;
//!     assert_eq!(data.len(), 10 * 300);
//!     for row in data.data.rows().take(3) {
//!         println!("{:.2} {:+.4} {:+.4} {:+.4}", row.timestamp, row.x, row.y, row.z);
//!     }
//!     # std::fs::remove_file("quickstart.bin").ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Choosing a window
//!
//! The start and end of a read accept page numbers, proportions of the
//! recording, epoch timestamps or time strings interpreted in the
//! recording's own time zone:
//!
//! ```rust
//! use accbin::{AccReader, Downsample, ReadOptions};
//! # accbin::doctest_utils::BinFixture::new().pages(10).write("window_example.bin")?;
//! let reader = AccReader::open("window_example.bin")?;
//!
//! // Second half of the recording
//! let half = reader.read(&ReadOptions::new().with_start("0.5"))?;
//! assert_eq!(half.window.start_page, 5);
//!
//! // The page containing 00:00:01 through the page containing 00:00:02
//! let seconds = reader.read(&ReadOptions::new().with_start("00:00:01").with_end("00:00:02"))?;
//! assert_eq!(seconds.len(), 300);
//!
//! // Every tenth sample, continuing the phase into the next read
//! let first = reader.read(
//!     &ReadOptions::new().with_end(5usize).with_downsample(Downsample::new(10)),
//! )?;
//! let phase = first.next_downsample_phase.unwrap();
//! let rest = reader.read(
//!     &ReadOptions::new()
//!         .with_start(6usize)
//!         .with_downsample(Downsample::with_phase(10, phase)),
//! )?;
//! assert_eq!(first.len() + rest.len(), 300);
//! assert_eq!(first.frequency, 10.0);
//! # std::fs::remove_file("window_example.bin").ok();
//! # Ok::<(), accbin::BinError>(())
//! ```
//!
//! ## Calibration
//!
//! Raw axis values are converted with `(raw * 100 - offset) / gain` using the
//! gains and offsets of the `Calibration Data` section; light is scaled by
//! `lux / volts`. Pass [`ReadOptions::uncalibrated`] for raw values or
//! [`ReadOptions::with_calibration`] to override the header's constants.
//!
//! ## Access paths
//!
//! Files are read through a memory map when the byte offsets of the page
//! records can be found, which lets a read jump straight to its window.
//! Otherwise, or when mapping fails, pages are decoded line by line. Both
//! paths produce identical output; any fallback is reported in
//! [`AccData::warnings`].

pub mod error;
pub mod types;
pub mod utils;
pub mod layout;
pub mod time;
pub mod header;
pub mod window;
pub mod decode;
pub mod reader;
pub mod lazy;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use error::{BinError, Result};
pub use types::{
    AccData, CalibrationConstants, HeaderField, HeaderInfo, PageWindow, ReadWarning, SampleBlock,
    SampleRow, SampleTable,
};
pub use reader::{read_bin, AccReader, AccessMode, BinRead, Downsample, ManualCalibration, ReadOptions};
pub use window::WindowSpec;
pub use lazy::VirtualAccData;
pub use time::RecordingClock;

// Important constants
pub use layout::{LINES_PER_PAGE, SAMPLES_PER_PAGE};

/// Library version
///
/// Returns the current version of the accbin library.
///
/// # Examples
///
/// ```rust
/// let version = accbin::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
