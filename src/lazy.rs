//! Deferred reads.
//!
//! A [`VirtualAccData`] holds everything needed to decode a window later:
//! the resolved page range, the parsed header and the read options. No
//! sample data is kept in memory until [`VirtualAccData::materialize`] is
//! called.

use std::path::{Path, PathBuf};

use crate::error::{BinError, Result};
use crate::layout::SAMPLES_PER_PAGE;
use crate::reader::{AccReader, ReadOptions};
use crate::types::{AccData, CalibrationConstants, HeaderInfo, PageWindow};
use crate::window::WindowSpec;

/// Bytes held per output row: timestamp, x, y, z and light as `f64` plus
/// the button byte.
const BYTES_PER_ROW: usize = 5 * 8 + 1;

/// A resolved but not yet decoded read.
///
/// # Examples
///
/// ```rust
/// use accbin::{read_bin, BinRead, ReadOptions};
/// # accbin::doctest_utils::BinFixture::new().pages(5).write("virtual_example.bin")?;
///
/// let options = ReadOptions::new().with_start(2usize).virtual_read();
/// let BinRead::Virtual(lazy) = read_bin("virtual_example.bin", &options)? else {
///     panic!("expected a virtual read");
/// };
/// assert_eq!(lazy.window.start_page, 2);
/// assert_eq!(lazy.estimated_rows(), 4 * 300);
///
/// // Decode only pages 3 and 4
/// let data = lazy.materialize(Some(3usize.into()), Some(4usize.into()))?;
/// assert_eq!(data.len(), 600);
/// # std::fs::remove_file("virtual_example.bin").ok();
/// # Ok::<(), accbin::BinError>(())
/// ```
#[derive(Debug, Clone)]
pub struct VirtualAccData {
    pub path: PathBuf,
    pub header: HeaderInfo,
    pub calibration: CalibrationConstants,
    pub window: PageWindow,
    /// First-sample timestamp of every page in the window
    pub page_timestamps: Vec<f64>,
    /// Sampling frequency after downsampling
    pub frequency: f64,
    pub options: ReadOptions,
}

impl VirtualAccData {
    pub(crate) fn new(
        path: PathBuf,
        header: HeaderInfo,
        calibration: CalibrationConstants,
        window: PageWindow,
        options: ReadOptions,
    ) -> Self {
        let page_timestamps = (window.start_page..=window.end_page)
            .map(|p| calibration.page_time(p))
            .collect();
        let frequency = match options.downsample {
            Some(ds) => calibration.sampling_frequency / ds.factor as f64,
            None => calibration.sampling_frequency,
        };

        VirtualAccData {
            path,
            header,
            calibration,
            window,
            page_timestamps,
            frequency,
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows a full materialization would produce, before any timestamp trim.
    pub fn estimated_rows(&self) -> usize {
        let samples = self.window.page_count() * SAMPLES_PER_PAGE;
        match self.options.downsample {
            Some(ds) => {
                let skipped = (ds.phase - 1) % ds.factor;
                (samples.saturating_sub(skipped)).div_ceil(ds.factor)
            }
            None => samples,
        }
    }

    /// Approximate memory taken by a full materialization.
    pub fn estimated_bytes(&self) -> usize {
        let per_row = if self.options.do_temp { BYTES_PER_ROW + 8 } else { BYTES_PER_ROW };
        self.estimated_rows() * per_row
    }

    /// Decodes the whole window, or the part of it between `start` and `end`.
    ///
    /// # Errors
    ///
    /// `BinError::InvalidWindow` when the requested range reaches outside
    /// the window this descriptor was created for.
    pub fn materialize(&self, start: Option<WindowSpec>, end: Option<WindowSpec>) -> Result<AccData> {
        let mut options = self.options.clone();
        options.virtual_read = false;
        if start.is_some() || end.is_some() {
            options.start = start;
            options.end = end;
            options.length = None;
        }
        self.materialize_with(options)
    }

    /// Decodes with a different set of options, such as another block size
    /// or downsampling phase. The window must stay inside this one.
    pub fn materialize_with(&self, options: ReadOptions) -> Result<AccData> {
        let reader = AccReader::open(&self.path)?;
        if reader.calibration() != &self.calibration {
            return Err(BinError::InvalidFormat(format!(
                "{} changed since it was opened",
                self.path.display()
            )));
        }

        let mut options = options;
        if options.start.is_none() {
            options.start = Some(WindowSpec::Page(self.window.start_page));
        }
        if options.end.is_none() && options.length.is_none() {
            options.end = Some(WindowSpec::Page(self.window.end_page));
        }

        let window = reader.resolve(&options)?;
        if !self.window.contains(&window) {
            return Err(BinError::InvalidWindow(format!(
                "pages {}..={} lie outside the deferred window {}..={}",
                window.start_page, window.end_page, self.window.start_page, self.window.end_page
            )));
        }

        log::debug!(
            "materializing pages {}..={} of {}",
            window.start_page,
            window.end_page,
            self.path.display()
        );
        reader.read(&options)
    }
}
