//! Resolution of start/end specifications into page ranges.

use crate::error::{BinError, Result};
use crate::layout::SMALL_FILE_PAGES;
use crate::time::{page_for_time, PageEdge, DEFAULT_TIME_FORMAT};
use crate::types::{CalibrationConstants, PageWindow};

/// One end of a requested window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSpec {
    /// 1-based page number
    Page(usize),
    /// Fraction of the recording in `[0, 1]`
    Proportion(f64),
    /// UTC epoch seconds; rows outside the exact time are trimmed
    Timestamp(f64),
    /// A time string understood by [`RecordingClock::resolve`]
    ///
    /// [`RecordingClock::resolve`]: crate::time::RecordingClock::resolve
    Time(String),
}

impl WindowSpec {
    /// Interprets a bare number given as a window start: values in `[0, 1)`
    /// are proportions, values of at least `1e9` are epoch timestamps and
    /// other integers are pages.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use accbin::WindowSpec;
    ///
    /// assert_eq!(WindowSpec::from_number(0.5)?, WindowSpec::Proportion(0.5));
    /// assert_eq!(WindowSpec::from_number(1.0)?, WindowSpec::Page(1));
    /// assert_eq!(WindowSpec::from_number(12.0)?, WindowSpec::Page(12));
    /// assert_eq!(WindowSpec::from_number(1.3e9)?, WindowSpec::Timestamp(1.3e9));
    /// assert!(WindowSpec::from_number(2.5).is_err());
    /// # Ok::<(), accbin::BinError>(())
    /// ```
    pub fn from_number(value: f64) -> Result<Self> {
        if (0.0..1.0).contains(&value) {
            Ok(WindowSpec::Proportion(value))
        } else if value >= 1e9 {
            Ok(WindowSpec::Timestamp(value))
        } else if value >= 1.0 && value.fract() == 0.0 {
            Ok(WindowSpec::Page(value as usize))
        } else {
            Err(BinError::InvalidWindow(format!(
                "{} is neither a proportion, a page number nor a timestamp",
                value
            )))
        }
    }

    /// Like [`WindowSpec::from_number`], but for a window end, where `1`
    /// means the whole recording rather than page 1.
    ///
    /// ```rust
    /// use accbin::WindowSpec;
    ///
    /// assert_eq!(WindowSpec::end_from_number(1.0)?, WindowSpec::Proportion(1.0));
    /// assert_eq!(WindowSpec::end_from_number(3.0)?, WindowSpec::Page(3));
    /// # Ok::<(), accbin::BinError>(())
    /// ```
    pub fn end_from_number(value: f64) -> Result<Self> {
        if value == 1.0 {
            Ok(WindowSpec::Proportion(1.0))
        } else {
            Self::from_number(value)
        }
    }

    fn exact_time(&self) -> Option<f64> {
        match self {
            WindowSpec::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<usize> for WindowSpec {
    fn from(page: usize) -> Self {
        WindowSpec::Page(page)
    }
}

impl From<&str> for WindowSpec {
    fn from(time: &str) -> Self {
        WindowSpec::Time(time.to_string())
    }
}

impl From<String> for WindowSpec {
    fn from(time: String) -> Self {
        WindowSpec::Time(time)
    }
}

fn check_proportion(p: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(BinError::InvalidWindow(format!("proportion {} outside [0, 1]", p)))
    }
}

struct PageLookup<'a> {
    calib: &'a CalibrationConstants,
    page_times: Option<Vec<f64>>,
}

impl PageLookup<'_> {
    fn page_at(&mut self, epoch: f64, edge: PageEdge) -> Option<usize> {
        let calib = self.calib;
        let times = self.page_times.get_or_insert_with(|| calib.page_times());
        page_for_time(epoch, times, calib.sample_interval, edge)
    }

    fn epoch_of(&self, spec: &WindowSpec) -> Result<Option<f64>> {
        match spec {
            WindowSpec::Timestamp(t) => Ok(Some(*t)),
            WindowSpec::Time(s) => self.calib.clock().resolve(s).map(Some),
            _ => Ok(None),
        }
    }
}

/// Resolves a start/end pair into an inclusive page range.
///
/// Missing ends default to the first and last page. `length`, when given
/// without an explicit end, sets the number of pages to read. A start page
/// past the end of the file is an error; an end past it is clamped.
pub fn resolve_window(
    start: Option<&WindowSpec>,
    end: Option<&WindowSpec>,
    length: Option<usize>,
    calib: &CalibrationConstants,
) -> Result<PageWindow> {
    let page_count = calib.page_count;
    let mut lookup = PageLookup { calib, page_times: None };

    let start_page = match start {
        None => 1,
        Some(WindowSpec::Page(p)) => {
            if *p > page_count {
                return Err(BinError::StartOutOfRange { start: *p, page_count });
            }
            (*p).max(1)
        }
        Some(WindowSpec::Proportion(p)) => {
            let page = (check_proportion(*p)? * page_count as f64).ceil() as usize;
            page.clamp(1, page_count)
        }
        Some(spec) => {
            let epoch = lookup.epoch_of(spec)?.unwrap_or(calib.start_calendar_epoch);
            match lookup.page_at(epoch, PageEdge::Start) {
                Some(page) => page,
                None => return Err(no_matching_pages(calib)),
            }
        }
    };

    let end_page = match end {
        None => match length {
            Some(0) => return Err(BinError::InvalidWindow("length must be at least one page".to_string())),
            Some(len) => (start_page + len - 1).min(page_count),
            None => page_count,
        },
        Some(WindowSpec::Page(p)) => (*p).min(page_count),
        Some(WindowSpec::Proportion(p)) => {
            let page = (check_proportion(*p)? * page_count as f64).ceil() as usize;
            page.clamp(1, page_count)
        }
        Some(spec) => {
            let epoch = lookup.epoch_of(spec)?.unwrap_or(calib.start_calendar_epoch);
            lookup.page_at(epoch, PageEdge::End).unwrap_or(0)
        }
    };

    if end_page < start_page || end_page == 0 {
        return Err(no_matching_pages(calib));
    }

    Ok(PageWindow {
        start_page,
        end_page,
        start_time: start.and_then(WindowSpec::exact_time),
        end_time: end.and_then(WindowSpec::exact_time),
    })
}

fn no_matching_pages(calib: &CalibrationConstants) -> BinError {
    if calib.page_count > SMALL_FILE_PAGES {
        return BinError::NoMatchingPages(String::new());
    }
    let clock = calib.clock();
    let last = calib.page_time(calib.page_count) + calib.page_duration();
    BinError::NoMatchingPages(format!(
        " (recording covers {} to {})",
        clock.format(calib.start_calendar_epoch, DEFAULT_TIME_FORMAT),
        clock.format(last, DEFAULT_TIME_FORMAT)
    ))
}
