// Internal utilities for documentation tests
// This file contains helpers that synthesise device files for doctests and
// integration tests

use std::path::Path;

use chrono::NaiveDateTime;

use crate::layout::SAMPLES_PER_PAGE;
use crate::Result;

/// Default recording start written by [`BinFixture`].
pub const FIXTURE_START: &str = "2012-02-01 00:00:00";

/// Raw sample values written at a given position of the recording.
///
/// `global` counts samples from the start of the file (0-based). Returns
/// `[x, y, z, light, button]` as the decoder should report them.
pub fn raw_sample(global: usize) -> [i32; 5] {
    let signed = |v: usize| {
        let v = (v % 4096) as i32;
        if v >= 2048 {
            v - 4096
        } else {
            v
        }
    };
    [
        signed(global * 7 + 11),
        signed(global * 13 + 100),
        signed(global * 31 + 2000),
        ((global * 3) % 1024) as i32,
        i32::from(global % 5 == 0),
    ]
}

/// Builder for synthetic recordings laid out like real device files.
#[derive(Debug, Clone)]
pub struct BinFixture {
    pages: usize,
    written_pages: Option<usize>,
    frequency: f64,
    start: String,
    time_zone: String,
    first_page_index: i64,
    comma: bool,
    decoy: bool,
    wide_temperature_pages: Vec<usize>,
}

impl Default for BinFixture {
    fn default() -> Self {
        BinFixture {
            pages: 3,
            written_pages: None,
            frequency: 100.0,
            start: FIXTURE_START.to_string(),
            time_zone: "GMT +00:00".to_string(),
            first_page_index: 0,
            comma: false,
            decoy: false,
            wide_temperature_pages: Vec::new(),
        }
    }
}

impl BinFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page count announced in the header (and written, unless truncated).
    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    /// Writes only the first `pages` records while announcing the full count.
    pub fn truncate_after(mut self, pages: usize) -> Self {
        self.written_pages = Some(pages);
        self
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Start time as `YYYY-MM-DD HH:MM:SS`.
    pub fn start(mut self, start: &str) -> Self {
        self.start = start.to_string();
        self
    }

    pub fn time_zone(mut self, time_zone: &str) -> Self {
        self.time_zone = time_zone.to_string();
        self
    }

    pub fn first_page_index(mut self, index: i64) -> Self {
        self.first_page_index = index;
        self
    }

    /// Writes numeric fields with `,` as the decimal mark.
    pub fn comma_decimals(mut self) -> Self {
        self.comma = true;
        self
    }

    /// Adds a stray `Recorded Data` title before `Memory Status`.
    pub fn decoy_marker(mut self) -> Self {
        self.decoy = true;
        self
    }

    /// Writes the temperature of these 1-based pages with an extra digit,
    /// making their records one byte longer.
    pub fn wide_temperature(mut self, pages: &[usize]) -> Self {
        self.wide_temperature_pages = pages.to_vec();
        self
    }

    /// Temperature written on a 1-based page.
    pub fn temperature(page: usize) -> f64 {
        20.0 + (page % 10) as f64 * 0.5
    }

    /// Battery voltage written on a 1-based page.
    pub fn voltage(page: usize) -> f64 {
        4.0 - (page % 50) as f64 * 0.01
    }

    fn decimal(&self, text: String) -> String {
        if self.comma {
            text.replace('.', ",")
        } else {
            text
        }
    }

    fn page_time(&self, page: usize) -> String {
        let start = NaiveDateTime::parse_from_str(&self.start, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_default();
        let offset_ms = ((page - 1) as f64 * SAMPLES_PER_PAGE as f64 / self.frequency * 1000.0).round();
        let time = start + chrono::Duration::milliseconds(offset_ms as i64);
        format!(
            "{}:{:03}",
            time.format("%Y-%m-%d %H:%M:%S"),
            time.and_utc().timestamp_subsec_millis()
        )
    }

    fn data_line(page: usize) -> String {
        let mut line = String::with_capacity(SAMPLES_PER_PAGE * 12);
        for k in 0..SAMPLES_PER_PAGE {
            let [x, y, z, light, button] = raw_sample((page - 1) * SAMPLES_PER_PAGE + k);
            let combined = (light << 2) | (button << 1);
            line.push_str(&format!(
                "{:03X}{:03X}{:03X}{:03X}",
                x & 0xFFF,
                y & 0xFFF,
                z & 0xFFF,
                combined
            ));
        }
        line
    }

    /// Renders the whole file as text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut line = |s: &str| {
            out.push_str(s);
            out.push('\n');
        };

        for s in [
            "Device Identity",
            "Device Unique Serial Code:012345",
            "Device Type:Accelerometer",
            "Device Model:1.1",
            "Device Firmware:Ver03.01 19Jan2012",
            "Calibration Date:2012-01-30 15:46:08:000",
            "",
            "Device Capabilities",
            "Accelerometer Range:-8 to 8",
            "Accelerometer Units:g",
            "Light Meter Range:0 to 5000",
            "Light Meter Units:lux",
            "Temperature Sensor Units:deg. C",
            "",
            "Configuration Info",
            "Measurement Frequency:100 Hz",
            "Measurement Period:168 Hours",
        ] {
            line(s);
        }
        line(&format!("Start Time:{}", self.page_time(1)));
        line(&format!("Time Zone:{}", self.time_zone));

        for s in [
            "",
            "Trial Info",
            "Study Centre:Test Centre",
            "Study Code:ST01",
            "Investigator ID:INV01",
            "Exercise Type:free living",
            "Config Operator ID:OP1",
            "Config Time:2012-01-31 10:48:19:000",
            "Extract Operator ID:OP2",
            "Extract Time:2012-02-10 09:00:00:000",
            "Extract Notes:",
            "",
            "Subject Info",
            "Device Location Code:left wrist",
            "Subject Code:S001",
            "Date of Birth:1980-01-01",
            "Sex:female",
            "Height:170",
            "Weight:65",
            "Handedness Code:right",
            "Subject Notes:",
            "",
        ] {
            line(s);
        }
        if self.decoy {
            line("Recorded Data");
            line("");
        }

        let volts = if self.comma { "300,0" } else { "300" };
        let lux = if self.comma { "800,0" } else { "800" };
        for s in [
            "Calibration Data".to_string(),
            "x gain:25548".to_string(),
            "x offset:-2425".to_string(),
            "y gain:26242".to_string(),
            "y offset:1136".to_string(),
            "z gain:25836".to_string(),
            "z offset:-1032".to_string(),
            format!("Volts:{}", volts),
            format!("Lux:{}", lux),
            String::new(),
            "Memory Status".to_string(),
            format!("Number of Pages:{}", self.pages),
            String::new(),
        ] {
            line(&s);
        }

        let written = self.written_pages.unwrap_or(self.pages).min(self.pages);
        for page in 1..=written {
            let temperature = if self.wide_temperature_pages.contains(&page) {
                format!("{:.2}", Self::temperature(page))
            } else {
                format!("{:.1}", Self::temperature(page))
            };
            line("Recorded Data");
            line("Device Unique Serial Code:012345");
            line(&format!("Sequence Number:{}", self.first_page_index + page as i64 - 1));
            line(&format!("Page Time:{}", self.page_time(page)));
            line("Unassigned:");
            line(&format!("Temperature:{}", self.decimal(temperature)));
            line(&format!("Battery voltage:{}", self.decimal(format!("{:.2}", Self::voltage(page)))));
            line("Device Status:Recording");
            line(&format!("Measurement Frequency:{}", self.decimal(format!("{:.1}", self.frequency))));
            line(&Self::data_line(page));
        }

        out
    }

    /// Writes the rendered file to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}
