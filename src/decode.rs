//! Packed sample decoding.
//!
//! Each sample is twelve hex digits: three 12-bit groups for the x, y and z
//! axes followed by one 12-bit group holding light (upper 10 bits) and the
//! button state (bit 1). Axis groups are two's-complement; the light group
//! is unsigned.
//!
//! Two decoders are provided, one over text and one over the raw bytes of a
//! memory-mapped file. They produce identical matrices for the same page.

use crate::error::{BinError, Result};
use crate::layout::{BUTTON_FRACTION_THRESHOLD, HEX_DIGITS_PER_SAMPLE};

/// Decoded integer samples, one vector per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleMatrix {
    pub x: Vec<i32>,
    pub y: Vec<i32>,
    pub z: Vec<i32>,
    pub light: Vec<i32>,
    pub button: Vec<i32>,
}

impl SampleMatrix {
    pub fn with_capacity(samples: usize) -> Self {
        SampleMatrix {
            x: Vec::with_capacity(samples),
            y: Vec::with_capacity(samples),
            z: Vec::with_capacity(samples),
            light: Vec::with_capacity(samples),
            button: Vec::with_capacity(samples),
        }
    }

    /// Number of samples (columns of the 5 x n matrix).
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The five channels in x, y, z, light, button order.
    pub fn rows(&self) -> [&[i32]; 5] {
        [&self.x, &self.y, &self.z, &self.light, &self.button]
    }

    pub fn append(&mut self, other: &mut SampleMatrix) {
        self.x.append(&mut other.x);
        self.y.append(&mut other.y);
        self.z.append(&mut other.z);
        self.light.append(&mut other.light);
        self.button.append(&mut other.button);
    }

    fn push_axes(&mut self, groups: [i32; 4], light: i32, button: i32) {
        self.x.push(signed_12bit(groups[0]));
        self.y.push(signed_12bit(groups[1]));
        self.z.push(signed_12bit(groups[2]));
        self.light.push(light);
        self.button.push(button);
    }
}

/// Two's-complement sign extension of a 12-bit field.
fn signed_12bit(value: i32) -> i32 {
    if value >= 2048 {
        value - 4096
    } else {
        value
    }
}

fn check_length(len: usize) -> Result<()> {
    if len % HEX_DIGITS_PER_SAMPLE != 0 {
        return Err(BinError::Decode(format!(
            "data length {} is not a multiple of {} hex digits",
            len, HEX_DIGITS_PER_SAMPLE
        )));
    }
    Ok(())
}

/// Decodes a run of hex characters.
///
/// # Examples
///
/// ```rust
/// use accbin::decode::decode_text;
///
/// // x = 0x001, y = 0xFFF (-1), z = 0x800 (-2048), light/button = 0x00E
/// let samples = decode_text("001FFF80000E")?;
/// assert_eq!(samples.x, vec![1]);
/// assert_eq!(samples.y, vec![-1]);
/// assert_eq!(samples.z, vec![-2048]);
/// assert_eq!(samples.light, vec![3]);
/// assert_eq!(samples.button, vec![1]);
/// # Ok::<(), accbin::BinError>(())
/// ```
pub fn decode_text(hex: &str) -> Result<SampleMatrix> {
    check_length(hex.len())?;
    let count = hex.len() / HEX_DIGITS_PER_SAMPLE;
    let mut out = SampleMatrix::with_capacity(count);

    let mut digits = hex.chars().map(|c| {
        c.to_digit(16)
            .map(|d| d as i32)
            .ok_or_else(|| BinError::Decode(format!("invalid hex digit '{}'", c)))
    });

    for _ in 0..count {
        let mut groups = [0i32; 4];
        for group in groups.iter_mut() {
            // 16²·d0 + 16·d1 + d2
            let mut value = 0;
            for _ in 0..3 {
                let digit = digits
                    .next()
                    .ok_or_else(|| BinError::Decode("truncated sample".to_string()))??;
                value = value * 16 + digit;
            }
            *group = value;
        }

        let combined = groups[3];
        let quarter = combined as f64 / 4.0;
        let light = quarter.floor() as i32;
        let button = i32::from(quarter - quarter.floor() > BUTTON_FRACTION_THRESHOLD);
        out.push_axes(groups, light, button);
    }

    Ok(out)
}

const INVALID: u8 = 0xFF;

/// ASCII code -> hex digit value.
const HEX_TABLE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 10 {
        table[b'0' as usize + i] = i as u8;
        i += 1;
    }
    let mut i = 0;
    while i < 6 {
        table[b'A' as usize + i] = 10 + i as u8;
        table[b'a' as usize + i] = 10 + i as u8;
        i += 1;
    }
    table
};

/// Decodes the raw bytes of a data line, e.g. a slice of a mapped file.
pub fn decode_bytes(raw: &[u8]) -> Result<SampleMatrix> {
    check_length(raw.len())?;
    let mut out = SampleMatrix::with_capacity(raw.len() / HEX_DIGITS_PER_SAMPLE);

    for sample in raw.chunks_exact(HEX_DIGITS_PER_SAMPLE) {
        let mut groups = [0i32; 4];
        for (group, digits) in groups.iter_mut().zip(sample.chunks_exact(3)) {
            let mut value = 0i32;
            for &byte in digits {
                let digit = HEX_TABLE[byte as usize];
                if digit == INVALID {
                    return Err(BinError::Decode(format!("invalid hex byte 0x{:02X}", byte)));
                }
                value = (value << 4) | digit as i32;
            }
            *group = value;
        }

        let combined = groups[3];
        out.push_axes(groups, combined >> 2, (combined >> 1) & 1);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[(i32, i32, i32, i32, bool)]) -> String {
        samples
            .iter()
            .map(|&(x, y, z, light, button)| {
                let combined = (light << 2) | (i32::from(button) << 1);
                format!(
                    "{:03X}{:03X}{:03X}{:03X}",
                    x & 0xFFF,
                    y & 0xFFF,
                    z & 0xFFF,
                    combined
                )
            })
            .collect()
    }

    #[test]
    fn test_sign_extension() {
        let hex = encode(&[(2047, -2048, -1, 0, false), (0, 1, -100, 1023, true)]);
        let m = decode_text(&hex).unwrap();
        assert_eq!(m.x, vec![2047, 0]);
        assert_eq!(m.y, vec![-2048, 1]);
        assert_eq!(m.z, vec![-1, -100]);
        assert_eq!(m.light, vec![0, 1023]);
        assert_eq!(m.button, vec![0, 1]);
    }

    #[test]
    fn test_light_is_unsigned() {
        // 0xFFC: 最高位为1，但光照不做符号扩展
        let m = decode_text("000000000FFC").unwrap();
        assert_eq!(m.light, vec![1023]);
        assert_eq!(m.button, vec![0]);
    }

    #[test]
    fn test_button_uses_second_lowest_bit() {
        // remainders 0, 1, 2, 3
        let m = decode_text("000000000004000000000005000000000006000000000007").unwrap();
        assert_eq!(m.light, vec![1, 1, 1, 1]);
        assert_eq!(m.button, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_text_and_bytes_agree() {
        let mut samples = Vec::new();
        for i in 0..300 {
            let v = (i * 37) % 4096 - 2048;
            samples.push((v, -v / 2, (i * 13) % 2048, (i * 7) % 1024, i % 3 == 0));
        }
        let hex = encode(&samples);
        let from_text = decode_text(&hex).unwrap();
        let from_bytes = decode_bytes(hex.as_bytes()).unwrap();
        assert_eq!(from_text, from_bytes);
        assert_eq!(from_text.len(), 300);

        // 小写十六进制同样可解析
        let lower = hex.to_ascii_lowercase();
        assert_eq!(decode_bytes(lower.as_bytes()).unwrap(), from_text);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(decode_text("00000000000"), Err(BinError::Decode(_))));
        assert!(matches!(decode_text("00000000000G"), Err(BinError::Decode(_))));
        assert!(matches!(decode_bytes(b"00000000000G"), Err(BinError::Decode(_))));
        assert!(decode_text("").unwrap().is_empty());
    }
}
