//! Waveform capture types.

use crate::error::ScopeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::settings::ChannelId;

/// Waveform record points mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsMode {
    Normal,
    Maximum,
    Raw,
}

impl PointsMode {
    pub fn scpi(self) -> &'static str {
        match self {
            PointsMode::Normal => "NORMal",
            PointsMode::Maximum => "MAXimum",
            PointsMode::Raw => "RAW",
        }
    }
}

impl FromStr for PointsMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "norm" | "normal" => Ok(PointsMode::Normal),
            "max" | "maximum" => Ok(PointsMode::Maximum),
            "raw" => Ok(PointsMode::Raw),
            _ => Err(ScopeError::Parse {
                what: "points mode",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Transfer format of waveform data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformFormat {
    Byte,
    Word,
    Ascii,
}

impl WaveformFormat {
    pub fn scpi(self) -> &'static str {
        match self {
            WaveformFormat::Byte => "BYTE",
            WaveformFormat::Word => "WORD",
            WaveformFormat::Ascii => "ASCii",
        }
    }
}

impl FromStr for WaveformFormat {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byte" => Ok(WaveformFormat::Byte),
            "word" => Ok(WaveformFormat::Word),
            "asc" | "ascii" => Ok(WaveformFormat::Ascii),
            _ => Err(ScopeError::Parse {
                what: "waveform format",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Byte order of WORD-format transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

impl ByteOrder {
    pub fn scpi(self) -> &'static str {
        match self {
            ByteOrder::LsbFirst => "LSBFirst",
            ByteOrder::MsbFirst => "MSBFirst",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ByteOrder::LsbFirst => "lsbfirst",
            ByteOrder::MsbFirst => "msbfirst",
        };
        f.write_str(name)
    }
}

impl FromStr for ByteOrder {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lsbf" | "lsbfirst" => Ok(ByteOrder::LsbFirst),
            "msbf" | "msbfirst" => Ok(ByteOrder::MsbFirst),
            _ => Err(ScopeError::Parse {
                what: "byte order",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// How a capture arms the waveform subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub source: ChannelId,
    pub points: u32,
    pub points_mode: PointsMode,
    pub format: WaveformFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: ChannelId::Channel1,
            points: 10240,
            points_mode: PointsMode::Raw,
            format: WaveformFormat::Byte,
        }
    }
}

impl CaptureConfig {
    pub fn new(source: ChannelId) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }
}

/// Scaling header returned by `:WAVeform:PREamble?`, ten comma-separated
/// fields.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
    pub format: i32,
    pub acquisition_type: i32,
    pub points: i64,
    pub count: i64,
    pub x_increment: f64,
    pub x_origin: f64,
    pub x_reference: f64,
    pub y_increment: f64,
    pub y_origin: f64,
    pub y_reference: f64,
}

impl Preamble {
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        let fields: Vec<f64> = raw
            .trim()
            .split(',')
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ScopeError::Parse {
                what: "waveform preamble",
                raw: raw.trim().to_string(),
            })?;
        if fields.len() < 10 {
            return Err(ScopeError::Parse {
                what: "waveform preamble",
                raw: raw.trim().to_string(),
            });
        }
        Ok(Self {
            format: fields[0] as i32,
            acquisition_type: fields[1] as i32,
            points: fields[2] as i64,
            count: fields[3] as i64,
            x_increment: fields[4],
            x_origin: fields[5],
            x_reference: fields[6],
            y_increment: fields[7],
            y_origin: fields[8],
            y_reference: fields[9],
        })
    }
}

/// One captured waveform record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub source: ChannelId,
    pub captured_at: DateTime<Utc>,
    pub preamble: Preamble,
    /// Raw BYTE-format samples.
    pub data: Vec<u8>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples scaled to volts using the preamble.
    pub fn to_volts(&self) -> Vec<f64> {
        let p = &self.preamble;
        self.data
            .iter()
            .map(|&raw| (f64::from(raw) - p.y_reference) * p.y_increment + p.y_origin)
            .collect()
    }

    /// Sample timestamps in seconds relative to the trigger.
    pub fn time_axis(&self) -> Vec<f64> {
        let p = &self.preamble;
        (0..self.data.len())
            .map(|i| p.x_origin + i as f64 * p.x_increment)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMBLE: &str = "+0,+0,+4,+1,+2.0E-06,-4.0E-06,+0,+3.9E-03,+0.0E+00,+128";

    #[test]
    fn test_preamble_parse() {
        let p = Preamble::parse(PREAMBLE).unwrap();
        assert_eq!(p.format, 0);
        assert_eq!(p.points, 4);
        assert_eq!(p.x_increment, 2.0e-6);
        assert_eq!(p.y_reference, 128.0);
    }

    #[test]
    fn test_preamble_rejects_short_reply() {
        assert!(Preamble::parse("+0,+0,+4").is_err());
        assert!(Preamble::parse("not,a,preamble,at,all,x,x,x,x,x").is_err());
    }

    #[test]
    fn test_waveform_scaling() {
        let wf = Waveform {
            source: ChannelId::Channel1,
            captured_at: Utc::now(),
            preamble: Preamble::parse(PREAMBLE).unwrap(),
            data: vec![128, 129, 127, 128],
        };
        let volts = wf.to_volts();
        assert_eq!(volts.len(), 4);
        assert!(volts[0].abs() < 1e-12);
        assert!((volts[1] - 3.9e-3).abs() < 1e-12);
        assert!((volts[2] + 3.9e-3).abs() < 1e-12);

        let times = wf.time_axis();
        assert_eq!(times[0], -4.0e-6);
        assert!((times[3] - (-4.0e-6 + 3.0 * 2.0e-6)).abs() < 1e-18);
    }

    #[test]
    fn test_capture_config_defaults() {
        let cfg = CaptureConfig::new(ChannelId::Channel2);
        assert_eq!(cfg.source, ChannelId::Channel2);
        assert_eq!(cfg.points, 10240);
        assert_eq!(cfg.points_mode, PointsMode::Raw);
        assert_eq!(cfg.format, WaveformFormat::Byte);
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(WaveformFormat::Byte.scpi(), "BYTE");
        assert_eq!("ASC".parse::<WaveformFormat>().unwrap(), WaveformFormat::Ascii);
        assert_eq!("LSBF".parse::<ByteOrder>().unwrap(), ByteOrder::LsbFirst);
        assert_eq!("MSBFirst".parse::<ByteOrder>().unwrap(), ByteOrder::MsbFirst);
        assert_eq!("RAW".parse::<PointsMode>().unwrap(), PointsMode::Raw);
    }
}
