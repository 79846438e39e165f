//! Typed instrument state.
//!
//! Snapshot structs mirror the query lists the driver issues against the
//! trigger, channel and timebase subsystems. Enums carry the SCPI token to
//! send via `scpi()` and parse tolerantly (short or long mnemonic, any
//! case) via `FromStr`, since instruments reply with the short form.

use crate::error::ScopeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vertical input channel; the instrument has four.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    Channel1,
    Channel2,
    Channel3,
    Channel4,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Channel1,
        ChannelId::Channel2,
        ChannelId::Channel3,
        ChannelId::Channel4,
    ];

    /// SCPI mnemonic used on the wire.
    pub fn scpi(self) -> &'static str {
        match self {
            ChannelId::Channel1 => "CHANnel1",
            ChannelId::Channel2 => "CHANnel2",
            ChannelId::Channel3 => "CHANnel3",
            ChannelId::Channel4 => "CHANnel4",
        }
    }

    /// One-based channel number.
    pub fn number(self) -> u8 {
        match self {
            ChannelId::Channel1 => 1,
            ChannelId::Channel2 => 2,
            ChannelId::Channel3 => 3,
            ChannelId::Channel4 => 4,
        }
    }

    /// Zero-based index into per-channel arrays.
    pub(crate) fn array_index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel{}", self.number())
    }
}

impl FromStr for ChannelId {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "chan1" | "channel1" => Ok(ChannelId::Channel1),
            "2" | "chan2" | "channel2" => Ok(ChannelId::Channel2),
            "3" | "chan3" | "channel3" => Ok(ChannelId::Channel3),
            "4" | "chan4" | "channel4" => Ok(ChannelId::Channel4),
            _ => Err(ScopeError::InvalidChannel(s.trim().to_string())),
        }
    }
}

/// Edge trigger source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSource {
    Channel1,
    Channel2,
    Channel3,
    Channel4,
    External,
    Line,
    WGen,
    WGen1,
    WGen2,
    WMod,
}

impl EdgeSource {
    pub fn scpi(self) -> &'static str {
        match self {
            EdgeSource::Channel1 => "CHANnel1",
            EdgeSource::Channel2 => "CHANnel2",
            EdgeSource::Channel3 => "CHANnel3",
            EdgeSource::Channel4 => "CHANnel4",
            EdgeSource::External => "EXTernal",
            EdgeSource::Line => "LINE",
            EdgeSource::WGen => "WGEN",
            EdgeSource::WGen1 => "WGEN1",
            EdgeSource::WGen2 => "WGEN2",
            EdgeSource::WMod => "WMOD",
        }
    }
}

impl From<ChannelId> for EdgeSource {
    fn from(channel: ChannelId) -> Self {
        match channel {
            ChannelId::Channel1 => EdgeSource::Channel1,
            ChannelId::Channel2 => EdgeSource::Channel2,
            ChannelId::Channel3 => EdgeSource::Channel3,
            ChannelId::Channel4 => EdgeSource::Channel4,
        }
    }
}

impl fmt::Display for EdgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeSource::Channel1 => "channel1",
            EdgeSource::Channel2 => "channel2",
            EdgeSource::Channel3 => "channel3",
            EdgeSource::Channel4 => "channel4",
            EdgeSource::External => "external",
            EdgeSource::Line => "line",
            EdgeSource::WGen => "wgen",
            EdgeSource::WGen1 => "wgen1",
            EdgeSource::WGen2 => "wgen2",
            EdgeSource::WMod => "wmod",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeSource {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chan1" | "channel1" => Ok(EdgeSource::Channel1),
            "chan2" | "channel2" => Ok(EdgeSource::Channel2),
            "chan3" | "channel3" => Ok(EdgeSource::Channel3),
            "chan4" | "channel4" => Ok(EdgeSource::Channel4),
            "ext" | "external" => Ok(EdgeSource::External),
            "line" => Ok(EdgeSource::Line),
            "wgen" => Ok(EdgeSource::WGen),
            "wgen1" => Ok(EdgeSource::WGen1),
            "wgen2" => Ok(EdgeSource::WGen2),
            "wmod" => Ok(EdgeSource::WMod),
            _ => Err(ScopeError::Parse {
                what: "edge trigger source",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Edge trigger input coupling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCoupling {
    Dc,
    Ac,
    LfReject,
}

impl EdgeCoupling {
    pub fn scpi(self) -> &'static str {
        match self {
            EdgeCoupling::Dc => "DC",
            EdgeCoupling::Ac => "AC",
            EdgeCoupling::LfReject => "LFReject",
        }
    }
}

impl fmt::Display for EdgeCoupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeCoupling::Dc => "dc",
            EdgeCoupling::Ac => "ac",
            EdgeCoupling::LfReject => "lfreject",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeCoupling {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dc" => Ok(EdgeCoupling::Dc),
            "ac" => Ok(EdgeCoupling::Ac),
            "lfr" | "lfreject" => Ok(EdgeCoupling::LfReject),
            _ => Err(ScopeError::Parse {
                what: "edge trigger coupling",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Edge trigger slope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSlope {
    Positive,
    Negative,
    Either,
    Alternate,
}

impl EdgeSlope {
    pub fn scpi(self) -> &'static str {
        match self {
            EdgeSlope::Positive => "POSitive",
            EdgeSlope::Negative => "NEGative",
            EdgeSlope::Either => "EITHer",
            EdgeSlope::Alternate => "ALTernate",
        }
    }
}

impl fmt::Display for EdgeSlope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeSlope::Positive => "positive",
            EdgeSlope::Negative => "negative",
            EdgeSlope::Either => "either",
            EdgeSlope::Alternate => "alternate",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeSlope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" | "positive" => Ok(EdgeSlope::Positive),
            "neg" | "negative" => Ok(EdgeSlope::Negative),
            "eith" | "either" => Ok(EdgeSlope::Either),
            "alt" | "alternate" => Ok(EdgeSlope::Alternate),
            _ => Err(ScopeError::Parse {
                what: "edge trigger slope",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Edge trigger frequency reject filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeReject {
    Off,
    LfReject,
    HfReject,
}

impl EdgeReject {
    pub fn scpi(self) -> &'static str {
        match self {
            EdgeReject::Off => "OFF",
            EdgeReject::LfReject => "LFReject",
            EdgeReject::HfReject => "HFReject",
        }
    }
}

impl fmt::Display for EdgeReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeReject::Off => "off",
            EdgeReject::LfReject => "lfreject",
            EdgeReject::HfReject => "hfreject",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeReject {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(EdgeReject::Off),
            "lfr" | "lfreject" => Ok(EdgeReject::LfReject),
            "hfr" | "hfreject" => Ok(EdgeReject::HfReject),
            _ => Err(ScopeError::Parse {
                what: "edge trigger reject filter",
                raw: s.trim().to_string(),
            }),
        }
    }
}

/// Trigger subsystem snapshot, one field per query the driver issues.
///
/// `mode` and the informational fields stay as raw instrument tokens; only
/// the edge block is strongly typed because it is the part the driver
/// writes back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    pub mode: String,
    pub sweep: String,
    pub hf_reject: bool,
    pub noise_reject: bool,
    pub holdoff: f64,
    pub holdoff_max: f64,
    pub holdoff_min: f64,
    pub holdoff_random: bool,
    pub edge: EdgeTriggerSettings,
}

impl TriggerSettings {
    pub fn is_edge_mode(&self) -> bool {
        self.mode.eq_ignore_ascii_case("edge")
    }
}

/// Edge trigger snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeTriggerSettings {
    pub source: EdgeSource,
    /// Trigger level in volts.
    pub level: f64,
    pub coupling: EdgeCoupling,
    pub slope: EdgeSlope,
    pub reject: EdgeReject,
}

/// Vertical channel snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub bandwidth_limit: bool,
    pub coupling: String,
    pub display: bool,
    pub impedance: String,
    pub invert: bool,
    pub label: String,
    /// Vertical offset in volts.
    pub offset: f64,
    /// Probe attenuation factor.
    pub probe: f64,
    pub protection: String,
    /// Full-scale vertical range in volts.
    pub range: f64,
    /// Volts per division.
    pub scale: f64,
    pub units: String,
    pub vernier: bool,
}

/// Horizontal timebase snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimebaseSettings {
    pub mode: String,
    /// Delay from trigger to reference point, in seconds.
    pub position: f64,
    /// Full-scale horizontal range in seconds.
    pub range: f64,
    pub ref_clock: bool,
    pub reference: String,
    pub reference_location: f64,
    /// Seconds per division.
    pub scale: f64,
    pub vernier: bool,
    pub window_position: f64,
    pub window_range: f64,
    pub window_scale: f64,
}

/// Desired edge trigger configuration; `None` leaves a setting untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTriggerConfig {
    pub source: Option<EdgeSource>,
    /// Trigger level in volts.
    pub level: Option<f64>,
    pub coupling: Option<EdgeCoupling>,
    pub slope: Option<EdgeSlope>,
    pub reject: Option<EdgeReject>,
}

/// Desired vertical channel configuration, values in volts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Volts per division.
    pub scale: Option<f64>,
    /// Vertical offset in volts.
    pub offset: Option<f64>,
}

/// Desired timebase configuration, values in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimebaseConfig {
    /// Seconds per division.
    pub scale: Option<f64>,
    /// Delay from trigger to reference point.
    pub position: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_and_tokens() {
        assert_eq!("channel2".parse::<ChannelId>().unwrap(), ChannelId::Channel2);
        assert_eq!("CHAN3".parse::<ChannelId>().unwrap(), ChannelId::Channel3);
        assert_eq!("4".parse::<ChannelId>().unwrap(), ChannelId::Channel4);
        assert_eq!(ChannelId::Channel1.scpi(), "CHANnel1");
        assert_eq!(ChannelId::Channel1.to_string(), "channel1");
        assert!(matches!(
            "channel9".parse::<ChannelId>(),
            Err(ScopeError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_edge_source_parse() {
        assert_eq!("CHAN1".parse::<EdgeSource>().unwrap(), EdgeSource::Channel1);
        assert_eq!(
            "external".parse::<EdgeSource>().unwrap(),
            EdgeSource::External
        );
        assert_eq!("EXT".parse::<EdgeSource>().unwrap(), EdgeSource::External);
        assert_eq!("wgen1".parse::<EdgeSource>().unwrap(), EdgeSource::WGen1);
        assert!("channel5".parse::<EdgeSource>().is_err());
    }

    #[test]
    fn test_edge_enum_round_trips() {
        for slope in [
            EdgeSlope::Positive,
            EdgeSlope::Negative,
            EdgeSlope::Either,
            EdgeSlope::Alternate,
        ] {
            assert_eq!(slope.scpi().parse::<EdgeSlope>().unwrap(), slope);
        }
        for coupling in [EdgeCoupling::Dc, EdgeCoupling::Ac, EdgeCoupling::LfReject] {
            assert_eq!(coupling.scpi().parse::<EdgeCoupling>().unwrap(), coupling);
        }
        for reject in [EdgeReject::Off, EdgeReject::LfReject, EdgeReject::HfReject] {
            assert_eq!(reject.scpi().parse::<EdgeReject>().unwrap(), reject);
        }
    }

    #[test]
    fn test_short_form_parse() {
        assert_eq!("POS".parse::<EdgeSlope>().unwrap(), EdgeSlope::Positive);
        assert_eq!("LFR".parse::<EdgeCoupling>().unwrap(), EdgeCoupling::LfReject);
        assert_eq!("HFR".parse::<EdgeReject>().unwrap(), EdgeReject::HfReject);
    }

    #[test]
    fn test_channel_serde_token() {
        let json = serde_json::to_string(&ChannelId::Channel2).unwrap();
        assert_eq!(json, "\"channel2\"");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelId::Channel2);
    }

    #[test]
    fn test_edge_mode_check() {
        let edge = EdgeTriggerSettings {
            source: EdgeSource::Channel1,
            level: 0.0,
            coupling: EdgeCoupling::Dc,
            slope: EdgeSlope::Positive,
            reject: EdgeReject::Off,
        };
        let settings = TriggerSettings {
            mode: "EDGE".to_string(),
            sweep: "AUTO".to_string(),
            hf_reject: false,
            noise_reject: false,
            holdoff: 60e-9,
            holdoff_max: 10.0,
            holdoff_min: 60e-9,
            holdoff_random: false,
            edge,
        };
        assert!(settings.is_edge_mode());
        let glitch = TriggerSettings {
            mode: "GLIT".to_string(),
            ..settings
        };
        assert!(!glitch.is_edge_mode());
    }
}
