//! SCPI response parsing helpers.
//!
//! Small pure functions shared by the driver: identification strings,
//! error-queue entries, IEEE 488.2 definite-length blocks, and the loose
//! numeric formats instruments reply with.

use crate::error::ScopeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest waveform payload the block parser will accept.
pub const MAX_BLOCK_LEN: usize = 10_000_000;

/// Instrument identification, the four comma-separated fields of `*IDN?`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    /// Parse a `*IDN?` reply, e.g.
    /// `KEYSIGHT TECHNOLOGIES,DSO-X 3024T,MY12345678,07.50.2021102830`.
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        let parts: Vec<&str> = raw.trim().split(',').collect();
        if parts.len() != 4 {
            return Err(ScopeError::Parse {
                what: "identification string",
                raw: raw.trim().to_string(),
            });
        }
        Ok(Self {
            manufacturer: parts[0].trim().to_string(),
            model: parts[1].trim().to_string(),
            serial: parts[2].trim().to_string(),
            firmware: parts[3].trim().to_string(),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

/// One entry of the instrument error queue, from `:SYSTem:ERRor?`.
///
/// Code 0 means "No error"; negative codes are SCPI-defined failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemError {
    pub code: i32,
    pub message: String,
}

impl SystemError {
    /// Parse a reply like `+0,"No error"` or `-113,"Undefined header"`.
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        let trimmed = raw.trim();
        let (code, message) = trimmed.split_once(',').ok_or_else(|| ScopeError::Parse {
            what: "error queue entry",
            raw: trimmed.to_string(),
        })?;
        let code = code.trim().parse::<i32>().map_err(|_| ScopeError::Parse {
            what: "error code",
            raw: trimmed.to_string(),
        })?;
        Ok(Self {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Extract the payload of an IEEE 488.2 definite-length block.
///
/// Layout: `#`, one digit giving the width of the length field, the decimal
/// length, then the payload. A trailing line terminator after the payload
/// is tolerated.
pub fn parse_block(raw: &[u8]) -> Result<&[u8], ScopeError> {
    if raw.first() != Some(&b'#') {
        return Err(ScopeError::MalformedBlock(
            "missing '#' block header".to_string(),
        ));
    }
    let digits = raw
        .get(1)
        .and_then(|b| (*b as char).to_digit(10))
        .ok_or_else(|| ScopeError::MalformedBlock("bad length-field width".to_string()))?
        as usize;
    if digits == 0 {
        // '#0' starts an indefinite-length block, which the scope never sends.
        return Err(ScopeError::MalformedBlock(
            "indefinite-length block not supported".to_string(),
        ));
    }
    let header_len = 2 + digits;
    let len_field = raw
        .get(2..header_len)
        .ok_or_else(|| ScopeError::MalformedBlock("truncated length field".to_string()))?;
    let len: usize = std::str::from_utf8(len_field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ScopeError::MalformedBlock("non-numeric length field".to_string()))?;
    if len > MAX_BLOCK_LEN {
        return Err(ScopeError::MalformedBlock(format!(
            "declared length {len} exceeds {MAX_BLOCK_LEN}"
        )));
    }
    let payload = &raw[header_len..];
    if payload.len() < len {
        return Err(ScopeError::MalformedBlock(format!(
            "payload truncated: expected {len} bytes, got {}",
            payload.len()
        )));
    }
    Ok(&payload[..len])
}

/// Parse a SCPI boolean reply (`0`/`1`/`OFF`/`ON`).
pub fn parse_bool(raw: &str) -> Result<bool, ScopeError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        _ => Err(ScopeError::Parse {
            what: "boolean",
            raw: raw.trim().to_string(),
        }),
    }
}

/// Parse a numeric reply, including NR3 scientific notation (`+2.00E-01`).
pub fn parse_f64(raw: &str) -> Result<f64, ScopeError> {
    raw.trim().parse::<f64>().map_err(|_| ScopeError::Parse {
        what: "number",
        raw: raw.trim().to_string(),
    })
}

/// Parse a voltage that may carry a `mV` or `V` suffix, e.g. `3.00`,
/// `500mV`, `2V`. The result is in volts.
pub fn parse_voltage(raw: &str) -> Result<f64, ScopeError> {
    let lower = raw.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(stripped) = lower.strip_suffix("mv") {
        (stripped, 1e-3)
    } else if let Some(stripped) = lower.strip_suffix('v') {
        (stripped, 1.0)
    } else {
        (lower.as_str(), 1.0)
    };
    number
        .trim()
        .parse::<f64>()
        .map(|v| v * scale)
        .map_err(|_| ScopeError::Parse {
            what: "voltage",
            raw: raw.trim().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_parse() {
        let id =
            Identity::parse("KEYSIGHT TECHNOLOGIES,DSO-X 3024T,MY12345678,07.50.2021102830\n")
                .unwrap();
        assert_eq!(id.manufacturer, "KEYSIGHT TECHNOLOGIES");
        assert_eq!(id.model, "DSO-X 3024T");
        assert_eq!(id.serial, "MY12345678");
        assert_eq!(id.firmware, "07.50.2021102830");
    }

    #[test]
    fn test_identity_rejects_short_reply() {
        assert!(Identity::parse("Keysight,DSO-X").is_err());
    }

    #[test]
    fn test_system_error_no_error() {
        let err = SystemError::parse("+0,\"No error\"\n").unwrap();
        assert!(err.is_ok());
        assert_eq!(err.message, "No error");
    }

    #[test]
    fn test_system_error_failure() {
        let err = SystemError::parse("-113,\"Undefined header\"").unwrap();
        assert!(!err.is_ok());
        assert_eq!(err.code, -113);
        assert_eq!(err.message, "Undefined header");
    }

    #[test]
    fn test_system_error_rejects_garbage() {
        assert!(SystemError::parse("nonsense").is_err());
    }

    #[test]
    fn test_parse_block() {
        let mut raw = b"#800000004".to_vec();
        raw.extend_from_slice(&[1, 2, 3, 4]);
        raw.push(b'\n');
        assert_eq!(parse_block(&raw).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_block_short_length_field() {
        let raw = b"#15hello";
        assert_eq!(parse_block(raw).unwrap(), b"hello");
    }

    #[test]
    fn test_parse_block_rejects_truncated_payload() {
        let raw = b"#15hel";
        assert!(matches!(
            parse_block(raw),
            Err(ScopeError::MalformedBlock(_))
        ));
    }

    #[test]
    fn test_parse_block_rejects_missing_header() {
        assert!(parse_block(b"hello").is_err());
        assert!(parse_block(b"").is_err());
        assert!(parse_block(b"#").is_err());
    }

    #[test]
    fn test_parse_block_rejects_oversized_claim() {
        let raw = b"#920000000000";
        assert!(parse_block(raw).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1\n").unwrap());
        assert!(parse_bool("ON").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_parse_f64_nr3() {
        assert_eq!(parse_f64("+2.00E-01\n").unwrap(), 0.2);
        assert_eq!(parse_f64("-4.0E-06").unwrap(), -4.0e-6);
        assert!(parse_f64("volts").is_err());
    }

    #[test]
    fn test_parse_voltage_suffixes() {
        assert_eq!(parse_voltage("3.00").unwrap(), 3.0);
        assert_eq!(parse_voltage("500mV").unwrap(), 0.5);
        assert_eq!(parse_voltage("2V").unwrap(), 2.0);
        assert_eq!(parse_voltage(" 250 mV ").unwrap(), 0.25);
        assert_eq!(parse_voltage("1.5e0 V").unwrap(), 1.5);
        assert!(parse_voltage("fast").is_err());
        assert!(parse_voltage("mV").is_err());
    }
}
