//! Pin identity and level types.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// A hardware pin number.
///
/// The numbering scheme (header position, BCM line, PiFace port bit) is the
/// backend's concern; the core only needs a stable, unique identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin(u8);

impl Pin {
    /// Create a pin from its number.
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    /// Get the pin number.
    pub const fn number(&self) -> u8 {
        self.0
    }

    /// Parse a comma-separated pin list such as `"17, 18,27"`.
    ///
    /// Whitespace around entries is ignored. An empty or blank string yields
    /// an empty list.
    pub fn parse_list(list: &str) -> Result<Vec<Pin>, ParseError> {
        if list.trim().is_empty() {
            return Ok(Vec::new());
        }

        list.split(',')
            .map(|entry| {
                entry
                    .trim()
                    .parse::<Pin>()
                    .map_err(|_| ParseError::InvalidPinList {
                        entry: entry.trim().to_string(),
                    })
            })
            .collect()
    }
}

impl FromStr for Pin {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>().map(Self)
    }
}

impl From<u8> for Pin {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin({})", self.0)
    }
}

/// Binary logical level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Logical low (`0` on the wire).
    Low,
    /// Logical high (`1` on the wire).
    High,
}

impl Level {
    /// Build a level from a raw bit.
    pub fn from_bit(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }

    /// The opposite level.
    pub fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    /// Whether this is [`Level::High`].
    pub fn is_high(self) -> bool {
        self == Self::High
    }

    /// The ASCII payload published for this level.
    pub fn as_payload(self) -> &'static str {
        match self {
            Self::Low => "0",
            Self::High => "1",
        }
    }

    /// Decode an inbound command payload.
    ///
    /// The payload must be an ASCII integer (surrounding whitespace allowed).
    /// `1` means [`Level::High`]; every other integer means [`Level::Low`].
    pub fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        let text = String::from_utf8_lossy(payload);
        let value: i64 = text.trim().parse().map_err(|_| ParseError::InvalidLevel {
            payload: text.to_string(),
        })?;
        Ok(Self::from_bit(value == 1))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// Direction a pin is currently configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Monitored input (initial mode of every pin).
    Input,
    /// Forced into output mode by an inbound command.
    Output,
}

/// How a commanded level maps onto the physical output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolarity {
    /// Command `1` drives the line high.
    ActiveHigh,
    /// Command `1` drives the line low (typical relay boards).
    ActiveLow,
}

impl OutputPolarity {
    /// Physical level to write for a commanded level.
    pub fn physical(self, commanded: Level) -> Level {
        match self {
            Self::ActiveHigh => commanded,
            Self::ActiveLow => commanded.inverted(),
        }
    }

    /// Inactive physical level: the initial level of a newly forced output
    /// and the level outputs are left at on shutdown.
    pub fn safe_level(self) -> Level {
        self.physical(Level::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_list_parses_with_whitespace() {
        let pins = Pin::parse_list(" 17, 18 ,27").unwrap();
        assert_eq!(pins, vec![Pin::new(17), Pin::new(18), Pin::new(27)]);
    }

    #[test]
    fn blank_pin_list_is_empty() {
        assert!(Pin::parse_list("").unwrap().is_empty());
        assert!(Pin::parse_list("   ").unwrap().is_empty());
    }

    #[test]
    fn pin_list_rejects_garbage() {
        let err = Pin::parse_list("17,abc").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidPinList {
                entry: "abc".into()
            }
        );
        assert!(Pin::parse_list("17,,18").is_err());
        assert!(Pin::parse_list("256").is_err());
    }

    #[test]
    fn payload_one_is_high() {
        assert_eq!(Level::from_payload(b"1").unwrap(), Level::High);
        assert_eq!(Level::from_payload(b" 1\n").unwrap(), Level::High);
    }

    #[test]
    fn other_integers_are_low() {
        assert_eq!(Level::from_payload(b"0").unwrap(), Level::Low);
        assert_eq!(Level::from_payload(b"2").unwrap(), Level::Low);
        assert_eq!(Level::from_payload(b"-1").unwrap(), Level::Low);
    }

    #[test]
    fn non_integer_payload_is_rejected() {
        assert!(matches!(
            Level::from_payload(b"on"),
            Err(ParseError::InvalidLevel { .. })
        ));
        assert!(Level::from_payload(b"").is_err());
    }

    #[test]
    fn level_payload_encoding() {
        assert_eq!(Level::High.as_payload(), "1");
        assert_eq!(Level::Low.as_payload(), "0");
    }

    #[test]
    fn active_low_inverts_commands() {
        let polarity = OutputPolarity::ActiveLow;
        assert_eq!(polarity.physical(Level::High), Level::Low);
        assert_eq!(polarity.physical(Level::Low), Level::High);
        assert_eq!(polarity.safe_level(), Level::High);
    }

    #[test]
    fn active_high_passes_through() {
        let polarity = OutputPolarity::ActiveHigh;
        assert_eq!(polarity.physical(Level::High), Level::High);
        assert_eq!(polarity.safe_level(), Level::Low);
    }
}
