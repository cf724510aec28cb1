//! Topic naming for the bridge.
//!
//! ```text
//! {base}/in/{pin}    inbound commands (subscribed as {base}/in/+)
//! {base}/out/{pin}   outbound pin levels
//! {refresh}          optional refresh trigger, payload ignored
//! ```

use crate::error::ParseError;
use crate::pin::{Level, Pin};

/// A request to drive a pin to a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundCommand {
    /// Target pin.
    pub pin: Pin,
    /// Commanded level, before any output polarity is applied.
    pub level: Level,
}

/// Classified inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Re-publish every monitored pin.
    Refresh,
    /// Set the level of a pin.
    Command(InboundCommand),
}

/// Maps pins to topics and back. Holds only the configured names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    base: String,
    refresh: Option<String>,
}

impl TopicRouter {
    /// Create a router for a base topic and an optional refresh topic.
    ///
    /// A trailing `/` on the base is ignored; an empty refresh topic means
    /// refresh is disabled.
    pub fn new(base: &str, refresh: Option<&str>) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            refresh: refresh.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    /// Topic a pin's level is published on.
    pub fn outbound_topic(&self, pin: Pin) -> String {
        format!("{}/out/{}", self.base, pin)
    }

    /// Subscription filter for inbound commands.
    pub fn command_filter(&self) -> String {
        format!("{}/in/+", self.base)
    }

    /// The refresh topic, if configured.
    pub fn refresh_topic(&self) -> Option<&str> {
        self.refresh.as_deref()
    }

    /// Extract the pin number from the last `/`-delimited topic segment.
    pub fn parse_inbound_pin(topic: &str) -> Result<Pin, ParseError> {
        let segment = topic.rsplit('/').next().unwrap_or(topic);
        segment.parse().map_err(|_| ParseError::InvalidPin {
            topic: topic.to_string(),
        })
    }

    /// Decide what an inbound message asks for.
    ///
    /// The refresh topic ignores its payload; anything else is a command
    /// whose pin comes from the topic and level from the payload.
    pub fn classify(&self, topic: &str, payload: &[u8]) -> Result<Inbound, ParseError> {
        if self.refresh.as_deref() == Some(topic) {
            return Ok(Inbound::Refresh);
        }
        let pin = Self::parse_inbound_pin(topic)?;
        let level = Level::from_payload(payload)?;
        Ok(Inbound::Command(InboundCommand { pin, level }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_topic_template() {
        let router = TopicRouter::new("home", None);
        assert_eq!(router.outbound_topic(Pin::new(17)), "home/out/17");
    }

    #[test]
    fn base_trailing_slash_ignored() {
        let router = TopicRouter::new("home/gpio/", None);
        assert_eq!(router.outbound_topic(Pin::new(4)), "home/gpio/out/4");
        assert_eq!(router.command_filter(), "home/gpio/in/+");
    }

    #[test]
    fn parses_final_segment() {
        assert_eq!(TopicRouter::parse_inbound_pin("home/in/7"), Ok(Pin::new(7)));
        assert_eq!(
            TopicRouter::parse_inbound_pin("site/rpi/extra/in/22"),
            Ok(Pin::new(22))
        );
        assert_eq!(TopicRouter::parse_inbound_pin("5"), Ok(Pin::new(5)));
    }

    #[test]
    fn rejects_non_numeric_segment() {
        assert_eq!(
            TopicRouter::parse_inbound_pin("home/in/abc"),
            Err(ParseError::InvalidPin {
                topic: "home/in/abc".into()
            })
        );
        assert!(TopicRouter::parse_inbound_pin("home/in/").is_err());
        assert!(TopicRouter::parse_inbound_pin("home/in/-1").is_err());
    }

    #[test]
    fn classify_refresh_ignores_payload() {
        let router = TopicRouter::new("home", Some("home/refresh"));
        assert_eq!(
            router.classify("home/refresh", b"whatever"),
            Ok(Inbound::Refresh)
        );
    }

    #[test]
    fn classify_command() {
        let router = TopicRouter::new("home", Some("home/refresh"));
        assert_eq!(
            router.classify("home/in/18", b"1"),
            Ok(Inbound::Command(InboundCommand {
                pin: Pin::new(18),
                level: Level::High
            }))
        );
    }

    #[test]
    fn classify_rejects_bad_payload() {
        let router = TopicRouter::new("home", None);
        assert!(matches!(
            router.classify("home/in/18", b"high"),
            Err(ParseError::InvalidLevel { .. })
        ));
        assert!(matches!(
            router.classify("home/in/x", b"1"),
            Err(ParseError::InvalidPin { .. })
        ));
    }

    #[test]
    fn empty_refresh_is_disabled() {
        let router = TopicRouter::new("home", Some(""));
        assert_eq!(router.refresh_topic(), None);
        assert!(router.classify("", b"").is_err());
    }
}
