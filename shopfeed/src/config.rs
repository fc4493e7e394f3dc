use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::feed::FeedSource;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Comma-separated list of feed locators. At least one is required.
    #[envconfig(from = "FEED_URLS")]
    pub feed_urls: FeedList,

    /// `0` or empty runs a single pass and exits; anything else repeats
    /// on that interval (`90s`, `30m`, `2h`, `1h30m`).
    #[envconfig(from = "REPEAT_INTERVAL", default = "0")]
    pub repeat_interval: EnvDuration,

    #[envconfig(from = "METRICS_ADDRESS", default = "0.0.0.0:2112")]
    pub metrics_address: SocketAddr,

    #[envconfig(from = "PUBLISHER_POOL_SIZE", default = "10")]
    pub publisher_pool_size: usize,

    /// Log items instead of publishing them; local debugging only.
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Periodic interval, or `None` for one-shot mode.
    pub fn interval(&self) -> Option<Duration> {
        if self.repeat_interval.0.is_zero() {
            None
        } else {
            Some(self.repeat_interval.0)
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(from = "KAFKA_URL")]
    pub kafka_hosts: String,

    /// Upper bound on waiting for a single delivery acknowledgement.
    #[envconfig(from = "KAFKA_DELIVERY_TIMEOUT_MS", default = "5000")]
    pub kafka_delivery_timeout_ms: u64,

    #[envconfig(from = "KAFKA_MESSAGE_TIMEOUT_MS", default = "5000")]
    pub kafka_message_timeout_ms: u32,

    #[envconfig(from = "KAFKA_SOCKET_TIMEOUT_MS", default = "5000")]
    pub kafka_socket_timeout_ms: u32,

    #[envconfig(from = "KAFKA_TLS", default = "false")]
    pub kafka_tls: bool,
}

/// Comma-separated feed list for envconfig binding.
#[derive(Debug, Clone)]
pub struct FeedList(pub Vec<FeedSource>);

impl FromStr for FeedList {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let feeds = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(FeedSource::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        Ok(FeedList(feeds))
    }
}

/// Duration literal in the format the original service accepted: an
/// optionally compound sequence of `<number><unit>` terms with units
/// `ms`, `s`, `m`, `h` (`90s`, `2h`, `1h30m`), or a bare `0`.
#[derive(Debug, Clone, Copy)]
pub struct EnvDuration(pub Duration);

impl FromStr for EnvDuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() || input == "0" {
            return Ok(EnvDuration(Duration::ZERO));
        }

        let invalid = || ConfigError::InvalidDuration(input.to_string());
        let mut total = Duration::ZERO;
        let mut rest = input;
        while !rest.is_empty() {
            let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            if digits == 0 {
                return Err(invalid());
            }
            let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];

            let (unit, len) = if rest.starts_with("ms") {
                (Duration::from_millis(1), 2)
            } else if rest.starts_with('s') {
                (Duration::from_secs(1), 1)
            } else if rest.starts_with('m') {
                (Duration::from_secs(60), 1)
            } else if rest.starts_with('h') {
                (Duration::from_secs(3600), 1)
            } else {
                return Err(invalid());
            };
            rest = &rest[len..];
            total += unit * u32::try_from(value).map_err(|_| invalid())?;
        }
        Ok(EnvDuration(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_list_splits_and_trims() {
        let list: FeedList = "file://a/feed.xml, https://example.com/feed.xml"
            .parse()
            .unwrap();
        assert_eq!(list.0.len(), 2);
        assert_eq!(list.0[1].key(), "https://example.com/feed.xml");
    }

    #[test]
    fn feed_list_rejects_empty() {
        assert!(matches!(
            "".parse::<FeedList>(),
            Err(ConfigError::NoFeeds)
        ));
        assert!(matches!(
            " , ".parse::<FeedList>(),
            Err(ConfigError::NoFeeds)
        ));
    }

    #[test]
    fn feed_list_surfaces_bad_urls() {
        assert!("file://ok/feed.xml,nonsense".parse::<FeedList>().is_err());
    }

    #[test]
    fn duration_literals() {
        let cases = [
            ("0", Duration::ZERO),
            ("", Duration::ZERO),
            ("500ms", Duration::from_millis(500)),
            ("90s", Duration::from_secs(90)),
            ("30m", Duration::from_secs(1800)),
            ("2h", Duration::from_secs(7200)),
            ("1h30m", Duration::from_secs(5400)),
        ];
        for (input, expected) in cases {
            let parsed: EnvDuration = input.parse().unwrap();
            assert_eq!(parsed.0, expected, "{input}");
        }
    }

    #[test]
    fn duration_rejects_unitless_and_junk() {
        for input in ["5", "h", "10x", "2h3"] {
            assert!(input.parse::<EnvDuration>().is_err(), "{input}");
        }
    }
}
