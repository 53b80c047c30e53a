//! Command-line configuration
//!
//! There is no config file; every knob is a flag with a sensible default.

use std::time::Duration;

use clap::Parser;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default bound of every actor inbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default bound of each account mailbox
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Default longest accepted client line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Multi-room line-based TCP chat server
#[derive(Parser, Debug, Clone)]
#[command(name = "roomchat", version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Capacity of every actor inbound queue (join, leave, message, ...)
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_parser = parse_capacity)]
    pub queue_capacity: usize,

    /// Capacity of each account mailbox; fan-out drops messages beyond it
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY, value_parser = parse_capacity)]
    pub mailbox_capacity: usize,

    /// Longest accepted line in bytes; longer lines end the session
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH, value_parser = parse_capacity)]
    pub max_line_length: usize,

    /// Seconds allowed to answer each login prompt (no limit when unset)
    #[arg(long)]
    pub handshake_timeout: Option<u64>,
}

impl Config {
    pub fn limits(&self) -> Limits {
        Limits {
            queue_capacity: self.queue_capacity,
            mailbox_capacity: self.mailbox_capacity,
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            handshake_timeout: None,
        }
    }
}

/// Channel bounds used by the actors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub queue_capacity: usize,
    pub mailbox_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits()
    }
}

/// Tokio channels panic on a zero bound
fn parse_capacity(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["roomchat"]).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.limits(), Limits::default());
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert!(config.handshake_timeout().is_none());
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "roomchat",
            "--addr",
            "0.0.0.0:9000",
            "--mailbox-capacity",
            "4",
            "--handshake-timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.limits().mailbox_capacity, 4);
        assert_eq!(config.handshake_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Config::try_parse_from(["roomchat", "--queue-capacity", "0"]).is_err());
        assert!(Config::try_parse_from(["roomchat", "--mailbox-capacity", "x"]).is_err());
    }
}
