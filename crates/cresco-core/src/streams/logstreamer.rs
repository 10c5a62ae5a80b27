//! Log stream.
//!
//! The stream stays silent until [`LogStreamer::update_config`] names the
//! agent to tail. Log lines then arrive as text frames.

use super::callbacks::StreamCallbacks;
use super::channel::{ChannelSettings, StreamChannel};
use super::SideChannel;
use crate::config::{ClientConfig, StreamConfig};
use crate::error::{CrescoError, Result};
use std::str::FromStr;

/// Log level requested from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CrescoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(CrescoError::Config {
                message: format!("Unknown log level: {}", s),
            }),
        }
    }
}

pub struct LogStreamer {
    channel: StreamChannel,
}

impl LogStreamer {
    /// Create an unconnected log stream for the endpoint in `config`.
    pub fn new(config: &ClientConfig, callbacks: StreamCallbacks) -> Result<Self> {
        let settings = ChannelSettings {
            name: "logstreamer",
            url: config.endpoint(StreamConfig::LOGSTREAMER_PATH)?,
            service_key: config.service_key.clone(),
            tls: config.tls,
            connect_timeout: config.connect_timeout,
            send_timeout: config.stream_timeout,
        };
        Ok(Self {
            channel: StreamChannel::new(settings, callbacks),
        })
    }

    pub fn connect(&self) -> Result<()> {
        self.channel.connect(None)
    }

    /// Tail every class on `region/agent` at trace level.
    pub fn update_config(&self, region: &str, agent: &str) -> Result<()> {
        self.update_config_class(region, agent, LogLevel::Trace, StreamConfig::DEFAULT_LOG_CLASS)
    }

    /// Tail `base_class` on `region/agent` at `level`.
    pub fn update_config_class(
        &self,
        region: &str,
        agent: &str,
        level: LogLevel,
        base_class: &str,
    ) -> Result<()> {
        let frame = config_frame(region, agent, level, base_class)?;
        self.channel.send_text(frame)
    }

    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.channel.send_text(text.into())
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.channel.send_binary(data.into())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub fn close(&self) {
        self.channel.close();
    }
}

fn config_frame(region: &str, agent: &str, level: LogLevel, base_class: &str) -> Result<String> {
    for (field, value) in [("region", region), ("agent", agent), ("base_class", base_class)] {
        if value.trim().is_empty() || value.contains(',') {
            return Err(CrescoError::invalid_destination(
                field,
                "must be non-empty and contain no commas",
            ));
        }
    }
    Ok(format!("{},{},{},{}", region, agent, level, base_class))
}

impl SideChannel for LogStreamer {
    fn kind(&self) -> &'static str {
        self.channel.name()
    }

    fn is_open(&self) -> bool {
        LogStreamer::is_open(self)
    }

    fn is_closed(&self) -> bool {
        LogStreamer::is_closed(self)
    }

    fn close(&self) {
        LogStreamer::close(self);
    }

    fn describe(&self) -> String {
        self.channel.url().to_string()
    }
}

impl std::fmt::Debug for LogStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamer")
            .field("url", &self.channel.url().as_str())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_frame() {
        let frame = config_frame("global-region", "global-controller", LogLevel::Trace, "default")
            .unwrap();
        assert_eq!(frame, "global-region,global-controller,Trace,default");
    }

    #[test]
    fn test_class_config_frame() {
        let frame = config_frame("lab", "agent-1", LogLevel::Info, "io.cresco.agent").unwrap();
        assert_eq!(frame, "lab,agent-1,Info,io.cresco.agent");
    }

    #[test]
    fn test_config_frame_rejects_commas() {
        assert!(config_frame("lab,x", "agent", LogLevel::Debug, "default").is_err());
        assert!(config_frame("lab", "", LogLevel::Debug, "default").is_err());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_update_before_connect_fails_cleanly() {
        let config = ClientConfig::new("localhost", 8282, "1234");
        let streamer = LogStreamer::new(&config, StreamCallbacks::new()).unwrap();
        assert!(matches!(
            streamer.update_config("lab", "agent-1"),
            Err(CrescoError::NotConnected)
        ));
    }
}
