use std::net::SocketAddr;

use reqwest::Url;

use crate::dispatcher::DispatcherConfig;
use crate::error::ConfigError;
use crate::types::Collector;

pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub collector: Collector,
    pub dispatcher: DispatcherConfig,
    /// Requests with larger bodies are rejected with 413.
    pub max_body_bytes: usize,
}

impl RelayConfig {
    pub fn new(listen_addr: SocketAddr, collector: Collector) -> Self {
        Self {
            listen_addr,
            collector,
            dispatcher: DispatcherConfig::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.collector.url).map_err(|e| ConfigError::InvalidCollectorUrl {
            url: self.collector.url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidCollectorUrl {
                url: self.collector.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.collector.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.dispatcher.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(url: &str) -> RelayConfig {
        RelayConfig::new("127.0.0.1:8080".parse().unwrap(), Collector::new(url))
    }

    #[test]
    fn accepts_http_and_https_collectors() {
        assert_eq!(config("http://collector:9000/ingest").validate(), Ok(()));
        assert_eq!(config("https://collector.example.com/").validate(), Ok(()));
    }

    #[test]
    fn rejects_unparseable_and_non_http_urls() {
        assert!(matches!(
            config("not a url").validate(),
            Err(ConfigError::InvalidCollectorUrl { .. })
        ));
        assert!(matches!(
            config("ftp://collector/").validate(),
            Err(ConfigError::InvalidCollectorUrl { .. })
        ));
    }

    #[test]
    fn rejects_zero_sized_pool_and_queue() {
        let cfg = config("http://c/").with_dispatcher(DispatcherConfig {
            worker_count: 0,
            ..Default::default()
        });
        assert_eq!(cfg.validate(), Err(ConfigError::NoWorkers));

        let cfg = config("http://c/").with_dispatcher(DispatcherConfig {
            queue_capacity: 0,
            ..Default::default()
        });
        assert_eq!(cfg.validate(), Err(ConfigError::NoQueueCapacity));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = config("http://c/");
        cfg.collector = cfg.collector.with_timeout(Duration::ZERO);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));
    }
}
