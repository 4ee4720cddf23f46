//! Network probes
//!
//! `http(s)://` templates issue a GET and fall back to a plain TCP connect when
//! the request fails without timing out. A request timeout is a TimeoutError:
//! a port that accepts connections but never answers is not healthy. Anything else (`tcp://host:port` or `host:port`) is a TCP
//! connect only.

use super::{render_template, Channel, ChannelError, ChannelOutput, Subject};
use crate::contracts::*;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Probe settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,

    /// Accept self-signed certificates on internal services
    pub accept_invalid_certs: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }
}

pub struct NetworkProbeChannel {
    client: reqwest::Client,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl NetworkProbeChannel {
    pub fn new(config: ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("infra-check/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        })
    }

    async fn http_probe(&self, url: &str) -> Result<ObservedValue, ChannelError> {
        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => Ok(ObservedValue::Latency {
                millis: start.elapsed().as_millis() as u64,
                status: Some(response.status().as_u16()),
            }),
            Err(e) if e.is_timeout() => Err(ChannelError::Timeout(format!(
                "HTTP request to {} exceeded {}ms",
                url,
                self.request_timeout.as_millis()
            ))),
            Err(e) => {
                tracing::debug!(url, error = %e, "HTTP probe failed, falling back to TCP");
                let parsed = reqwest::Url::parse(url)
                    .map_err(|e| ChannelError::parse(format!("invalid URL: {}", e), url))?;
                let host = parsed
                    .host_str()
                    .ok_or_else(|| ChannelError::parse("URL has no host", url))?;
                let port = parsed
                    .port_or_known_default()
                    .ok_or_else(|| ChannelError::parse("URL has no port", url))?;
                tcp_probe(&format!("{}:{}", host, port), self.connect_timeout).await
            }
        }
    }
}

/// Connect and report the handshake latency
pub(crate) async fn tcp_probe(addr: &str, bound: Duration) -> Result<ObservedValue, ChannelError> {
    let start = Instant::now();
    match tokio::time::timeout(bound, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(ObservedValue::Latency {
            millis: start.elapsed().as_millis() as u64,
            status: None,
        }),
        Ok(Err(e)) => Err(ChannelError::Connection(format!("{}: {}", addr, e))),
        Err(_) => Err(ChannelError::Timeout(format!(
            "connect to {} exceeded {}ms",
            addr,
            bound.as_millis()
        ))),
    }
}

#[async_trait]
impl Channel for NetworkProbeChannel {
    fn name(&self) -> &str {
        "network_probe"
    }

    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> Result<ChannelOutput, ChannelError> {
        let endpoint = render_template(&check.command, subject);

        let value = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            self.http_probe(&endpoint).await?
        } else {
            let addr = endpoint.strip_prefix("tcp://").unwrap_or(&endpoint);
            tcp_probe(addr, self.connect_timeout).await?
        };

        Ok(ChannelOutput::from(value))
    }
}
