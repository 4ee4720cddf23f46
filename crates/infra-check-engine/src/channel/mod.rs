//! Execution channels
//!
//! A channel fetches the raw observation for one check against one subject.
//! The engine holds one channel per `ChannelKind`; demo mode replaces all of
//! them with the [`SimulatedChannel`].

mod cluster;
mod database;
mod probe;
mod shell;
mod simulated;

pub use cluster::ClusterQueryChannel;
pub use database::DatabaseProbeChannel;
pub use probe::{NetworkProbeChannel, ProbeConfig};
pub use shell::{RemoteExecutor, RemoteShellChannel, ShellConfig, SshExecutor};
pub use simulated::SimulatedChannel;

use crate::contracts::*;
use crate::error::{EngineError, Result};
use crate::policy::parse_number;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Failure of a single channel invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Target unreachable or authentication refused
    #[error("connection failed: {0}")]
    Connection(String),

    /// Invocation exceeded its bound
    #[error("timed out: {0}")]
    Timeout(String),

    /// Output did not have the expected shape
    #[error("unexpected output: {detail}")]
    Parse { detail: String, raw: String },

    /// Channel cannot serve this subject
    #[error("unsupported subject: {0}")]
    Unsupported(String),
}

impl ChannelError {
    pub fn parse(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        ChannelError::Parse {
            detail: detail.into(),
            raw: raw.into(),
        }
    }

    /// Connection and timeout failures may clear up on a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::Connection(_) | ChannelError::Timeout(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::Connection(_) | ChannelError::Unsupported(_) => FailureKind::Connection,
            ChannelError::Timeout(_) => FailureKind::Timeout,
            ChannelError::Parse { .. } => FailureKind::Parse,
        }
    }

    /// Failure marker recorded in the result, with IPv4 addresses masked
    pub fn into_failure(self) -> ChannelFailure {
        match self {
            ChannelError::Connection(detail) | ChannelError::Unsupported(detail) => {
                ChannelFailure::connection(mask_addresses(&detail))
            }
            ChannelError::Timeout(detail) => ChannelFailure::timeout(mask_addresses(&detail)),
            ChannelError::Parse { detail, raw } => {
                ChannelFailure::parse(mask_addresses(&detail), mask_addresses(&raw))
            }
        }
    }
}

/// Mask the last two octets of every IPv4 address: `10.0.3.11` becomes `10.0.xxx.xxx`
pub fn mask_addresses(text: &str) -> String {
    static IPV4: OnceLock<Option<Regex>> = OnceLock::new();
    match IPV4.get_or_init(|| Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.\d{1,3}\.\d{1,3}\b").ok()) {
        Some(re) => re.replace_all(text, "$1.$2.xxx.xxx").into_owned(),
        None => text.to_string(),
    }
}

/// What a single invocation is pointed at
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// A host, for remote shell checks
    Host(Target),
    /// One service endpoint of a host, for probes
    Service {
        target: Target,
        endpoint: ServiceEndpoint,
    },
    /// A whole cluster, for control-plane queries
    Cluster(ClusterRef),
}

impl Subject {
    pub fn environment(&self) -> Environment {
        match self {
            Subject::Host(target) | Subject::Service { target, .. } => target.environment,
            Subject::Cluster(cluster) => cluster.environment,
        }
    }

    /// Hostname, or cluster name for cluster subjects
    pub fn host_name(&self) -> &str {
        match self {
            Subject::Host(target) | Subject::Service { target, .. } => &target.hostname,
            Subject::Cluster(cluster) => &cluster.name,
        }
    }

    /// Host the invocation actually reaches
    pub fn target(&self) -> &Target {
        match self {
            Subject::Host(target) | Subject::Service { target, .. } => target,
            Subject::Cluster(cluster) => &cluster.api_host,
        }
    }

    /// Per-host session key
    pub fn session_key(&self) -> String {
        let target = self.target();
        format!("{}/{}", target.environment, target.hostname)
    }

    /// Subject as recorded in results
    pub fn result_subject(&self) -> ResultSubject {
        match self {
            Subject::Host(target) => {
                ResultSubject::new(target.environment, &target.hostname).with_role(target.role)
            }
            Subject::Service { target, endpoint } => {
                ResultSubject::new(target.environment, &target.hostname)
                    .with_role(target.role)
                    .with_resource(&endpoint.name)
            }
            Subject::Cluster(cluster) => ResultSubject::new(cluster.environment, &cluster.name),
        }
    }
}

/// One fanned-out sub-observation of a cluster query
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObservation {
    pub name: String,
    pub observation: RawObservation,
}

impl ResourceObservation {
    pub fn new(name: impl Into<String>, observation: RawObservation) -> Self {
        Self {
            name: name.into(),
            observation,
        }
    }
}

/// Successful channel return
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutput {
    Single(RawObservation),
    PerResource(Vec<ResourceObservation>),
}

impl From<RawObservation> for ChannelOutput {
    fn from(observation: RawObservation) -> Self {
        ChannelOutput::Single(observation)
    }
}

impl From<ObservedValue> for ChannelOutput {
    fn from(value: ObservedValue) -> Self {
        ChannelOutput::Single(RawObservation::Value(value))
    }
}

/// Execution channel
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel identifier, used in logs and metric labels
    fn name(&self) -> &str;

    /// Key of the session this invocation would reuse
    ///
    /// Invocations sharing a key are serialized by the engine. `None` means
    /// the channel is safe to use concurrently for this subject.
    fn session_key(&self, _subject: &Subject, _check: &CheckDefinition) -> Option<String> {
        None
    }

    /// Fetch the raw observation for `check` against `subject`
    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> std::result::Result<ChannelOutput, ChannelError>;
}

/// Channel per kind
#[derive(Clone, Default)]
pub struct ChannelSet {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
    simulated: bool,
}

impl ChannelSet {
    /// Empty set, every check will fail with a connection error
    pub fn new() -> Self {
        Self::default()
    }

    /// Live channels over SSH, HTTP and TCP
    pub fn live(shell: ShellConfig, probe: ProbeConfig) -> Result<Self> {
        let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(shell.clone()));
        let network = NetworkProbeChannel::new(probe.clone())
            .map_err(|e| EngineError::channel(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::new()
            .with(
                ChannelKind::RemoteShell,
                Arc::new(RemoteShellChannel::new(
                    Arc::clone(&executor),
                    shell.serialize_per_host,
                )),
            )
            .with(
                ChannelKind::ClusterQuery,
                Arc::new(ClusterQueryChannel::new(
                    Arc::clone(&executor),
                    shell.serialize_per_host,
                )),
            )
            .with(ChannelKind::NetworkProbe, Arc::new(network))
            .with(
                ChannelKind::DatabaseProbe,
                Arc::new(DatabaseProbeChannel::new(executor, probe.connect_timeout)),
            ))
    }

    /// The simulator for every kind
    pub fn simulated(simulator: SimulatedChannel) -> Self {
        let simulator: Arc<dyn Channel> = Arc::new(simulator);
        let mut set = Self::new();
        for kind in ChannelKind::ALL {
            set.channels.insert(kind, Arc::clone(&simulator));
        }
        set.simulated = true;
        set
    }

    /// Install or replace the channel for `kind`
    pub fn with(mut self, kind: ChannelKind, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(kind, channel);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn Channel>> {
        self.channels.get(&kind)
    }

    /// True in demo mode
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self
            .channels
            .iter()
            .map(|(kind, channel)| (kind.as_str(), channel.name().to_string()))
            .collect();
        kinds.sort();
        f.debug_struct("ChannelSet")
            .field("channels", &kinds)
            .field("simulated", &self.simulated)
            .finish()
    }
}

/// Substitute `{placeholder}`s in a command template
pub fn render_template(template: &str, subject: &Subject) -> String {
    let target = subject.target();
    let (port, name, path) = match subject {
        Subject::Service { endpoint, .. } => (
            endpoint.port,
            endpoint.name.as_str(),
            endpoint.path.as_deref().unwrap_or("/"),
        ),
        Subject::Host(target) => (target.ssh_port, target.name.as_str(), "/"),
        Subject::Cluster(cluster) => (cluster.api_host.ssh_port, cluster.name.as_str(), "/"),
    };
    let cluster = match subject {
        Subject::Cluster(cluster) => cluster.name.as_str(),
        _ => target.cluster.as_deref().unwrap_or(""),
    };

    template
        .replace("{hostname}", &target.hostname)
        .replace("{address}", &target.address)
        .replace("{port}", &port.to_string())
        .replace("{name}", name)
        .replace("{path}", path)
        .replace("{cluster}", cluster)
        .replace("{environment}", subject.environment().as_str())
}

/// Parse one value with the check's parser
pub fn parse_value(
    raw: &str,
    parser: ValueParser,
) -> std::result::Result<ObservedValue, ChannelError> {
    let trimmed = raw.trim();
    match parser {
        ValueParser::Text => {
            if trimmed.is_empty() {
                Ok(ObservedValue::Absent)
            } else {
                Ok(ObservedValue::Text(trimmed.to_string()))
            }
        }
        ValueParser::State => match trimmed.split_whitespace().next() {
            Some(state) => Ok(ObservedValue::State(state.to_string())),
            None => Ok(ObservedValue::Absent),
        },
        ValueParser::Number => parse_number(trimmed)
            .map(ObservedValue::Number)
            .ok_or_else(|| ChannelError::parse("expected a number", raw)),
        ValueParser::Replicas => {
            let parsed = trimmed.split_once('/').and_then(|(ready, desired)| {
                Some((
                    ready.trim().parse::<u32>().ok()?,
                    desired.trim().parse::<u32>().ok()?,
                ))
            });
            parsed
                .map(|(ready, desired)| ObservedValue::Replicas { ready, desired })
                .ok_or_else(|| ChannelError::parse("expected ready/desired", raw))
        }
    }
}

/// Turn command stdout into a channel output
///
/// Per-resource checks expect one `name:value` per line. A line that does not
/// parse becomes a failure for that resource only.
pub fn interpret_output(
    raw: &str,
    check: &CheckDefinition,
) -> std::result::Result<ChannelOutput, ChannelError> {
    let parser = check.value_parser();

    if !check.is_per_resource() {
        return parse_value(raw, parser).map(ChannelOutput::from);
    }

    let resources = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((name, value)) => {
                let observation = match parse_value(value, parser) {
                    Ok(value) => RawObservation::Value(value),
                    Err(err) => RawObservation::Failure(err.into_failure()),
                };
                ResourceObservation::new(name.trim(), observation)
            }
            None => ResourceObservation::new(
                line,
                RawObservation::Failure(ChannelFailure::parse("expected name:value", line)),
            ),
        })
        .collect();

    Ok(ChannelOutput::PerResource(resources))
}
