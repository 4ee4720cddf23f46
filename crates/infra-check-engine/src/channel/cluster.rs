//! Cluster control-plane queries
//!
//! Queries run once per cluster on its API host (the first master), through
//! the same remote executor as host commands.

use super::{
    interpret_output, render_template, Channel, ChannelError, ChannelOutput, RemoteExecutor,
    Subject,
};
use crate::contracts::*;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ClusterQueryChannel {
    executor: Arc<dyn RemoteExecutor>,
    serialize_per_host: bool,
}

impl ClusterQueryChannel {
    /// `serialize_per_host` queues queries behind other work on the API host
    pub fn new(executor: Arc<dyn RemoteExecutor>, serialize_per_host: bool) -> Self {
        Self {
            executor,
            serialize_per_host,
        }
    }
}

#[async_trait]
impl Channel for ClusterQueryChannel {
    fn name(&self) -> &str {
        "cluster_query"
    }

    fn session_key(&self, subject: &Subject, _check: &CheckDefinition) -> Option<String> {
        self.serialize_per_host.then(|| subject.session_key())
    }

    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> Result<ChannelOutput, ChannelError> {
        let cluster = match subject {
            Subject::Cluster(cluster) => cluster,
            other => {
                return Err(ChannelError::Unsupported(format!(
                    "cluster query {} needs a cluster, got host {}",
                    check.id,
                    other.host_name()
                )))
            }
        };

        let query = render_template(&check.command, subject);
        tracing::debug!(
            cluster = %cluster.name,
            api_host = %cluster.api_host.hostname,
            check_id = %check.id,
            "cluster query"
        );
        let stdout = self.executor.execute(&cluster.api_host, &query).await?;
        interpret_output(&stdout, check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExecutor(&'static str);

    #[async_trait]
    impl RemoteExecutor for FixedExecutor {
        async fn execute(&self, target: &Target, _command: &str) -> Result<String, ChannelError> {
            assert_eq!(target.hostname, "stg-m1");
            Ok(self.0.to_string())
        }
    }

    fn cluster() -> ClusterRef {
        ClusterRef {
            name: "stg-cluster".into(),
            environment: Environment::Stg,
            api_host: Target::new(Environment::Stg, "stg-m1", Role::Master),
            nodes: vec!["stg-m1".into(), "stg-w1".into()],
        }
    }

    #[tokio::test]
    async fn test_per_resource_query_runs_on_api_host() {
        let channel = ClusterQueryChannel::new(
            Arc::new(FixedExecutor("stg-m1:Ready\nstg-w1:NotReady\n")),
            true,
        );
        let check = CheckDefinition::new(
            "K8S-009",
            "Node status",
            CheckCategory::Cluster,
            ChannelKind::ClusterQuery,
            "kubectl get nodes --no-headers | awk '{print $1\":\"$2}'",
            ThresholdPolicy::AcceptedStates {
                accepted: vec!["Ready".into()],
                on_mismatch: Severity::Critical,
            },
        )
        .with_fan_out(FanOut::PerResource);

        let subject = Subject::Cluster(cluster());
        let output = channel.fetch(&subject, &check).await.unwrap();
        match output {
            ChannelOutput::PerResource(resources) => {
                assert_eq!(resources.len(), 2);
                assert_eq!(resources[1].name, "stg-w1");
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(
            channel.session_key(&subject, &check).as_deref(),
            Some("STG/stg-m1")
        );
    }

    #[tokio::test]
    async fn test_host_subject_unsupported() {
        let channel = ClusterQueryChannel::new(Arc::new(FixedExecutor("")), false);
        let check = CheckDefinition::new(
            "K8S-001",
            "Cluster version",
            CheckCategory::Cluster,
            ChannelKind::ClusterQuery,
            "kubectl version",
            ThresholdPolicy::Informational,
        );
        let subject = Subject::Host(Target::new(Environment::Stg, "stg-w1", Role::Worker));
        let err = channel.fetch(&subject, &check).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
        assert_eq!(channel.session_key(&Subject::Cluster(cluster()), &check), None);
    }
}
