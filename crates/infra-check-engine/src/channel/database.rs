//! Database probes
//!
//! - `mysql://host:port` reads the server greeting packet
//! - `tcp://host:port` connects only
//! - anything else is a read-only status query run on the database host

use super::probe::tcp_probe;
use super::{
    interpret_output, render_template, Channel, ChannelError, ChannelOutput, RemoteExecutor,
    Subject,
};
use crate::contracts::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

const MYSQL_PROTOCOL_V10: u8 = 10;
const MYSQL_ERR_PACKET: u8 = 0xFF;
const MAX_GREETING: usize = 1024;

pub struct DatabaseProbeChannel {
    executor: Arc<dyn RemoteExecutor>,
    connect_timeout: Duration,
}

impl DatabaseProbeChannel {
    pub fn new(executor: Arc<dyn RemoteExecutor>, connect_timeout: Duration) -> Self {
        Self {
            executor,
            connect_timeout,
        }
    }

    async fn mysql_greeting(&self, addr: &str) -> Result<ObservedValue, ChannelError> {
        let read = async {
            let mut stream = TcpStream::connect(addr)
                .await
                .map_err(|e| ChannelError::Connection(format!("{}: {}", addr, e)))?;

            let mut header = [0u8; 4];
            stream
                .read_exact(&mut header)
                .await
                .map_err(|e| ChannelError::Connection(format!("{}: no greeting: {}", addr, e)))?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;

            let mut payload = vec![0u8; len.min(MAX_GREETING)];
            stream
                .read_exact(&mut payload)
                .await
                .map_err(|e| ChannelError::Connection(format!("{}: short greeting: {}", addr, e)))?;
            Ok::<_, ChannelError>(payload)
        };

        let payload = tokio::time::timeout(self.connect_timeout, read)
            .await
            .map_err(|_| {
                ChannelError::Timeout(format!(
                    "greeting from {} exceeded {}ms",
                    addr,
                    self.connect_timeout.as_millis()
                ))
            })??;

        match payload.first() {
            Some(&MYSQL_PROTOCOL_V10) => Ok(ObservedValue::State("connected".to_string())),
            Some(&MYSQL_ERR_PACKET) => {
                let message = payload
                    .get(3..)
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                Err(ChannelError::Connection(format!(
                    "{} refused connection: {}",
                    addr,
                    message.trim_start_matches('#')
                )))
            }
            _ => Err(ChannelError::parse(
                "unexpected MySQL greeting",
                hex::encode(&payload),
            )),
        }
    }
}

#[async_trait]
impl Channel for DatabaseProbeChannel {
    fn name(&self) -> &str {
        "database_probe"
    }

    fn session_key(&self, subject: &Subject, check: &CheckDefinition) -> Option<String> {
        let command = check.command.trim_start();
        if command.starts_with("mysql://") || command.starts_with("tcp://") {
            None
        } else {
            Some(subject.session_key())
        }
    }

    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> Result<ChannelOutput, ChannelError> {
        let rendered = render_template(&check.command, subject);
        let rendered = rendered.trim();

        if let Some(addr) = rendered.strip_prefix("mysql://") {
            return self.mysql_greeting(addr).await.map(ChannelOutput::from);
        }
        if let Some(addr) = rendered.strip_prefix("tcp://") {
            return tcp_probe(addr, self.connect_timeout)
                .await
                .map(ChannelOutput::from);
        }

        let stdout = self.executor.execute(subject.target(), rendered).await?;
        interpret_output(&stdout, check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct LagExecutor;

    #[async_trait]
    impl RemoteExecutor for LagExecutor {
        async fn execute(&self, _target: &Target, command: &str) -> Result<String, ChannelError> {
            assert!(command.contains("Seconds_Behind_Master"));
            Ok("3\n".to_string())
        }
    }

    fn db_subject(port: u16) -> Subject {
        Subject::Service {
            target: Target::new(Environment::Prd, "prd-db1", Role::Database)
                .with_address("127.0.0.1"),
            endpoint: ServiceEndpoint::new("MySQL", port),
        }
    }

    fn channel() -> DatabaseProbeChannel {
        DatabaseProbeChannel::new(Arc::new(LagExecutor), Duration::from_secs(1))
    }

    async fn serve_once(packet: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(&packet).await;
            }
        });
        port
    }

    fn packet(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u32;
        let mut out = vec![len as u8, (len >> 8) as u8, (len >> 16) as u8, 0];
        out.extend_from_slice(payload);
        out
    }

    fn connectivity_check() -> CheckDefinition {
        CheckDefinition::new(
            "DB-001",
            "MySQL connectivity",
            CheckCategory::Database,
            ChannelKind::DatabaseProbe,
            "mysql://{address}:{port}",
            ThresholdPolicy::AcceptedStates {
                accepted: vec!["connected".into()],
                on_mismatch: Severity::Critical,
            },
        )
    }

    #[tokio::test]
    async fn test_mysql_greeting_connected() {
        let mut payload = vec![MYSQL_PROTOCOL_V10];
        payload.extend_from_slice(b"8.0.36\0");
        let port = serve_once(packet(&payload)).await;

        let output = channel()
            .fetch(&db_subject(port), &connectivity_check())
            .await
            .unwrap();
        assert_eq!(output, ChannelOutput::from(RawObservation::state("connected")));
    }

    #[tokio::test]
    async fn test_mysql_error_packet() {
        let mut payload = vec![MYSQL_ERR_PACKET, 0x6a, 0x04];
        payload.extend_from_slice(b"Host is blocked");
        let port = serve_once(packet(&payload)).await;

        let err = channel()
            .fetch(&db_subject(port), &connectivity_check())
            .await
            .unwrap_err();
        match err {
            ChannelError::Connection(msg) => assert!(msg.contains("Host is blocked")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_query_through_executor() {
        let check = CheckDefinition::new(
            "DB-002",
            "Replication lag",
            CheckCategory::Database,
            ChannelKind::DatabaseProbe,
            "mysql -e 'SHOW SLAVE STATUS\\G' | awk '/Seconds_Behind_Master/{print $2}'",
            ThresholdPolicy::UpperBound {
                warning: 30.0,
                critical: 300.0,
            },
        );
        let subject = db_subject(3306);
        let ch = channel();
        assert_eq!(ch.session_key(&subject, &check).as_deref(), Some("PRD/prd-db1"));
        assert!(ch.session_key(&subject, &connectivity_check()).is_none());

        let output = ch.fetch(&subject, &check).await.unwrap();
        assert_eq!(output, ChannelOutput::from(RawObservation::number(3.0)));
    }
}
