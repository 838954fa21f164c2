//! The resolver contract (§6, collaborator viewpoint) and a default
//! implementation on top of `tokio::net::lookup_host`. The DNS protocol
//! itself is out of scope (§1) — this only needs "resolve hostname to a
//! list of A/AAAA addresses".

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::ConnectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn family_digit(self) -> u8 {
        match self {
            RecordType::A => 4,
            RecordType::Aaaa => 6,
        }
    }
}

/// `resolveAll(host, recordType) -> Future<list<ip-string>>` from §6. An
/// empty list is a valid answer, not an error; implementations must be
/// cancel-safe (dropping the future mid-flight must not leak resources).
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, record: RecordType) -> Result<Vec<IpAddr>, ConnectError>;
}

/// Resolves via the OS stub resolver through Tokio's blocking-pool backed
/// `lookup_host`, filtering the answer down to the requested address
/// family. This is the resolver C7 wires in by default when `dns` isn't
/// disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioResolver;

#[async_trait]
impl Resolver for TokioResolver {
    async fn resolve(&self, host: &str, record: RecordType) -> Result<Vec<IpAddr>, ConnectError> {
        // lookup_host requires a `host:port` pair; the port is discarded.
        let lookup = format!("{host}:0");
        let addrs = tokio::net::lookup_host(lookup)
            .await
            .map_err(|e| ConnectError::invalid_argument(format!("DNS lookup for {host} failed: {e}")))?;

        let wanted_v6 = record == RecordType::Aaaa;
        Ok(addrs
            .map(|sock| sock.ip())
            .filter(|ip| ip.is_ipv6() == wanted_v6)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Clone)]
    pub struct Answer {
        pub ips: Result<Vec<IpAddr>, String>,
        pub delay: Duration,
    }

    impl Answer {
        pub fn ok(ips: Vec<IpAddr>) -> Self {
            Answer {
                ips: Ok(ips),
                delay: Duration::ZERO,
            }
        }

        pub fn ok_after(ips: Vec<IpAddr>, delay: Duration) -> Self {
            Answer { ips: Ok(ips), delay }
        }

        pub fn err(message: impl Into<String>) -> Self {
            Answer {
                ips: Err(message.into()),
                delay: Duration::ZERO,
            }
        }
    }

    /// A scripted resolver for exercising the Happy Eyeballs dialer without
    /// any real network access.
    #[derive(Default)]
    pub struct FakeResolver {
        answers: Mutex<HashMap<(String, RecordType), Answer>>,
    }

    impl FakeResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, host: &str, record: RecordType, answer: Answer) {
            self.answers.lock().unwrap().insert((host.to_string(), record), answer);
        }
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn resolve(&self, host: &str, record: RecordType) -> Result<Vec<IpAddr>, ConnectError> {
            let answer = self
                .answers
                .lock()
                .unwrap()
                .get(&(host.to_string(), record))
                .cloned()
                .unwrap_or_else(|| Answer::ok(vec![]));

            if !answer.delay.is_zero() {
                sleep(answer.delay).await;
            }
            answer
                .ips
                .map_err(|msg| ConnectError::invalid_argument(msg))
        }
    }
}
