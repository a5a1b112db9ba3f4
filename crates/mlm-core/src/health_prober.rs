// HealthProber: a single bounded HTTP check against a model's /v1/models.
//
// Stateless by design — a fresh TCP connection per probe is acceptable at the
// default 5s cadence (spec.md §4.6).

use std::time::Duration;

use async_trait::async_trait;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Classification of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    HttpError(u16),
    TransportError,
    Timeout,
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok)
    }
}

#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome;
}

/// Real prober: `GET http://{host}:{port}/v1/models` with a bounded read timeout.
pub struct HttpHealthProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProber {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build health-prober reqwest client"),
            timeout,
        }
    }
}

impl Default for HttpHealthProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome {
        let url = format!("http://{host}:{port}/v1/models");

        match tokio::time::timeout(self.timeout, self.client.get(&url).send()).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(_)) => ProbeOutcome::TransportError,
            Ok(Ok(resp)) => {
                if resp.status().is_success() {
                    ProbeOutcome::Ok
                } else {
                    ProbeOutcome::HttpError(resp.status().as_u16())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_error_on_closed_port() {
        let prober = HttpHealthProber::with_timeout(Duration::from_millis(500));
        // Nothing is listening on this loopback port.
        let outcome = prober.probe("127.0.0.1", 1).await;
        assert_eq!(outcome, ProbeOutcome::TransportError);
    }
}
