//! Mock language model for benchmarking engine overhead.
//!
//! Returns instant in-memory responses without any network calls, with
//! optional simulated latency (plus variance) so schedulers can be
//! exercised under realistic timing.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use moneta_orchestrator::{CapabilityError, CompletionRequest, LanguageModel};

#[derive(Debug, Clone)]
pub struct MockLanguageModel {
    latency_ms: u64,
    latency_variance_ms: u64,
    reply: String,
}

impl MockLanguageModel {
    pub fn new(latency_ms: u64, latency_variance_ms: u64, reply: impl Into<String>) -> Self {
        Self {
            latency_ms,
            latency_variance_ms,
            reply: reply.into(),
        }
    }

    /// Zero-latency instance.
    pub fn instant(reply: impl Into<String>) -> Self {
        Self::new(0, 0, reply)
    }

    /// Roughly network-shaped latency (200 ms ± 50 ms).
    pub fn realistic(reply: impl Into<String>) -> Self {
        Self::new(200, 50, reply)
    }

    fn sampled_latency(&self) -> u64 {
        if self.latency_variance_ms == 0 {
            return self.latency_ms;
        }
        let mut rng = rand::rng();
        let variance = rng.random_range(0..=self.latency_variance_ms);
        if rng.random_bool(0.5) {
            self.latency_ms.saturating_add(variance)
        } else {
            self.latency_ms
                .saturating_sub(variance.min(self.latency_ms))
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CapabilityError> {
        let latency = self.sampled_latency();
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(self.reply.clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let latency = self.sampled_latency();
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let mut v = vec![0.0f32; 16];
        for (i, b) in text.bytes().enumerate() {
            v[i % 16] += f32::from(b) / 255.0;
        }
        Ok(v)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
