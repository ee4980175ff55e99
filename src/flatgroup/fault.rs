//! Fault-injecting local vote production (§4.4 "Fault injection").
//!
//! Every voter, including the coordinator casting its own vote, goes
//! through this same trait method — there is deliberately no privileged
//! path for the local vote. Dispatching through [`VoteSource`] rather than
//! a bare function is grounded on the teacher's `#[async_trait]`-based
//! procedure handlers (each NSM/NLM RPC procedure implements one async
//! trait method that `Vfs`-style dispatch tables call by name); here the
//! "procedure" is "produce a vote for this request."

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Per-node fault injection knobs; rates are in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy)]
pub struct FaultConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub connection_failure_rate: f64,
    pub incorrect_response_rate: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self { base_delay_ms: 0, max_delay_ms: 0, connection_failure_rate: 0.0, incorrect_response_rate: 0.0 }
    }
}

/// Produces a local vote for one request. `FaultConfig` is the only
/// implementation in this crate, but the trait seam lets tests substitute
/// a deterministic vote source without touching the consensus round.
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn vote(&self, self_id: &str, req: &str) -> Option<String>;
}

#[async_trait]
impl VoteSource for FaultConfig {
    /// A random delay, then a coin flip between a dropped vote, a
    /// fabricated error, and a genuine ack.
    async fn vote(&self, self_id: &str, req: &str) -> Option<String> {
        let delay_ms = if self.max_delay_ms > self.base_delay_ms {
            rand::thread_rng().gen_range(self.base_delay_ms..=self.max_delay_ms)
        } else {
            self.base_delay_ms
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let roll: f64 = rand::thread_rng().gen();
        if roll < self.connection_failure_rate {
            None
        } else if roll < self.connection_failure_rate + self.incorrect_response_rate {
            let rand_suffix: u32 = rand::thread_rng().gen();
            Some(format!("ERROR_P{self_id}_{rand_suffix}"))
        } else {
            Some(format!("ACK_P{self_id}_{req}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_rates_always_acks() {
        let fault = FaultConfig::default();
        let vote = fault.vote("p1", "REQ_1").await;
        assert_eq!(vote, Some("ACK_Pp1_REQ_1".to_string()));
    }

    #[tokio::test]
    async fn full_failure_rate_never_votes() {
        let fault = FaultConfig { connection_failure_rate: 1.0, ..FaultConfig::default() };
        assert_eq!(fault.vote("p1", "REQ_1").await, None);
    }
}
