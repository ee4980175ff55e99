//! One consensus round: normalized vote tally with a first-class-to-cross-
//! threshold winner, resolved via a `oneshot` so the waiting coordinator
//! task is woken exactly once (§4.4 "Consensus round").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

struct Inner {
    tally: HashMap<String, (usize, String)>,
    votes_received: usize,
    winner: Option<oneshot::Sender<String>>,
}

/// Tracks one in-flight consensus round. Dropping the round (e.g. when it
/// is removed from the active-rounds map after a timeout) drops the
/// `oneshot::Sender`, which wakes any still-waiting receiver with a
/// `RecvError` — the cancellation path described in §5 "Cancellation".
pub struct ConsensusRound {
    required: usize,
    total: usize,
    inner: Mutex<Inner>,
}

impl ConsensusRound {
    pub fn new(required: usize, total: usize) -> (Arc<Self>, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let round = Arc::new(Self {
            required,
            total,
            inner: Mutex::new(Inner { tally: HashMap::new(), votes_received: 0, winner: Some(tx) }),
        });
        (round, rx)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Records one raw vote, normalizing it into a class. If this vote
    /// brings its class to `required`, resolves the round with the first
    /// raw vote seen in that class.
    pub async fn record_vote(&self, raw_vote: &str) {
        let class = normalize(raw_vote);
        let mut inner = self.inner.lock().await;
        inner.votes_received += 1;
        let entry = inner.tally.entry(class).or_insert_with(|| (0, raw_vote.to_string()));
        entry.0 += 1;
        if entry.0 >= self.required {
            if let Some(tx) = inner.winner.take() {
                let _ = tx.send(entry.1.clone());
            }
        }
    }

    pub async fn votes_received(&self) -> usize {
        self.inner.lock().await.votes_received
    }
}

/// Normalizes a raw vote string into its tally class, per §4.4 step 5.
fn normalize(raw: &str) -> String {
    if raw.starts_with("ACK_") {
        "ACK_SUCCESS".to_string()
    } else if raw.starts_with("ERROR_") {
        "ERROR_RESPONSE".to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reaching_required_votes_resolves_with_first_raw_vote_in_class() {
        let (round, rx) = ConsensusRound::new(2, 3);
        round.record_vote("ACK_P1_REQ").await;
        round.record_vote("ACK_P2_REQ").await;
        let winner = rx.await.unwrap();
        assert_eq!(winner, "ACK_P1_REQ");
    }

    #[tokio::test]
    async fn error_votes_tally_into_one_class_independent_of_suffix() {
        let (round, rx) = ConsensusRound::new(2, 3);
        round.record_vote("ERROR_P1_123").await;
        round.record_vote("ERROR_P2_456").await;
        assert_eq!(rx.await.unwrap(), "ERROR_P1_123");
    }

    #[tokio::test]
    async fn dropping_the_round_wakes_the_receiver_with_an_error() {
        let (round, rx) = ConsensusRound::new(3, 3);
        round.record_vote("ACK_P1_REQ").await;
        drop(round);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn votes_received_counts_every_vote_not_just_the_winning_class() {
        let (round, _rx) = ConsensusRound::new(5, 5);
        round.record_vote("ACK_P1_REQ").await;
        round.record_vote("ERROR_P2_1").await;
        assert_eq!(round.votes_received().await, 2);
    }
}
