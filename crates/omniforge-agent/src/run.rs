//! Inputs shared by both executors, plus cancellation and retry helpers.

use std::time::Duration;

use omniforge_skills::{PreparedSkill, Skill};
use tokio::sync::watch;

use crate::config::AutonomousConfig;
use crate::context::ExecutionContext;

/// Everything an executor needs for one run of one skill.
#[derive(Debug)]
pub struct SkillRun<'a> {
    pub task_id: &'a str,
    pub skill: &'a Skill,
    pub prepared: &'a PreparedSkill,
    pub request: &'a str,
    pub config: &'a AutonomousConfig,
    pub context: &'a ExecutionContext,
    /// Flipped to `true` to cancel the run.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl SkillRun<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested; never resolves otherwise.
    pub async fn cancelled(&self) {
        wait_cancelled(self.cancel.clone()).await;
    }
}

async fn wait_cancelled(rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = rx
        && rx.wait_for(|cancelled| *cancelled).await.is_ok()
    {
        return;
    }
    // No signal, or the sender went away without cancelling.
    std::future::pending::<()>().await;
}

/// Exponential backoff between reasoning retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_factor).min(self.max_delay.as_secs_f64()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_millis());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[tokio::test]
    async fn dropped_sender_is_not_cancellation() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let waited =
            tokio::time::timeout(Duration::from_millis(20), wait_cancelled(Some(rx))).await;
        assert!(waited.is_err());
    }
}
