use crate::auth::{AccessToken, Authenticate, Session};
use crate::error::SentinelError;
use log::{error, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Maps (base delay, failed attempt number starting at 1) to the wait before the next attempt.
pub type Backoff = fn(Duration, u32) -> Duration;

pub fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: linear_backoff,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(self.base_delay, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

/// Runs `operation` with the session's current token until it succeeds or the policy's attempts
/// are used up. Between attempts it sleeps for the backoff delay and then forces a token refresh.
/// A refresh that fails is logged and the next attempt reuses the old token.
pub async fn with_retry<A, T, F, Fut>(
    policy: &RetryPolicy,
    session: &mut Session<A>,
    label: &str,
    mut operation: F,
) -> Result<T, SentinelError>
where
    A: Authenticate,
    F: FnMut(AccessToken) -> Fut,
    Fut: Future<Output = Result<T, SentinelError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(session.token().clone()).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} error, retrying in {:?}... ({}/{}): {}",
                    label, delay, attempt, max_attempts, e
                );
                sleep(delay).await;
                if let Err(refresh_err) = session.refresh().await {
                    warn!("Token refresh failed, keeping previous token: {}", refresh_err);
                }
                attempt += 1;
            }
            Err(e) => {
                error!("{} failed after {} attempts: {}", label, max_attempts, e);
                return Err(e);
            }
        }
    }
}
