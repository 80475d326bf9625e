//! Caller-facing operations.
//!
//! Each service takes the acting [`Identity`](firewatch_core::identity::Identity)
//! as an explicit argument, re-reads what it decides on, and writes through
//! guarded store operations.

pub mod chat;
pub mod incidents;
pub mod profiles;

use std::future::Future;

use firewatch_core::retry::RetryPolicy;
use firewatch_db::StoreError;

pub use chat::{ChatEvent, ChatService, ChatSession};
pub use incidents::IncidentService;
pub use profiles::ProfileReconciler;

/// Run `op`, retrying transient store failures per `policy`.
///
/// Only for idempotent reads and guarded writes; anything else is returned
/// as-is on the first failure.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient store failure, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
