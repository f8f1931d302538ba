//! Bounded polling with exponential backoff.

use crate::supervisor::domain::PollSettings;
use std::future::Future;

/// Repeatedly evaluates `check` until it reports `true` or the poll timeout
/// elapses.
///
/// The delay between attempts starts at the initial interval and doubles up
/// to the configured ceiling. The whole loop runs under a single
/// [`tokio::time::timeout`], so a check that hangs is abandoned when the
/// budget runs out. Returns whether the condition was met in time.
pub async fn poll_until<F, Fut>(settings: &PollSettings, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let attempts = async {
        let mut interval = settings.initial_interval();
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(interval).await;
            interval = interval.saturating_mul(2).min(settings.max_interval());
        }
    };
    tokio::time::timeout(settings.timeout(), attempts)
        .await
        .is_ok()
}
