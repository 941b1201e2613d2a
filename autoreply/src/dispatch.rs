//! Reply dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::{AccessToken, DispatchError, DispatchOutcome};
use crate::governor::{AdmissionPermit, RateGovernor};
use crate::platform::PlatformApi;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    pub latency_ms: u64,
}

/// Posts replies through the platform. One attempt per call, no retries:
/// the next scheduled pass retries, guarded by the idempotency check.
#[derive(Clone)]
pub struct Dispatcher {
    platform: Arc<dyn PlatformApi>,
    governor: RateGovernor,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(platform: Arc<dyn PlatformApi>, governor: RateGovernor, timeout: Duration) -> Self {
        Self {
            platform,
            governor,
            timeout,
        }
    }

    /// Send `message` as a reply to `comment_id`. The permit is committed
    /// before the call since an attempt counts against the ceilings whatever
    /// its outcome.
    pub async fn dispatch(
        &self,
        permit: AdmissionPermit,
        comment_id: &str,
        message: &str,
        token: &AccessToken,
    ) -> DispatchResult {
        let monitor_id = permit.monitor_id().to_string();
        permit.commit();

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.platform.reply_to_comment(comment_id, message, token),
        )
        .await;
        let latency_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

        let outcome = match result {
            Ok(Ok(message_id)) => {
                self.governor.record_success(&monitor_id);
                debug!(monitor_id, comment_id, message_id, latency_ms, "Reply sent");
                DispatchOutcome::Sent { message_id }
            }
            Ok(Err(e)) => {
                warn!(monitor_id, comment_id, error = %e, "Reply failed");
                DispatchOutcome::Failed(DispatchError::new(e.message(), e.code()))
            }
            Err(_) => {
                warn!(monitor_id, comment_id, timeout = ?self.timeout, "Reply timed out");
                DispatchOutcome::Failed(DispatchError::new(
                    format!("reply timed out after {}s", self.timeout.as_secs()),
                    Some("timeout".to_string()),
                ))
            }
        };

        DispatchResult {
            outcome,
            latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::domain::{IncomingComment, Monitor};
    use crate::platform::PlatformPost;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use graph_api::ApiError;

    /// Replies after `delay`, or fails with an API error.
    struct SlowPlatform {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl PlatformApi for SlowPlatform {
        async fn list_posts(
            &self,
            _page_id: &str,
            _token: &AccessToken,
        ) -> Result<Vec<PlatformPost>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_comments(
            &self,
            _post_id: &str,
            _token: &AccessToken,
        ) -> Result<Vec<IncomingComment>, ApiError> {
            Ok(Vec::new())
        }

        async fn reply_to_comment(
            &self,
            _comment_id: &str,
            _message: &str,
            _token: &AccessToken,
        ) -> Result<String, ApiError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ApiError::Api {
                    status: 400,
                    message: "Unsupported post request".to_string(),
                    code: Some(100),
                });
            }
            Ok("reply-1".to_string())
        }
    }

    fn setup(delay: Duration, fail: bool) -> (Dispatcher, RateGovernor, Monitor) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap(),
        ));
        let governor = RateGovernor::new(clock.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(SlowPlatform { delay, fail }),
            governor.clone(),
            Duration::from_millis(50),
        );
        let monitor = Monitor::new("o1", "m", "page", AccessToken::new("t"), clock.now());
        (dispatcher, governor, monitor)
    }

    #[tokio::test]
    async fn test_successful_reply_counts_as_success() {
        let (dispatcher, governor, monitor) = setup(Duration::ZERO, false);
        let permit = governor.try_acquire(&monitor).unwrap();

        let result = dispatcher
            .dispatch(permit, "c1", "thanks", &monitor.page_token)
            .await;
        assert_eq!(result.outcome.message_id(), Some("reply-1"));
        assert_eq!(governor.snapshot().successes_last_minute, 1);
    }

    #[tokio::test]
    async fn test_api_error_is_structured() {
        let (dispatcher, governor, monitor) = setup(Duration::ZERO, true);
        let permit = governor.try_acquire(&monitor).unwrap();

        let result = dispatcher
            .dispatch(permit, "c1", "thanks", &monitor.page_token)
            .await;
        let err = result.outcome.error().unwrap();
        assert_eq!(err.message, "Unsupported post request");
        assert_eq!(err.code.as_deref(), Some("100"));
        assert_eq!(governor.snapshot().successes_last_minute, 0);
        assert_eq!(governor.snapshot().attempts_last_minute, 1);
    }

    #[tokio::test]
    async fn test_slow_reply_times_out() {
        let (dispatcher, governor, monitor) = setup(Duration::from_secs(5), false);
        let permit = governor.try_acquire(&monitor).unwrap();

        let result = dispatcher
            .dispatch(permit, "c1", "thanks", &monitor.page_token)
            .await;
        assert!(!result.outcome.is_success());
        assert_eq!(
            result.outcome.error().and_then(|e| e.code.as_deref()),
            Some("timeout")
        );
    }
}
