use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage::repository::VideoViewRepository;
use tracing::{debug, warn};
use tutor_core::model::{UserId, UserVideoView, VideoTracking};

use crate::error::TrackingServiceError;

/// Reply sent back to the video player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl TrackOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            msg: None,
        }
    }

    #[must_use]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
        }
    }
}

/// Accumulates playback pings into per-user video view records.
#[derive(Clone)]
pub struct EngagementTracker {
    video_views: Arc<dyn VideoViewRepository>,
}

impl EngagementTracker {
    #[must_use]
    pub fn new(video_views: Arc<dyn VideoViewRepository>) -> Self {
        Self { video_views }
    }

    /// Validate a ping and add its seconds to the user's record.
    ///
    /// Invalid input yields a failed outcome and leaves storage untouched.
    ///
    /// # Errors
    ///
    /// Returns `TrackingServiceError::Storage` if the upsert fails.
    pub async fn record_view(
        &self,
        user_id: UserId,
        ping: &VideoTracking,
    ) -> Result<TrackOutcome, TrackingServiceError> {
        if let Err(err) = ping.validate() {
            warn!(user = %user_id, video_id = %ping.video_id, %err, "rejected tracking ping");
            return Ok(TrackOutcome::failed(err.to_string()));
        }

        let view = self
            .video_views
            .accumulate_view(
                user_id,
                &ping.video_id,
                ping.video_duration,
                ping.seconds_viewed,
            )
            .await?;
        debug!(
            user = %user_id,
            video_id = %view.video_id,
            seconds_viewed = view.seconds_viewed,
            "tracked video view"
        );
        Ok(TrackOutcome::ok())
    }

    /// # Errors
    ///
    /// Returns `TrackingServiceError::Storage` on repository failures.
    pub async fn view(
        &self,
        user_id: UserId,
        video_id: &str,
    ) -> Result<Option<UserVideoView>, TrackingServiceError> {
        Ok(self.video_views.get_view(user_id, video_id).await?)
    }

    /// Percent of the video the user has watched; 0 without a record.
    ///
    /// # Errors
    ///
    /// Returns `TrackingServiceError::Storage` on repository failures.
    pub async fn percent_viewed(
        &self,
        user_id: UserId,
        video_id: &str,
    ) -> Result<f64, TrackingServiceError> {
        Ok(self
            .view(user_id, video_id)
            .await?
            .map_or(0.0, |v| v.percent_viewed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::InMemoryRepository;

    fn ping(video_id: &str, duration: i64, seconds: i64) -> VideoTracking {
        VideoTracking {
            video_id: video_id.into(),
            video_duration: duration,
            seconds_viewed: seconds,
        }
    }

    fn tracker() -> EngagementTracker {
        EngagementTracker::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn repeated_pings_add_up_and_keep_latest_duration() {
        let tracker = tracker();
        let user = UserId::new(1);
        tracker.record_view(user, &ping("abc", 200, 30)).await.unwrap();
        let outcome = tracker.record_view(user, &ping("abc", 150, 45)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::ok());

        let view = tracker.view(user, "abc").await.unwrap().unwrap();
        assert_eq!(view.seconds_viewed, 75);
        assert_eq!(view.video_duration, 150);
        assert!((tracker.percent_viewed(user, "abc").await.unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_video_id_is_rejected_without_a_record() {
        let tracker = tracker();
        let outcome = tracker
            .record_view(UserId::new(1), &ping("", 100, 10))
            .await
            .unwrap();
        assert_eq!(outcome, TrackOutcome::failed("Invalid video id"));
        assert!(tracker.view(UserId::new(1), "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let tracker = tracker();
        let outcome = tracker
            .record_view(UserId::new(1), &ping("abc", 0, 10))
            .await
            .unwrap();
        assert_eq!(outcome.msg.as_deref(), Some("Invalid video duration"));
        assert!(!outcome.success);
        assert!(tracker.view(UserId::new(1), "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn negative_seconds_are_rejected_and_total_is_kept() {
        let tracker = tracker();
        let user = UserId::new(1);
        tracker.record_view(user, &ping("v", 100, 50)).await.unwrap();
        let outcome = tracker.record_view(user, &ping("v", 100, -80)).await.unwrap();
        assert_eq!(outcome, TrackOutcome::failed("Invalid seconds viewed"));

        let view = tracker.view(user, "v").await.unwrap().unwrap();
        assert_eq!(view.seconds_viewed, 50);
    }

    #[tokio::test]
    async fn unseen_video_is_zero_percent() {
        let tracker = tracker();
        let pct = tracker.percent_viewed(UserId::new(3), "nope").await.unwrap();
        assert!(pct.abs() < f64::EPSILON);
    }

    #[test]
    fn outcome_omits_msg_on_success() {
        let json = serde_json::to_string(&TrackOutcome::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }
}
