use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackingError {
    #[error("Invalid video id")]
    InvalidVideoId,
    #[error("Invalid video duration")]
    InvalidDuration,
    #[error("Invalid seconds viewed")]
    InvalidSecondsViewed,
}

/// A playback progress ping from the video player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTracking {
    pub video_id: String,
    pub video_duration: i64,
    pub seconds_viewed: i64,
}

impl VideoTracking {
    /// Checks the ping before anything is persisted.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidVideoId` for an empty id and
    /// `TrackingError::InvalidDuration` for a duration below one second, and
    /// `TrackingError::InvalidSecondsViewed` for a negative viewing delta.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.video_id.is_empty() {
            return Err(TrackingError::InvalidVideoId);
        }
        if self.video_duration < 1 {
            return Err(TrackingError::InvalidDuration);
        }
        if self.seconds_viewed < 0 {
            return Err(TrackingError::InvalidSecondsViewed);
        }
        Ok(())
    }
}

/// Cumulative viewing record for one user and one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVideoView {
    pub user_id: UserId,
    pub video_id: String,
    pub video_duration: i64,
    pub seconds_viewed: i64,
}

impl UserVideoView {
    #[must_use]
    pub fn empty(user_id: UserId, video_id: impl Into<String>) -> Self {
        Self {
            user_id,
            video_id: video_id.into(),
            video_duration: 0,
            seconds_viewed: 0,
        }
    }

    /// Apply a tracking ping: the latest duration wins, viewed seconds add up.
    /// The total never decreases and saturates at `i64::MAX`.
    pub fn accumulate(&mut self, video_duration: i64, seconds_viewed: i64) {
        self.video_duration = video_duration;
        self.seconds_viewed = self.seconds_viewed.saturating_add(seconds_viewed.max(0));
    }

    /// Share of the video watched, in percent. Can exceed 100 on rewatches.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_viewed(&self) -> f64 {
        if self.video_duration <= 0 {
            return 0.0;
        }
        self.seconds_viewed as f64 / self.video_duration as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(id: &str, duration: i64, viewed: i64) -> VideoTracking {
        VideoTracking {
            video_id: id.into(),
            video_duration: duration,
            seconds_viewed: viewed,
        }
    }

    #[test]
    fn validation_rejects_empty_id_and_short_duration() {
        assert_eq!(ping("", 10, 1).validate(), Err(TrackingError::InvalidVideoId));
        assert_eq!(ping("v", 0, 1).validate(), Err(TrackingError::InvalidDuration));
        assert_eq!(ping("v", -3, 1).validate(), Err(TrackingError::InvalidDuration));
        assert_eq!(
            ping("v", 10, -1).validate(),
            Err(TrackingError::InvalidSecondsViewed)
        );
        assert!(ping("v", 1, 0).validate().is_ok());
    }

    #[test]
    fn accumulate_adds_seconds_and_overwrites_duration() {
        let mut view = UserVideoView::empty(UserId::new(1), "v");
        view.accumulate(100, 30);
        view.accumulate(120, 45);
        assert_eq!(view.seconds_viewed, 75);
        assert_eq!(view.video_duration, 120);
    }

    #[test]
    fn accumulate_never_decreases_or_overflows() {
        let mut view = UserVideoView::empty(UserId::new(1), "v");
        view.accumulate(100, 50);
        view.accumulate(100, -80);
        assert_eq!(view.seconds_viewed, 50);

        view.accumulate(100, i64::MAX);
        view.accumulate(100, i64::MAX);
        assert_eq!(view.seconds_viewed, i64::MAX);
    }

    #[test]
    fn percent_viewed_is_a_ratio() {
        let mut view = UserVideoView::empty(UserId::new(1), "v");
        view.accumulate(200, 50);
        assert!((view.percent_viewed() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_viewed_guards_zero_duration() {
        let view = UserVideoView::empty(UserId::new(1), "v");
        assert_eq!(view.percent_viewed(), 0.0);
    }

    #[test]
    fn error_messages_match_the_player_contract() {
        assert_eq!(TrackingError::InvalidVideoId.to_string(), "Invalid video id");
        assert_eq!(
            TrackingError::InvalidDuration.to_string(),
            "Invalid video duration"
        );
    }
}
