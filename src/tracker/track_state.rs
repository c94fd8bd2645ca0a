use serde::{Deserialize, Serialize};

/// Track state enumeration for object tracking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackState {
    /// Newly created track, not yet confirmed
    #[default]
    Tentative,
    /// Actively tracked object
    Confirmed,
    /// Missed for a while, may still be recovered
    Lost,
    /// Terminal; removed on the next registry cleanup
    Deleted,
}

impl TrackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackState::Tentative => "TENTATIVE",
            TrackState::Confirmed => "CONFIRMED",
            TrackState::Lost => "LOST",
            TrackState::Deleted => "DELETED",
        }
    }

    /// Every state except `Deleted` takes part in prediction and matching.
    #[inline]
    pub fn is_live(&self) -> bool {
        !matches!(self, TrackState::Deleted)
    }
}

impl std::fmt::Display for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
