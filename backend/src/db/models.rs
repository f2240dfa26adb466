use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{HealthStatus, HistoryEntry, UserInfo};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UserAccount> for UserInfo {
    fn from(user: &UserAccount) -> Self {
        Self {
            username: user.username.clone(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Fields supplied by the caller when appending a prediction.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub owner: String,
    pub image_ref: String,
    pub label: String,
    pub confidence: f32,
    pub is_healthy: bool,
    pub crop_type: String,
}

/// One stored prediction. Records are append-only and never modified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub owner: String,
    pub image_ref: String,
    pub label: String,
    pub confidence: f32,
    pub is_healthy: bool,
    pub crop_type: String,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_new(new: NewPrediction, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: new.owner,
            image_ref: new.image_ref,
            label: new.label,
            confidence: new.confidence,
            is_healthy: new.is_healthy,
            crop_type: new.crop_type,
            created_at,
        }
    }

    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.id.to_string(),
            image: self.image_ref.replace('\\', "/"),
            prediction: self.label.clone(),
            confidence: self.confidence,
            is_healthy: self.is_healthy,
            status: HealthStatus::from(self.is_healthy),
            crop_type: self.crop_type.clone(),
            date: self.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}
