use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub username: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Result of a single upload run through the classifier.
///
/// `confidence` is a percentage in `[0, 100]` rounded to two decimals.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: String,
    pub confidence: f32,
    pub crop_type: String,
    pub is_healthy: bool,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
}

impl FailureResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum HealthStatus {
    Healthy,
    Diseased,
}

impl From<bool> for HealthStatus {
    fn from(is_healthy: bool) -> Self {
        if is_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Diseased
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HistoryEntry {
    pub id: String,
    pub image: String,
    pub prediction: String,
    /// Fraction in `[0, 1]`.
    pub confidence: f32,
    pub is_healthy: bool,
    pub status: HealthStatus,
    pub crop_type: String,
    pub date: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PredictionStats {
    pub total: u64,
    pub healthy: u64,
    pub diseased: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DashboardResponse {
    pub username: String,
    pub stats: PredictionStats,
    pub recent_predictions: Vec<HistoryEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CropHealth {
    pub crop_type: String,
    pub total: u64,
    pub healthy: u64,
    pub diseased: u64,
    pub health_percentage: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CurrentWeather {
    pub location: String,
    pub temp: f64,
    pub description: String,
    pub humidity: i64,
    pub wind_speed: f64,
    pub visibility: i64,
    pub rainfall: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ForecastDay {
    pub date: String,
    pub temp: f64,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WeatherResponse {
    pub current: CurrentWeather,
    pub forecast: Vec<ForecastDay>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn health_status_follows_flag() {
        assert_eq!(HealthStatus::from(true).to_string(), "Healthy");
        assert_eq!(HealthStatus::from(false).to_string(), "Diseased");
        assert_eq!(HealthStatus::from_str("Diseased").unwrap(), HealthStatus::Diseased);
    }

    #[test]
    fn predict_response_omits_missing_warning() {
        let response = PredictResponse {
            success: true,
            prediction: "Rice plant Diseases".into(),
            confidence: 87.5,
            crop_type: "Rice".into(),
            is_healthy: false,
            image_url: "/static/uploads/a.jpg".into(),
            warning: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("warning").is_none());
        assert_eq!(json["crop_type"], "Rice");
    }
}
