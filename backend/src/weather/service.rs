use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde_json::Value;
use shared::{CurrentWeather, ForecastDay, WeatherResponse};
use url::Url;

const OPENWEATHER_BASE: &str = "https://api.openweathermap.org/data/2.5/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const FORECAST_DAYS: usize = 3;

pub const DEFAULT_LAT: f64 = 40.7128;
pub const DEFAULT_LON: f64 = -74.0060;

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Weather API key is not configured")]
    NotConfigured,
    #[error("Weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid weather URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Weather API returned {0}")]
    Status(u16),
}

#[derive(Clone)]
pub struct WeatherService {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherService {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: OPENWEATHER_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Current conditions and a short forecast. Never fails: upstream
    /// problems produce the static sample with `error` set.
    pub async fn report(&self, lat: Option<f64>, lon: Option<f64>) -> WeatherResponse {
        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => (DEFAULT_LAT, DEFAULT_LON),
        };

        match self.fetch(lat, lon).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Weather API error: {}", e);
                fallback_report(Utc::now(), Some(e.to_string()))
            }
        }
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<WeatherResponse, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::NotConfigured)?;

        let current = self.get_json("weather", lat, lon, api_key).await?;
        let forecast = self.get_json("forecast", lat, lon, api_key).await?;

        Ok(WeatherResponse {
            current: parse_current(&current),
            forecast: parse_forecast(&forecast, Utc::now().date_naive()),
            error: None,
        })
    }

    async fn get_json(
        &self,
        endpoint: &str,
        lat: f64,
        lon: f64,
        api_key: &str,
    ) -> Result<Value, WeatherError> {
        let url = Url::parse(&self.base_url)?.join(endpoint)?;
        let url = Url::parse_with_params(
            url.as_str(),
            &[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("units", "metric".to_string()),
                ("appid", api_key.to_string()),
            ],
        )?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }
        Ok(response.json::<Value>().await?)
    }
}

fn first_description(value: &Value) -> String {
    value
        .get("weather")
        .and_then(|w| w.get(0))
        .and_then(|w| w.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn parse_current(json: &Value) -> CurrentWeather {
    let main = json.get("main");
    CurrentWeather {
        location: json
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string(),
        temp: main
            .and_then(|m| m.get("temp"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        description: first_description(json),
        humidity: main
            .and_then(|m| m.get("humidity"))
            .and_then(Value::as_f64)
            .map(|h| h as i64)
            .unwrap_or(0),
        wind_speed: json
            .get("wind")
            .and_then(|w| w.get("speed"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        visibility: json
            .get("visibility")
            .and_then(Value::as_f64)
            .map(|v| v as i64)
            .unwrap_or(0),
        rainfall: json
            .get("rain")
            .and_then(|r| r.get("1h"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    }
}

/// First entry of each of the next three days after `today` (UTC).
pub fn parse_forecast(json: &Value, today: NaiveDate) -> Vec<ForecastDay> {
    let mut forecast = Vec::new();
    let mut seen = HashSet::new();
    let items = json.get("list").and_then(Value::as_array);

    for item in items.into_iter().flatten() {
        let Some(dt) = item
            .get("dt_txt")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        else {
            continue;
        };
        let date = dt.date();
        if date <= today || !seen.insert(date) {
            continue;
        }
        forecast.push(ForecastDay {
            date: dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            temp: item
                .get("main")
                .and_then(|m| m.get("temp"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            description: first_description(item),
        });
        if forecast.len() == FORECAST_DAYS {
            break;
        }
    }
    forecast
}

pub fn fallback_report(now: DateTime<Utc>, error: Option<String>) -> WeatherResponse {
    let hour = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let day = |days: i64, temp: f64, description: &str| ForecastDay {
        date: (hour + chrono::Duration::days(days) + chrono::Duration::hours(9))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string(),
        temp,
        description: description.to_string(),
    };

    WeatherResponse {
        current: CurrentWeather {
            location: "Sample City".to_string(),
            temp: 29.0,
            description: "clear sky".to_string(),
            humidity: 60,
            wind_speed: 2.0,
            visibility: 10000,
            rainfall: 0.0,
        },
        forecast: vec![
            day(1, 28.0, "scattered clouds"),
            day(2, 27.0, "light rain"),
            day(3, 30.0, "clear sky"),
        ],
        error,
    }
}
