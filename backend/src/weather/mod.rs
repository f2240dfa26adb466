pub mod service;

pub use service::{WeatherError, WeatherService};
