//! Weather report types and WMO code classification.

use serde::{Deserialize, Serialize};

/// Coarse condition for a WMO weather interpretation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    ClearSky,
    PartlyCloudy,
    Foggy,
    Rainy,
    Snow,
    Thunderstorm,
    Overcast,
}

impl WeatherCondition {
    pub fn from_wmo(code: i32) -> Self {
        match code {
            0 => WeatherCondition::ClearSky,
            1..=3 => WeatherCondition::PartlyCloudy,
            45..=48 => WeatherCondition::Foggy,
            51..=67 => WeatherCondition::Rainy,
            71..=77 => WeatherCondition::Snow,
            c if c >= 95 => WeatherCondition::Thunderstorm,
            _ => WeatherCondition::Overcast,
        }
    }

    /// Locale key for the condition label (`weather.rainy`, ...).
    pub fn label_key(&self) -> &'static str {
        match self {
            WeatherCondition::ClearSky => "weather.clear_sky",
            WeatherCondition::PartlyCloudy => "weather.partly_cloudy",
            WeatherCondition::Foggy => "weather.foggy",
            WeatherCondition::Rainy => "weather.rainy",
            WeatherCondition::Snow => "weather.snow",
            WeatherCondition::Thunderstorm => "weather.thunderstorm",
            WeatherCondition::Overcast => "weather.overcast",
        }
    }
}

/// Daily forecast as sent by the backend: parallel arrays keyed by index.
/// Open-Meteo leaves gaps as `null`, so every cell is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability_max: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub code: i32,
    pub max: f64,
    pub min: f64,
    pub rain_chance: Option<f64>,
}

impl DailyForecast {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_wmo(self.code)
    }
}

impl ForecastSeries {
    /// Zip the arrays into rows. Rows stop at the shortest required array;
    /// a row with a `null` code or temperature is skipped.
    pub fn days(&self) -> Vec<DailyForecast> {
        self.time
            .iter()
            .zip(&self.weather_code)
            .zip(self.temperature_2m_max.iter().zip(&self.temperature_2m_min))
            .enumerate()
            .filter_map(|(i, ((date, code), (max, min)))| {
                Some(DailyForecast {
                    date: date.clone(),
                    code: (*code)?,
                    max: (*max)?,
                    min: (*min)?,
                    rain_chance: self.precipitation_probability_max.get(i).copied().flatten(),
                })
            })
            .collect()
    }
}

/// Full `/api/weather` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub weather_code: i32,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub ai_advice: Option<String>,
    #[serde(default)]
    pub forecast: ForecastSeries,
}

impl WeatherReport {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_wmo(self.weather_code)
    }

    pub fn daily(&self) -> Vec<DailyForecast> {
        self.forecast.days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wmo_buckets() {
        assert_eq!(WeatherCondition::from_wmo(0), WeatherCondition::ClearSky);
        assert_eq!(WeatherCondition::from_wmo(2), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_wmo(45), WeatherCondition::Foggy);
        assert_eq!(WeatherCondition::from_wmo(61), WeatherCondition::Rainy);
        assert_eq!(WeatherCondition::from_wmo(75), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_wmo(96), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_wmo(80), WeatherCondition::Overcast);
        assert_eq!(WeatherCondition::from_wmo(4), WeatherCondition::Overcast);
    }

    #[test]
    fn forecast_rows_zip_parallel_arrays() {
        let report: WeatherReport = serde_json::from_str(
            r#"{
                "weather_code": 61, "temperature": 27.5, "humidity": 80, "wind_speed": 9.1,
                "ai_advice": "Delay irrigation.",
                "forecast": {
                    "time": ["2024-07-01", "2024-07-02", "2024-07-03"],
                    "weather_code": [61, 3, 0],
                    "temperature_2m_max": [30.1, 31.0, 33.2],
                    "temperature_2m_min": [24.0, 24.5],
                    "precipitation_probability_max": [90, null, 5]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(report.condition(), WeatherCondition::Rainy);
        let days = report.daily();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2024-07-01");
        assert_eq!(days[0].rain_chance, Some(90.0));
        assert_eq!(days[1].condition(), WeatherCondition::PartlyCloudy);
        assert_eq!(days[1].rain_chance, None);
    }

    #[test]
    fn null_forecast_cells_drop_only_their_row() {
        let report: WeatherReport = serde_json::from_str(
            r#"{
                "weather_code": 61, "temperature": null, "humidity": 80,
                "forecast": {
                    "time": ["2024-07-01", "2024-07-02", "2024-07-03"],
                    "weather_code": [61, null, 0],
                    "temperature_2m_max": [30.1, 31.0, null],
                    "temperature_2m_min": [24.0, 24.5, 25.0]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(report.weather_code, 61);
        assert_eq!(report.temperature, None);
        assert_eq!(report.humidity, Some(80.0));
        let days = report.daily();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, "2024-07-01");
        assert_eq!(days[0].max, 30.1);
    }
}
