// weather.rs - Weather Lookup Command Module
// This module implements the ^weather command group. A bare ^weather reads the
// invoker's saved coordinates, reverse-geocodes them to a named place and
// shows the current conditions there; ^weather <location> geocodes free-form
// text instead, and ^weather set <location> stores the invoker's coordinates
// for later bare lookups.
//
// Key Features:
// - Shared pooled HTTP client, initialized once
// - OpenStreetMap-style geocoder (search + reverse) with env-overridable base URL
// - Open-Meteo-style current weather endpoint, metric units
// - Saved locations held in the shared client context, keyed by user id
//
// Used by: main.rs (command registration and location map setup)

use serenity::{
    client::Context,
    framework::standard::{macros::command, macros::group, Args, CommandResult},
    model::channel::Message,
    model::id::UserId,
    prelude::TypeMapKey,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use log::{info, warn};

use crate::commands::gate::parse_user_mention;

const GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const FORECAST_BASE_URL: &str = "https://api.open-meteo.com";

/// Saved coordinates for one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Shared-context key for the per-user saved locations.
pub struct UserLocationMap;

impl TypeMapKey for UserLocationMap {
    type Value = HashMap<UserId, SavedLocation>;
}

/// Error types for weather lookups
#[derive(Debug)]
pub enum WeatherError {
    Http(reqwest::Error),
    Parse(String),
    PlaceNotFound(String),
    LocationNotSet,
    ReverseLookupFailed,
}

impl fmt::Display for WeatherError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WeatherError::Http(e) => write!(f, "Weather service request failed: {}", e),
            WeatherError::Parse(msg) => {
                write!(f, "Weather service returned unexpected data: {}", msg)
            }
            WeatherError::PlaceNotFound(location) => {
                write!(f, "I could not find {}! Try another location.", location)
            }
            WeatherError::LocationNotSet => {
                write!(f, "Location is not set yet! Please set the location first!")
            }
            WeatherError::ReverseLookupFailed => {
                write!(f, "I could not find the set location! Try setting another location.")
            }
        }
    }
}

impl Error for WeatherError {}

impl From<reqwest::Error> for WeatherError {
    fn from(error: reqwest::Error) -> Self {
        WeatherError::Http(error)
    }
}

// Global HTTP client for connection pooling and reuse
static HTTP_CLIENT: OnceCell<reqwest::Client> = OnceCell::const_new();

async fn get_http_client() -> &'static reqwest::Client {
    HTTP_CLIENT
        .get_or_init(|| async {
            info!("[WEATHER] Initializing shared HTTP client");
            reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .connect_timeout(Duration::from_secs(5))
                .pool_idle_timeout(Duration::from_secs(90))
                // The geocoder rejects requests without an identifying agent.
                .user_agent("general_bot_rust/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new())
        })
        .await
}

fn geocoder_base_url() -> String {
    env::var("GEOCODER_BASE_URL").unwrap_or_else(|_| GEOCODER_BASE_URL.to_string())
}

fn forecast_base_url() -> String {
    env::var("FORECAST_BASE_URL").unwrap_or_else(|_| FORECAST_BASE_URL.to_string())
}

/// One resolved place.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

/// Geocoder rows carry coordinates as strings.
#[derive(Debug, Clone, Deserialize)]
struct GeocodeRow {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
    error: Option<String>,
}

fn place_from_row(row: GeocodeRow) -> Result<Place, WeatherError> {
    let latitude = row
        .lat
        .parse::<f64>()
        .map_err(|_| WeatherError::Parse(format!("bad latitude {}", row.lat)))?;
    let longitude = row
        .lon
        .parse::<f64>()
        .map_err(|_| WeatherError::Parse(format!("bad longitude {}", row.lon)))?;
    Ok(Place {
        latitude,
        longitude,
        display_name: row.display_name,
    })
}

fn place_from_reverse(response: ReverseResponse) -> Result<Option<Place>, WeatherError> {
    if response.error.is_some() {
        return Ok(None);
    }
    match (response.display_name, response.lat, response.lon) {
        (Some(display_name), Some(lat), Some(lon)) => place_from_row(GeocodeRow {
            lat,
            lon,
            display_name,
        })
        .map(Some),
        _ => Ok(None),
    }
}

/// Resolves free-form text to the best matching place, None when the geocoder
/// has no result for it.
pub async fn geocode(location: &str) -> Result<Option<Place>, WeatherError> {
    let client = get_http_client().await;
    let url = format!("{}/search", geocoder_base_url());
    let rows: Vec<GeocodeRow> = client
        .get(&url)
        .query(&[("q", location), ("format", "json"), ("limit", "1")])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    match rows.into_iter().next() {
        Some(row) => place_from_row(row).map(Some),
        None => Ok(None),
    }
}

/// Resolves coordinates back to a named place, None when the geocoder cannot
/// name them (open ocean, bad coordinates).
pub async fn reverse_geocode(latitude: f64, longitude: f64) -> Result<Option<Place>, WeatherError> {
    let client = get_http_client().await;
    let url = format!("{}/reverse", geocoder_base_url());
    let response: ReverseResponse = client
        .get(&url)
        .query(&[
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("format", "json".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    place_from_reverse(response)
}

/// Current conditions block as the forecast service reports it, metric units.
/// The wind direction is degrees clockwise from north; older service
/// responses may omit it.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub temperature: f64,
    pub windspeed: f64,
    pub winddirection: Option<f64>,
    pub weathercode: u8,
    pub time: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
}

pub async fn current_weather(latitude: f64, longitude: f64) -> Result<CurrentWeather, WeatherError> {
    let client = get_http_client().await;
    let url = format!("{}/v1/forecast", forecast_base_url());
    let response: ForecastResponse = client
        .get(&url)
        .query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current_weather", "true".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    response
        .current_weather
        .ok_or_else(|| WeatherError::Parse("no current weather block in response".to_string()))
}

/// Plain-language name for the standard weather interpretation codes.
pub fn weather_description(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snowfall",
        77 => "Snow grains",
        80 | 81 | 82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown conditions",
    }
}

/// The forecast service reports observation times as local ISO minutes.
/// Unparseable values pass through untouched.
fn format_observation_time(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        Ok(time) => time.format("%H:%M local time, %B %-d").to_string(),
        Err(_) => raw.to_string(),
    }
}

fn weather_emoji(code: u8) -> &'static str {
    match code {
        0 => "☀️",
        1 | 2 => "⛅",
        3 => "☁️",
        45 | 48 => "🌫️",
        51..=67 | 80..=82 => "🌧️",
        71..=77 | 85 | 86 => "❄️",
        95..=99 => "⛈️",
        _ => "🌡️",
    }
}

/// Nearest 16-point compass label for a wind direction in degrees.
fn wind_direction_label(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let index = (degrees.rem_euclid(360.0) / 22.5).round() as usize % 16;
    POINTS[index]
}

/// Wind field text: speed, plus the compass point when the service reports a
/// direction.
fn format_wind(weather: &CurrentWeather) -> String {
    match weather.winddirection {
        Some(degrees) => format!(
            "{:.1} km/h {}",
            weather.windspeed,
            wind_direction_label(degrees)
        ),
        None => format!("{:.1} km/h", weather.windspeed),
    }
}

/// Looks up the saved coordinates for `user`, names them and fetches the
/// conditions there. The forecast runs at the geocoder's snapped coordinates.
async fn saved_location_weather(
    ctx: &Context,
    user: UserId,
) -> Result<(Place, CurrentWeather), WeatherError> {
    let saved = {
        let data = ctx.data.read().await;
        data.get::<UserLocationMap>()
            .and_then(|map| map.get(&user).copied())
    };
    let saved = saved.ok_or(WeatherError::LocationNotSet)?;

    let place = reverse_geocode(saved.latitude, saved.longitude)
        .await?
        .ok_or(WeatherError::ReverseLookupFailed)?;
    let weather = current_weather(place.latitude, place.longitude).await?;
    Ok((place, weather))
}

async fn named_location_weather(location: &str) -> Result<(Place, CurrentWeather), WeatherError> {
    let place = geocode(location)
        .await?
        .ok_or_else(|| WeatherError::PlaceNotFound(location.to_string()))?;
    let weather = current_weather(place.latitude, place.longitude).await?;
    Ok((place, weather))
}

async fn send_weather_embed(
    ctx: &Context,
    msg: &Message,
    place: &Place,
    weather: &CurrentWeather,
) -> serenity::Result<()> {
    msg.channel_id
        .send_message(&ctx.http, |message| {
            message.embed(|embed| {
                embed
                    .title(format!(
                        "{} Weather for {}",
                        weather_emoji(weather.weathercode),
                        place.display_name
                    ))
                    .field("Conditions", weather_description(weather.weathercode), true)
                    .field("Temperature", format!("{:.1} °C", weather.temperature), true)
                    .field("Wind", format_wind(weather), true)
                    .footer(|footer| {
                        footer.text(format!("Observed at {}", format_observation_time(&weather.time)))
                    })
                    .colour(0x3498db)
            })
        })
        .await?;
    Ok(())
}

#[command]
/// ^weather - Current weather at your saved location
/// ^weather @user - Current weather at another user's saved location
/// ^weather <location> - Current weather anywhere (i.e. Los Angeles)
pub async fn weather(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let _typing = ctx.http.start_typing(msg.channel_id.0)?;

    let query = args.message().trim().to_string();
    info!(
        "[WEATHER] Lookup by {} ({}): '{}'",
        msg.author.name, msg.author.id, query
    );

    let (place, weather) = if query.is_empty() {
        saved_location_weather(ctx, msg.author.id).await?
    } else if let Some(target) = parse_user_mention(&query) {
        saved_location_weather(ctx, target).await?
    } else {
        // A bare number is a place query (postal code), not a user id.
        named_location_weather(&query).await?
    };

    send_weather_embed(ctx, msg, &place, &weather).await?;
    Ok(())
}

#[command]
/// ^weather set <location> - Save your location for bare ^weather lookups
pub async fn set(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let _typing = ctx.http.start_typing(msg.channel_id.0)?;

    let location = args.message().trim().to_string();
    if location.is_empty() {
        msg.reply(ctx, "Please provide a location! Usage: `weather set <location>`")
            .await?;
        return Ok(());
    }

    let place = geocode(&location)
        .await?
        .ok_or_else(|| WeatherError::PlaceNotFound(location.clone()))?;

    {
        let mut data = ctx.data.write().await;
        match data.get_mut::<UserLocationMap>() {
            Some(map) => {
                map.insert(
                    msg.author.id,
                    SavedLocation {
                        latitude: place.latitude,
                        longitude: place.longitude,
                    },
                );
            }
            None => warn!("[WEATHER] Location map missing from shared context"),
        }
    }
    info!(
        "[WEATHER] {} ({}) saved location {}",
        msg.author.name, msg.author.id, place.display_name
    );

    msg.reply(
        ctx,
        format!("Successfully set your location to **{}**!", place.display_name),
    )
    .await?;
    Ok(())
}

#[group]
#[prefix = "weather"]
#[default_command(weather)]
#[commands(weather, set)]
pub struct Weather;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocoder_rows_parse_string_coordinates() {
        let row: GeocodeRow = serde_json::from_str(
            r#"{"lat": "52.5108850", "lon": "13.3989367", "display_name": "Berlin, Deutschland"}"#,
        )
        .unwrap();
        let place = place_from_row(row).unwrap();
        assert!((place.latitude - 52.510885).abs() < 1e-6);
        assert!((place.longitude - 13.3989367).abs() < 1e-6);
        assert_eq!(place.display_name, "Berlin, Deutschland");
    }

    #[test]
    fn garbage_coordinates_are_a_parse_error() {
        let row = GeocodeRow {
            lat: "north-ish".to_string(),
            lon: "13.4".to_string(),
            display_name: "Nowhere".to_string(),
        };
        assert!(matches!(place_from_row(row), Err(WeatherError::Parse(_))));
    }

    #[test]
    fn reverse_lookup_error_body_means_no_place() {
        let response: ReverseResponse =
            serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert_eq!(place_from_reverse(response).unwrap(), None);
    }

    #[test]
    fn reverse_lookup_full_body_yields_the_place() {
        let response: ReverseResponse = serde_json::from_str(
            r#"{"lat": "34.05", "lon": "-118.24", "display_name": "Los Angeles, California"}"#,
        )
        .unwrap();
        let place = place_from_reverse(response).unwrap().unwrap();
        assert_eq!(place.display_name, "Los Angeles, California");
        assert!((place.longitude + 118.24).abs() < 1e-9);
    }

    #[test]
    fn forecast_body_parses_the_current_weather_block() {
        let response: ForecastResponse = serde_json::from_str(
            r#"{
                "latitude": 52.52,
                "longitude": 13.42,
                "current_weather": {
                    "temperature": 13.2,
                    "windspeed": 11.1,
                    "winddirection": 121.0,
                    "weathercode": 3,
                    "time": "2024-05-01T12:00"
                }
            }"#,
        )
        .unwrap();
        let weather = response.current_weather.unwrap();
        assert!((weather.temperature - 13.2).abs() < 1e-9);
        assert_eq!(weather.winddirection, Some(121.0));
        assert_eq!(weather.weathercode, 3);
        assert_eq!(weather.time, "2024-05-01T12:00");
    }

    #[test]
    fn forecast_body_without_current_block_is_detected() {
        let response: ForecastResponse =
            serde_json::from_str(r#"{"latitude": 1.0, "longitude": 2.0}"#).unwrap();
        assert!(response.current_weather.is_none());
    }

    #[test]
    fn forecast_without_a_wind_direction_still_parses() {
        let response: ForecastResponse = serde_json::from_str(
            r#"{"current_weather": {"temperature": 1.5, "windspeed": 4.0, "weathercode": 0, "time": "2024-01-01T06:00"}}"#,
        )
        .unwrap();
        let weather = response.current_weather.unwrap();
        assert_eq!(weather.winddirection, None);
    }

    #[test]
    fn wind_directions_round_to_compass_points() {
        assert_eq!(wind_direction_label(0.0), "N");
        assert_eq!(wind_direction_label(90.0), "E");
        assert_eq!(wind_direction_label(121.0), "ESE");
        assert_eq!(wind_direction_label(225.0), "SW");
        assert_eq!(wind_direction_label(355.0), "N");
    }

    #[test]
    fn wind_text_carries_the_direction_only_when_reported() {
        let mut weather = CurrentWeather {
            temperature: 13.2,
            windspeed: 11.1,
            winddirection: Some(121.0),
            weathercode: 3,
            time: "2024-05-01T12:00".to_string(),
        };
        assert_eq!(format_wind(&weather), "11.1 km/h ESE");
        weather.winddirection = None;
        assert_eq!(format_wind(&weather), "11.1 km/h");
    }

    #[test]
    fn numeric_queries_are_place_lookups_not_user_targets() {
        // "^weather 90210" must geocode the postal code; only a mention-shaped
        // argument reads another user's saved location.
        assert_eq!(parse_user_mention("90210"), None);
        assert_eq!(parse_user_mention("<@90210>"), Some(UserId(90210)));
        assert_eq!(parse_user_mention("<@!90210>"), Some(UserId(90210)));
    }

    #[test]
    fn observation_times_render_for_the_footer() {
        assert_eq!(
            format_observation_time("2024-05-01T12:00"),
            "12:00 local time, May 1"
        );
        assert_eq!(format_observation_time("whenever"), "whenever");
    }

    #[test]
    fn weather_codes_map_to_descriptions() {
        assert_eq!(weather_description(0), "Clear sky");
        assert_eq!(weather_description(3), "Overcast");
        assert_eq!(weather_description(63), "Rain");
        assert_eq!(weather_description(95), "Thunderstorm");
        assert_eq!(weather_description(42), "Unknown conditions");
    }

    #[test]
    fn error_text_matches_the_user_facing_wording() {
        assert_eq!(
            WeatherError::LocationNotSet.to_string(),
            "Location is not set yet! Please set the location first!"
        );
        assert_eq!(
            WeatherError::ReverseLookupFailed.to_string(),
            "I could not find the set location! Try setting another location."
        );
        assert_eq!(
            WeatherError::PlaceNotFound("Atlantis".to_string()).to_string(),
            "I could not find Atlantis! Try another location."
        );
    }
}
