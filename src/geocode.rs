use std::{
    error::Error,
    sync::{Arc, RwLock, atomic::{AtomicU64, Ordering}},
    thread,
    time::Duration,
};

use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::utilities::UiWaker;

const GEOCODE_URL: &str = "https://api.bigdatacloud.net/data/reverse-geocode-client";

const NOT_A_CITY_MESSAGE: &str = "That doesn't seem to be a city. Click somewhere else 😉";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeocodeResponse {
    #[serde(default)]
    city: String,
    #[serde(default)]
    locality: String,
    #[serde(default)]
    country_name: String,
    #[serde(default)]
    country_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub city_name: String,
    pub country: String,
    pub emoji: String,
}

/// ISO 3166 alpha-2 code to the matching regional-indicator flag emoji.
pub fn country_code_emoji(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .filter_map(|c| char::from_u32(0x1F1E6 + (c.to_ascii_uppercase() as u32 - 'A' as u32)))
        .collect()
}

enum GeocodeCommand {
    Lookup(f64, f64),
    Stop,
}

/// Resolves clicked coordinates to a city/country/flag for prefilling the
/// creation form. Only the latest published result matters; the form keys
/// off the version counter.
pub struct GeocodeService {
    pub result: Arc<RwLock<Option<Result<GeocodeResult, String>>>>,
    pub version: Arc<AtomicU64>,
    tx: Sender<GeocodeCommand>,
}

impl GeocodeService {
    pub fn lookup(&self, lat: f64, lng: f64) {
        let _ = self.tx.send(GeocodeCommand::Lookup(lat, lng));
    }
}

impl Drop for GeocodeService {
    fn drop(&mut self) {
        let _ = self.tx.send(GeocodeCommand::Stop);
    }
}

fn fetch_geocode_once(client: &Client, lat: f64, lng: f64) -> Result<GeocodeResponse, Box<dyn Error>> {
    let url = format!(
        "{}?latitude={}&longitude={}&localityLanguage=en",
        GEOCODE_URL, lat, lng
    );

    let resp = client
        .get(&url)
        .header(USER_AGENT, "trip-log-desktop")
        .send()?
        .error_for_status()?;

    let bytes = resp.bytes()?;
    Ok(serde_json::from_slice::<GeocodeResponse>(&bytes)?)
}

fn into_result(response: GeocodeResponse) -> Result<GeocodeResult, String> {
    if response.country_code.is_empty() {
        return Err(NOT_A_CITY_MESSAGE.to_string());
    }

    let city_name = if !response.city.is_empty() {
        response.city
    } else {
        response.locality
    };

    Ok(GeocodeResult {
        city_name,
        country: response.country_name,
        emoji: country_code_emoji(&response.country_code),
    })
}

pub fn start_geocode_service(waker: UiWaker) -> GeocodeService {
    let result: Arc<RwLock<Option<Result<GeocodeResult, String>>>> = Arc::new(RwLock::new(None));
    let result_clone = Arc::clone(&result);

    let version = Arc::new(AtomicU64::new(0));
    let version_clone = Arc::clone(&version);

    let (tx, rx): (Sender<GeocodeCommand>, Receiver<GeocodeCommand>) = channel();

    thread::spawn(move || {
        let client = match Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to build HTTP client: {}", e);
                return;
            }
        };

        loop {
            let command = match rx.recv() {
                Ok(c) => c,
                Err(_) => break,
            };

            let (lat, lng) = match command {
                GeocodeCommand::Lookup(lat, lng) => (lat, lng),
                GeocodeCommand::Stop => break,
            };

            let outcome = match fetch_geocode_once(&client, lat, lng) {
                Ok(response) => into_result(response),
                Err(e) => {
                    eprintln!("Reverse geocode failed: {}", e);
                    Err(e.to_string())
                }
            };

            if let Ok(mut slot) = result_clone.write() {
                *slot = Some(outcome);
            }
            version_clone.fetch_add(1, Ordering::Relaxed);
            waker.wake();
        }
    });

    GeocodeService {
        result,
        version,
        tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_become_flags() {
        assert_eq!(country_code_emoji("PT"), "🇵🇹");
        assert_eq!(country_code_emoji("az"), "🇦🇿");
        assert_eq!(country_code_emoji(""), "");
        assert_eq!(country_code_emoji("U1S"), "🇺🇸");
    }

    #[test]
    fn city_falls_back_to_locality() {
        let response = GeocodeResponse {
            city: String::new(),
            locality: "Sintra".to_string(),
            country_name: "Portugal".to_string(),
            country_code: "PT".to_string(),
        };

        let result = into_result(response).unwrap();
        assert_eq!(result.city_name, "Sintra");
        assert_eq!(result.emoji, "🇵🇹");
    }

    #[test]
    fn open_water_is_not_a_city() {
        let response = GeocodeResponse {
            city: String::new(),
            locality: String::new(),
            country_name: String::new(),
            country_code: String::new(),
        };

        assert_eq!(into_result(response), Err(NOT_A_CITY_MESSAGE.to_string()));
    }
}
