use std::{
    error::Error,
    sync::{Arc, RwLock, atomic::{AtomicU64, Ordering}},
    thread,
};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::utilities::UiWaker;

const APP_USER_AGENT: &str = "trip-log-desktop";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: u64,
    pub city_name: String,
    pub country: String,
    pub emoji: String,
    pub date: DateTime<Utc>,
    pub notes: String,
    pub position: Position,
}

/// Create payload; the store assigns the id and echoes the full record back.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewCity {
    pub city_name: String,
    pub country: String,
    pub emoji: String,
    pub date: DateTime<Utc>,
    pub notes: String,
    pub position: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitiesState {
    pub cities: Vec<City>,
    pub is_loading: bool,
    pub current_city: Option<City>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum CityAction {
    Loading,
    CitiesLoaded(Vec<City>),
    CityLoaded(City),
    CityCreated(City),
    CityDeleted(u64),
    Rejected(String),
}

/// Pure transition function. Every mutation of the shared state goes
/// through here; the match is exhaustive, so an unhandled action cannot
/// exist at runtime. The error field is deliberately left alone on the
/// success arms: it reports the last failure until the next one replaces it.
pub fn reduce(state: CitiesState, action: CityAction) -> CitiesState {
    match action {
        CityAction::Loading => CitiesState {
            is_loading: true,
            ..state
        },
        CityAction::CitiesLoaded(cities) => CitiesState {
            is_loading: false,
            cities,
            ..state
        },
        CityAction::CityLoaded(city) => CitiesState {
            is_loading: false,
            current_city: Some(city),
            ..state
        },
        CityAction::CityCreated(city) => {
            let mut cities = state.cities;
            cities.push(city.clone());
            CitiesState {
                is_loading: false,
                cities,
                current_city: Some(city),
                ..state
            }
        }
        CityAction::CityDeleted(id) => {
            let mut cities = state.cities;
            cities.retain(|city| city.id != id);
            CitiesState {
                is_loading: false,
                cities,
                current_city: None,
                ..state
            }
        }
        CityAction::Rejected(message) => CitiesState {
            is_loading: false,
            error: message,
            ..state
        },
    }
}

enum CityCommand {
    LoadAll,
    GetCity(u64),
    CreateCity(NewCity),
    DeleteCity(u64),
    Stop,
}

/// Owns the authoritative city collection. All store traffic runs on one
/// worker thread, so commands settle strictly in the order they were sent
/// and at most one request is ever in flight.
pub struct CityService {
    pub state: Arc<RwLock<CitiesState>>,
    pub version: Arc<AtomicU64>,
    tx: Sender<CityCommand>,
}

impl CityService {
    pub fn load_all(&self) {
        let _ = self.tx.send(CityCommand::LoadAll);
    }

    pub fn get_city(&self, id: u64) {
        let _ = self.tx.send(CityCommand::GetCity(id));
    }

    pub fn create_city(&self, new_city: NewCity) {
        let _ = self.tx.send(CityCommand::CreateCity(new_city));
    }

    pub fn delete_city(&self, id: u64) {
        let _ = self.tx.send(CityCommand::DeleteCity(id));
    }

    pub fn snapshot(&self) -> CitiesState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Drop for CityService {
    fn drop(&mut self) {
        let _ = self.tx.send(CityCommand::Stop);
    }
}

fn dispatch(
    state: &RwLock<CitiesState>,
    version: &AtomicU64,
    waker: &UiWaker,
    action: CityAction,
) {
    if let Ok(mut current) = state.write() {
        let next = reduce(current.clone(), action);
        *current = next;
    }
    version.fetch_add(1, Ordering::Relaxed);
    waker.wake();
}

fn fetch_cities(client: &Client, base_url: &str) -> Result<Vec<City>, Box<dyn Error>> {
    let resp = client
        .get(format!("{}/cities", base_url))
        .header(USER_AGENT, APP_USER_AGENT)
        .send()?
        .error_for_status()?;

    let bytes = resp.bytes()?;
    Ok(serde_json::from_slice::<Vec<City>>(&bytes)?)
}

fn fetch_city(client: &Client, base_url: &str, id: u64) -> Result<City, Box<dyn Error>> {
    let resp = client
        .get(format!("{}/cities/{}", base_url, id))
        .header(USER_AGENT, APP_USER_AGENT)
        .send()?
        .error_for_status()?;

    let bytes = resp.bytes()?;
    Ok(serde_json::from_slice::<City>(&bytes)?)
}

fn post_city(client: &Client, base_url: &str, new_city: &NewCity) -> Result<City, Box<dyn Error>> {
    let body = serde_json::to_string(new_city)?;

    let resp = client
        .post(format!("{}/cities/", base_url))
        .header(USER_AGENT, APP_USER_AGENT)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()?
        .error_for_status()?;

    let bytes = resp.bytes()?;
    Ok(serde_json::from_slice::<City>(&bytes)?)
}

fn delete_city_request(client: &Client, base_url: &str, id: u64) -> Result<(), Box<dyn Error>> {
    client
        .delete(format!("{}/cities/{}", base_url, id))
        .header(USER_AGENT, APP_USER_AGENT)
        .send()?
        .error_for_status()?;

    Ok(())
}

pub fn start_city_service(base_url: String, waker: UiWaker) -> CityService {
    let state = Arc::new(RwLock::new(CitiesState::default()));
    let state_clone = Arc::clone(&state);

    let version = Arc::new(AtomicU64::new(0));
    let version_clone = Arc::clone(&version);

    let (tx, rx): (Sender<CityCommand>, Receiver<CityCommand>) = channel();

    thread::spawn(move || {
        // no request timeout on purpose: a stalled store call keeps the
        // loading flag up until the server answers, matching the store
        // contract this app was written against
        let client = match Client::builder().timeout(None).build() {
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

            match command {
                CityCommand::LoadAll => {
                    dispatch(&state_clone, &version_clone, &waker, CityAction::Loading);

                    match fetch_cities(&client, &base_url) {
                        Ok(cities) => {
                            dispatch(&state_clone, &version_clone, &waker, CityAction::CitiesLoaded(cities));
                        }
                        Err(e) => {
                            eprintln!("City list fetch failed: {}", e);
                            dispatch(&state_clone, &version_clone, &waker, CityAction::Rejected(e.to_string()));
                        }
                    }
                }
                CityCommand::GetCity(id) => {
                    // re-selecting the already loaded city is a no-op, no
                    // request and no state transition at all
                    let already_current = state_clone
                        .read()
                        .map(|s| s.current_city.as_ref().map(|c| c.id) == Some(id))
                        .unwrap_or(false);

                    if already_current {
                        continue;
                    }

                    dispatch(&state_clone, &version_clone, &waker, CityAction::Loading);

                    match fetch_city(&client, &base_url, id) {
                        Ok(city) => {
                            dispatch(&state_clone, &version_clone, &waker, CityAction::CityLoaded(city));
                        }
                        Err(e) => {
                            eprintln!("City fetch failed: {}", e);
                            dispatch(
                                &state_clone,
                                &version_clone,
                                &waker,
                                CityAction::Rejected("There was an error loading data...".to_string()),
                            );
                        }
                    }
                }
                CityCommand::CreateCity(new_city) => {
                    dispatch(&state_clone, &version_clone, &waker, CityAction::Loading);

                    match post_city(&client, &base_url, &new_city) {
                        Ok(city) => {
                            dispatch(&state_clone, &version_clone, &waker, CityAction::CityCreated(city));
                        }
                        Err(e) => {
                            eprintln!("City create failed: {}", e);
                            dispatch(
                                &state_clone,
                                &version_clone,
                                &waker,
                                CityAction::Rejected("There was an error creating the city...".to_string()),
                            );
                        }
                    }
                }
                CityCommand::DeleteCity(id) => {
                    dispatch(&state_clone, &version_clone, &waker, CityAction::Loading);

                    match delete_city_request(&client, &base_url, id) {
                        Ok(()) => {
                            dispatch(&state_clone, &version_clone, &waker, CityAction::CityDeleted(id));
                        }
                        Err(e) => {
                            eprintln!("City delete failed: {}", e);
                            dispatch(
                                &state_clone,
                                &version_clone,
                                &waker,
                                CityAction::Rejected("There was an error deleting the city...".to_string()),
                            );
                        }
                    }
                }
                CityCommand::Stop => break,
            }
        }
    });

    CityService {
        state,
        version,
        tx,
    }
}
