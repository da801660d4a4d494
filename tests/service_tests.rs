//! End-to-end checks of the city store worker against a canned local HTTP
//! server, covering every operation's success and failure path.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use trip_log::cities::{self, CitiesState, CityService, NewCity, Position};
use trip_log::utilities::UiWaker;

use chrono::{TimeZone, Utc};

const LISBON: &str = r#"{"id":1,"cityName":"Lisbon","country":"Portugal","emoji":"🇵🇹","date":"2027-10-31T15:59:59.138Z","notes":"My favorite city so far!","position":{"lat":38.727881642324164,"lng":-9.140900099907554}}"#;
const BERLIN: &str = r#"{"id":2,"cityName":"Berlin","country":"Germany","emoji":"🇩🇪","date":"2027-02-12T09:24:11.863Z","notes":"Amazing 😃","position":{"lat":52.53586782505711,"lng":13.376933665713324}}"#;

type RouteKey = (String, String);

struct StoreFixture {
    base_url: String,
    routes: Arc<Mutex<HashMap<RouteKey, (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl StoreFixture {
    fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let routes: Arc<Mutex<HashMap<RouteKey, (u16, String)>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let requests: Arc<Mutex<Vec<(String, String, String)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let routes_clone = Arc::clone(&routes);
        let requests_clone = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(mut stream) => handle_connection(&mut stream, &routes_clone, &requests_clone),
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            routes,
            requests,
        }
    }

    fn set_response(&self, method: &str, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
    }

    fn requests_to(&self, method: &str, path: &str) -> Vec<(String, String, String)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p, _)| m == method && p == path)
            .cloned()
            .collect()
    }
}

fn handle_connection(
    stream: &mut TcpStream,
    routes: &Mutex<HashMap<RouteKey, (u16, String)>>,
    requests: &Mutex<Vec<(String, String, String)>>,
) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(clone) => clone,
        Err(_) => return,
    });

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body_bytes = vec![0u8; content_length];
    if content_length > 0 {
        let _ = reader.read_exact(&mut body_bytes);
    }
    let body = String::from_utf8_lossy(&body_bytes).to_string();

    requests
        .lock()
        .unwrap()
        .push((method.clone(), path.clone(), body));

    let (status, payload) = routes
        .lock()
        .unwrap()
        .get(&(method, path))
        .cloned()
        .unwrap_or((404, "{}".to_string()));

    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        payload.len(),
        payload
    );

    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn wait_until_settled(service: &CityService, from_version: u64) -> CitiesState {
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        let version = service.version.load(Ordering::Relaxed);
        if version > from_version {
            let snapshot = service.snapshot();
            if !snapshot.is_loading {
                return snapshot;
            }
        }

        if Instant::now() > deadline {
            panic!("timed out waiting for the city worker to settle");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn new_city_payload() -> NewCity {
    NewCity {
        city_name: "Baku".to_string(),
        country: "Azerbaijan".to_string(),
        emoji: "🇦🇿".to_string(),
        date: Utc.with_ymd_and_hms(2024, 7, 2, 12, 0, 0).unwrap(),
        notes: "Old town".to_string(),
        position: Position { lat: 40.41, lng: 49.86 },
    }
}

#[test]
fn load_all_replaces_the_collection() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{},{}]", LISBON, BERLIN));

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();

    let state = wait_until_settled(&service, before);
    assert_eq!(state.cities.len(), 2);
    assert_eq!(state.cities[0].city_name, "Lisbon");
    assert_eq!(state.cities[1].city_name, "Berlin");
    assert!(state.error.is_empty());
}

#[test]
fn failed_reload_keeps_the_old_collection() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{}]", LISBON));

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();
    wait_until_settled(&service, before);

    fixture.set_response("GET", "/cities", 500, "{}");
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();

    let state = wait_until_settled(&service, before);
    assert!(!state.error.is_empty());
    assert_eq!(state.cities.len(), 1);
    assert_eq!(state.cities[0].city_name, "Lisbon");
    assert!(!state.is_loading);
}

#[test]
fn get_city_fetches_once_and_short_circuits_after() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities/1", 200, LISBON);

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.get_city(1);

    let state = wait_until_settled(&service, before);
    assert_eq!(state.current_city.as_ref().map(|c| c.id), Some(1));

    // same id again: no request, no state transition
    let settled_version = service.version.load(Ordering::Relaxed);
    service.get_city(1);
    thread::sleep(Duration::from_millis(300));

    assert_eq!(service.version.load(Ordering::Relaxed), settled_version);
    assert_eq!(fixture.requests_to("GET", "/cities/1").len(), 1);
    assert_eq!(service.snapshot(), state);
}

#[test]
fn failed_get_city_reports_and_keeps_current() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities/1", 200, LISBON);
    fixture.set_response("GET", "/cities/9", 500, "{}");

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.get_city(1);
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.get_city(9);

    let state = wait_until_settled(&service, before);
    assert_eq!(state.error, "There was an error loading data...");
    assert_eq!(state.current_city.as_ref().map(|c| c.id), Some(1));
}

#[test]
fn create_appends_the_server_record_and_selects_it() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{}]", LISBON));
    fixture.set_response(
        "POST",
        "/cities/",
        201,
        r#"{"id":99,"cityName":"Baku","country":"Azerbaijan","emoji":"🇦🇿","date":"2024-07-02T12:00:00Z","notes":"Old town","position":{"lat":40.41,"lng":49.86}}"#,
    );

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.create_city(new_city_payload());

    let state = wait_until_settled(&service, before);
    assert_eq!(state.cities.len(), 2);
    assert_eq!(state.cities[1].id, 99);
    assert_eq!(state.current_city.as_ref().map(|c| c.id), Some(99));

    // the payload went out as camelCase JSON without an id
    let posts = fixture.requests_to("POST", "/cities/");
    assert_eq!(posts.len(), 1);
    assert!(posts[0].2.contains("\"cityName\":\"Baku\""));
    assert!(!posts[0].2.contains("\"id\""));
}

#[test]
fn failed_create_reports_and_changes_nothing() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{}]", LISBON));
    fixture.set_response("POST", "/cities/", 500, "{}");

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.create_city(new_city_payload());

    let state = wait_until_settled(&service, before);
    assert_eq!(state.error, "There was an error creating the city...");
    assert_eq!(state.cities.len(), 1);
    assert_eq!(state.current_city, None);
    assert!(!state.is_loading);
}

#[test]
fn delete_removes_the_record_and_clears_selection() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{},{}]", LISBON, BERLIN));
    fixture.set_response("GET", "/cities/1", 200, LISBON);
    fixture.set_response("DELETE", "/cities/1", 200, "{}");

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.get_city(1);
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.delete_city(1);

    let state = wait_until_settled(&service, before);
    assert_eq!(state.cities.len(), 1);
    assert_eq!(state.cities[0].id, 2);
    assert_eq!(state.current_city, None);
}

#[test]
fn failed_delete_keeps_the_stale_record() {
    let fixture = StoreFixture::spawn();
    fixture.set_response("GET", "/cities", 200, &format!("[{},{}]", LISBON, BERLIN));
    fixture.set_response("DELETE", "/cities/2", 500, "{}");

    let service = cities::start_city_service(fixture.base_url.clone(), UiWaker::disconnected());
    let before = service.version.load(Ordering::Relaxed);
    service.load_all();
    wait_until_settled(&service, before);

    let before = service.version.load(Ordering::Relaxed);
    service.delete_city(2);

    let state = wait_until_settled(&service, before);
    assert_eq!(state.error, "There was an error deleting the city...");
    assert_eq!(state.cities.len(), 2);
    assert!(!state.is_loading);
}
