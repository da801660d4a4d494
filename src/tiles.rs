use std::{
    collections::{HashMap, HashSet},
    error::Error,
    sync::{Arc, RwLock, atomic::{AtomicU64, Ordering}},
    thread,
    time::Duration,
};

use egui::ColorImage;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::utilities::UiWaker;

pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: u8 = 2;
pub const MAX_ZOOM: u8 = 19;

// Web Mercator cuts off near the poles
const LATITUDE_LIMIT: f64 = 85.05112878;

// past this the worker throws away every tile outside the active zoom level
const MAX_CACHED_TILES: usize = 512;

const TILE_USER_AGENT: &str = "trip-log-desktop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom
}

/// Full world width/height in pixels at the given zoom level.
pub fn world_size(zoom: u8) -> f64 {
    TILE_SIZE * tiles_per_axis(zoom) as f64
}

pub fn tile_url(pattern: &str, tile: TileId) -> String {
    pattern
        .replace("{z}", &tile.zoom.to_string())
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
}

/// Geographic coordinates to world pixels at a zoom level.
pub fn project(lat: f64, lng: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);
    let lat = lat.clamp(-LATITUDE_LIMIT, LATITUDE_LIMIT);
    let lat_rad = lat.to_radians();

    let x = (lng + 180.0) / 360.0 * size;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * size;

    (x, y)
}

/// World pixels back to (lat, lng). The x axis wraps around the antimeridian.
pub fn unproject(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);

    let x = x.rem_euclid(size);
    let y = y.clamp(0.0, size);

    let lng = x / size * 360.0 - 180.0;
    let lat = (std::f64::consts::PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();

    (lat, lng)
}

enum TileCommand {
    Request(Vec<TileId>),
    Stop,
}

/// Downloads and decodes map tiles off the UI thread. Decoded bitmaps are
/// published into the shared map; the UI uploads them as GPU textures when
/// the version counter moves.
pub struct TileService {
    pub tiles: Arc<RwLock<HashMap<TileId, ColorImage>>>,
    pub version: Arc<AtomicU64>,
    tx: Sender<TileCommand>,
}

impl TileService {
    pub fn request(&self, wanted: Vec<TileId>) {
        if !wanted.is_empty() {
            let _ = self.tx.send(TileCommand::Request(wanted));
        }
    }
}

impl Drop for TileService {
    fn drop(&mut self) {
        let _ = self.tx.send(TileCommand::Stop);
    }
}

fn fetch_tile_once(client: &Client, pattern: &str, tile: TileId) -> Result<ColorImage, Box<dyn Error>> {
    let resp = client
        .get(tile_url(pattern, tile))
        .header(USER_AGENT, TILE_USER_AGENT)
        .send()?
        .error_for_status()?;

    let bytes = resp.bytes()?;
    let decoded = image::load_from_memory(&bytes)?.to_rgba8();

    let size = [decoded.width() as usize, decoded.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, decoded.as_flat_samples().as_slice()))
}

pub fn start_tile_service(url_pattern: String, waker: UiWaker) -> TileService {
    let tiles: Arc<RwLock<HashMap<TileId, ColorImage>>> = Arc::new(RwLock::new(HashMap::new()));
    let tiles_clone = Arc::clone(&tiles);

    let version = Arc::new(AtomicU64::new(0));
    let version_clone = Arc::clone(&version);

    let (tx, rx): (Sender<TileCommand>, Receiver<TileCommand>) = channel();

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

        let mut failed: HashSet<TileId> = HashSet::new();

        loop {
            let command = match rx.recv() {
                Ok(c) => c,
                Err(_) => break,
            };

            let wanted = match command {
                TileCommand::Request(wanted) => wanted,
                TileCommand::Stop => break,
            };

            for tile in wanted {
                let cached = tiles_clone
                    .read()
                    .map(|t| t.contains_key(&tile))
                    .unwrap_or(false);

                if cached || failed.contains(&tile) {
                    continue;
                }

                match fetch_tile_once(&client, &url_pattern, tile) {
                    Ok(bitmap) => {
                        if let Ok(mut cache) = tiles_clone.write() {
                            cache.insert(tile, bitmap);

                            if cache.len() > MAX_CACHED_TILES {
                                cache.retain(|id, _| id.zoom == tile.zoom);
                            }
                        }

                        version_clone.fetch_add(1, Ordering::Relaxed);
                        waker.wake();
                    }
                    Err(e) => {
                        eprintln!("Tile {}/{}/{} fetch failed: {}", tile.zoom, tile.x, tile.y, e);
                        failed.insert(tile);
                    }
                }
            }
        }
    });

    TileService {
        tiles,
        version,
        tx,
    }
}
