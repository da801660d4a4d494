use std::collections::HashMap;
use std::sync::atomic::Ordering;

use egui::{
    self, Align2, Color32, CornerRadius, FontId, Pos2, Rect, Sense, Stroke, TextStyle,
    TextureHandle, TextureOptions, Ui, Vec2, pos2, vec2,
};

use crate::cities::City;
use crate::routes::MapQuery;
use crate::tiles::{self, MAX_ZOOM, MIN_ZOOM, TILE_SIZE, TileId, TileService};

pub const DEFAULT_CENTER: (f64, f64) = (40.0, 0.0);
pub const DEFAULT_ZOOM: u8 = 6;

const MARKER_COLOR: Color32 = Color32::from_rgb(0, 196, 106);

// one zoom step per this much accumulated scroll
const SCROLL_STEP: f32 = 40.0;

pub fn resolve_center(query: Option<MapQuery>) -> (f64, f64) {
    match query {
        Some(q) => (q.lat, q.lng),
        None => DEFAULT_CENTER,
    }
}

pub enum MapEvent {
    /// Click on empty map surface; leads to the creation form.
    ClickedAt { lat: f64, lng: f64 },
    /// Click on an existing marker; leads to that city's detail view.
    SelectedCity { id: u64, query: MapQuery },
}

pub struct MapView {
    center: (f64, f64),
    zoom: u8,
    last_query: Option<MapQuery>,
    tile_textures: HashMap<TileId, TextureHandle>,
    last_tile_version: u64,
    scroll_accum: f32,
}

impl MapView {
    pub fn new() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            last_query: None,
            tile_textures: HashMap::new(),
            last_tile_version: 0,
            scroll_accum: 0.0,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Recenters only when the resolved query pair actually changes, so a
    /// map the user panned away stays put across unrelated re-renders.
    pub fn sync_with_query(&mut self, query: Option<MapQuery>) {
        if query != self.last_query {
            if let Some(q) = query {
                self.center = (q.lat, q.lng);
            }
            self.last_query = query;
        }
    }

    pub fn ui(&mut self, ui: &mut Ui, cities: &[City], tile_service: &TileService) -> Option<MapEvent> {
        let desired = ui.available_size();
        let (rect, response) = ui.allocate_exact_size(desired, Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        // ---------------- ZOOM ----------------
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);

            if scroll != 0.0 {
                self.scroll_accum += scroll;

                while self.scroll_accum >= SCROLL_STEP {
                    self.scroll_accum -= SCROLL_STEP;
                    self.step_zoom(1, response.hover_pos(), rect);
                }
                while self.scroll_accum <= -SCROLL_STEP {
                    self.scroll_accum += SCROLL_STEP;
                    self.step_zoom(-1, response.hover_pos(), rect);
                }
            }
        }

        // ---------------- PAN ----------------
        if response.dragged_by(egui::PointerButton::Primary) {
            let delta = response.drag_delta();
            let (cx, cy) = tiles::project(self.center.0, self.center.1, self.zoom);
            let size = tiles::world_size(self.zoom);

            self.center = tiles::unproject(
                cx - delta.x as f64,
                (cy - delta.y as f64).clamp(0.0, size),
                self.zoom,
            );
        }

        // ---------------- TILES ----------------
        self.upload_new_tiles(ui.ctx(), tile_service);

        let (cx, cy) = tiles::project(self.center.0, self.center.1, self.zoom);
        let top_left_x = cx - rect.width() as f64 / 2.0;
        let top_left_y = cy - rect.height() as f64 / 2.0;

        let per_axis = tiles::tiles_per_axis(self.zoom) as i64;
        let first_tile_x = (top_left_x / TILE_SIZE).floor() as i64;
        let first_tile_y = (top_left_y / TILE_SIZE).floor() as i64;
        let tiles_wide = (rect.width() as f64 / TILE_SIZE).ceil() as i64 + 1;
        let tiles_high = (rect.height() as f64 / TILE_SIZE).ceil() as i64 + 1;

        let full_uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
        let mut missing: Vec<TileId> = vec![];

        for grid_x in first_tile_x..first_tile_x + tiles_wide {
            for grid_y in first_tile_y..first_tile_y + tiles_high {
                if grid_y < 0 || grid_y >= per_axis {
                    continue;
                }

                let id = TileId {
                    zoom: self.zoom,
                    x: grid_x.rem_euclid(per_axis) as u32,
                    y: grid_y as u32,
                };

                let tile_min = pos2(
                    rect.min.x + (grid_x as f64 * TILE_SIZE - top_left_x) as f32,
                    rect.min.y + (grid_y as f64 * TILE_SIZE - top_left_y) as f32,
                );
                let tile_rect = Rect::from_min_size(tile_min, vec2(TILE_SIZE as f32, TILE_SIZE as f32));

                match self.tile_textures.get(&id) {
                    Some(texture) => {
                        painter.image(texture.id(), tile_rect, full_uv, Color32::WHITE);
                    }
                    None => {
                        painter.rect_filled(tile_rect, CornerRadius::ZERO, Color32::from_gray(34));
                        missing.push(id);
                    }
                }
            }
        }

        tile_service.request(missing);

        // ---------------- CITY MARKERS ----------------
        let mut selected = None;

        for city in cities {
            let screen = self.geo_to_screen(city.position.lat, city.position.lng, rect);

            if !rect.expand(16.0).contains(screen) {
                continue;
            }

            let marker_response = ui.allocate_rect(
                Rect::from_center_size(screen, Vec2::splat(16.0)),
                Sense::click(),
            );

            painter.circle_filled(screen, 6.0, MARKER_COLOR);
            painter.circle_stroke(screen, 9.0, Stroke::new(1.5, Color32::WHITE));

            if marker_response.hovered() {
                let label = format!("{} {}", city.emoji, city.city_name);
                let galley = painter.layout_no_wrap(
                    label,
                    TextStyle::Body.resolve(&ui.style()),
                    Color32::BLACK,
                );

                let bubble = Rect::from_min_size(
                    screen + vec2(-galley.size().x * 0.5 - 8.0, -galley.size().y - 26.0),
                    galley.size() + vec2(16.0, 10.0),
                );

                painter.rect_filled(bubble, CornerRadius::same(6), Color32::from_white_alpha(235));
                painter.galley(bubble.min + vec2(8.0, 5.0), galley, Color32::BLACK);
            }

            if marker_response.clicked() {
                selected = Some(MapEvent::SelectedCity {
                    id: city.id,
                    query: MapQuery {
                        lat: city.position.lat,
                        lng: city.position.lng,
                    },
                });
            }
        }

        // ---------------- ATTRIBUTION ----------------
        painter.text(
            rect.right_bottom() - vec2(6.0, 4.0),
            Align2::RIGHT_BOTTOM,
            "© OpenStreetMap contributors",
            FontId::proportional(11.0),
            Color32::from_white_alpha(150),
        );

        // a marker click must not double as a map click
        if selected.is_some() {
            return selected;
        }

        // ---------------- CLICK TO ADD ----------------
        if response.clicked_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let (lat, lng) = self.screen_to_geo(pos, rect);
                return Some(MapEvent::ClickedAt { lat, lng });
            }
        }

        None
    }

    fn step_zoom(&mut self, direction: i8, cursor: Option<Pos2>, rect: Rect) {
        let new_zoom = (self.zoom as i16 + direction as i16)
            .clamp(MIN_ZOOM as i16, MAX_ZOOM as i16) as u8;

        if new_zoom == self.zoom {
            return;
        }

        match cursor {
            Some(cursor) => {
                // keep the spot under the cursor fixed through the zoom
                let anchor = self.screen_to_geo(cursor, rect);
                self.zoom = new_zoom;

                let (ax, ay) = tiles::project(anchor.0, anchor.1, self.zoom);
                let offset = cursor - rect.center();
                let size = tiles::world_size(self.zoom);

                self.center = tiles::unproject(
                    ax - offset.x as f64,
                    (ay - offset.y as f64).clamp(0.0, size),
                    self.zoom,
                );
            }
            None => {
                self.zoom = new_zoom;
            }
        }
    }

    fn geo_to_screen(&self, lat: f64, lng: f64, rect: Rect) -> Pos2 {
        let (cx, cy) = tiles::project(self.center.0, self.center.1, self.zoom);
        let (px, py) = tiles::project(lat, lng, self.zoom);
        let size = tiles::world_size(self.zoom);

        // take the short way around the antimeridian
        let mut dx = px - cx;
        if dx > size / 2.0 {
            dx -= size;
        } else if dx < -size / 2.0 {
            dx += size;
        }

        pos2(
            rect.center().x + dx as f32,
            rect.center().y + (py - cy) as f32,
        )
    }

    fn screen_to_geo(&self, pos: Pos2, rect: Rect) -> (f64, f64) {
        let (cx, cy) = tiles::project(self.center.0, self.center.1, self.zoom);

        tiles::unproject(
            cx + (pos.x - rect.center().x) as f64,
            cy + (pos.y - rect.center().y) as f64,
            self.zoom,
        )
    }

    fn upload_new_tiles(&mut self, ctx: &egui::Context, tile_service: &TileService) {
        let version = tile_service.version.load(Ordering::Relaxed);
        if version == self.last_tile_version {
            return;
        }
        self.last_tile_version = version;

        if let Ok(cache) = tile_service.tiles.read() {
            for (id, bitmap) in cache.iter() {
                if !self.tile_textures.contains_key(id) {
                    let name = format!("tile_{}_{}_{}", id.zoom, id.x, id.y);
                    let texture = ctx.load_texture(name, bitmap.clone(), TextureOptions::LINEAR);
                    self.tile_textures.insert(*id, texture);
                }
            }

            // let go of textures the worker already evicted
            self.tile_textures.retain(|id, _| cache.contains_key(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_resolution_prefers_the_query() {
        assert_eq!(
            resolve_center(Some(MapQuery { lat: 40.41, lng: 49.86 })),
            (40.41, 49.86)
        );
        assert_eq!(resolve_center(None), DEFAULT_CENTER);
    }

    #[test]
    fn query_change_recenters() {
        let mut map = MapView::new();
        map.sync_with_query(Some(MapQuery { lat: 40.41, lng: 49.86 }));
        assert_eq!(map.center(), (40.41, 49.86));
    }

    #[test]
    fn unchanged_query_leaves_a_panned_map_alone() {
        let mut map = MapView::new();
        let query = Some(MapQuery { lat: 40.41, lng: 49.86 });

        map.sync_with_query(query);
        map.center = (10.0, 10.0); // user panned away
        map.sync_with_query(query);

        assert_eq!(map.center(), (10.0, 10.0));
    }

    #[test]
    fn dropping_the_query_keeps_the_last_position() {
        let mut map = MapView::new();
        map.sync_with_query(Some(MapQuery { lat: 40.41, lng: 49.86 }));
        map.sync_with_query(None);
        assert_eq!(map.center(), (40.41, 49.86));
    }

    #[test]
    fn screen_round_trip_through_the_viewport() {
        let map = MapView::new();
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0));

        let screen = map.geo_to_screen(10.0, 20.0, rect);
        let (lat, lng) = map.screen_to_geo(screen, rect);

        assert!((lat - 10.0).abs() < 1e-3);
        assert!((lng - 20.0).abs() < 1e-3);
    }

    #[test]
    fn viewport_center_maps_to_map_center() {
        let map = MapView::new();
        let rect = Rect::from_min_size(pos2(100.0, 50.0), vec2(640.0, 480.0));

        let (lat, lng) = map.screen_to_geo(rect.center(), rect);
        assert!((lat - DEFAULT_CENTER.0).abs() < 1e-9);
        assert!((lng - DEFAULT_CENTER.1).abs() < 1e-9);
    }
}
