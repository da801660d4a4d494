use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use chrono::{Datelike, Local};
use egui::{
    self, Align, Color32, Context, Key, Layout, RichText, ViewportCommand, vec2,
};
use toml_edit::DocumentMut;

use crate::auth::{AuthService, FAKE_USER};
use crate::cities::{CitiesState, CityService, NewCity, Position};
use crate::citywidgets::{ACCENT, CityRow, CountryRow};
use crate::geocode::GeocodeService;
use crate::map::{MapEvent, MapView};
use crate::routes::{AppView, MapQuery, Route, Router};
use crate::tiles::TileService;
use crate::utilities::{self, format_visit_date};

const ERROR_COLOR: Color32 = Color32::from_rgb(230, 80, 80);
const FADED_TEXT: Color32 = Color32::from_gray(160);

pub struct TripAppConfig {
    pub api_base_url: String,
    pub tile_url_pattern: String,
    pub start_in_fullscreen: bool,
    pub userconfig_path: PathBuf,
    pub city_service: CityService,
    pub tile_service: TileService,
    pub geocode_service: GeocodeService,
}

pub struct TripApp {
    /* ───────────────────────── Services ───────────────────────── */
    city_service: CityService,
    tile_service: TileService,
    geocode_service: GeocodeService,
    auth: AuthService,

    /* ───────────────────────── Routing ───────────────────────── */
    router: Router,

    /* ───────────────────────── City state cache ───────────────────────── */
    cities_cache: CitiesState,
    last_cities_version: u64,
    awaiting_create: bool,

    /* ───────────────────────── Map ───────────────────────── */
    map: MapView,

    /* ───────────────────────── Login inputs ───────────────────────── */
    email_input: String,
    password_input: String,
    login_error_flag: bool,

    /* ───────────────────────── Form inputs ───────────────────────── */
    cityname_input: String,
    country_input: String,
    emoji_input: String,
    notes_input: String,
    day_input: i32,
    month_input: i32,
    year_input: i32,
    date_error_flag: bool,
    awaiting_geocode: bool,
    geocode_error: String,
    last_geocode_version: u64,

    /* ───────────────────────── Settings ───────────────────────── */
    settings_flag: bool,
    base_url_input: String,
    tile_url_input: String,
    userconfig_path: PathBuf,

    /* ───────────────────────── Misc ───────────────────────── */
    start_in_fullscreen: bool,
}

impl TripApp {
    pub fn new(config: TripAppConfig) -> Self {
        let now = Local::now();

        Self {
            city_service: config.city_service,
            tile_service: config.tile_service,
            geocode_service: config.geocode_service,
            auth: AuthService::new(),

            router: Router::new(),

            cities_cache: CitiesState::default(),
            last_cities_version: 0,
            awaiting_create: false,

            map: MapView::new(),

            // prefilled so the demo account is one click away
            email_input: FAKE_USER.email.to_string(),
            password_input: FAKE_USER.password.to_string(),
            login_error_flag: false,

            cityname_input: String::new(),
            country_input: String::new(),
            emoji_input: String::new(),
            notes_input: String::new(),
            day_input: now.day() as i32,
            month_input: now.month() as i32,
            year_input: now.year(),
            date_error_flag: false,
            awaiting_geocode: false,
            geocode_error: String::new(),
            last_geocode_version: 0,

            settings_flag: false,
            base_url_input: config.api_base_url,
            tile_url_input: config.tile_url_pattern,
            userconfig_path: config.userconfig_path,

            start_in_fullscreen: config.start_in_fullscreen,
        }
    }

    pub fn init_with_context(&mut self, ctx: &Context) {
        set_styles(ctx);

        if self.start_in_fullscreen {
            ctx.send_viewport_cmd(ViewportCommand::Fullscreen(true));
        }
    }

    pub fn ui(&mut self, ctx: &Context) {
        if let Some(old_fullscreen) = ctx.input(|i| {
            if i.key_pressed(Key::F11) {
                i.viewport().fullscreen
            } else {
                None
            }
        }) {
            ctx.send_viewport_cmd(ViewportCommand::Fullscreen(!old_fullscreen));
        }

        // commit navigation queued during the previous frame
        if self.router.apply_pending() {
            self.on_route_entered();
        }

        // pick up what the city worker published since last frame
        let cities_version = self.city_service.version.load(Ordering::Relaxed);
        if cities_version != self.last_cities_version {
            self.cities_cache = self.city_service.snapshot();
            self.last_cities_version = cities_version;

            // back to the list once the create settles, success or not;
            // a failure stays visible through the sidebar error banner
            if self.awaiting_create && !self.cities_cache.is_loading {
                self.router.navigate(Route::App(AppView::Cities), None);
                self.awaiting_create = false;
            }
        }

        // queues at most one redirect; it is applied at the next frame top
        let render_protected = self.router.guard_protected(self.auth.is_authenticated());

        match self.router.route() {
            Route::Home => self.show_homepage(ctx),
            Route::Login => self.show_login(ctx),
            Route::App(view) => {
                if render_protected {
                    self.show_app(ctx, view);
                } else {
                    egui::CentralPanel::default().show(ctx, |_ui| {});
                }
            }
        }

        self.show_settings_window(ctx);

        if self.router.has_pending() {
            ctx.request_repaint();
        }
    }

    fn on_route_entered(&mut self) {
        match self.router.route() {
            Route::App(AppView::City(id)) => {
                // the worker short-circuits if this city is already current
                self.city_service.get_city(id);
            }
            Route::App(AppView::Form) => {
                self.reset_form_inputs();

                if let Some(query) = self.router.query() {
                    self.last_geocode_version = self.geocode_service.version.load(Ordering::Relaxed);
                    self.awaiting_geocode = true;
                    self.geocode_service.lookup(query.lat, query.lng);
                }
            }
            _ => {}
        }
    }

    fn reset_form_inputs(&mut self) {
        let now = Local::now();

        self.cityname_input.clear();
        self.country_input.clear();
        self.emoji_input.clear();
        self.notes_input.clear();
        self.day_input = now.day() as i32;
        self.month_input = now.month() as i32;
        self.year_input = now.year();
        self.date_error_flag = false;
        self.awaiting_geocode = false;
        self.geocode_error.clear();
    }

    /* ───────────────────────── Public views ───────────────────────── */

    fn show_homepage(&mut self, ctx: &Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(110.0);
                ui.label(RichText::new("🌍 TripLog").size(26.0).strong());
                ui.add_space(50.0);
                ui.label(RichText::new("You travel the world.").size(38.0).strong());
                ui.label(RichText::new("TripLog keeps track of your adventures.").size(38.0).strong());
                ui.add_space(18.0);

                ui.scope(|ui| {
                    ui.set_max_width(620.0);
                    ui.label(
                        RichText::new(
                            "A world map that tracks your footsteps into every city you can \
                             think of. Never forget your wonderful experiences, and show your \
                             friends how you have wandered the world.",
                        )
                        .color(FADED_TEXT),
                    );
                });

                ui.add_space(30.0);
                if ui.button(RichText::new("START TRACKING NOW").size(15.0).strong()).clicked() {
                    self.router.navigate(Route::Login, None);
                }
            });
        });
    }

    fn show_login(&mut self, ctx: &Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(120.0);
                ui.label(RichText::new("🌍 TripLog").size(26.0).strong());
                ui.add_space(50.0);

                ui.scope(|ui| {
                    ui.set_max_width(320.0);

                    ui.with_layout(Layout::top_down(Align::Min), |ui| {
                        ui.label("Email address");
                        ui.add(egui::TextEdit::singleline(&mut self.email_input).desired_width(320.0));
                        ui.add_space(10.0);
                        ui.label("Password");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.password_input)
                                .password(true)
                                .desired_width(320.0),
                        );
                        ui.add_space(16.0);

                        let submitted =
                            ui.button("Login").clicked() || ui.input(|i| i.key_pressed(Key::Enter));

                        if submitted {
                            if self.auth.login(&self.email_input, &self.password_input) {
                                self.login_error_flag = false;
                                self.router.navigate(Route::App(AppView::Cities), None);
                            } else {
                                self.login_error_flag = true;
                            }
                        }

                        if self.login_error_flag {
                            ui.add_space(8.0);
                            ui.colored_label(ERROR_COLOR, "Wrong email or password");
                        }
                    });
                });
            });
        });
    }

    /* ───────────────────────── Protected app ───────────────────────── */

    fn show_app(&mut self, ctx: &Context, view: AppView) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.label(RichText::new("🌍 TripLog").strong());
                ui.add_space(12.0);

                if self.settings_flag {
                    if ui.button("Settings").highlight().clicked() {
                        self.settings_flag = false;
                    }
                } else {
                    if ui.button("Settings").clicked() {
                        self.settings_flag = true;
                    }
                }

                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if ui.button("Quit").clicked() {
                        ui.ctx().send_viewport_cmd(ViewportCommand::Close);
                    }
                    ui.add_space(12.0);
                    if ui.button("Logout").clicked() {
                        self.auth.logout();
                        self.router.navigate(Route::Home, None);
                    }
                    ui.add_space(8.0);
                    if let Some(user) = self.auth.user() {
                        ui.label(format!("Welcome, {}", user.name));
                    }
                });
            });
        });

        egui::SidePanel::left("sidebar")
            .exact_width(380.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(10.0);

                ui.horizontal(|ui| {
                    if ui
                        .selectable_label(matches!(view, AppView::Cities), "Cities")
                        .clicked()
                    {
                        self.router.navigate_keep_query(Route::App(AppView::Cities));
                    }
                    if ui
                        .selectable_label(matches!(view, AppView::Countries), "Countries")
                        .clicked()
                    {
                        self.router.navigate_keep_query(Route::App(AppView::Countries));
                    }
                });
                ui.add_space(8.0);

                // last failure reported by the store worker
                if !self.cities_cache.error.is_empty() {
                    ui.colored_label(ERROR_COLOR, &self.cities_cache.error);
                    ui.add_space(6.0);
                }

                match view {
                    AppView::Cities => self.show_city_list(ui),
                    AppView::City(id) => self.show_city_detail(ui, id),
                    AppView::Countries => self.show_country_list(ui),
                    AppView::Form => self.show_form(ui),
                }

                ui.with_layout(Layout::bottom_up(Align::Center), |ui| {
                    ui.add_space(8.0);
                    ui.label(
                        RichText::new(format!("© Copyright {} by TripLog Inc.", Local::now().year()))
                            .size(12.0)
                            .color(Color32::from_white_alpha(100)),
                    );
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::new())
            .show(ctx, |ui| {
                self.map.sync_with_query(self.router.query());

                match self.map.ui(ui, &self.cities_cache.cities, &self.tile_service) {
                    Some(MapEvent::ClickedAt { lat, lng }) => {
                        self.router
                            .navigate(Route::App(AppView::Form), Some(MapQuery { lat, lng }));
                    }
                    Some(MapEvent::SelectedCity { id, query }) => {
                        self.router.navigate(Route::App(AppView::City(id)), Some(query));
                    }
                    None => {}
                }
            });
    }

    fn show_city_list(&mut self, ui: &mut egui::Ui) {
        if self.cities_cache.is_loading {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.add(egui::Spinner::new().size(32.0));
            });
            return;
        }

        if self.cities_cache.cities.is_empty() {
            ui.add_space(20.0);
            ui.label("👋 Add your first city by clicking on a city on the map!");
            return;
        }

        let selected_id = self.cities_cache.current_city.as_ref().map(|c| c.id);
        let mut clicked: Option<(u64, MapQuery)> = None;
        let mut deleted: Option<u64> = None;

        egui::ScrollArea::vertical()
            .max_height(ui.available_height() - 40.0)
            .show(ui, |ui| {
                for city in &self.cities_cache.cities {
                    ui.horizontal(|ui| {
                        let row_width = ui.available_width() - 34.0;
                        let response = ui.add_sized(
                            [row_width, 44.0],
                            CityRow::new(
                                &city.emoji,
                                &city.city_name,
                                city.date,
                                selected_id == Some(city.id),
                            ),
                        );

                        if response.clicked() {
                            clicked = Some((
                                city.id,
                                MapQuery {
                                    lat: city.position.lat,
                                    lng: city.position.lng,
                                },
                            ));
                        }

                        if ui.button("✕").clicked() {
                            deleted = Some(city.id);
                        }
                    });
                    ui.add_space(6.0);
                }
            });

        if let Some((id, query)) = clicked {
            self.router.navigate(Route::App(AppView::City(id)), Some(query));
        }
        if let Some(id) = deleted {
            self.city_service.delete_city(id);
        }
    }

    fn show_city_detail(&mut self, ui: &mut egui::Ui, id: u64) {
        let city = match &self.cities_cache.current_city {
            Some(current) if current.id == id && !self.cities_cache.is_loading => current.clone(),
            _ => {
                ui.vertical_centered(|ui| {
                    ui.add_space(40.0);
                    ui.add(egui::Spinner::new().size(32.0));
                });
                return;
            }
        };

        ui.label(RichText::new("CITY NAME").small().color(FADED_TEXT));
        ui.label(RichText::new(format!("{} {}", city.emoji, city.city_name)).size(22.0).strong());
        ui.add_space(12.0);

        ui.label(
            RichText::new(format!("YOU WENT TO {} ON", city.city_name.to_uppercase()))
                .small()
                .color(FADED_TEXT),
        );
        ui.label(format_visit_date(city.date));

        if !city.notes.is_empty() {
            ui.add_space(12.0);
            ui.label(RichText::new("YOUR NOTES").small().color(FADED_TEXT));
            ui.label(&city.notes);
        }

        ui.add_space(12.0);
        ui.hyperlink_to(
            format!("Check out {} on Wikipedia →", city.city_name),
            format!("https://en.wikipedia.org/wiki/{}", city.city_name),
        );

        ui.add_space(18.0);
        if ui.button("← Back").clicked() {
            self.router.navigate_keep_query(Route::App(AppView::Cities));
        }
    }

    fn show_country_list(&mut self, ui: &mut egui::Ui) {
        if self.cities_cache.is_loading {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.add(egui::Spinner::new().size(32.0));
            });
            return;
        }

        if self.cities_cache.cities.is_empty() {
            ui.add_space(20.0);
            ui.label("👋 Add your first city by clicking on a city on the map!");
            return;
        }

        let mut seen: HashSet<&str> = HashSet::new();

        egui::ScrollArea::vertical()
            .max_height(ui.available_height() - 40.0)
            .show(ui, |ui| {
                for city in &self.cities_cache.cities {
                    if seen.insert(city.country.as_str()) {
                        ui.add(CountryRow::new(&city.emoji, &city.country));
                        ui.add_space(6.0);
                    }
                }
            });
    }

    fn show_form(&mut self, ui: &mut egui::Ui) {
        let query = match self.router.query() {
            Some(q) => q,
            None => {
                ui.add_space(20.0);
                ui.label("Start by clicking somewhere on the map");
                return;
            }
        };

        if self.awaiting_geocode {
            let version = self.geocode_service.version.load(Ordering::Relaxed);

            if version != self.last_geocode_version {
                self.awaiting_geocode = false;

                let outcome = self
                    .geocode_service
                    .result
                    .read()
                    .ok()
                    .and_then(|slot| slot.clone());

                match outcome {
                    Some(Ok(found)) => {
                        self.cityname_input = found.city_name;
                        self.country_input = found.country;
                        self.emoji_input = found.emoji;
                    }
                    Some(Err(message)) => self.geocode_error = message,
                    None => {}
                }
            }
        }

        if self.awaiting_geocode {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.add(egui::Spinner::new().size(32.0));
            });
            return;
        }

        if !self.geocode_error.is_empty() {
            ui.add_space(20.0);
            ui.label(&self.geocode_error);
            ui.add_space(10.0);
            if ui.button("← Back").clicked() {
                self.router.navigate_keep_query(Route::App(AppView::Cities));
            }
            return;
        }

        ui.label("City name");
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut self.cityname_input).desired_width(280.0));
            ui.label(RichText::new(&self.emoji_input).size(18.0));
        });
        ui.add_space(8.0);

        ui.label(format!("When did you go to {}?", self.cityname_input));
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut self.day_input).range(1..=31));
            ui.label("/");
            ui.add(egui::DragValue::new(&mut self.month_input).range(1..=12));
            ui.label("/");
            ui.add(egui::DragValue::new(&mut self.year_input).range(1970..=2100));
        });
        if self.date_error_flag {
            ui.colored_label(ERROR_COLOR, "That date does not exist");
        }
        ui.add_space(8.0);

        ui.label(format!("Notes about your trip to {}", self.cityname_input));
        ui.add(egui::TextEdit::multiline(&mut self.notes_input).desired_rows(3));
        ui.add_space(12.0);

        ui.horizontal(|ui| {
            if ui.button(RichText::new("Add").color(ACCENT).strong()).clicked() {
                match utilities::parse_date_input(self.day_input, self.month_input, self.year_input) {
                    Ok(date) => {
                        self.date_error_flag = false;
                        self.awaiting_create = true;

                        self.city_service.create_city(NewCity {
                            city_name: self.cityname_input.clone(),
                            country: self.country_input.clone(),
                            emoji: self.emoji_input.clone(),
                            date,
                            notes: self.notes_input.clone(),
                            position: Position {
                                lat: query.lat,
                                lng: query.lng,
                            },
                        });
                    }
                    Err(_) => self.date_error_flag = true,
                }
            }

            if ui.button("← Back").clicked() {
                self.router.navigate_keep_query(Route::App(AppView::Cities));
            }
        });

        if self.awaiting_create {
            ui.add_space(8.0);
            ui.add(egui::Spinner::new());
        }
    }

    /* ───────────────────────── Settings ───────────────────────── */

    fn show_settings_window(&mut self, ctx: &Context) {
        if !self.settings_flag {
            return;
        }

        let mut open = true;

        egui::Window::new("Settings")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label("City store URL");
                ui.text_edit_singleline(&mut self.base_url_input);
                ui.add_space(8.0);

                ui.label("Tile server pattern");
                ui.text_edit_singleline(&mut self.tile_url_input);
                ui.add_space(8.0);

                let mut fullscreen = self.start_in_fullscreen;
                if ui.checkbox(&mut fullscreen, "Start in fullscreen").changed() {
                    self.start_in_fullscreen = fullscreen;
                    if let Err(e) = self.update_config_value("start_in_fullscreen", toml_edit::value(fullscreen)) {
                        eprintln!("Failed to update config: {}", e);
                    }
                }

                ui.add_space(12.0);
                if ui.button("Save URLs").clicked() {
                    if let Err(e) = self.update_config_value("api_base_url", toml_edit::value(self.base_url_input.clone())) {
                        eprintln!("Failed to update config: {}", e);
                    }
                    if let Err(e) = self.update_config_value("tile_url_pattern", toml_edit::value(self.tile_url_input.clone())) {
                        eprintln!("Failed to update config: {}", e);
                    }
                }
                ui.label(RichText::new("URL changes take effect after a restart").size(12.0).color(FADED_TEXT));
            });

        if !open {
            self.settings_flag = false;
        }
    }

    fn update_config_value(&self, key: &str, value: toml_edit::Item) -> Result<(), Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(&self.userconfig_path)?;

        let mut doc = toml_content.parse::<DocumentMut>()?;
        doc[key] = value;

        fs::write(&self.userconfig_path, doc.to_string())?;

        Ok(())
    }
}

fn set_styles(ctx: &Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.hyperlink_color = ACCENT;
    visuals.selection.bg_fill = ACCENT.gamma_multiply(0.5);
    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = vec2(8.0, 6.0);
    style.spacing.button_padding = vec2(10.0, 6.0);
    ctx.set_style(style);
}
