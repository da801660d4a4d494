#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use mimalloc::MiMalloc;
use trip_log::{
    cities, geocode,
    initialization::{App, Config, default_userconfig_path, get_check_and_set_config},
    tiles,
    ui::{TripApp, TripAppConfig},
    utilities::UiWaker,
};
use winit::event_loop::{ControlFlow, EventLoop};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        pollster::block_on(run());
    }
}

async fn run() {
    let event_loop = EventLoop::new().unwrap();
    let proxy = event_loop.create_proxy();

    event_loop.set_control_flow(ControlFlow::Wait);

    let userconfig_path = default_userconfig_path();
    let Config {
        window_size_startup,
        start_in_fullscreen,
        api_base_url,
        tile_url_pattern,
    } = get_check_and_set_config(&userconfig_path);

    let city_service =
        cities::start_city_service(api_base_url.clone(), UiWaker::new(proxy.clone()));

    // the one collection fetch at startup; everything after is user-driven
    city_service.load_all();

    let tile_service =
        tiles::start_tile_service(tile_url_pattern.clone(), UiWaker::new(proxy.clone()));

    let geocode_service = geocode::start_geocode_service(UiWaker::new(proxy));

    let trip_app = TripApp::new(TripAppConfig {
        api_base_url,
        tile_url_pattern,
        start_in_fullscreen,
        userconfig_path,
        city_service,
        tile_service,
        geocode_service,
    });

    let mut app = App::new(trip_app, window_size_startup);

    event_loop.run_app(&mut app).expect("Failed to run app");
}
