pub mod auth;
pub mod cities;
pub mod citywidgets;
pub mod geocode;
pub mod initialization;
pub mod map;
pub mod routes;
pub mod tiles;
pub mod ui;
pub mod utilities;
