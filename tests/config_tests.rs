use std::fs;

use tempfile::tempdir;
use trip_log::initialization::{
    DEFAULT_API_BASE_URL, DEFAULT_TILE_URL_PATTERN, get_check_and_set_config,
};

#[test]
fn missing_config_is_created_with_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trip_log_data").join("userconfig.toml");

    let config = get_check_and_set_config(&path);

    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.tile_url_pattern, DEFAULT_TILE_URL_PATTERN);
    assert_eq!(config.window_size_startup, [1280.0, 720.0]);
    assert!(!config.start_in_fullscreen);

    // the normalized file is written back with every known key
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("api_base_url"));
    assert!(written.contains("tile_url_pattern"));
    assert!(written.contains("window_size_startup"));
}

#[test]
fn custom_values_survive_the_normalize_pass() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("userconfig.toml");

    fs::write(
        &path,
        "api_base_url = \"http://10.0.0.5:9000\"\nstart_in_fullscreen = true\n",
    )
    .unwrap();

    let config = get_check_and_set_config(&path);
    assert_eq!(config.api_base_url, "http://10.0.0.5:9000");
    assert!(config.start_in_fullscreen);

    // a second read of the rewritten file yields the same values
    let config = get_check_and_set_config(&path);
    assert_eq!(config.api_base_url, "http://10.0.0.5:9000");
    assert!(config.start_in_fullscreen);
    assert_eq!(config.tile_url_pattern, DEFAULT_TILE_URL_PATTERN);
}

#[test]
fn garbage_config_is_replaced_with_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("userconfig.toml");

    fs::write(&path, "not even { close to toml").unwrap();

    let config = get_check_and_set_config(&path);
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.parse::<toml::Table>().is_ok());
}
