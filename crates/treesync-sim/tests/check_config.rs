use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use treesync_core::SyncConfig;
use treesync_sim::{load_config, render_config};

fn config_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_partial_file_over_defaults() {
    let file = config_file("limit_hint = 5\ndebounce_ms = 40\n");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.limit_hint, 5);
    assert_eq!(config.debounce(), Duration::from_millis(40));
    assert_eq!(config.journal_capacity, SyncConfig::default().journal_capacity);
}

#[test]
fn rejects_out_of_range_value() {
    let file = config_file("limit_hint = 0\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("limit_hint"));
}

#[test]
fn rejects_malformed_toml() {
    let file = config_file("limit_hint = [\n");
    assert!(load_config(file.path()).is_err());
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn rendered_config_loads_back() {
    let config = SyncConfig::new()
        .with_limit(9)
        .with_fetch_timeout(Duration::from_millis(750));
    let file = config_file(&render_config(&config).unwrap());
    assert_eq!(load_config(file.path()).unwrap(), config);
}
