use media_range::config::DevServerConfig;
use std::io::Write;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_load_example_config() {
    let config = DevServerConfig::from_file("media_range.example.yaml");
    assert!(config.is_ok(), "Failed to load example config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.listen_address, "127.0.0.1:5173");
    assert_eq!(config.media_root, "../media-files");
    assert_eq!(config.chunk_size, 65536);
    assert_eq!(config.stream_buffer_chunks, 16);
    assert_eq!(config.request_timeout_secs, 300);
    assert_eq!(config.api_proxy.upstream, "http://localhost:8082");
    let metrics = config.metrics_endpoint.expect("example enables metrics");
    assert!(metrics.enabled);
    assert_eq!(metrics.address, "127.0.0.1:9090");
}

#[test]
fn test_load_minimal_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "media_root: /srv/media").unwrap();

    let config = DevServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.media_root, "/srv/media");
    // Defaults are applied
    assert_eq!(config.media_prefix, "/media-files/");
    assert_eq!(config.chunk_size, 64 * 1024);
    assert_eq!(config.image_max_age_secs, 86400);
    assert!(config.api_proxy.enabled);
    assert_eq!(config.api_proxy.timeout_secs, 60);
    assert!(config.metrics_endpoint.is_none());
    assert!(config.static_root.is_none());
}

#[test]
fn test_load_invalid_config() {
    let cases = [
        "chunk_size: 1024",
        "chunk_size: 20971520",
        "request_timeout_secs: 0",
        "stream_buffer_chunks: 0",
        "media_prefix: media-files/",
        "listen_address: not-an-address",
        "api_proxy:\n  upstream: localhost:8082",
        "metrics_endpoint:\n  enabled: true\n  address: nowhere",
    ];
    for yaml in cases {
        assert_err!(DevServerConfig::from_yaml(yaml), "should reject: {}", yaml);
    }
}

#[test]
fn test_disabled_proxy_skips_upstream_check() {
    let yaml = "api_proxy:\n  enabled: false\n  upstream: whatever";
    let config = assert_ok!(DevServerConfig::from_yaml(yaml));
    assert!(!config.api_proxy.enabled);
}

#[test]
fn test_load_nonexistent_file() {
    let config = DevServerConfig::from_file("nonexistent.yaml");
    assert!(config.is_err(), "Should fail when file doesn't exist");
}

#[test]
fn test_load_malformed_yaml() {
    let result = DevServerConfig::from_yaml("chunk_size: [1, 2");
    assert!(result.is_err());
}
