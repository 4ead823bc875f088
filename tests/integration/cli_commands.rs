#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("depgraph.toml");
    fs::write(&path, contents).expect("write config");
    path
}

fn config_json(args: &[&str], home: &TempDir) -> Value {
    let output = cargo_bin_cmd!("depgraph")
        .env_remove("DEPGRAPH_CONFIG")
        .env_remove("DEPGRAPH_STORE_URL")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .args(args)
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn config_reports_defaults_and_overrides() {
    let home = TempDir::new().expect("tempdir");
    let json = config_json(
        &["--store-url", "http://localhost:7474/db/data/transaction/commit", "--port", "8088"],
        &home,
    );
    assert_eq!(
        json["store"]["url"],
        "http://localhost:7474/db/data/transaction/commit"
    );
    assert_eq!(json["server"]["port"], 8088);
    assert_eq!(json["server"]["host"], "127.0.0.1");
}

#[test]
fn config_file_values_are_loaded_and_headers_redacted() {
    let home = TempDir::new().expect("tempdir");
    let path = write_config(
        &home,
        r#"
[store]
url = "http://graph:7474/db/data/transaction/commit"
timeout_secs = 5

[store.headers]
Authorization = "Basic c2VjcmV0"

[server]
allow_origins = ["http://localhost:8080"]
"#,
    );
    let config_arg = path.to_string_lossy().into_owned();
    let json = config_json(
        &["--config", &config_arg, "--header", "X-Request-Source=cli"],
        &home,
    );
    assert_eq!(json["store"]["timeout_secs"], 5);
    assert_eq!(json["store"]["headers"]["Authorization"], "<redacted>");
    assert_eq!(json["store"]["headers"]["X-Request-Source"], "<redacted>");
    assert_eq!(json["server"]["allow_origins"][0], "http://localhost:8080");
}

#[test]
fn text_format_prints_toml() {
    let home = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("depgraph")
        .env_remove("DEPGRAPH_CONFIG")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .args(["--store-url", "http://graph:7474/commit", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("[store]"));
    assert!(text.contains("url = \"http://graph:7474/commit\""));
}

#[test]
fn missing_config_file_fails() {
    let home = TempDir::new().expect("tempdir");
    let absent = home.path().join("absent.toml");
    let output = cargo_bin_cmd!("depgraph")
        .env_remove("DEPGRAPH_CONFIG")
        .arg("--config")
        .arg(&absent)
        .arg("config")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("failed to read config"));
}

#[test]
fn malformed_header_argument_fails() {
    let home = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("depgraph")
        .env_remove("DEPGRAPH_CONFIG")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .args(["--header", "no-separator", "config"])
        .assert()
        .failure();
}

#[test]
fn serve_without_store_url_fails() {
    let home = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("depgraph")
        .env_remove("DEPGRAPH_CONFIG")
        .env_remove("DEPGRAPH_STORE_URL")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .arg("serve")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("no store url configured"));
}
