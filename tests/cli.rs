use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use tempfile::TempDir;
use zip::write::FileOptions;

fn dataingest() -> Command {
    let mut cmd = Command::cargo_bin("dataingest").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serves `body` to a single request and returns the base URL.
fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
        }
    });

    format!("http://{}", addr)
}

fn write_config(dir: &Path, source_url: &str) -> std::path::PathBuf {
    let root = dir.join("artifacts");
    let content = format!(
        "artifacts_root: {root}\n\
         data_ingestion:\n  \
           root_dir: {root}/data_ingestion\n  \
           source_URL: {url}\n  \
           local_data_path: {root}/data_ingestion/data.zip\n  \
           unzip_dir: {root}/data_ingestion/data\n",
        root = root.display(),
        url = source_url,
    );
    let path = dir.join("config.yaml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn generate_config_writes_sample() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config/config.yaml");

    dataingest()
        .arg("--generate-config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated sample configuration file"));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("source_URL"));
}

#[test]
fn dry_run_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:9/data.zip");

    dataingest()
        .args(["--dry-run", "--output-format", "plain", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:9/data.zip"));

    assert!(!temp.path().join("artifacts").exists());
}

#[test]
fn missing_config_exits_with_config_code() {
    let temp = TempDir::new().unwrap();

    dataingest()
        .current_dir(temp.path())
        .arg("--config")
        .arg(temp.path().join("absent.yaml"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("absent.yaml"));
}

#[test]
fn malformed_config_exits_with_config_code() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.yaml");
    fs::write(&path, "data_ingestion: [unclosed\n").unwrap();

    dataingest().arg("--config").arg(&path).assert().code(3);
}

#[test]
fn invalid_source_url_flag_is_rejected() {
    dataingest()
        .args(["--source-url", "ftp://example.com/data.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("http"));
}

#[test]
fn unreachable_source_exits_with_network_code() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "http://127.0.0.1:9/data.zip");

    dataingest()
        .args(["-q", "--config"])
        .arg(&config)
        .assert()
        .code(4);
}

#[test]
fn downloads_and_extracts_archive() {
    let temp = TempDir::new().unwrap();
    let archive = zip_bytes(&[("a.txt", "alpha"), ("b.txt", "bravo"), ("c.txt", "charlie")]);
    let url = format!("{}/data.zip", serve_once(archive.clone()));
    let config = write_config(temp.path(), &url);
    let report = temp.path().join("report.json");

    dataingest()
        .args(["--output-format", "plain", "--config"])
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Files extracted: 3"));

    let ingest_dir = temp.path().join("artifacts/data_ingestion");
    assert_eq!(fs::read(ingest_dir.join("data.zip")).unwrap(), archive);

    let mut names: Vec<String> = fs::read_dir(ingest_dir.join("data"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["archive"]["downloaded"], serde_json::json!(true));

    // The server is gone; a second run must reuse the archive on disk.
    dataingest()
        .args(["-q", "--config"])
        .arg(&config)
        .assert()
        .success();
}
