#![allow(dead_code)]

use async_compression::tokio::write::GzipEncoder;
use camino::{Utf8Path, Utf8PathBuf};
use goup::{executor, DirectExecutor, PrivilegedExecutor, Settings};
use sha2::Digest;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use wiremock::{
    matchers::{method, path, query_param},
    Mock,
    MockServer,
    ResponseTemplate,
};

pub const LINUX_AMD64: (&str, &str) = ("linux", "amd64");

pub struct Sandbox {
    pub root: tempfile::TempDir,
    pub settings: Settings,
}

impl Sandbox {
    pub fn new(server: Option<&MockServer>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::try_from(root.path().to_path_buf()).unwrap();
        let url = server.map_or_else(|| "http://127.0.0.1:9/dl/".to_owned(), |server| format!("{}/dl/", server.uri()));
        let settings = Settings {
            index_url: url.clone(),
            download_url: url,
            install_dir: base.join("usr").join("local").join("go"),
            bin_dir: base.join("usr").join("bin"),
            work_dir: base.join("work"),
            ..Settings::default()
        };
        std::fs::create_dir_all(&settings.bin_dir).unwrap();
        std::fs::create_dir_all(&settings.work_dir).unwrap();
        Self { root, settings }
    }

    pub fn install_dir(&self) -> &Utf8Path {
        &self.settings.install_dir
    }

    pub fn link(&self, binary: &str) -> Utf8PathBuf {
        self.settings.bin_dir.join(binary)
    }

    /// Lays out an installed toolchain by hand.
    pub fn preinstall(&self, version: &str) {
        let bin = self.install_dir().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(self.install_dir().join("VERSION"), format!("{version}\n")).unwrap();
        for binary in ["go", "gofmt"] {
            std::fs::write(bin.join(binary), format!("{version} {binary}")).unwrap();
            std::os::unix::fs::symlink(bin.join(binary), self.link(binary)).unwrap();
        }
    }

    pub fn installed_version(&self) -> Option<String> {
        std::fs::read_to_string(self.install_dir().join("VERSION"))
            .ok()
            .and_then(|text| text.lines().next().map(ToOwned::to_owned))
    }

    pub fn work_dir_entries(&self) -> Vec<String> {
        std::fs::read_dir(&self.settings.work_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// A gzip tarball shaped like an official release archive.
pub async fn go_archive(version: &str) -> Vec<u8> {
    let version_file = format!("{version}\n");
    tarball(&[
        ("go/VERSION", version_file.as_bytes()),
        ("go/bin/go", b"#!/bin/sh\necho go\n"),
        ("go/bin/gofmt", b"#!/bin/sh\necho gofmt\n"),
        ("go/src/runtime/extern.go", b"package runtime\n"),
    ])
    .await
}

pub async fn tarball(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tokio_tar::Builder::new(vec![]);
    for (path, data) in members {
        let mut header = tokio_tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).await.unwrap();
    }
    let tar = builder.into_inner().await.unwrap();
    let mut encoder = GzipEncoder::new(vec![]);
    encoder.write_all(&tar).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(bytes))
}

pub fn filename(version: &str, (os, arch): (&str, &str)) -> String {
    format!("{version}.{os}-{arch}.tar.gz")
}

/// One index entry whose linux-amd64 archive has the given digest and size.
pub fn release_json(version: &str, stable: bool, sha256: &str, size: usize) -> serde_json::Value {
    serde_json::json!({
        "version": version,
        "stable": stable,
        "files": [
            {
                "filename": format!("{version}.src.tar.gz"),
                "os": "",
                "arch": "",
                "version": version,
                "sha256": "00",
                "size": 1,
                "kind": "source",
            },
            {
                "filename": filename(version, LINUX_AMD64),
                "os": LINUX_AMD64.0,
                "arch": LINUX_AMD64.1,
                "version": version,
                "sha256": sha256,
                "size": size,
                "kind": "archive",
            },
        ],
    })
}

pub async fn mount_index(server: &MockServer, releases: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/dl/"))
        .and(query_param("mode", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(releases))
        .mount(server)
        .await;
}

pub async fn mount_archive(server: &MockServer, version: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/dl/{}", filename(version, LINUX_AMD64))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

/// Serves `version` as the only stable release, with a matching archive.
pub async fn serve_release(server: &MockServer, version: &str) {
    let bytes = go_archive(version).await;
    let index = serde_json::json!([release_json(version, true, &sha256_hex(&bytes), bytes.len())]);
    mount_index(server, index).await;
    mount_archive(server, version, bytes).await;
}

/// Performs every operation directly and remembers which ones ran.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    inner: DirectExecutor,
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_owned());
    }
}

impl PrivilegedExecutor for RecordingExecutor {
    async fn acquire(&self) -> Result<(), executor::Error> {
        self.record("acquire");
        self.inner.acquire().await
    }

    async fn release(&self) -> Result<(), executor::Error> {
        self.record("release");
        self.inner.release().await
    }

    async fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), executor::Error> {
        self.record("remove_dir_all");
        self.inner.remove_dir_all(path).await
    }

    async fn remove_file(&self, path: &Utf8Path) -> Result<(), executor::Error> {
        self.record("remove_file");
        self.inner.remove_file(path).await
    }

    async fn move_tree(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), executor::Error> {
        self.record("move_tree");
        self.inner.move_tree(from, to).await
    }

    async fn replace_symlink(&self, target: &Utf8Path, link: &Utf8Path) -> Result<(), executor::Error> {
        self.record("replace_symlink");
        self.inner.replace_symlink(target, link).await
    }
}
