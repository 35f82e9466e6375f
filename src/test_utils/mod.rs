//! Test utilities for release-vector
//!
//! This module provides helpers shared by unit and integration tests:
//! - logging that cooperates with the test harness
//! - [`MockTransport`], an in-memory [`HttpTransport`] recording every request
//! - builders for tar+gzip archives and OCI manifests
//! - [`TestGit`] for creating local role repositories
//!
//! # Example
//!
//! ```rust,no_run
//! use release_vector::loader::HttpResponse;
//! use release_vector::test_utils::MockTransport;
//!
//! let transport = MockTransport::new();
//! transport.respond("https://example.com/release.yaml", HttpResponse::new(200, "a: 1\n"));
//! ```

pub mod git_helper;

pub use git_helper::TestGit;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::loader::transport::{HttpRequest, HttpResponse, HttpTransport, TransportFuture};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` if given, otherwise
/// `RUST_LOG`; without either, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// In-memory transport with canned responses per URL.
///
/// Multiple responses registered for one URL are returned in order; the
/// last one repeats. Unknown URLs answer `404`.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// An empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`.
    pub fn respond(&self, url: &str, response: HttpResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.entry(url.to_string()).or_default().push_back(response);
        }
    }

    /// Serve `blob` under `<repository_url>/blobs/sha256:<digest>`.
    pub fn respond_blob(&self, repository_url: &str, blob: &[u8]) {
        self.respond(&format!("{}/blobs/{}", repository_url, sha256_digest(blob)), HttpResponse::new(200, blob));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The URLs of every request received so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, request: HttpRequest) -> TransportFuture<'_> {
        let response = self.responses.lock().ok().and_then(|mut responses| {
            let queue = responses.get_mut(&request.url)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Box::pin(async move { Ok(response.unwrap_or_else(|| HttpResponse::new(404, "not found"))) })
    }
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Build a tar+gzip archive from `(path, content)` pairs.
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, content.as_bytes()).expect("append tar entry");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip")
}

/// Like [`tar_gz`], but writes entry names verbatim so that unsafe paths
/// can be produced.
pub fn tar_gz_raw(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        let name = &mut header.as_gnu_mut().expect("gnu header").name;
        name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).expect("append tar entry");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip")
}

/// Write an executable `sh` script named `name` into `dir`, standing in for
/// an external tool such as cosign.
#[cfg(unix)]
pub fn fake_tool(dir: &std::path::Path, name: &str, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod fake tool");
    path
}

/// An OCI image manifest with a single layer containing `blob`.
pub fn oci_manifest(media_type: &str, blob: &[u8]) -> String {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": crate::constants::OCI_MANIFEST_MEDIA_TYPE,
        "config": {
            "mediaType": "application/vnd.oci.empty.v1+json",
            "digest": sha256_digest(b"{}"),
            "size": 2
        },
        "layers": [{
            "mediaType": media_type,
            "digest": sha256_digest(blob),
            "size": blob.len()
        }]
    })
    .to_string()
}
