//! Shared helpers for integration tests
//!
//! - `tls_server` -- self-signed TLS endpoint standing in for the gateway

#![allow(dead_code)]

mod tls_server;

pub use tls_server::{FakeTlsServer, GREETING};

/// Write a credentials file into `dir` and return its path.
pub fn write_properties(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join(davmail_testkit::TEST_PROPERTIES);
    std::fs::write(&path, contents).expect("write test.properties");
    path
}
