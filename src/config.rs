//! Test configuration sources

use serde::Serialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Credentials file looked up in the working directory.
pub const TEST_PROPERTIES: &str = "test.properties";

/// Connection values for the gateway under test.
///
/// Every field is optional: a partial credentials file leaves the
/// missing ones at whatever the caller supplied.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub url: Option<String>,
    pub certificate_hash: Option<String>,
    pub username: Option<String>,
    #[serde(serialize_with = "redact")]
    pub password: Option<String>,
}

#[allow(clippy::ref_option)]
fn redact<S: serde::Serializer>(
    password: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match password {
        Some(_) => serializer.serialize_some("********"),
        None => serializer.serialize_none(),
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("certificate_hash", &self.certificate_hash)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

impl Credentials {
    /// Read preset values from environment variables.
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `DAVMAIL_URL`
    /// - `DAVMAIL_CERTIFICATE_HASH`
    /// - `DAVMAIL_USERNAME`
    /// - `DAVMAIL_PASSWORD`
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            url: non_empty_var("DAVMAIL_URL"),
            certificate_hash: non_empty_var("DAVMAIL_CERTIFICATE_HASH"),
            username: non_empty_var("DAVMAIL_USERNAME"),
            password: non_empty_var("DAVMAIL_PASSWORD"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Where the bootstrap takes its configuration from.
///
/// Exactly one source is consulted per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Load the credentials file at `path`; its absence is fatal.
    /// `fallback` supplies username and password when the file omits
    /// them.
    File { path: PathBuf, fallback: Credentials },
    /// Use values supplied by the caller; no file is read.
    Preset(Credentials),
}

impl ConfigSource {
    /// Pick the source for a set of caller-supplied values.
    ///
    /// A supplied URL wins and the file is never looked at; otherwise the
    /// file at `path` is required and the supplied values only serve as
    /// fallbacks.
    #[must_use]
    pub fn resolve(supplied: Credentials, path: impl Into<PathBuf>) -> Self {
        if supplied.url.is_some() {
            Self::Preset(supplied)
        } else {
            Self::File {
                path: path.into(),
                fallback: supplied,
            }
        }
    }

    /// Resolve from `DAVMAIL_*` environment variables and
    /// [`TEST_PROPERTIES`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(Credentials::from_env(), TEST_PROPERTIES)
    }

    /// The credentials file this source reads, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Preset(_) => None,
        }
    }
}
