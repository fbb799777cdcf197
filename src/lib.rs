//! DavMail gateway test kit
//!
//! Shared setup for the gateway's integration tests. Every test case
//! calls [`environment()`] from its setup: the first call resolves the
//! configuration (preset `DAVMAIL_*` values or the `test.properties`
//! credentials file), registers the certificate trust override and
//! forces server mode; later calls return the same
//! [`TestEnvironment`].
//!
//! Test messages come from the [`fixture`] module.

mod bootstrap;
mod config;
mod environment;
mod error;
pub mod fixture;
pub mod logging;
mod properties;
mod session;
mod settings;
pub mod trust;

pub use bootstrap::{Bootstrap, GlobalTrust, TrustRegistrar, environment, install, try_environment};
pub use config::{ConfigSource, Credentials, TEST_PROPERTIES};
pub use environment::{EnvironmentSummary, KerberosConfig, TestEnvironment};
pub use error::{Error, Result};
pub use fixture::TestMessage;
pub use session::{RemoteSession, SessionSlot};
pub use settings::{Settings, keys};
pub use trust::{CertificateHash, TrustOverride, TrustPolicy};
