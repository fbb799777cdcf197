//! One-time test environment bootstrap
//!
//! Every test case calls into the bootstrap from its setup; the
//! configuration work runs at most once per [`Bootstrap`] and the
//! outcome, success or failure, is kept for the rest of the process.
//!
//! ```no_run
//! let env = davmail_testkit::environment();
//! assert!(env.is_server_mode());
//! ```

use crate::config::{ConfigSource, Credentials};
use crate::environment::{KerberosConfig, TestEnvironment};
use crate::error::{Error, Result};
use crate::logging;
use crate::settings::{Settings, keys};
use crate::trust::{self, TrustPolicy};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

static GLOBAL: OnceLock<Bootstrap> = OnceLock::new();

/// Installs the certificate trust policy for outgoing connections.
pub trait TrustRegistrar: Send + Sync {
    fn register(&self, policy: &TrustPolicy) -> Result<()>;
}

/// Registers the policy as the process-wide [`trust::TrustOverride`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalTrust;

impl TrustRegistrar for GlobalTrust {
    fn register(&self, policy: &TrustPolicy) -> Result<()> {
        trust::register(policy.clone()).map(|_| ())
    }
}

pub struct Bootstrap {
    source: ConfigSource,
    registrar: Box<dyn TrustRegistrar>,
    state: OnceLock<std::result::Result<TestEnvironment, Arc<Error>>>,
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("source", &self.source)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    #[must_use]
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            registrar: Box::new(GlobalTrust),
            state: OnceLock::new(),
        }
    }

    /// Use `registrar` instead of the process-wide trust registration.
    #[must_use]
    pub fn with_registrar(mut self, registrar: impl TrustRegistrar + 'static) -> Self {
        self.registrar = Box::new(registrar);
        self
    }

    #[must_use]
    pub const fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Whether initialization has run, successfully or not.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Run the bootstrap if it has not run yet and return the environment.
    ///
    /// Concurrent callers wait for the first one. A failure is stored and
    /// returned as [`Error::Setup`] to every caller; it is never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] wrapping the first failure: a missing or
    /// unreadable credentials file, an invalid certificate hash, or a
    /// failed trust registration.
    pub fn ensure_initialized(&self) -> Result<&TestEnvironment> {
        self.state
            .get_or_init(|| self.initialize().map_err(Arc::new))
            .as_ref()
            .map_err(|e| Error::Setup(Arc::clone(e)))
    }

    fn initialize(&self) -> Result<TestEnvironment> {
        let (mut settings, credentials) = match &self.source {
            ConfigSource::Preset(preset) => (preset_settings(preset), preset.clone()),
            ConfigSource::File { path, fallback } => load_file(path, fallback)?,
        };

        let kerberos = settings
            .get_boolean_property(keys::ENABLE_KERBEROS, false)
            .then(|| KerberosConfig::from_settings(&settings));

        let trust = TrustPolicy::from_hash(credentials.certificate_hash.as_deref())?;
        self.registrar.register(&trust)?;

        settings.set_property(keys::SERVER, "true");

        info!(
            "Test environment ready: url={}, user={}, trust={}",
            credentials.url.as_deref().unwrap_or("-"),
            credentials.username.as_deref().unwrap_or("-"),
            trust
        );
        Ok(TestEnvironment::new(settings, credentials, kerberos, trust))
    }
}

fn preset_settings(preset: &Credentials) -> Settings {
    let mut settings = Settings::with_defaults();
    let values = [
        (keys::URL, &preset.url),
        (keys::CERTIFICATE_HASH, &preset.certificate_hash),
        (keys::USERNAME, &preset.username),
        (keys::PASSWORD, &preset.password),
    ];
    for (key, value) in values {
        if let Some(value) = value {
            settings.set_property(key, value.as_str());
        }
    }
    settings
}

fn load_file(path: &Path, fallback: &Credentials) -> Result<(Settings, Credentials)> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::MissingConfig {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    debug!("Loading test settings from {}", path.display());

    let mut settings = Settings::with_defaults();
    settings.set_property(keys::SERVER, "true");
    settings.load(file)?;
    settings.update_logging_config();

    let property = |key: &str| settings.get_property(key).map(String::from);
    let credentials = Credentials {
        url: property(keys::URL),
        certificate_hash: property(keys::CERTIFICATE_HASH),
        username: property(keys::USERNAME).or_else(|| fallback.username.clone()),
        password: property(keys::PASSWORD).or_else(|| fallback.password.clone()),
    };
    Ok((settings, credentials))
}

/// Supply the configuration source before any test asks for the
/// environment, e.g. from a suite-level setup.
///
/// # Errors
///
/// Returns an error if the process-wide bootstrap already exists.
pub fn install(source: ConfigSource) -> Result<()> {
    GLOBAL
        .set(Bootstrap::new(source))
        .map_err(|_| Error::Config("The test environment bootstrap is already installed".into()))
}

/// The process-wide environment, bootstrapping it on first use.
///
/// Without a prior [`install`], the source comes from
/// [`ConfigSource::from_env`]. Also installs test logging.
///
/// # Errors
///
/// Returns [`Error::Setup`] if bootstrapping failed, now or earlier.
pub fn try_environment() -> Result<&'static TestEnvironment> {
    logging::init_test_logging();
    GLOBAL
        .get_or_init(|| Bootstrap::new(ConfigSource::from_env()))
        .ensure_initialized()
}

/// Like [`try_environment`], for use in test setup.
///
/// # Panics
///
/// Panics with the setup error when the environment cannot be
/// configured, failing every test that depends on it.
#[must_use]
pub fn environment() -> &'static TestEnvironment {
    match try_environment() {
        Ok(env) => env,
        Err(e) => panic!("{e}"),
    }
}
