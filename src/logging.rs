//! Test logging with a reloadable filter
//!
//! The subscriber is installed once per process. Settings provide the
//! base filter (see [`crate::Settings::update_logging_config`]) and
//! individual channels can be raised afterwards without rebuilding the
//! subscriber.

use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex, MutexGuard, Once, PoisonError};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Raw HTTP traffic between the gateway and the backend.
pub const WIRE_CHANNEL: &str = "davmail::http::wire";

/// HTTP client events (requests, redirects, authentication).
pub const HTTP_CHANNEL: &str = "davmail::http";

const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();
static STATE: LazyLock<Mutex<LogState>> = LazyLock::new(|| Mutex::new(LogState::default()));

#[derive(Default)]
struct LogState {
    base: Option<String>,
    /// Set when `RUST_LOG` was present at install time; settings then no
    /// longer replace the base filter.
    env_pinned: bool,
    overrides: BTreeMap<String, LevelFilter>,
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogState {
    fn directives(&self) -> String {
        let base = self.base.as_deref().unwrap_or(DEFAULT_FILTER);
        let mut parts = vec![base.to_string()];
        parts.extend(
            self.overrides
                .iter()
                .map(|(target, level)| format!("{target}={}", level_name(*level))),
        );
        parts.join(",")
    }

    fn apply(&self) {
        let Some(handle) = &self.handle else {
            return;
        };
        if let Err(e) = handle.reload(EnvFilter::new(self.directives())) {
            warn!("Failed to reload log filter: {e}");
        }
    }
}

fn state() -> MutexGuard<'static, LogState> {
    STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn level_name(level: LevelFilter) -> String {
    level.to_string().to_ascii_lowercase()
}

/// Install the process-wide test subscriber.
///
/// Safe to call from every test; only the first call installs anything.
/// If another subscriber is already set globally, the filter state is
/// still tracked but reloads become no-ops.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let mut state = state();
        if let Ok(from_env) = std::env::var(EnvFilter::DEFAULT_ENV) {
            state.base = Some(from_env);
            state.env_pinned = true;
        }

        let (filter, handle) = reload::Layer::new(EnvFilter::new(state.directives()));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().compact())
            .try_init();

        if installed.is_ok() {
            state.handle = Some(handle);
        }
    });
}

/// Replace the base filter derived from settings.
pub(crate) fn configure(base: String) {
    let mut state = state();
    if state.env_pinned {
        return;
    }
    state.base = Some(base);
    state.apply();
}

/// Set a single channel (tracing target) to `level`.
pub fn set_level(channel: &str, level: LevelFilter) {
    let mut state = state();
    if state.overrides.get(channel) == Some(&level) {
        return;
    }
    state.overrides.insert(channel.to_string(), level);
    state.apply();
}

/// Turn on debug output for the HTTP wire and HTTP client channels.
pub fn enable_wire_debug_logging() {
    set_level(WIRE_CHANNEL, LevelFilter::DEBUG);
    set_level(HTTP_CHANNEL, LevelFilter::DEBUG);
}

/// The filter directives currently in effect.
#[must_use]
pub fn current_filter() -> String {
    state().directives()
}
