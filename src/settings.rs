//! Gateway settings store
//!
//! A flat `key=value` property map mirroring the gateway's own settings
//! file. The bootstrap fills it from defaults, then from either preset
//! values or the credentials file.

use crate::error::Result;
use crate::logging;
use crate::properties;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;
use tracing::level_filters::LevelFilter;

/// Well-known setting keys.
pub mod keys {
    pub const MODE: &str = "davmail.mode";
    pub const URL: &str = "davmail.url";
    pub const CERTIFICATE_HASH: &str = "davmail.server.certificate.hash";
    pub const USERNAME: &str = "davmail.username";
    pub const PASSWORD: &str = "davmail.password";
    pub const SERVER: &str = "davmail.server";
    pub const ALLOW_REMOTE: &str = "davmail.allowRemote";
    pub const POP_PORT: &str = "davmail.popPort";
    pub const IMAP_PORT: &str = "davmail.imapPort";
    pub const SMTP_PORT: &str = "davmail.smtpPort";
    pub const CALDAV_PORT: &str = "davmail.caldavPort";
    pub const LDAP_PORT: &str = "davmail.ldapPort";
    pub const ENABLE_KERBEROS: &str = "davmail.enableKerberos";
    pub const KRB5_REALM: &str = "java.security.krb5.realm";
    pub const KRB5_KDC: &str = "java.security.krb5.kdc";
    /// Root log level.
    pub const LOG_LEVEL: &str = "log.level";
    /// Prefix for per-target log levels, e.g. `log.davmail=debug`.
    pub const LOG_PREFIX: &str = "log.";
}

const DEFAULTS: &[(&str, &str)] = &[
    (keys::MODE, "EWS"),
    (keys::URL, "https://outlook.office365.com/EWS/Exchange.asmx"),
    (keys::POP_PORT, "1110"),
    (keys::IMAP_PORT, "1143"),
    (keys::SMTP_PORT, "1025"),
    (keys::CALDAV_PORT, "1080"),
    (keys::LDAP_PORT, "1389"),
    (keys::SERVER, "false"),
    (keys::ALLOW_REMOTE, "false"),
    (keys::ENABLE_KERBEROS, "false"),
    (keys::LOG_LEVEL, "warn"),
    ("log.davmail", "debug"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Settings {
    properties: BTreeMap<String, String>,
}

impl Settings {
    /// An empty store with no defaults applied.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
        }
    }

    /// A store holding the gateway defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut settings = Self::new();
        settings.set_default_settings();
        settings
    }

    /// Reset every property to the gateway defaults.
    ///
    /// Keys without a default are removed.
    pub fn set_default_settings(&mut self) {
        self.properties = DEFAULTS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Boolean property; anything other than `true` (case-insensitive)
    /// is false, a missing key yields `default`.
    #[must_use]
    pub fn get_boolean_property(&self, key: &str, default: bool) -> bool {
        self.get_property(key)
            .map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Integer property; a missing or unparsable value yields `default`.
    #[must_use]
    pub fn get_int_property(&self, key: &str, default: i64) -> i64 {
        self.get_property(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Whether the gateway runs unattended.
    #[must_use]
    pub fn is_server_mode(&self) -> bool {
        self.get_boolean_property(keys::SERVER, false)
    }

    /// Overlay the entries of a `.properties` file read from `reader`.
    ///
    /// Keys already present are overwritten; keys absent from the input
    /// are untouched. Values are literal, so `$` and quotes are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or an escape is malformed.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let entries = properties::read(reader)?;
        debug!("Loaded {} setting(s)", entries.len());
        self.properties.extend(entries);
        Ok(())
    }

    /// The `tracing` filter described by the `log.*` keys.
    #[must_use]
    pub fn log_filter(&self) -> String {
        let root = self.get_property(keys::LOG_LEVEL).unwrap_or("warn");
        let mut directives = vec![root.trim().to_string()];
        directives.extend(self.properties.iter().filter_map(|(key, level)| {
            let target = key.strip_prefix(keys::LOG_PREFIX)?;
            (key != keys::LOG_LEVEL && !target.is_empty())
                .then(|| format!("{target}={}", level.trim()))
        }));
        directives.join(",")
    }

    /// Push the `log.*` keys to the process logging filter.
    pub fn update_logging_config(&self) {
        logging::configure(self.log_filter());
    }

    /// Record `level` for `channel` and apply it immediately.
    pub fn set_logging_level(&mut self, channel: &str, level: LevelFilter) {
        self.set_property(
            format!("{}{channel}", keys::LOG_PREFIX),
            logging::level_name(level),
        );
        logging::set_level(channel, level);
    }

    /// All properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
