//! The configured test environment

use crate::config::Credentials;
use crate::session::SessionSlot;
use crate::settings::{Settings, keys};
use crate::trust::TrustPolicy;
use serde::Serialize;

/// Kerberos realm and KDC handed to the gateway when
/// `davmail.enableKerberos` is set. Passed through as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KerberosConfig {
    pub realm: Option<String>,
    pub kdc: Option<String>,
}

impl KerberosConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            realm: settings.get_property(keys::KRB5_REALM).map(String::from),
            kdc: settings.get_property(keys::KRB5_KDC).map(String::from),
        }
    }
}

/// Everything the bootstrap resolved. Read-only for the rest of the
/// process, apart from the shared session slot.
#[derive(Debug)]
pub struct TestEnvironment {
    settings: Settings,
    credentials: Credentials,
    kerberos: Option<KerberosConfig>,
    trust: TrustPolicy,
    session: SessionSlot,
}

impl TestEnvironment {
    pub(crate) fn new(
        settings: Settings,
        credentials: Credentials,
        kerberos: Option<KerberosConfig>,
        trust: TrustPolicy,
    ) -> Self {
        Self {
            settings,
            credentials,
            kerberos,
            trust,
            session: SessionSlot::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.credentials.url.as_deref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.credentials.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.credentials.password.as_deref()
    }

    #[must_use]
    pub fn certificate_hash(&self) -> Option<&str> {
        self.credentials.certificate_hash.as_deref()
    }

    #[must_use]
    pub const fn kerberos(&self) -> Option<&KerberosConfig> {
        self.kerberos.as_ref()
    }

    #[must_use]
    pub const fn trust_policy(&self) -> &TrustPolicy {
        &self.trust
    }

    #[must_use]
    pub fn is_server_mode(&self) -> bool {
        self.settings.is_server_mode()
    }

    /// Slot for the backend session shared by all test cases.
    #[must_use]
    pub const fn session(&self) -> &SessionSlot {
        &self.session
    }

    /// A printable view without secrets.
    #[must_use]
    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            credentials: self.credentials.clone(),
            server_mode: self.is_server_mode(),
            mode: self.settings.get_property(keys::MODE).map(String::from),
            kerberos: self.kerberos.clone(),
            trust: self.trust.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentSummary {
    pub credentials: Credentials,
    pub server_mode: bool,
    pub mode: Option<String>,
    pub kerberos: Option<KerberosConfig>,
    pub trust: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment() -> TestEnvironment {
        let mut settings = Settings::with_defaults();
        settings.set_property(keys::SERVER, "true");
        TestEnvironment::new(
            settings,
            Credentials {
                url: Some("https://mail.test/EWS/Exchange.asmx".into()),
                certificate_hash: None,
                username: Some("alice".into()),
                password: Some("hunter2".into()),
            },
            None,
            TrustPolicy::AcceptAny,
        )
    }

    #[test]
    fn accessors_expose_credentials() {
        let env = environment();
        assert_eq!(env.url(), Some("https://mail.test/EWS/Exchange.asmx"));
        assert_eq!(env.username(), Some("alice"));
        assert_eq!(env.password(), Some("hunter2"));
        assert_eq!(env.certificate_hash(), None);
        assert!(env.is_server_mode());
    }

    #[test]
    fn summary_hides_password() {
        let json = serde_json::to_string(&environment().summary()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"server_mode\":true"));
        assert!(json.contains("accept any certificate"));
    }

    #[test]
    fn kerberos_from_settings_passes_values_through() {
        let mut settings = Settings::new();
        settings.set_property(keys::KRB5_REALM, "EXAMPLE.TEST");
        let krb = KerberosConfig::from_settings(&settings);
        assert_eq!(krb.realm.as_deref(), Some("EXAMPLE.TEST"));
        assert_eq!(krb.kdc, None);
    }
}
