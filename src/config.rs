#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use typed_builder::TypedBuilder;

use crate::sinks::DispatchPolicy;

/// Relay used when `GRADEO_SMTP_RELAY` is unset.
pub const DEFAULT_SMTP_RELAY: &str = "smtp.gmail.com";

/// Default labs directory.
pub const DEFAULT_LABS_DIR: &str = "labs/";

/// Default email preferences file.
pub const DEFAULT_EMAIL_PREFERENCES: &str = "email_dispatch.json";

/// SMTP credentials and addressing, sourced from the environment.
#[derive(Clone)]
pub struct SmtpSettings {
    /// Relay host.
    relay:    String,
    /// Login name on the relay.
    username: String,
    /// Password or app token.
    password: String,
    /// Mail domain shared by the grader and submitters.
    domain:   String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("relay", &self.relay)
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl SmtpSettings {
    /// Builds settings from explicit values.
    pub fn new(
        relay: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            relay:    relay.into(),
            username: username.into(),
            password: password.into(),
            domain:   domain.into(),
        }
    }

    /// Reads `GRADEO_SMTP_RELAY`, `GRADEO_SMTP_USERNAME`,
    /// `GRADEO_SMTP_PASSWORD` and `GRADEO_EMAIL_DOMAIN`.
    pub fn from_env() -> Result<Self> {
        /// Reads a required, non-blank variable.
        fn required(key: &str) -> Result<String> {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{key} must be set to send email"))
        }

        let relay = std::env::var("GRADEO_SMTP_RELAY")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SMTP_RELAY.to_string());

        Ok(Self {
            relay,
            username: required("GRADEO_SMTP_USERNAME")?,
            password: required("GRADEO_SMTP_PASSWORD")?,
            domain: required("GRADEO_EMAIL_DOMAIN")?,
        })
    }

    /// Relay host.
    pub fn relay(&self) -> &str {
        &self.relay
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Mail domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Sender address: the username if it is already an address, otherwise
    /// the username at the mail domain.
    pub fn sender(&self) -> String {
        if self.username.contains('@') {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.domain)
        }
    }
}

/// Email options for a run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EmailOptions {
    /// Policy for submitters without a recorded preference.
    #[builder(default)]
    pub default_policy: DispatchPolicy,
    /// Per-submitter preferences file.
    #[builder(default = PathBuf::from(DEFAULT_EMAIL_PREFERENCES), setter(into))]
    pub preferences:    PathBuf,
    /// Relay and credentials; read from the environment when unset.
    #[builder(default, setter(strip_option))]
    pub smtp:           Option<SmtpSettings>,
}

impl EmailOptions {
    /// The configured SMTP settings, falling back to the environment.
    pub fn smtp_settings(&self) -> Result<SmtpSettings> {
        match &self.smtp {
            Some(settings) => Ok(settings.clone()),
            None => SmtpSettings::from_env(),
        }
    }
}

/// Everything one grading run needs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RunOptions {
    /// Grader script.
    #[builder(setter(into))]
    pub grader:               PathBuf,
    /// Directory of submissions.
    #[builder(default = PathBuf::from(DEFAULT_LABS_DIR), setter(into))]
    pub labs:                 PathBuf,
    /// Print one-line reports even for incorrect submissions.
    #[builder(default)]
    pub short_print:          bool,
    /// Print an overview table after the reports.
    #[builder(default)]
    pub overview:             bool,
    /// Score table to update.
    #[builder(default, setter(strip_option, into))]
    pub csv:                  Option<PathBuf>,
    /// Directory graded files are moved into.
    #[builder(default, setter(strip_option, into))]
    pub move_to:              Option<PathBuf>,
    /// Similarity threshold; the scan only runs when set.
    #[builder(default, setter(strip_option))]
    pub similarity_threshold: Option<f32>,
    /// Email options; no email is sent when unset.
    #[builder(default, setter(strip_option))]
    pub email:                Option<EmailOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_falls_back_to_the_domain() {
        let settings = SmtpSettings::new("relay", "grader", "secret", "example.edu");
        assert_eq!(settings.sender(), "grader@example.edu");

        let settings = SmtpSettings::new("relay", "grader@other.org", "secret", "example.edu");
        assert_eq!(settings.sender(), "grader@other.org");
    }

    #[test]
    fn debug_output_hides_the_password() {
        let settings = SmtpSettings::new("relay", "grader", "secret", "example.edu");
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[test]
    fn run_options_have_sensible_defaults() {
        let options = RunOptions::builder().grader("hw001_cs100_h01.rhai").build();
        assert_eq!(options.labs, PathBuf::from(DEFAULT_LABS_DIR));
        assert!(options.csv.is_none());
        assert!(options.email.is_none());
        assert!(options.similarity_threshold.is_none());
    }
}
