use std::{collections::BTreeMap, fmt::Display, fs, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use super::ResultSink;
use crate::{config::SmtpSettings, report::ScoreReport};

/// When a submitter gets emailed their report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchPolicy {
    /// Never email.
    #[default]
    Never,
    /// Always email.
    Always,
    /// Email only when something was wrong or the lab failed to load.
    Incorrect,
}

impl DispatchPolicy {
    /// Whether `report` should be emailed under this policy.
    pub fn should_send(self, report: &ScoreReport) -> bool {
        match self {
            DispatchPolicy::Never => false,
            DispatchPolicy::Always => true,
            DispatchPolicy::Incorrect => !report.result().is_fully_correct(),
        }
    }
}

/// Text that names no [`DispatchPolicy`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not an acceptable email default setting, must be NEVER, ALWAYS, or INCORRECT")]
pub struct UnknownPolicy(String);

impl FromStr for DispatchPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEVER" => Ok(DispatchPolicy::Never),
            "ALWAYS" => Ok(DispatchPolicy::Always),
            "INCORRECT" => Ok(DispatchPolicy::Incorrect),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl Display for DispatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatchPolicy::Never => "NEVER",
            DispatchPolicy::Always => "ALWAYS",
            DispatchPolicy::Incorrect => "INCORRECT",
        };
        f.write_str(name)
    }
}

/// Per-submitter policies, keyed by course, then section, then submitter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(BTreeMap<String, BTreeMap<String, BTreeMap<String, DispatchPolicy>>>);

impl Preferences {
    /// Reads a preferences file. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            warn!("No email dispatch preferences found at {}.", path.display());
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let preferences = serde_json::from_str(&contents)
            .with_context(|| format!("Could not parse email preferences in {}", path.display()))?;
        Ok(Some(preferences))
    }

    /// The policy recorded for one submitter, if any.
    pub fn lookup(&self, course: &str, section: &str, submitter: &str) -> Option<DispatchPolicy> {
        self.0.get(course)?.get(section)?.get(submitter).copied()
    }
}

/// Sends plain-text mail.
pub trait Mailer {
    /// Sends `body` to `to`.
    fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Closes the connection, if any.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// [`Mailer`] over an authenticated STARTTLS SMTP relay.
pub struct SmtpMailer {
    /// Open transport; `None` once closed.
    transport: Option<SmtpTransport>,
    /// Sender mailbox.
    from:      Mailbox,
}

impl SmtpMailer {
    /// Connects and authenticates to the relay in `settings`.
    pub fn connect(settings: &SmtpSettings) -> Result<Self> {
        let transport = SmtpTransport::starttls_relay(settings.relay())
            .with_context(|| format!("Could not reach SMTP relay {}", settings.relay()))?
            .credentials(Credentials::new(
                settings.username().to_string(),
                settings.password().to_string(),
            ))
            .build();

        let connected = transport
            .test_connection()
            .with_context(|| format!("Could not connect to SMTP relay {}", settings.relay()))?;
        if !connected {
            bail!("SMTP relay {} refused the connection", settings.relay());
        }

        let from = settings
            .sender()
            .parse::<Mailbox>()
            .with_context(|| format!("`{}` is not a valid sender address", settings.sender()))?;

        info!("Connected to SMTP relay {}", settings.relay());
        Ok(Self {
            transport: Some(transport),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP connection is already closed"))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>().with_context(|| format!("`{to}` is not a valid address"))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("Could not build email")?;

        transport
            .send(&email)
            .with_context(|| format!("Could not send email to {to}"))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.transport.take().is_some() {
            info!("SMTP connection closed");
        }
        Ok(())
    }
}

/// Who is grading, and how submitters are addressed.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EmailSettings {
    /// Course token of the grader.
    #[builder(setter(into))]
    course:         String,
    /// Section token of the grader.
    #[builder(setter(into))]
    section:        String,
    /// Identity of the person sending, used in the subject line.
    #[builder(setter(into))]
    sender:         String,
    /// Mail domain appended to submitter ids.
    #[builder(setter(into))]
    domain:         String,
    /// Policy for submitters without a recorded preference.
    #[builder(default)]
    default_policy: DispatchPolicy,
    /// Recorded preferences, if a file was found.
    #[builder(default)]
    preferences:    Option<Preferences>,
}

impl EmailSettings {
    /// Policy for `submitter`.
    pub fn policy_for(&self, submitter: &str) -> DispatchPolicy {
        self.preferences
            .as_ref()
            .and_then(|p| p.lookup(&self.course, &self.section, submitter))
            .unwrap_or(self.default_policy)
    }

    /// Subject line for every email in this run.
    pub fn subject(&self) -> String {
        format!("{}-{} email from {}", self.course, self.section, self.sender)
    }

    /// Address of `submitter`.
    pub fn address_for(&self, submitter: &str) -> String {
        format!("{submitter}@{}", self.domain)
    }
}

/// Emails long-form reports to submitters according to their policy.
pub struct EmailSink<M> {
    /// Addressing and policy settings.
    settings: EmailSettings,
    /// Transport, owned by this sink alone.
    mailer:   M,
}

impl<M: Mailer> EmailSink<M> {
    /// Creates a sink that sends through `mailer`.
    pub fn new(settings: EmailSettings, mailer: M) -> Self {
        Self { settings, mailer }
    }

    /// The mailer.
    pub fn mailer(&self) -> &M {
        &self.mailer
    }
}

impl<M: Mailer> ResultSink for EmailSink<M> {
    fn name(&self) -> &str {
        "email"
    }

    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()> {
        let subject = self.settings.subject();
        let mut failed = Vec::new();
        let mut sent = 0;

        for report in reports {
            let submitter = report.submitter_id();
            if !self.settings.policy_for(submitter).should_send(report) {
                continue;
            }

            let to = self.settings.address_for(submitter);
            match self.mailer.send(&to, &subject, &report.render(false)) {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!("Could not email {submitter}: {e:#}");
                    failed.push(submitter.to_string());
                }
            }
        }

        info!("Sent {sent} emails");
        if !failed.is_empty() {
            bail!("could not email {} submitter(s): {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.mailer.close()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::report::ScoreResult;

    #[derive(Default)]
    struct Outbox {
        sent:   Vec<(String, String, String)>,
        reject: Option<&'static str>,
        closed: bool,
    }

    impl Mailer for Outbox {
        fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.reject == Some(to) {
                bail!("mailbox unavailable");
            }
            self.sent.push((to.into(), subject.into(), body.into()));
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn report(id: &str, result: ScoreResult) -> ScoreReport {
        ScoreReport::builder()
            .submitter_id(id)
            .lab_number(1)
            .source_path(format!("labs/hw001_{id}.rhai"))
            .result(result)
            .build()
    }

    fn batch() -> Vec<ScoreReport> {
        vec![
            report("perfect", ScoreResult::graded(100.0, Some(BTreeMap::from([(1, true)])), None)),
            report("partial", ScoreResult::graded(0.0, Some(BTreeMap::from([(1, false)])), None)),
            report("broken", ScoreResult::failed("Syntax error")),
        ]
    }

    fn settings(default_policy: DispatchPolicy, preferences: Option<Preferences>) -> EmailSettings {
        EmailSettings::builder()
            .course("cs100")
            .section("h01")
            .sender("grader")
            .domain("example.edu")
            .default_policy(default_policy)
            .preferences(preferences)
            .build()
    }

    fn recipients(sink: &EmailSink<Outbox>) -> Vec<&str> {
        sink.mailer().sent.iter().map(|(to, ..)| to.as_str()).collect()
    }

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("always".parse::<DispatchPolicy>(), Ok(DispatchPolicy::Always));
        assert_eq!("INCORRECT".parse::<DispatchPolicy>(), Ok(DispatchPolicy::Incorrect));
        assert!("sometimes".parse::<DispatchPolicy>().is_err());
    }

    #[test]
    fn incorrect_policy_only_mails_imperfect_labs() {
        let mut sink = EmailSink::new(settings(DispatchPolicy::Incorrect, None), Outbox::default());
        sink.handle_batch(&batch()).expect("sends");
        assert_eq!(recipients(&sink), vec!["partial@example.edu", "broken@example.edu"]);

        let (_, subject, body) = &sink.mailer().sent[0];
        assert_eq!(subject, "cs100-h01 email from grader");
        assert!(body.contains("Question 1"));
    }

    #[test]
    fn preferences_override_the_default() {
        let preferences: Preferences = serde_json::from_str(
            r#"{"cs100": {"h01": {"perfect": "ALWAYS", "broken": "NEVER"}}}"#,
        )
        .expect("parses");
        let mut sink =
            EmailSink::new(settings(DispatchPolicy::Never, Some(preferences)), Outbox::default());
        sink.handle_batch(&batch()).expect("sends");
        assert_eq!(recipients(&sink), vec!["perfect@example.edu"]);
    }

    #[test]
    fn one_failed_recipient_does_not_stop_the_rest() {
        let outbox = Outbox {
            reject: Some("partial@example.edu"),
            ..Outbox::default()
        };
        let mut sink = EmailSink::new(settings(DispatchPolicy::Always, None), outbox);
        let error = sink.handle_batch(&batch()).expect_err("reports the failure");
        assert!(error.to_string().contains("partial"));
        assert_eq!(recipients(&sink), vec!["perfect@example.edu", "broken@example.edu"]);

        sink.shutdown().expect("closes");
        assert!(sink.mailer().closed);
    }
}
