//! Test message fixtures
//!
//! Builds small plain-text messages for driving the gateway and converts
//! them to and from their RFC 5322 byte form.
//!
//! ```
//! use davmail_testkit::fixture::{self, DEFAULT_RECIPIENT};
//!
//! let message = fixture::create_message(None).unwrap();
//! assert_eq!(message.recipient(), DEFAULT_RECIPIENT);
//!
//! let bytes = fixture::serialize(&message).unwrap();
//! let parsed = fixture::TestMessage::parse(&bytes).unwrap();
//! assert_eq!(parsed, message);
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeaderMap};
use std::io::Write;

pub const DEFAULT_RECIPIENT: &str = "test@test.local";
pub const DEFAULT_SUBJECT: &str = "Test subject";
pub const DEFAULT_BODY: &str = "Test message\n";

/// 2024-01-01T12:00:00Z, so serialized fixtures are byte-for-byte stable.
const FIXTURE_TIMESTAMP: i64 = 1_704_110_400;

/// A single-part plain-text message owned by one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    recipient: String,
    subject: String,
    body: String,
    date: DateTime<Utc>,
}

/// Build the standard fixture, addressed to `recipient` or to
/// [`DEFAULT_RECIPIENT`].
///
/// # Errors
///
/// Returns [`Error::InvalidRecipient`] if `recipient` is not a single
/// mailbox address.
pub fn create_message(recipient: Option<&str>) -> Result<TestMessage> {
    TestMessage::new(recipient.unwrap_or(DEFAULT_RECIPIENT))
}

/// The canonical byte form of `message`.
///
/// # Errors
///
/// Returns [`Error::Encoding`] for subjects that cannot be written as a
/// plain header.
pub fn serialize(message: &TestMessage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    message.write_to(&mut out)?;
    Ok(out)
}

impl TestMessage {
    /// Standard subject, body and date for `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecipient`] for anything but one mailbox.
    pub fn new(recipient: &str) -> Result<Self> {
        Ok(Self {
            recipient: validate_recipient(recipient)?,
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            date: DateTime::from_timestamp(FIXTURE_TIMESTAMP, 0).unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub const fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Write the message with CRLF line endings.
    ///
    /// Subjects must be single-line ASCII that reads back unchanged: no
    /// surrounding whitespace and no `=?` encoded-word marker. A non-ASCII
    /// body is sent as UTF-8 with `8bit` transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for a subject that would not survive
    /// [`TestMessage::parse`], or
    /// [`Error::Io`] if `out` fails.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        check_subject(&self.subject)?;

        let (charset, transfer_encoding) = if self.body.is_ascii() {
            ("us-ascii", "7bit")
        } else {
            ("utf-8", "8bit")
        };

        write!(out, "Date: {}\r\n", self.date.to_rfc2822())?;
        write!(out, "To: {}\r\n", self.recipient)?;
        write!(out, "Subject: {}\r\n", self.subject)?;
        out.write_all(b"MIME-Version: 1.0\r\n")?;
        write!(out, "Content-Type: text/plain; charset={charset}\r\n")?;
        write!(out, "Content-Transfer-Encoding: {transfer_encoding}\r\n")?;
        out.write_all(b"\r\n")?;
        out.write_all(to_crlf(&self.body).as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Read a message back from its byte form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the bytes are not a message with `To`,
    /// `Subject` and `Date` headers.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;
        let header = |name: &str| {
            parsed
                .headers
                .get_first_value(name)
                .ok_or_else(|| Error::Parse(format!("Missing {name} header")))
        };

        let recipient = validate_recipient(&header("To")?)?;
        let subject = header("Subject")?;
        let date = DateTime::parse_from_rfc2822(header("Date")?.trim())
            .map_err(|e| Error::Parse(format!("Invalid Date header: {e}")))?
            .with_timezone(&Utc);
        let body = parsed
            .get_body()
            .map_err(|e| Error::Parse(e.to_string()))?
            .replace("\r\n", "\n");

        Ok(Self {
            recipient,
            subject,
            body,
            date,
        })
    }
}

fn check_subject(subject: &str) -> Result<()> {
    let problem = if !subject.is_ascii() || subject.contains(['\r', '\n']) {
        "must be single-line ASCII"
    } else if subject.trim() != subject {
        "must not start or end with whitespace"
    } else if subject.contains("=?") {
        "must not contain an encoded-word marker"
    } else {
        return Ok(());
    };
    Err(Error::Encoding(format!("Subject {problem}: {subject:?}")))
}

fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Accept exactly one mailbox (optionally with a display name).
fn validate_recipient(recipient: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidRecipient {
        recipient: recipient.to_string(),
        reason: reason.to_string(),
    };

    if recipient.contains(['\r', '\n']) {
        return Err(invalid("line breaks are not allowed"));
    }

    let addresses = mailparse::addrparse(recipient).map_err(|e| invalid(&e.to_string()))?;
    match addresses.as_slice() {
        [MailAddr::Single(info)] => {
            let well_formed = info
                .addr
                .rsplit_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
            if well_formed {
                Ok(recipient.trim().to_string())
            } else {
                Err(invalid("not a mailbox address"))
            }
        }
        [] => Err(invalid("no address given")),
        [MailAddr::Group(_)] => Err(invalid("groups are not supported")),
        _ => Err(invalid("expected a single address")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn default_fixture() {
        let message = create_message(None).unwrap();
        assert_eq!(message.recipient(), "test@test.local");
        assert_eq!(message.subject(), "Test subject");
        assert_eq!(message.body(), "Test message\n");
        assert_eq!(message.date().timestamp(), FIXTURE_TIMESTAMP);
    }

    #[test]
    fn custom_recipient() {
        let message = create_message(Some("alice@example.com")).unwrap();
        assert_eq!(message.recipient(), "alice@example.com");
        assert_eq!(message.subject(), DEFAULT_SUBJECT);
    }

    #[test]
    fn display_name_recipient() {
        let message = create_message(Some("Alice <alice@example.com>")).unwrap();
        assert_eq!(message.recipient(), "Alice <alice@example.com>");
    }

    #[test]
    fn malformed_recipients_are_rejected() {
        for bad in [
            "",
            "not-an-address",
            "@example.com",
            "a@example.com, b@example.com",
            "a@example.com\r\nBcc: c@example.com",
        ] {
            let err = create_message(Some(bad)).unwrap_err();
            assert!(
                matches!(err, Error::InvalidRecipient { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn serialized_default_fixture() {
        let message = create_message(None).unwrap();
        let bytes = serialize(&message).unwrap();
        let expected = format!(
            "Date: {}\r\n\
             To: test@test.local\r\n\
             Subject: Test subject\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=us-ascii\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             Test message\r\n",
            message.date().to_rfc2822()
        );
        assert_eq!(as_text(&bytes), expected);
    }

    #[test]
    fn serialization_is_deterministic() {
        let a = serialize(&create_message(None).unwrap()).unwrap();
        let b = serialize(&create_message(None).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn body_line_endings_are_canonical() {
        let message = create_message(None)
            .unwrap()
            .with_body("one\ntwo\r\nthree\n");
        let bytes = serialize(&message).unwrap();
        assert!(as_text(&bytes).ends_with("\r\n\r\none\r\ntwo\r\nthree\r\n"));
    }

    #[test]
    fn non_ascii_subject_is_an_encoding_error() {
        let message = create_message(None).unwrap().with_subject("Grüße");
        assert!(matches!(serialize(&message), Err(Error::Encoding(_))));
    }

    #[test]
    fn multi_line_subject_is_an_encoding_error() {
        let message = create_message(None)
            .unwrap()
            .with_subject("a\r\nBcc: x@example.com");
        assert!(matches!(serialize(&message), Err(Error::Encoding(_))));
    }

    #[test]
    fn subjects_that_would_change_on_parse_are_rejected() {
        for subject in ["=?utf-8?q?caf=C3=A9?=", "Re: =?x", "  padded", "padded ", "\ttab"] {
            let message = create_message(None).unwrap().with_subject(subject);
            assert!(
                matches!(serialize(&message), Err(Error::Encoding(_))),
                "{subject:?} was accepted"
            );
        }
    }

    #[test]
    fn round_trip_keeps_punctuated_subject() {
        let subject = "a = b? [x] (y) =; \"quoted\"";
        let message = create_message(None).unwrap().with_subject(subject);
        let parsed = TestMessage::parse(&serialize(&message).unwrap()).unwrap();
        assert_eq!(parsed.subject(), subject);
    }

    #[test]
    fn utf8_body_declares_charset() {
        let message = create_message(None).unwrap().with_body("Grüße\n");
        let text = String::from_utf8(serialize(&message).unwrap()).unwrap();
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: 8bit\r\n"));
    }

    #[test]
    fn round_trip_default() {
        let message = create_message(None).unwrap();
        let parsed = TestMessage::parse(&serialize(&message).unwrap()).unwrap();
        assert_eq!(parsed.recipient(), message.recipient());
        assert_eq!(parsed.subject(), message.subject());
        assert_eq!(parsed.body(), message.body());
        assert_eq!(parsed, message);
    }

    #[test]
    fn round_trip_customized() {
        let message = create_message(Some("Bob <bob@example.com>"))
            .unwrap()
            .with_subject("Quarterly report")
            .with_body("Line one\nLine two\n");
        let parsed = TestMessage::parse(&serialize(&message).unwrap()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn parse_requires_headers() {
        let raw = b"To: a@example.com\r\nDate: Mon, 1 Jan 2024 12:00:00 +0000\r\n\r\nbody\r\n";
        let err = TestMessage::parse(raw).unwrap_err();
        assert!(matches!(err, Error::Parse(msg) if msg.contains("Subject")));
    }
}
