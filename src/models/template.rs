//! Domain models for notification templates and template types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TemplateError;

/// Delivery medium of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "EMAIL",
            NotificationChannel::Sms => "SMS",
            NotificationChannel::Push => "PUSH",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Ok(NotificationChannel::Email),
            "SMS" => Ok(NotificationChannel::Sms),
            "PUSH" => Ok(NotificationChannel::Push),
            other => Err(TemplateError::Validation(format!(
                "unknown notification channel '{other}'"
            ))),
        }
    }
}

/// Ownership tier of a template, ordered by resolution precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateScope {
    /// Tenant + application override. Highest precedence.
    Application(String),
    /// Tenant-level custom template.
    Organization,
    /// Compiled-in defaults. Read-only, not tenant scoped.
    System,
}

/// Normalize a template type display name into its storage key:
/// lower-cased with all whitespace stripped. Distinct display names that
/// collide after normalization are indistinguishable in storage.
pub fn normalize_type_key(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// A named notification category for one channel, independent of locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplateType {
    pub display_name: String,
    pub channel: NotificationChannel,
}

impl NotificationTemplateType {
    pub fn new(display_name: impl Into<String>, channel: NotificationChannel) -> Self {
        Self {
            display_name: display_name.into(),
            channel,
        }
    }

    /// Storage key derived from the display name.
    pub fn type_key(&self) -> String {
        normalize_type_key(&self.display_name)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.display_name.trim().is_empty() {
            return Err(TemplateError::Validation(
                "template type display name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// One localized rendering of a notification type.
///
/// Identity key: (tenant, channel, type_key, lowercase locale, [app_id]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    /// Normalized template type key, e.g. "passwordreset".
    pub type_key: String,
    /// Human label of the type, e.g. "PasswordReset".
    pub display_name: String,
    /// Locale tag, e.g. "en_US".
    pub locale: String,
    pub channel: NotificationChannel,
    /// Required non-blank for EMAIL; must be empty for SMS.
    pub subject: String,
    pub body: String,
    /// Required non-blank for EMAIL; must be empty for SMS.
    pub footer: String,
    /// MIME type of the body, email only.
    pub content_type: String,
}

impl NotificationTemplate {
    pub fn new(
        display_name: impl Into<String>,
        locale: impl Into<String>,
        channel: NotificationChannel,
    ) -> Self {
        let display_name = display_name.into();
        Self {
            type_key: normalize_type_key(&display_name),
            display_name,
            locale: locale.into(),
            channel,
            subject: String::new(),
            body: String::new(),
            footer: String::new(),
            content_type: String::new(),
        }
    }

    /// Lower-cased locale, the form used in storage keys.
    pub fn locale_key(&self) -> String {
        self.locale.to_lowercase()
    }

    /// Channel-dependent invariants. EMAIL needs subject, body and footer;
    /// SMS carries only a body; PUSH needs a body.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.display_name.trim().is_empty() {
            return Err(TemplateError::Validation(
                "template display name must not be blank".to_string(),
            ));
        }
        if self.locale.trim().is_empty() {
            return Err(TemplateError::Validation(format!(
                "locale must not be blank for template type '{}'",
                self.display_name
            )));
        }
        match self.channel {
            NotificationChannel::Email => {
                if self.subject.trim().is_empty()
                    || self.body.trim().is_empty()
                    || self.footer.trim().is_empty()
                {
                    return Err(TemplateError::Validation(format!(
                        "email template '{}' ({}) requires subject, body and footer",
                        self.display_name, self.locale
                    )));
                }
            }
            NotificationChannel::Sms => {
                if self.body.trim().is_empty() {
                    return Err(TemplateError::Validation(format!(
                        "sms template '{}' ({}) requires a body",
                        self.display_name, self.locale
                    )));
                }
                if !self.subject.is_empty() || !self.footer.is_empty() {
                    return Err(TemplateError::Validation(format!(
                        "sms template '{}' ({}) must not carry a subject or footer",
                        self.display_name, self.locale
                    )));
                }
            }
            NotificationChannel::Push => {
                if self.body.trim().is_empty() {
                    return Err(TemplateError::Validation(format!(
                        "push template '{}' ({}) requires a body",
                        self.display_name, self.locale
                    )));
                }
            }
        }
        Ok(())
    }

    /// Content equality used by the default-collapse policy: a submitted
    /// template that matches the system default byte-for-byte in every
    /// content field is not worth persisting.
    pub fn same_content(&self, other: &NotificationTemplate) -> bool {
        self.subject == other.subject
            && self.body == other.body
            && self.footer == other.footer
            && self.content_type == other.content_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_template() -> NotificationTemplate {
        let mut t = NotificationTemplate::new("Password Reset", "en_US", NotificationChannel::Email);
        t.subject = "Reset your password".to_string();
        t.body = "Click the link".to_string();
        t.footer = "Team".to_string();
        t.content_type = "text/html".to_string();
        t
    }

    #[test]
    fn type_key_is_normalized() {
        let t = email_template();
        assert_eq!(t.type_key, "passwordreset");
        assert_eq!(normalize_type_key("  Account  Lock "), "accountlock");
    }

    #[test]
    fn template_type_validates_and_derives_its_key() {
        let tt = NotificationTemplateType::new("Password Reset", NotificationChannel::Email);
        assert!(tt.validate().is_ok());
        assert_eq!(tt.type_key(), "passwordreset");

        let blank = NotificationTemplateType::new("   ", NotificationChannel::Email);
        assert!(matches!(blank.validate(), Err(TemplateError::Validation(_))));
    }

    #[test]
    fn email_template_requires_all_content_fields() {
        let mut t = email_template();
        assert!(t.validate().is_ok());
        t.body = "  ".to_string();
        assert!(matches!(t.validate(), Err(TemplateError::Validation(_))));
    }

    #[test]
    fn sms_template_rejects_subject_and_footer() {
        let mut t = NotificationTemplate::new("OTP", "en_US", NotificationChannel::Sms);
        t.body = "Your code is {{code}}".to_string();
        assert!(t.validate().is_ok());
        t.subject = "code".to_string();
        assert!(matches!(t.validate(), Err(TemplateError::Validation(_))));
    }

    #[test]
    fn blank_locale_is_a_client_error() {
        let mut t = email_template();
        t.locale = " ".to_string();
        let err = t.validate().unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn channel_parse_round_trip() {
        for channel in [
            NotificationChannel::Email,
            NotificationChannel::Sms,
            NotificationChannel::Push,
        ] {
            assert_eq!(channel.as_str().parse::<NotificationChannel>().unwrap(), channel);
        }
        assert!("smoke".parse::<NotificationChannel>().is_err());
    }
}
