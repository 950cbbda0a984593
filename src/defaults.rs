//! Compiled-in system default templates.
//!
//! Loaded once at process start from bundled per-channel definition files
//! and then immutable; the resolver falls back to this set when no
//! application- or organization-scope override exists. Loading is best
//! effort: a missing file degrades to an empty set and a malformed entry
//! is skipped, so a bad bundle never blocks startup.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::models::{NotificationChannel, NotificationTemplate};

const EMAIL_DEFAULTS_FILE: &str = "email_templates.json";
const SMS_DEFAULTS_FILE: &str = "sms_templates.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultTemplateEntry {
    display_name: String,
    locale: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    subject: String,
    body: String,
    #[serde(default)]
    footer: String,
}

/// Immutable set of system default templates, one list per channel.
#[derive(Debug, Default)]
pub struct SystemDefaults {
    email: Vec<NotificationTemplate>,
    sms: Vec<NotificationTemplate>,
}

impl SystemDefaults {
    /// Empty default set; tenants then only see their own templates.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_templates(templates: Vec<NotificationTemplate>) -> Self {
        let mut defaults = Self::default();
        for t in templates {
            match t.channel {
                NotificationChannel::Email => defaults.email.push(t),
                NotificationChannel::Sms => defaults.sms.push(t),
                // no bundled push defaults today
                NotificationChannel::Push => {}
            }
        }
        defaults
    }

    pub fn all(&self, channel: NotificationChannel) -> &[NotificationTemplate] {
        match channel {
            NotificationChannel::Email => &self.email,
            NotificationChannel::Sms => &self.sms,
            NotificationChannel::Push => &[],
        }
    }

    /// Default template for (type, locale, channel), matched on the
    /// normalized type key and case-insensitive locale.
    pub fn get(
        &self,
        type_key: &str,
        locale: &str,
        channel: NotificationChannel,
    ) -> Option<&NotificationTemplate> {
        let locale_key = locale.to_lowercase();
        self.all(channel)
            .iter()
            .find(|t| t.type_key == type_key && t.locale_key() == locale_key)
    }

    /// Templates of one type across locales.
    pub fn of_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
    ) -> Vec<&NotificationTemplate> {
        self.all(channel)
            .iter()
            .filter(|t| t.type_key == type_key)
            .collect()
    }

    /// Deduplicated display names of the default types for a channel.
    pub fn type_display_names(&self, channel: NotificationChannel) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for t in self.all(channel) {
            if !names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&t.display_name))
            {
                names.push(t.display_name.clone());
            }
        }
        names
    }
}

/// Load the bundled default-template definitions from `dir`.
pub fn load_system_defaults(dir: &Path) -> SystemDefaults {
    let mut templates = Vec::new();
    templates.extend(load_channel_file(
        &dir.join(EMAIL_DEFAULTS_FILE),
        NotificationChannel::Email,
    ));
    templates.extend(load_channel_file(
        &dir.join(SMS_DEFAULTS_FILE),
        NotificationChannel::Sms,
    ));
    SystemDefaults::from_templates(templates)
}

/// Parse one channel file, best effort: whatever parses is kept.
fn load_channel_file(path: &Path, channel: NotificationChannel) -> Vec<NotificationTemplate> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                path = %path.display(),
                channel = channel.as_str(),
                "default template file not readable, continuing with empty defaults: {e}"
            );
            return Vec::new();
        }
    };
    let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                path = %path.display(),
                "default template file is not a JSON array, continuing with empty defaults: {e}"
            );
            return Vec::new();
        }
    };

    let mut templates = Vec::new();
    for (index, value) in entries.into_iter().enumerate() {
        match serde_json::from_value::<DefaultTemplateEntry>(value) {
            Ok(entry) => {
                let mut template =
                    NotificationTemplate::new(entry.display_name, entry.locale, channel);
                template.subject = entry.subject;
                template.body = entry.body;
                template.footer = entry.footer;
                template.content_type = entry.content_type;
                if let Err(e) = template.validate() {
                    warn!(
                        path = %path.display(),
                        index,
                        "skipping invalid default template entry: {e}"
                    );
                    continue;
                }
                templates.push(template);
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    index,
                    "skipping malformed default template entry: {e}"
                );
            }
        }
    }
    templates
}
