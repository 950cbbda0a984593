//! Template persistence backends.
//!
//! `TemplatePersistenceManager` is the contract shared by the three
//! interchangeable stores: registry tree, database, and the migration-era
//! hybrid store. Callers never branch on the backend; the factory picks one
//! at startup and wraps it in the cache decorator and the unified resolver.

pub mod database;
pub mod hybrid;
pub mod registry;

use async_trait::async_trait;

use crate::models::{NotificationChannel, NotificationTemplate, TemplateError};

/// Storage contract for notification template types and templates.
///
/// Every method takes an explicit tenant id; application-scoped operations
/// pass `Some(app_id)`, organization-scoped ones pass `None`. Reads report
/// plain absence as `Ok(None)` / empty collections.
#[async_trait]
pub trait TemplatePersistenceManager: Send + Sync {
    /// Register a template type. Fails with `TypeAlreadyExists` when the
    /// normalized display name is already present for (tenant, channel).
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;

    /// Display name of a type, or `None`.
    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError>;

    /// Deduplicated display names of all types for (tenant, channel).
    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError>;

    /// Idempotent: deleting an absent type is not an error.
    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;

    /// Store a new template. Fails with `TemplateAlreadyExists` when the
    /// (locale, type, channel, app) key is already present at this scope.
    /// Creates the template type lazily if it is absent.
    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;

    async fn get_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError>;

    /// Side-effect-free existence probe.
    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError>;

    /// All locales of one type at this scope.
    async fn list_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError>;

    /// Every organization-scope template of the channel.
    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError>;

    /// Full overwrite of subject/body/footer/content_type. Fails with
    /// `TemplateNotFound` when the row is absent; upsert is the resolver's
    /// responsibility.
    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;

    /// Idempotent single delete.
    async fn delete_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;

    /// Idempotent bulk delete of all locales of one type at this scope.
    async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError>;
}

/// Persisted schema version tag for blob-encoded template content.
pub(crate) const CONTENT_SCHEMA_VERSION: &str = "v1";

/// Encode template content as the persisted wire format: a JSON array of
/// the three content fields, `[subject, body, footer]`.
pub(crate) fn encode_content(template: &NotificationTemplate) -> Vec<u8> {
    // serializing three strings cannot fail
    serde_json::to_vec(&[
        template.subject.as_str(),
        template.body.as_str(),
        template.footer.as_str(),
    ])
    .unwrap_or_default()
}

/// Decode the JSON content array. Anything other than a 3-element array of
/// strings/nulls is corrupt persisted state, a server error.
pub(crate) fn decode_content(
    bytes: &[u8],
) -> Result<(Option<String>, Option<String>, Option<String>), TemplateError> {
    let parts: Vec<Option<String>> = serde_json::from_slice(bytes).map_err(|e| {
        TemplateError::CorruptContent(format!("template content is not a JSON array: {e}"))
    })?;
    if parts.len() != 3 {
        return Err(TemplateError::CorruptContent(format!(
            "template content array has {} elements, expected 3",
            parts.len()
        )));
    }
    let mut it = parts.into_iter();
    Ok((
        it.next().flatten(),
        it.next().flatten(),
        it.next().flatten(),
    ))
}

/// Decode the legacy pipe-delimited `subject|body|footer` payload kept for
/// resources written before the JSON content array existed.
pub(crate) fn decode_legacy_content(raw: &str) -> (String, String, String) {
    let mut parts = raw.splitn(3, '|');
    let subject = parts.next().unwrap_or_default().to_string();
    let body = parts.next().unwrap_or_default().to_string();
    let footer = parts.next().unwrap_or_default().to_string();
    (subject, body, footer)
}
