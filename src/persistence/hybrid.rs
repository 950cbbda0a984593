//! Migration-era template store over the dual-representation schema.
//!
//! The same tables carry both the content blob (new representation) and the
//! legacy plain-text subject/body/footer columns. Which of them is written
//! and read is a deployment-time storage mode fixed at construction; the
//! reader is a pure function of that mode, never of per-record metadata.
//! This supports online schema migration: a `Hybrid` writer maintains both
//! representations during the transition window.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::debug;

use super::database::{DbTemplateStore, TemplateRow};
use super::{decode_content, encode_content, TemplatePersistenceManager};
use crate::models::{NotificationChannel, NotificationTemplate, TemplateError};

/// Dual-schema storage mode, selected once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// New representation only: write and read the content blob.
    #[default]
    UnicodeSupported,
    /// Transition window: write blob and legacy columns, read blob first
    /// and fall back to the legacy columns when the blob is absent or
    /// decodes to all-null fields.
    Hybrid,
    /// Legacy representation only: plain-text columns, blob untouched.
    WithoutUnicode,
}

impl StorageMode {
    /// Total mapping from the configuration value; unrecognized, blank or
    /// unset input selects the default.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("hybrid") => StorageMode::Hybrid,
            Some(v) if v.eq_ignore_ascii_case("without-unicode") => StorageMode::WithoutUnicode,
            _ => StorageMode::UnicodeSupported,
        }
    }
}

/// Template store that reads old and new schema representations
/// transparently according to the configured [`StorageMode`].
pub struct HybridTemplateStore {
    db: DbTemplateStore,
    mode: StorageMode,
}

impl HybridTemplateStore {
    pub fn new(pool: PgPool, mode: StorageMode) -> Self {
        Self {
            db: DbTemplateStore::new(pool),
            mode,
        }
    }

    fn representations<'a>(
        &self,
        template: &'a NotificationTemplate,
        blob: &'a [u8],
    ) -> (Option<&'a [u8]>, Option<(&'a str, &'a str, &'a str)>) {
        let legacy = (
            template.subject.as_str(),
            template.body.as_str(),
            template.footer.as_str(),
        );
        match self.mode {
            StorageMode::UnicodeSupported => (Some(blob), None),
            StorageMode::Hybrid => (Some(blob), Some(legacy)),
            StorageMode::WithoutUnicode => (None, Some(legacy)),
        }
    }
}

fn decode_legacy_row(row: &TemplateRow, channel: NotificationChannel) -> NotificationTemplate {
    let mut template = row.skeleton(channel);
    template.subject = row.subject.clone().unwrap_or_default();
    template.body = row.body.clone().unwrap_or_default();
    template.footer = row.footer.clone().unwrap_or_default();
    template
}

fn decode_row(
    mode: StorageMode,
    row: &TemplateRow,
    channel: NotificationChannel,
) -> Result<NotificationTemplate, TemplateError> {
    match mode {
        StorageMode::UnicodeSupported => row.decode_blob(channel),
        StorageMode::WithoutUnicode => Ok(decode_legacy_row(row, channel)),
        StorageMode::Hybrid => {
            let decoded = row
                .content
                .as_deref()
                .map(decode_content)
                .transpose()?
                .unwrap_or((None, None, None));
            if let (None, None, None) = decoded {
                // blob absent or all-null: this row predates the
                // unicode-supported writer
                debug!(
                    locale = row.locale.as_str(),
                    "falling back to legacy template columns"
                );
                return Ok(decode_legacy_row(row, channel));
            }
            let mut template = row.skeleton(channel);
            let (subject, body, footer) = decoded;
            template.subject = subject.unwrap_or_default();
            template.body = body.unwrap_or_default();
            template.footer = footer.unwrap_or_default();
            Ok(template)
        }
    }
}

#[async_trait]
impl TemplatePersistenceManager for HybridTemplateStore {
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.db
            .add_template_type(display_name, channel, tenant_id)
            .await
    }

    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        self.db.get_template_type(type_key, channel, tenant_id).await
    }

    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        self.db.list_template_types(channel, tenant_id).await
    }

    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.db
            .delete_template_type(type_key, channel, tenant_id)
            .await
    }

    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let blob = encode_content(template);
        let (content, legacy) = self.representations(template, &blob);
        self.db
            .add_with_content(template, app_id, tenant_id, content, legacy)
            .await
    }

    async fn get_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError> {
        let Some(type_id) = self.db.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(None);
        };
        let Some(row) = self.db.fetch_row(locale, type_id, app_id, tenant_id).await? else {
            return Ok(None);
        };
        Ok(Some(decode_row(self.mode, &row, channel)?))
    }

    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        self.db
            .template_exists(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    async fn list_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let Some(type_id) = self.db.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(Vec::new());
        };
        let rows = self
            .db
            .fetch_rows_of_type(type_id, app_id, tenant_id)
            .await?;
        rows.iter().map(|row| decode_row(self.mode, row, channel)).collect()
    }

    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let rows = self.db.fetch_all_org_rows(channel, tenant_id).await?;
        rows.iter().map(|row| decode_row(self.mode, row, channel)).collect()
    }

    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let blob = encode_content(template);
        let (content, legacy) = self.representations(template, &blob);
        self.db
            .update_with_content(template, app_id, tenant_id, content, legacy)
            .await
    }

    async fn delete_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.db
            .delete_template(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.db
            .delete_templates(type_key, channel, app_id, tenant_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_mode_parsing_is_total() {
        assert_eq!(StorageMode::from_config(None), StorageMode::UnicodeSupported);
        assert_eq!(
            StorageMode::from_config(Some("")),
            StorageMode::UnicodeSupported
        );
        assert_eq!(
            StorageMode::from_config(Some("Hybrid")),
            StorageMode::Hybrid
        );
        assert_eq!(
            StorageMode::from_config(Some(" without-unicode ")),
            StorageMode::WithoutUnicode
        );
        assert_eq!(
            StorageMode::from_config(Some("carrier-pigeon")),
            StorageMode::UnicodeSupported
        );
    }

    fn row(content: Option<Vec<u8>>, legacy: Option<(&str, &str, &str)>) -> TemplateRow {
        TemplateRow {
            locale: "en_US".to_string(),
            content,
            content_type: Some("text/plain".to_string()),
            subject: legacy.map(|(s, _, _)| s.to_string()),
            body: legacy.map(|(_, b, _)| b.to_string()),
            footer: legacy.map(|(_, _, f)| f.to_string()),
            display_name: "Welcome".to_string(),
        }
    }

    #[test]
    fn hybrid_read_prefers_blob() {
        let blob = br#"["New subject","New body","New footer"]"#.to_vec();
        let row = row(Some(blob), Some(("old", "old", "old")));
        let t = decode_row(StorageMode::Hybrid, &row, NotificationChannel::Email).unwrap();
        assert_eq!(t.subject, "New subject");
        assert_eq!(t.body, "New body");
    }

    #[test]
    fn hybrid_read_falls_back_when_blob_is_all_null() {
        let row = row(
            Some(b"[null,null,null]".to_vec()),
            Some(("Old subject", "Old body", "Old footer")),
        );
        let t = decode_row(StorageMode::Hybrid, &row, NotificationChannel::Email).unwrap();
        assert_eq!(t.subject, "Old subject");
        assert_eq!(t.footer, "Old footer");
    }

    #[test]
    fn hybrid_read_falls_back_when_blob_is_missing() {
        let row = row(None, Some(("s", "b", "f")));
        let t = decode_row(StorageMode::Hybrid, &row, NotificationChannel::Email).unwrap();
        assert_eq!(t.body, "b");
    }

    #[test]
    fn without_unicode_ignores_the_blob() {
        let row = row(
            Some(br#"["blob","blob","blob"]"#.to_vec()),
            Some(("legacy", "legacy", "legacy")),
        );
        let t = decode_row(StorageMode::WithoutUnicode, &row, NotificationChannel::Email).unwrap();
        assert_eq!(t.subject, "legacy");
    }
}
