//! Postgres-backed template store (new schema only).
//!
//! Template types live in a scenario lookup table keyed by
//! (type_key, channel, tenant_id); organization- and application-scoped
//! templates live in separate tables foreign-keyed through it. Content is
//! persisted as the JSON content array in a binary column under a schema
//! version tag. Existence checks resolve type to type id first and then
//! probe the template row, mirroring the normalization rules.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::debug;

use super::{
    decode_content, encode_content, TemplatePersistenceManager, CONTENT_SCHEMA_VERSION,
};
use crate::models::{
    NotificationChannel, NotificationTemplate, NotificationTemplateType, TemplateError,
};

/// Create the connection pool for the template database.
pub async fn create_template_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    tracing::info!("connecting to template database");
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

const ORG_TABLE: &str = "notification_org_template";
const APP_TABLE: &str = "notification_app_template";

/// Table for the requested scope. The two names are a fixed internal
/// allowlist; no caller input reaches the SQL text.
pub(crate) fn template_table(app_id: Option<&str>) -> &'static str {
    match app_id {
        Some(_) => APP_TABLE,
        None => ORG_TABLE,
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TemplateRow {
    pub locale: String,
    pub content: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub footer: Option<String>,
    pub display_name: String,
}

impl TemplateRow {
    /// Template skeleton without content fields; the caller decides which
    /// schema representation (blob or legacy columns) to decode.
    pub(crate) fn skeleton(&self, channel: NotificationChannel) -> NotificationTemplate {
        let mut template =
            NotificationTemplate::new(self.display_name.clone(), self.locale.clone(), channel);
        template.content_type = self.content_type.clone().unwrap_or_default();
        template
    }

    /// Decode the content blob into the template.
    pub(crate) fn decode_blob(
        &self,
        channel: NotificationChannel,
    ) -> Result<NotificationTemplate, TemplateError> {
        let mut template = self.skeleton(channel);
        let blob = self.content.as_deref().ok_or_else(|| {
            TemplateError::CorruptContent(format!(
                "template row '{}' of type '{}' has no content blob",
                self.locale, self.display_name
            ))
        })?;
        let (subject, body, footer) = decode_content(blob)?;
        template.subject = subject.unwrap_or_default();
        template.body = body.unwrap_or_default();
        template.footer = footer.unwrap_or_default();
        Ok(template)
    }
}

const ROW_COLUMNS: &str =
    "t.locale, t.content, t.content_type, t.subject, t.body, t.footer, s.display_name";

/// Template store over the relational schema, new representation only.
pub struct DbTemplateStore {
    pool: PgPool,
}

impl DbTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Step one of every template lookup: scenario row for the type.
    pub(crate) async fn resolve_type_id(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<i32>, TemplateError> {
        let id: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT id FROM notification_template_type
            WHERE type_key = $1 AND channel = $2 AND tenant_id = $3
            "#,
        )
        .bind(type_key)
        .bind(channel.as_str())
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Resolve the type id, inserting the scenario row when absent so a
    /// template can be added without a prior `add_template_type` call.
    pub(crate) async fn resolve_or_create_type_id(
        &self,
        template: &NotificationTemplate,
        tenant_id: i32,
    ) -> Result<i32, TemplateError> {
        if let Some(id) = self
            .resolve_type_id(&template.type_key, template.channel, tenant_id)
            .await?
        {
            return Ok(id);
        }
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO notification_template_type (type_key, display_name, channel, tenant_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (type_key, channel, tenant_id)
                DO UPDATE SET type_key = EXCLUDED.type_key
            RETURNING id
            "#,
        )
        .bind(&template.type_key)
        .bind(&template.display_name)
        .bind(template.channel.as_str())
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub(crate) async fn fetch_row(
        &self,
        locale: &str,
        type_id: i32,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<TemplateRow>, TemplateError> {
        let table = template_table(app_id);
        let row = match app_id {
            Some(app) => {
                let sql = format!(
                    r#"
                    SELECT {ROW_COLUMNS}
                    FROM {table} t
                    JOIN notification_template_type s ON s.id = t.type_id
                    WHERE t.template_key = $1 AND t.type_id = $2
                      AND t.tenant_id = $3 AND t.app_id = $4
                    "#
                );
                sqlx::query_as::<_, TemplateRow>(&sql)
                    .bind(locale.to_lowercase())
                    .bind(type_id)
                    .bind(tenant_id)
                    .bind(app)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {ROW_COLUMNS}
                    FROM {table} t
                    JOIN notification_template_type s ON s.id = t.type_id
                    WHERE t.template_key = $1 AND t.type_id = $2 AND t.tenant_id = $3
                    "#
                );
                sqlx::query_as::<_, TemplateRow>(&sql)
                    .bind(locale.to_lowercase())
                    .bind(type_id)
                    .bind(tenant_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row)
    }

    pub(crate) async fn fetch_rows_of_type(
        &self,
        type_id: i32,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<TemplateRow>, TemplateError> {
        let table = template_table(app_id);
        let rows = match app_id {
            Some(app) => {
                let sql = format!(
                    r#"
                    SELECT {ROW_COLUMNS}
                    FROM {table} t
                    JOIN notification_template_type s ON s.id = t.type_id
                    WHERE t.type_id = $1 AND t.tenant_id = $2 AND t.app_id = $3
                    "#
                );
                sqlx::query_as::<_, TemplateRow>(&sql)
                    .bind(type_id)
                    .bind(tenant_id)
                    .bind(app)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {ROW_COLUMNS}
                    FROM {table} t
                    JOIN notification_template_type s ON s.id = t.type_id
                    WHERE t.type_id = $1 AND t.tenant_id = $2
                    "#
                );
                sqlx::query_as::<_, TemplateRow>(&sql)
                    .bind(type_id)
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Insert or overwrite a template row. `overwrite` distinguishes add
    /// (duplicate is a client error) from update (missing is a client
    /// error); the probe has already been done by the caller.
    async fn write_row(
        &self,
        template: &NotificationTemplate,
        type_id: i32,
        app_id: Option<&str>,
        tenant_id: i32,
        overwrite: bool,
        content: Option<&[u8]>,
        legacy: Option<(&str, &str, &str)>,
    ) -> Result<(), TemplateError> {
        let table = template_table(app_id);
        let (subject, body, footer) = match legacy {
            Some((s, b, f)) => (Some(s), Some(b), Some(f)),
            None => (None, None, None),
        };
        if overwrite {
            // A legacy-only update binds content as NULL; COALESCE leaves
            // any existing blob in place instead of clearing it.
            let sql = match app_id {
                Some(_) => format!(
                    r#"
                    UPDATE {table}
                    SET content = COALESCE($1, content), content_type = $2, subject = $3,
                        body = $4, footer = $5, schema_version = $6, updated_at = now()
                    WHERE template_key = $7 AND type_id = $8 AND tenant_id = $9 AND app_id = $10
                    "#
                ),
                None => format!(
                    r#"
                    UPDATE {table}
                    SET content = COALESCE($1, content), content_type = $2, subject = $3,
                        body = $4, footer = $5, schema_version = $6, updated_at = now()
                    WHERE template_key = $7 AND type_id = $8 AND tenant_id = $9
                    "#
                ),
            };
            let mut query = sqlx::query(&sql)
                .bind(content)
                .bind(&template.content_type)
                .bind(subject)
                .bind(body)
                .bind(footer)
                .bind(CONTENT_SCHEMA_VERSION)
                .bind(template.locale_key())
                .bind(type_id)
                .bind(tenant_id);
            if let Some(app) = app_id {
                query = query.bind(app);
            }
            query.execute(&self.pool).await?;
        } else {
            let sql = match app_id {
                Some(_) => format!(
                    r#"
                    INSERT INTO {table}
                        (template_key, locale, content, content_type, subject, body, footer,
                         schema_version, type_id, tenant_id, app_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#
                ),
                None => format!(
                    r#"
                    INSERT INTO {table}
                        (template_key, locale, content, content_type, subject, body, footer,
                         schema_version, type_id, tenant_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#
                ),
            };
            let mut query = sqlx::query(&sql)
                .bind(template.locale_key())
                .bind(&template.locale)
                .bind(content)
                .bind(&template.content_type)
                .bind(subject)
                .bind(body)
                .bind(footer)
                .bind(CONTENT_SCHEMA_VERSION)
                .bind(type_id)
                .bind(tenant_id);
            if let Some(app) = app_id {
                query = query.bind(app);
            }
            query.execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Shared add path: validate, resolve type, probe for duplicates, then
    /// write whichever schema representation the caller selected.
    pub(crate) async fn add_with_content(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
        content: Option<&[u8]>,
        legacy: Option<(&str, &str, &str)>,
    ) -> Result<(), TemplateError> {
        template.validate()?;
        let type_id = self.resolve_or_create_type_id(template, tenant_id).await?;
        let exists = self
            .fetch_row(&template.locale, type_id, app_id, tenant_id)
            .await?
            .is_some();
        if exists {
            return Err(TemplateError::TemplateAlreadyExists {
                type_key: template.type_key.clone(),
                locale: template.locale.clone(),
            });
        }
        debug!(
            tenant_id,
            type_key = template.type_key.as_str(),
            locale = template.locale.as_str(),
            "inserting notification template row"
        );
        self.write_row(template, type_id, app_id, tenant_id, false, content, legacy)
            .await
    }

    /// Shared update path, full overwrite of content fields.
    pub(crate) async fn update_with_content(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
        content: Option<&[u8]>,
        legacy: Option<(&str, &str, &str)>,
    ) -> Result<(), TemplateError> {
        template.validate()?;
        let type_id = self
            .resolve_type_id(&template.type_key, template.channel, tenant_id)
            .await?
            .ok_or_else(|| TemplateError::TypeNotFound(template.type_key.clone()))?;
        let exists = self
            .fetch_row(&template.locale, type_id, app_id, tenant_id)
            .await?
            .is_some();
        if !exists {
            return Err(TemplateError::TemplateNotFound {
                type_key: template.type_key.clone(),
                locale: template.locale.clone(),
            });
        }
        self.write_row(template, type_id, app_id, tenant_id, true, content, legacy)
            .await
    }

    pub(crate) async fn delete_row(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let Some(type_id) = self.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(()); // idempotent
        };
        let table = template_table(app_id);
        match app_id {
            Some(app) => {
                let sql = format!(
                    "DELETE FROM {table} WHERE template_key = $1 AND type_id = $2 AND tenant_id = $3 AND app_id = $4"
                );
                sqlx::query(&sql)
                    .bind(locale.to_lowercase())
                    .bind(type_id)
                    .bind(tenant_id)
                    .bind(app)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                let sql = format!(
                    "DELETE FROM {table} WHERE template_key = $1 AND type_id = $2 AND tenant_id = $3"
                );
                sqlx::query(&sql)
                    .bind(locale.to_lowercase())
                    .bind(type_id)
                    .bind(tenant_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn delete_rows_of_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let Some(type_id) = self.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(());
        };
        let table = template_table(app_id);
        match app_id {
            Some(app) => {
                let sql = format!(
                    "DELETE FROM {table} WHERE type_id = $1 AND tenant_id = $2 AND app_id = $3"
                );
                sqlx::query(&sql)
                    .bind(type_id)
                    .bind(tenant_id)
                    .bind(app)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                let sql = format!("DELETE FROM {table} WHERE type_id = $1 AND tenant_id = $2");
                sqlx::query(&sql)
                    .bind(type_id)
                    .bind(tenant_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn fetch_all_org_rows(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<TemplateRow>, TemplateError> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT t.locale, t.content, t.content_type, t.subject, t.body, t.footer,
                   s.display_name
            FROM notification_org_template t
            JOIN notification_template_type s ON s.id = t.type_id
            WHERE s.channel = $1 AND t.tenant_id = $2
            "#,
        )
        .bind(channel.as_str())
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TemplatePersistenceManager for DbTemplateStore {
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let template_type = NotificationTemplateType::new(display_name, channel);
        template_type.validate()?;
        let type_key = template_type.type_key();
        if self
            .resolve_type_id(&type_key, channel, tenant_id)
            .await?
            .is_some()
        {
            return Err(TemplateError::TypeAlreadyExists {
                display_name: display_name.to_string(),
                channel: channel.to_string(),
            });
        }
        sqlx::query(
            r#"
            INSERT INTO notification_template_type (type_key, display_name, channel, tenant_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&type_key)
        .bind(display_name)
        .bind(channel.as_str())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        let name: Option<String> = sqlx::query_scalar(
            r#"
            SELECT display_name FROM notification_template_type
            WHERE type_key = $1 AND channel = $2 AND tenant_id = $3
            "#,
        )
        .bind(type_key)
        .bind(channel.as_str())
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }

    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT display_name FROM notification_template_type
            WHERE channel = $1 AND tenant_id = $2
            "#,
        )
        .bind(channel.as_str())
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        // templates cascade through the type_id foreign key
        sqlx::query(
            r#"
            DELETE FROM notification_template_type
            WHERE type_key = $1 AND channel = $2 AND tenant_id = $3
            "#,
        )
        .bind(type_key)
        .bind(channel.as_str())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let content = encode_content(template);
        self.add_with_content(template, app_id, tenant_id, Some(&content), None)
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
        let Some(type_id) = self.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(None);
        };
        let Some(row) = self.fetch_row(locale, type_id, app_id, tenant_id).await? else {
            return Ok(None);
        };
        Ok(Some(row.decode_blob(channel)?))
    }

    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        let Some(type_id) = self.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(false);
        };
        Ok(self
            .fetch_row(locale, type_id, app_id, tenant_id)
            .await?
            .is_some())
    }

    async fn list_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let Some(type_id) = self.resolve_type_id(type_key, channel, tenant_id).await? else {
            return Ok(Vec::new());
        };
        let rows = self.fetch_rows_of_type(type_id, app_id, tenant_id).await?;
        rows.iter().map(|row| row.decode_blob(channel)).collect()
    }

    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let rows = self.fetch_all_org_rows(channel, tenant_id).await?;
        rows.iter().map(|row| row.decode_blob(channel)).collect()
    }

    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let content = encode_content(template);
        self.update_with_content(template, app_id, tenant_id, Some(&content), None)
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
        self.delete_row(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.delete_rows_of_type(type_key, channel, app_id, tenant_id)
            .await
    }
}
