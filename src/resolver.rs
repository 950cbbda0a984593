//! Unified tiered template resolution.
//!
//! The façade callers go through: lookups try the application scope, then
//! the organization scope, then the compiled-in system defaults. Writes
//! apply the default-collapse policy: an override whose content equals
//! the system default is not persisted (and an existing one is deleted),
//! since resolution would return the same bytes anyway.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::defaults::SystemDefaults;
use crate::models::{NotificationChannel, NotificationTemplate, TemplateError, TemplateScope};
use crate::persistence::TemplatePersistenceManager;

pub struct UnifiedTemplateManager {
    store: Arc<dyn TemplatePersistenceManager>,
    defaults: Arc<SystemDefaults>,
}

impl UnifiedTemplateManager {
    pub fn new(store: Arc<dyn TemplatePersistenceManager>, defaults: Arc<SystemDefaults>) -> Self {
        Self { store, defaults }
    }

    /// Resolve a template through the scope ladder:
    /// application (when `app_id` is given) → organization → system
    /// default. Absence everywhere is `Ok(None)`.
    pub async fn resolve_template(
        &self,
        type_key: &str,
        locale: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError> {
        Ok(self
            .resolve_template_with_scope(type_key, locale, channel, app_id, tenant_id)
            .await?
            .map(|(template, _)| template))
    }

    /// Like [`resolve_template`](Self::resolve_template), additionally
    /// reporting which scope supplied the template.
    pub async fn resolve_template_with_scope(
        &self,
        type_key: &str,
        locale: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<(NotificationTemplate, TemplateScope)>, TemplateError> {
        if let Some(app) = app_id {
            if let Some(template) = self
                .store
                .get_template(locale, type_key, channel, Some(app), tenant_id)
                .await?
            {
                return Ok(Some((template, TemplateScope::Application(app.to_string()))));
            }
        }
        if let Some(template) = self
            .store
            .get_template(locale, type_key, channel, None, tenant_id)
            .await?
        {
            return Ok(Some((template, TemplateScope::Organization)));
        }
        Ok(self
            .defaults
            .get(type_key, locale, channel)
            .cloned()
            .map(|template| (template, TemplateScope::System)))
    }

    /// Upsert with default collapse. A template whose content equals the
    /// system default is treated as "reset to default": any persisted
    /// override at this scope is deleted instead of storing a redundant
    /// copy; when none exists this is a silent no-op.
    pub async fn add_or_update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        template.validate()?;
        let exists = self
            .store
            .template_exists(
                &template.locale,
                &template.type_key,
                template.channel,
                app_id,
                tenant_id,
            )
            .await?;

        let matches_default = self
            .defaults
            .get(&template.type_key, &template.locale, template.channel)
            .is_some_and(|d| template.same_content(d));
        if matches_default {
            if exists {
                debug!(
                    tenant_id,
                    type_key = template.type_key.as_str(),
                    locale = template.locale.as_str(),
                    "submitted template equals the system default, deleting override"
                );
                self.store
                    .delete_template(
                        &template.locale,
                        &template.type_key,
                        template.channel,
                        app_id,
                        tenant_id,
                    )
                    .await?;
            }
            return Ok(());
        }

        if exists {
            self.store
                .update_template(template, app_id, tenant_id)
                .await
        } else {
            self.store.add_template(template, app_id, tenant_id).await
        }
    }

    /// All templates of one type: persisted entries of the requested scope
    /// chain unioned with the system defaults, deduplicated by
    /// (type, locale) with higher scopes winning.
    pub async fn list_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let mut merged = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        if let Some(app) = app_id {
            let app_templates = self
                .store
                .list_templates(type_key, channel, Some(app), tenant_id)
                .await?;
            merge_into(&mut merged, &mut seen, app_templates);
        }
        let org_templates = self
            .store
            .list_templates(type_key, channel, None, tenant_id)
            .await?;
        merge_into(&mut merged, &mut seen, org_templates);
        merge_into(
            &mut merged,
            &mut seen,
            self.defaults
                .of_type(type_key, channel)
                .into_iter()
                .cloned()
                .collect(),
        );
        Ok(merged)
    }

    /// Every template of the channel visible to the tenant: organization
    /// entries plus system defaults not overridden by them.
    pub async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let mut merged = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        merge_into(
            &mut merged,
            &mut seen,
            self.store.list_all_templates(channel, tenant_id).await?,
        );
        merge_into(&mut merged, &mut seen, self.defaults.all(channel).to_vec());
        Ok(merged)
    }

    pub async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .add_template_type(display_name, channel, tenant_id)
            .await
    }

    pub async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        match self
            .store
            .get_template_type(type_key, channel, tenant_id)
            .await?
        {
            Some(name) => Ok(Some(name)),
            None => Ok(self
                .defaults
                .type_display_names(channel)
                .into_iter()
                .find(|n| crate::models::normalize_type_key(n) == type_key)),
        }
    }

    /// Persisted type names merged with the default catalogue.
    pub async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        let mut names = self.store.list_template_types(channel, tenant_id).await?;
        for name in self.defaults.type_display_names(channel) {
            if !names.iter().any(|n| {
                crate::models::normalize_type_key(n) == crate::models::normalize_type_key(&name)
            }) {
                names.push(name);
            }
        }
        Ok(names)
    }

    pub async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .delete_template_type(type_key, channel, tenant_id)
            .await
    }

    pub async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store.add_template(template, app_id, tenant_id).await
    }

    pub async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        self.store
            .template_exists(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    pub async fn delete_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .delete_template(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    pub async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .delete_templates(type_key, channel, app_id, tenant_id)
            .await
    }
}

fn merge_into(
    merged: &mut Vec<NotificationTemplate>,
    seen: &mut HashSet<(String, String)>,
    templates: Vec<NotificationTemplate>,
) {
    for template in templates {
        let key = (template.type_key.clone(), template.locale_key());
        if seen.insert(key) {
            merged.push(template);
        }
    }
}
