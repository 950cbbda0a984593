//! Registry-tree backed template store.
//!
//! Template types are represented as "directories" (collection resources)
//! and templates as leaf resources carrying properties plus the JSON content
//! array. The tree itself is an external collaborator consumed through the
//! narrow [`ResourceStore`] trait; an in-memory implementation ships with
//! the crate and is the unit-test substrate.
//!
//! Layout per channel:
//!
//! ```text
//! identity/email/{type_key}                     type collection
//! identity/email/{type_key}/{locale}            organization-scope template
//! identity/email/{type_key}/app/{app}/{locale}  application-scope template
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{decode_content, decode_legacy_content, encode_content, TemplatePersistenceManager};
use crate::models::{
    NotificationChannel, NotificationTemplate, NotificationTemplateType, TemplateError,
};

const PROP_TYPE_KEY: &str = "type";
const PROP_DISPLAY_NAME: &str = "displayName";
const PROP_LOCALE: &str = "locale";
const PROP_CONTENT_TYPE: &str = "contentType";

const MEDIA_TYPE_COLLECTION: &str = "application/vnd.registry.collection";
const MEDIA_TYPE_TEMPLATE: &str = "application/json";

/// A node in the resource tree.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub properties: HashMap<String, String>,
    pub content: Vec<u8>,
    pub media_type: String,
}

/// Narrow interface over the platform's registry resource tree.
///
/// Paths are `/`-separated, tenant-partitioned. Deleting an absent path is
/// a no-op; deleting a path removes the whole subtree under it.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn exists(&self, path: &str, tenant_id: i32) -> anyhow::Result<bool>;

    async fn get(&self, path: &str, tenant_id: i32) -> anyhow::Result<Option<Resource>>;

    async fn put(&self, path: &str, resource: Resource, tenant_id: i32) -> anyhow::Result<()>;

    async fn delete(&self, path: &str, tenant_id: i32) -> anyhow::Result<()>;

    /// Direct child paths of a collection, in no particular order.
    async fn list_children(&self, path: &str, tenant_id: i32) -> anyhow::Result<Vec<String>>;
}

/// Process-local resource tree. Used for tests and embedded deployments
/// without a backing registry service.
#[derive(Default)]
pub struct InMemoryResourceStore {
    nodes: DashMap<(i32, String), Resource>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn exists(&self, path: &str, tenant_id: i32) -> anyhow::Result<bool> {
        Ok(self.nodes.contains_key(&(tenant_id, path.to_string())))
    }

    async fn get(&self, path: &str, tenant_id: i32) -> anyhow::Result<Option<Resource>> {
        Ok(self
            .nodes
            .get(&(tenant_id, path.to_string()))
            .map(|r| r.clone()))
    }

    async fn put(&self, path: &str, resource: Resource, tenant_id: i32) -> anyhow::Result<()> {
        self.nodes.insert((tenant_id, path.to_string()), resource);
        Ok(())
    }

    async fn delete(&self, path: &str, tenant_id: i32) -> anyhow::Result<()> {
        let prefix = format!("{path}/");
        self.nodes
            .retain(|(t, p), _| *t != tenant_id || (p != path && !p.starts_with(&prefix)));
        Ok(())
    }

    async fn list_children(&self, path: &str, tenant_id: i32) -> anyhow::Result<Vec<String>> {
        let prefix = format!("{path}/");
        let children: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| {
                let (t, p) = entry.key();
                *t == tenant_id
                    && p.starts_with(&prefix)
                    && !p[prefix.len()..].contains('/')
            })
            .map(|entry| entry.key().1.clone())
            .collect();
        Ok(children)
    }
}

fn channel_base(channel: NotificationChannel) -> &'static str {
    match channel {
        NotificationChannel::Email => "identity/email",
        NotificationChannel::Sms => "identity/sms",
        NotificationChannel::Push => "identity/push",
    }
}

fn type_path(channel: NotificationChannel, type_key: &str) -> String {
    format!("{}/{}", channel_base(channel), type_key)
}

fn scope_path(channel: NotificationChannel, type_key: &str, app_id: Option<&str>) -> String {
    match app_id {
        Some(app) => format!("{}/app/{}", type_path(channel, type_key), app),
        None => type_path(channel, type_key),
    }
}

fn template_path(
    channel: NotificationChannel,
    type_key: &str,
    app_id: Option<&str>,
    locale: &str,
) -> String {
    format!(
        "{}/{}",
        scope_path(channel, type_key, app_id),
        locale.to_lowercase()
    )
}

/// Template store over a registry resource tree.
pub struct RegistryTemplateStore {
    store: Arc<dyn ResourceStore>,
}

impl RegistryTemplateStore {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    fn template_resource(template: &NotificationTemplate) -> Resource {
        let mut properties = HashMap::new();
        properties.insert(PROP_TYPE_KEY.to_string(), template.type_key.clone());
        properties.insert(
            PROP_DISPLAY_NAME.to_string(),
            template.display_name.clone(),
        );
        properties.insert(PROP_LOCALE.to_string(), template.locale.clone());
        properties.insert(
            PROP_CONTENT_TYPE.to_string(),
            template.content_type.clone(),
        );
        Resource {
            properties,
            content: encode_content(template),
            media_type: MEDIA_TYPE_TEMPLATE.to_string(),
        }
    }

    fn resource_to_template(
        resource: &Resource,
        channel: NotificationChannel,
        path: &str,
    ) -> Result<NotificationTemplate, TemplateError> {
        let prop = |key: &str| resource.properties.get(key).cloned().unwrap_or_default();
        let display_name = prop(PROP_DISPLAY_NAME);
        let locale = prop(PROP_LOCALE);
        let mut template = NotificationTemplate::new(display_name, locale, channel);
        template.content_type = prop(PROP_CONTENT_TYPE);

        if serde_json::from_slice::<serde_json::Value>(&resource.content).is_ok() {
            // Valid JSON that is not the 3-element content array is
            // corrupt persisted state, not a legacy payload.
            let (subject, body, footer) = decode_content(&resource.content)?;
            template.subject = subject.unwrap_or_default();
            template.body = body.unwrap_or_default();
            template.footer = footer.unwrap_or_default();
        } else {
            // Pre-migration resources carry the pipe-delimited payload.
            let raw = std::str::from_utf8(&resource.content).map_err(|_| {
                TemplateError::CorruptContent(format!(
                    "template resource at '{path}' holds non-UTF-8 content"
                ))
            })?;
            let (subject, body, footer) = decode_legacy_content(raw);
            template.subject = subject;
            template.body = body;
            template.footer = footer;
        }
        Ok(template)
    }

    /// Create the type collection when it is missing, so templates can be
    /// added without a prior `add_template_type` call.
    async fn ensure_type(
        &self,
        template: &NotificationTemplate,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let path = type_path(template.channel, &template.type_key);
        let exists = self
            .store
            .exists(&path, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry existence check failed", e))?;
        if !exists {
            let mut properties = HashMap::new();
            properties.insert(
                PROP_DISPLAY_NAME.to_string(),
                template.display_name.clone(),
            );
            let resource = Resource {
                properties,
                content: Vec::new(),
                media_type: MEDIA_TYPE_COLLECTION.to_string(),
            };
            self.store
                .put(&path, resource, tenant_id)
                .await
                .map_err(|e| TemplateError::storage("registry write failed", e))?;
        }
        Ok(())
    }

    /// Templates directly under a scope directory. Children without a
    /// locale property (e.g. the `app` subtree under an organization-scope
    /// type) are skipped.
    async fn templates_under(
        &self,
        dir: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let children = self
            .store
            .list_children(dir, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry listing failed", e))?;
        let mut templates = Vec::new();
        for child in children {
            let Some(resource) = self
                .store
                .get(&child, tenant_id)
                .await
                .map_err(|e| TemplateError::storage("registry read failed", e))?
            else {
                continue;
            };
            if !resource.properties.contains_key(PROP_LOCALE) {
                continue;
            }
            templates.push(Self::resource_to_template(&resource, channel, &child)?);
        }
        Ok(templates)
    }
}

#[async_trait]
impl TemplatePersistenceManager for RegistryTemplateStore {
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        let template_type = NotificationTemplateType::new(display_name, channel);
        template_type.validate()?;
        let path = type_path(channel, &template_type.type_key());
        let exists = self
            .store
            .exists(&path, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry existence check failed", e))?;
        if exists {
            return Err(TemplateError::TypeAlreadyExists {
                display_name: display_name.to_string(),
                channel: channel.to_string(),
            });
        }
        let mut properties = HashMap::new();
        properties.insert(PROP_DISPLAY_NAME.to_string(), display_name.to_string());
        let resource = Resource {
            properties,
            content: Vec::new(),
            media_type: MEDIA_TYPE_COLLECTION.to_string(),
        };
        self.store
            .put(&path, resource, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry write failed", e))
    }

    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        let resource = self
            .store
            .get(&type_path(channel, type_key), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry read failed", e))?;
        Ok(resource.and_then(|r| r.properties.get(PROP_DISPLAY_NAME).cloned()))
    }

    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        let children = self
            .store
            .list_children(channel_base(channel), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry listing failed", e))?;
        let mut names = Vec::new();
        for child in children {
            if let Some(resource) = self
                .store
                .get(&child, tenant_id)
                .await
                .map_err(|e| TemplateError::storage("registry read failed", e))?
            {
                if let Some(name) = resource.properties.get(PROP_DISPLAY_NAME) {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        Ok(names)
    }

    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .delete(&type_path(channel, type_key), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry delete failed", e))
    }

    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        template.validate()?;
        self.ensure_type(template, tenant_id).await?;
        let path = template_path(
            template.channel,
            &template.type_key,
            app_id,
            &template.locale,
        );
        let exists = self
            .store
            .exists(&path, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry existence check failed", e))?;
        if exists {
            return Err(TemplateError::TemplateAlreadyExists {
                type_key: template.type_key.clone(),
                locale: template.locale.clone(),
            });
        }
        debug!(
            tenant_id,
            path = path.as_str(),
            "storing notification template resource"
        );
        self.store
            .put(&path, Self::template_resource(template), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry write failed", e))
    }

    async fn get_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError> {
        let path = template_path(channel, type_key, app_id, locale);
        let resource = self
            .store
            .get(&path, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry read failed", e))?;
        match resource {
            Some(r) => Ok(Some(Self::resource_to_template(&r, channel, &path)?)),
            None => Ok(None),
        }
    }

    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        self.store
            .exists(&template_path(channel, type_key, app_id, locale), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry existence check failed", e))
    }

    async fn list_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        self.templates_under(&scope_path(channel, type_key, app_id), channel, tenant_id)
            .await
    }

    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let types = self
            .store
            .list_children(channel_base(channel), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry listing failed", e))?;
        let mut all = Vec::new();
        for type_dir in types {
            all.extend(self.templates_under(&type_dir, channel, tenant_id).await?);
        }
        Ok(all)
    }

    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        template.validate()?;
        let path = template_path(
            template.channel,
            &template.type_key,
            app_id,
            &template.locale,
        );
        let exists = self
            .store
            .exists(&path, tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry existence check failed", e))?;
        if !exists {
            return Err(TemplateError::TemplateNotFound {
                type_key: template.type_key.clone(),
                locale: template.locale.clone(),
            });
        }
        self.store
            .put(&path, Self::template_resource(template), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry write failed", e))
    }

    async fn delete_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.store
            .delete(&template_path(channel, type_key, app_id, locale), tenant_id)
            .await
            .map_err(|e| TemplateError::storage("registry delete failed", e))
    }

    async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        match app_id {
            // Application scope lives in its own subtree.
            Some(_) => self
                .store
                .delete(&scope_path(channel, type_key, app_id), tenant_id)
                .await
                .map_err(|e| TemplateError::storage("registry delete failed", e)),
            // Organization scope: remove locale leaves one by one so the
            // type collection and any application subtrees survive.
            None => {
                let dir = scope_path(channel, type_key, None);
                let templates = self.templates_under(&dir, channel, tenant_id).await?;
                for t in templates {
                    self.store
                        .delete(
                            &template_path(channel, type_key, None, &t.locale),
                            tenant_id,
                        )
                        .await
                        .map_err(|e| TemplateError::storage("registry delete failed", e))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RegistryTemplateStore {
        RegistryTemplateStore::new(Arc::new(InMemoryResourceStore::new()))
    }

    fn sms_template(name: &str, locale: &str, body: &str) -> NotificationTemplate {
        let mut t = NotificationTemplate::new(name, locale, NotificationChannel::Sms);
        t.body = body.to_string();
        t
    }

    #[tokio::test]
    async fn duplicate_type_is_a_client_error() {
        let store = store();
        store
            .add_template_type("Password Reset", NotificationChannel::Email, 1)
            .await
            .unwrap();
        let err = store
            .add_template_type("passwordreset", NotificationChannel::Email, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::TypeAlreadyExists { .. }));
        // same name on another channel or tenant is fine
        store
            .add_template_type("Password Reset", NotificationChannel::Sms, 1)
            .await
            .unwrap();
        store
            .add_template_type("Password Reset", NotificationChannel::Email, 2)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn legacy_pipe_resources_are_readable() {
        let resources = Arc::new(InMemoryResourceStore::new());
        let mut properties = HashMap::new();
        properties.insert(PROP_DISPLAY_NAME.to_string(), "Welcome".to_string());
        properties.insert(PROP_LOCALE.to_string(), "en_US".to_string());
        properties.insert(PROP_CONTENT_TYPE.to_string(), "text/plain".to_string());
        resources
            .put(
                "identity/email/welcome/en_us",
                Resource {
                    properties,
                    content: b"Hello|Welcome aboard|The team".to_vec(),
                    media_type: MEDIA_TYPE_TEMPLATE.to_string(),
                },
                1,
            )
            .await
            .unwrap();

        let store = RegistryTemplateStore::new(resources);
        let t = store
            .get_template("en_US", "welcome", NotificationChannel::Email, None, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.subject, "Hello");
        assert_eq!(t.body, "Welcome aboard");
        assert_eq!(t.footer, "The team");
    }

    #[tokio::test]
    async fn malformed_content_array_is_a_server_error() {
        let resources = Arc::new(InMemoryResourceStore::new());
        let mut properties = HashMap::new();
        properties.insert(PROP_DISPLAY_NAME.to_string(), "Welcome".to_string());
        properties.insert(PROP_LOCALE.to_string(), "en_US".to_string());
        resources
            .put(
                "identity/email/welcome/en_us",
                Resource {
                    properties,
                    content: br#"["only","two"]"#.to_vec(),
                    media_type: MEDIA_TYPE_TEMPLATE.to_string(),
                },
                1,
            )
            .await
            .unwrap();

        let store = RegistryTemplateStore::new(resources);
        let err = store
            .get_template("en_US", "welcome", NotificationChannel::Email, None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::CorruptContent(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn bulk_delete_keeps_type_and_app_scope() {
        let store = store();
        // add org + app templates of the same type
        store
            .add_template(&sms_template("Otp", "en_US", "org body"), None, 1)
            .await
            .unwrap();
        store
            .add_template(&sms_template("Otp", "fr_FR", "org body fr"), None, 1)
            .await
            .unwrap();
        store
            .add_template(&sms_template("Otp", "en_US", "app body"), Some("app-1"), 1)
            .await
            .unwrap();

        store
            .delete_templates("otp", NotificationChannel::Sms, None, 1)
            .await
            .unwrap();

        assert!(store
            .list_templates("otp", NotificationChannel::Sms, None, 1)
            .await
            .unwrap()
            .is_empty());
        // app-scope copy and the type itself survive
        assert!(store
            .template_exists("en_US", "otp", NotificationChannel::Sms, Some("app-1"), 1)
            .await
            .unwrap());
        assert!(store
            .get_template_type("otp", NotificationChannel::Sms, 1)
            .await
            .unwrap()
            .is_some());
    }
}
