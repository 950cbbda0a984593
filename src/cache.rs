//! Cache-aside decorator over any [`TemplatePersistenceManager`].
//!
//! One process-wide cache, partitioned by tenant as the outer map
//! dimension. The partitioning is a correctness invariant (no
//! cross-tenant leakage), not an optimization. Reads are cache-first: a
//! hit never calls the underlying backend. Template-level lookups cache
//! negative results; type-level lookups do not (preserved asymmetry of
//! the original behavior).

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{NotificationChannel, NotificationTemplate, TemplateError};
use crate::persistence::TemplatePersistenceManager;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Template {
        type_key: String,
        channel: NotificationChannel,
        app_id: Option<String>,
        locale: String,
    },
    TemplateList {
        type_key: String,
        channel: NotificationChannel,
        app_id: Option<String>,
    },
    AllTemplates {
        channel: NotificationChannel,
    },
    TypeDisplayName {
        type_key: String,
        channel: NotificationChannel,
    },
    TypeList {
        channel: NotificationChannel,
    },
}

impl CacheKey {
    fn template(
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        locale: &str,
    ) -> Self {
        CacheKey::Template {
            type_key: type_key.to_string(),
            channel,
            app_id: app_id.map(str::to_string),
            locale: locale.to_lowercase(),
        }
    }

    fn template_list(type_key: &str, channel: NotificationChannel, app_id: Option<&str>) -> Self {
        CacheKey::TemplateList {
            type_key: type_key.to_string(),
            channel,
            app_id: app_id.map(str::to_string),
        }
    }
}

#[derive(Clone)]
enum CacheValue {
    /// `None` is a cached negative lookup.
    Template(Option<NotificationTemplate>),
    Templates(Vec<NotificationTemplate>),
    DisplayName(String),
    Names(Vec<String>),
}

/// Process-wide template cache, tenant-partitioned.
#[derive(Default)]
struct TemplateCache {
    tenants: DashMap<i32, Arc<DashMap<CacheKey, CacheValue>>>,
}

impl TemplateCache {
    fn partition(&self, tenant_id: i32) -> Arc<DashMap<CacheKey, CacheValue>> {
        self.tenants
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }

    fn get(&self, tenant_id: i32, key: &CacheKey) -> Option<CacheValue> {
        self.tenants
            .get(&tenant_id)
            .and_then(|p| p.get(key).map(|v| v.clone()))
    }

    fn put(&self, tenant_id: i32, key: CacheKey, value: CacheValue) {
        self.partition(tenant_id).insert(key, value);
    }

    fn invalidate(&self, tenant_id: i32, key: &CacheKey) {
        if let Some(partition) = self.tenants.get(&tenant_id) {
            partition.remove(key);
        }
    }

    /// Coarse invalidation: drop everything the tenant has cached.
    fn clear_tenant(&self, tenant_id: i32) {
        self.tenants.remove(&tenant_id);
    }
}

/// Read-through / invalidate-on-write wrapper around a backend store.
pub struct CachedTemplateStore<S> {
    inner: S,
    cache: TemplateCache,
}

impl<S: TemplatePersistenceManager> CachedTemplateStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: TemplateCache::default(),
        }
    }

    fn invalidate_lists(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) {
        self.cache.invalidate(
            tenant_id,
            &CacheKey::template_list(type_key, channel, app_id),
        );
        self.cache
            .invalidate(tenant_id, &CacheKey::AllTemplates { channel });
    }
}

#[async_trait]
impl<S: TemplatePersistenceManager> TemplatePersistenceManager for CachedTemplateStore<S> {
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner
            .add_template_type(display_name, channel, tenant_id)
            .await?;
        self.cache
            .invalidate(tenant_id, &CacheKey::TypeList { channel });
        Ok(())
    }

    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        let key = CacheKey::TypeDisplayName {
            type_key: type_key.to_string(),
            channel,
        };
        if let Some(CacheValue::DisplayName(name)) = self.cache.get(tenant_id, &key) {
            debug!(tenant_id, type_key, "template type cache hit");
            return Ok(Some(name));
        }
        let name = self
            .inner
            .get_template_type(type_key, channel, tenant_id)
            .await?;
        // negative type lookups are not cached
        if let Some(name) = &name {
            self.cache
                .put(tenant_id, key, CacheValue::DisplayName(name.clone()));
        }
        Ok(name)
    }

    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        let key = CacheKey::TypeList { channel };
        if let Some(CacheValue::Names(names)) = self.cache.get(tenant_id, &key) {
            return Ok(names);
        }
        let names = self.inner.list_template_types(channel, tenant_id).await?;
        self.cache
            .put(tenant_id, key, CacheValue::Names(names.clone()));
        Ok(names)
    }

    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner
            .delete_template_type(type_key, channel, tenant_id)
            .await?;
        // all templates of the type are gone with it; enumerating their
        // cached locales is not tractable here, so drop the whole tenant
        // partition (acknowledged performance cliff under template churn)
        self.cache.clear_tenant(tenant_id);
        Ok(())
    }

    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner.add_template(template, app_id, tenant_id).await?;
        self.cache.put(
            tenant_id,
            CacheKey::template(&template.type_key, template.channel, app_id, &template.locale),
            CacheValue::Template(Some(template.clone())),
        );
        self.invalidate_lists(&template.type_key, template.channel, app_id, tenant_id);
        // a fresh type may have been created lazily
        self.cache.invalidate(
            tenant_id,
            &CacheKey::TypeList {
                channel: template.channel,
            },
        );
        Ok(())
    }

    async fn get_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError> {
        let key = CacheKey::template(type_key, channel, app_id, locale);
        if let Some(CacheValue::Template(cached)) = self.cache.get(tenant_id, &key) {
            debug!(tenant_id, type_key, locale, "template cache hit");
            return Ok(cached);
        }
        let fetched = self
            .inner
            .get_template(locale, type_key, channel, app_id, tenant_id)
            .await?;
        // negative results are cached too
        self.cache
            .put(tenant_id, key, CacheValue::Template(fetched.clone()));
        Ok(fetched)
    }

    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        let key = CacheKey::template(type_key, channel, app_id, locale);
        if let Some(CacheValue::Template(cached)) = self.cache.get(tenant_id, &key) {
            return Ok(cached.is_some());
        }
        self.inner
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
        let key = CacheKey::template_list(type_key, channel, app_id);
        if let Some(CacheValue::Templates(templates)) = self.cache.get(tenant_id, &key) {
            return Ok(templates);
        }
        let templates = self
            .inner
            .list_templates(type_key, channel, app_id, tenant_id)
            .await?;
        self.cache
            .put(tenant_id, key, CacheValue::Templates(templates.clone()));
        Ok(templates)
    }

    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        let key = CacheKey::AllTemplates { channel };
        if let Some(CacheValue::Templates(templates)) = self.cache.get(tenant_id, &key) {
            return Ok(templates);
        }
        let templates = self.inner.list_all_templates(channel, tenant_id).await?;
        self.cache
            .put(tenant_id, key, CacheValue::Templates(templates.clone()));
        Ok(templates)
    }

    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner
            .update_template(template, app_id, tenant_id)
            .await?;
        self.cache.put(
            tenant_id,
            CacheKey::template(&template.type_key, template.channel, app_id, &template.locale),
            CacheValue::Template(Some(template.clone())),
        );
        self.invalidate_lists(&template.type_key, template.channel, app_id, tenant_id);
        Ok(())
    }

    async fn delete_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner
            .delete_template(locale, type_key, channel, app_id, tenant_id)
            .await?;
        self.cache.invalidate(
            tenant_id,
            &CacheKey::template(type_key, channel, app_id, locale),
        );
        self.invalidate_lists(type_key, channel, app_id, tenant_id);
        Ok(())
    }

    async fn delete_templates(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.inner
            .delete_templates(type_key, channel, app_id, tenant_id)
            .await?;
        self.cache.invalidate(
            tenant_id,
            &CacheKey::template_list(type_key, channel, app_id),
        );
        // coarse: see delete_template_type
        self.cache.clear_tenant(tenant_id);
        Ok(())
    }
}
