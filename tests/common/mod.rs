//! Shared helpers for the integration tests: template fixtures, a
//! registry-backed store over the in-memory resource tree, and a
//! call-counting wrapper used to assert cache transparency.

// not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use notify_templates::defaults::SystemDefaults;
use notify_templates::models::{NotificationChannel, NotificationTemplate, TemplateError};
use notify_templates::persistence::registry::{InMemoryResourceStore, RegistryTemplateStore};
use notify_templates::persistence::TemplatePersistenceManager;

pub const TENANT: i32 = 1;

pub fn registry_store() -> RegistryTemplateStore {
    RegistryTemplateStore::new(Arc::new(InMemoryResourceStore::new()))
}

pub fn email_template(
    display_name: &str,
    locale: &str,
    subject: &str,
    body: &str,
    footer: &str,
) -> NotificationTemplate {
    let mut t = NotificationTemplate::new(display_name, locale, NotificationChannel::Email);
    t.subject = subject.to_string();
    t.body = body.to_string();
    t.footer = footer.to_string();
    t.content_type = "text/html".to_string();
    t
}

pub fn sms_template(display_name: &str, locale: &str, body: &str) -> NotificationTemplate {
    let mut t = NotificationTemplate::new(display_name, locale, NotificationChannel::Sms);
    t.body = body.to_string();
    t
}

/// System defaults used across the resolution tests: one email type in
/// two locales and one SMS type.
pub fn system_defaults() -> Arc<SystemDefaults> {
    Arc::new(SystemDefaults::from_templates(vec![
        email_template(
            "Password Reset",
            "en_US",
            "Reset your password",
            "Follow the link to reset",
            "The identity team",
        ),
        email_template(
            "Password Reset",
            "fr_FR",
            "Réinitialisez votre mot de passe",
            "Suivez le lien",
            "L'équipe",
        ),
        sms_template("Sms OTP", "en_US", "Your code is {{code}}"),
    ]))
}

/// Store wrapper counting calls through to the wrapped backend.
pub struct CountingStore<S> {
    inner: S,
    pub get_template_calls: AtomicUsize,
    pub get_type_calls: AtomicUsize,
    pub list_template_calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_template_calls: AtomicUsize::new(0),
            get_type_calls: AtomicUsize::new(0),
            list_template_calls: AtomicUsize::new(0),
        }
    }

    pub fn get_template_count(&self) -> usize {
        self.get_template_calls.load(Ordering::SeqCst)
    }

    pub fn get_type_count(&self) -> usize {
        self.get_type_calls.load(Ordering::SeqCst)
    }

    pub fn list_template_count(&self) -> usize {
        self.list_template_calls.load(Ordering::SeqCst)
    }
}

/// Shared handle over a [`CountingStore`]; the cache decorator owns one
/// handle while the test keeps another for counter assertions.
pub struct SharedCounting<S>(pub Arc<CountingStore<S>>);

#[async_trait]
impl<S: TemplatePersistenceManager> TemplatePersistenceManager for SharedCounting<S> {
    async fn add_template_type(
        &self,
        display_name: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.0
            .inner
            .add_template_type(display_name, channel, tenant_id)
            .await
    }

    async fn get_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Option<String>, TemplateError> {
        self.0.get_type_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .inner
            .get_template_type(type_key, channel, tenant_id)
            .await
    }

    async fn list_template_types(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<String>, TemplateError> {
        self.0.inner.list_template_types(channel, tenant_id).await
    }

    async fn delete_template_type(
        &self,
        type_key: &str,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.0
            .inner
            .delete_template_type(type_key, channel, tenant_id)
            .await
    }

    async fn add_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.0.inner.add_template(template, app_id, tenant_id).await
    }

    async fn get_template(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<Option<NotificationTemplate>, TemplateError> {
        self.0.get_template_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .inner
            .get_template(locale, type_key, channel, app_id, tenant_id)
            .await
    }

    async fn template_exists(
        &self,
        locale: &str,
        type_key: &str,
        channel: NotificationChannel,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<bool, TemplateError> {
        self.0
            .inner
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
        self.0.list_template_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .inner
            .list_templates(type_key, channel, app_id, tenant_id)
            .await
    }

    async fn list_all_templates(
        &self,
        channel: NotificationChannel,
        tenant_id: i32,
    ) -> Result<Vec<NotificationTemplate>, TemplateError> {
        self.0.inner.list_all_templates(channel, tenant_id).await
    }

    async fn update_template(
        &self,
        template: &NotificationTemplate,
        app_id: Option<&str>,
        tenant_id: i32,
    ) -> Result<(), TemplateError> {
        self.0
            .inner
            .update_template(template, app_id, tenant_id)
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
        self.0
            .inner
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
        self.0
            .inner
            .delete_templates(type_key, channel, app_id, tenant_id)
            .await
    }
}
