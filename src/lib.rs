//! Multi-tenant notification template store.
//!
//! Templates (email, SMS, push) are resolved through a three-tier scope
//! ladder: application override, then organization (tenant) custom
//! template, then compiled-in system default. Resolution runs over one of
//! three interchangeable storage backends (registry tree, database,
//! migration-era hybrid), with a tenant-partitioned read-through cache in
//! between. The backend is
//! selected once at startup from configuration; see [`factory`].

pub mod cache;
pub mod defaults;
pub mod factory;
pub mod models;
pub mod persistence;
pub mod resolver;

pub use cache::CachedTemplateStore;
pub use defaults::{load_system_defaults, SystemDefaults};
pub use factory::{build_template_manager, ConfigSource, EnvConfig, StorageType, TemplateStoreContext};
pub use models::{NotificationChannel, NotificationTemplate, NotificationTemplateType, TemplateError};
pub use persistence::TemplatePersistenceManager;
pub use resolver::UnifiedTemplateManager;
