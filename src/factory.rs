//! Config-driven construction of the template persistence stack.
//!
//! One configuration value selects the backend; the chosen store is always
//! wrapped in the cache decorator and the unified resolver. All wiring is
//! explicit: the caller owns the pool, the registry handle and the
//! default set, and hands them over in a context struct.

use sqlx::postgres::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::cache::CachedTemplateStore;
use crate::defaults::SystemDefaults;
use crate::persistence::database::DbTemplateStore;
use crate::persistence::hybrid::{HybridTemplateStore, StorageMode};
use crate::persistence::registry::{RegistryTemplateStore, ResourceStore};
use crate::persistence::TemplatePersistenceManager;
use crate::resolver::UnifiedTemplateManager;

/// Configuration key selecting the backend: `database`, `hybrid` or
/// `registry`.
pub const STORAGE_TYPE_KEY: &str = "TEMPLATE_STORAGE_TYPE";
/// Configuration key selecting the hybrid backend's storage mode.
pub const STORAGE_MODE_KEY: &str = "TEMPLATE_STORAGE_MODE";

/// Narrow configuration lookup, resolved once at construction time.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Configuration backed by process environment variables.
#[derive(Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Persistence backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    #[default]
    Database,
    Hybrid,
    Registry,
}

impl StorageType {
    /// Total mapping: unrecognized, blank or unset configuration silently
    /// selects the default backend.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("hybrid") => StorageType::Hybrid,
            Some(v) if v.eq_ignore_ascii_case("registry") => StorageType::Registry,
            _ => StorageType::Database,
        }
    }
}

/// Everything the factory needs to construct any backend.
pub struct TemplateStoreContext {
    pub pool: PgPool,
    pub registry: Arc<dyn ResourceStore>,
    pub defaults: Arc<SystemDefaults>,
}

/// Build the full stack: selected backend → cache decorator → unified
/// resolver.
pub fn build_template_manager(
    config: &dyn ConfigSource,
    ctx: TemplateStoreContext,
) -> UnifiedTemplateManager {
    let storage_type = StorageType::from_config(config.get(STORAGE_TYPE_KEY).as_deref());
    info!(?storage_type, "selecting template persistence backend");

    let store: Arc<dyn TemplatePersistenceManager> = match storage_type {
        StorageType::Database => Arc::new(CachedTemplateStore::new(DbTemplateStore::new(ctx.pool))),
        StorageType::Hybrid => {
            let mode = StorageMode::from_config(config.get(STORAGE_MODE_KEY).as_deref());
            Arc::new(CachedTemplateStore::new(HybridTemplateStore::new(
                ctx.pool, mode,
            )))
        }
        StorageType::Registry => Arc::new(CachedTemplateStore::new(RegistryTemplateStore::new(
            ctx.registry,
        ))),
    };
    UnifiedTemplateManager::new(store, ctx.defaults)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_mapping_is_total() {
        assert_eq!(StorageType::from_config(None), StorageType::Database);
        assert_eq!(StorageType::from_config(Some("")), StorageType::Database);
        assert_eq!(StorageType::from_config(Some("  ")), StorageType::Database);
        assert_eq!(
            StorageType::from_config(Some("database")),
            StorageType::Database
        );
        assert_eq!(StorageType::from_config(Some("HYBRID")), StorageType::Hybrid);
        assert_eq!(
            StorageType::from_config(Some("registry")),
            StorageType::Registry
        );
        assert_eq!(
            StorageType::from_config(Some("cloud-magic")),
            StorageType::Database
        );
    }

    struct MapConfig(std::collections::HashMap<String, String>);

    impl ConfigSource for MapConfig {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn config_source_is_consulted() {
        let mut map = std::collections::HashMap::new();
        map.insert(STORAGE_TYPE_KEY.to_string(), "registry".to_string());
        let config = MapConfig(map);
        assert_eq!(
            StorageType::from_config(config.get(STORAGE_TYPE_KEY).as_deref()),
            StorageType::Registry
        );
    }
}
