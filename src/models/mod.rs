pub mod error;
pub mod template;

// Re-export commonly used types
pub use error::TemplateError;
pub use template::{
    normalize_type_key, NotificationChannel, NotificationTemplate, NotificationTemplateType,
    TemplateScope,
};
