pub mod client_config;
pub mod config_store;
pub mod mapping_store;
pub mod service;
pub mod signature_guard;
pub mod validation;

pub use client_config::{
    AiSettings, ClientConfig, FieldError, Manager, Provider, Signature, StoredConfig,
};
pub use validation::{validate_and_normalize, ConfigDraft};
