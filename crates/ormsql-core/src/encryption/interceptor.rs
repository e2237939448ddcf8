//! Save/load hooks that encrypt marked properties.

use std::sync::Arc;

use dashmap::DashMap;
use ormsql_proto::{EntityRecord, Value};
use tracing::debug;

use super::cipher::PropertyCipher;
use crate::catalog::EntityDef;
use crate::error::Error;

/// Encrypts marked properties before a save and decrypts them after a load.
///
/// Which properties are encrypted is discovered once per entity type and
/// remembered. Only string properties can be encrypted; anything else is a
/// configuration error raised at discovery. Null values pass through.
pub struct EncryptionInterceptor {
    cipher: Option<Arc<dyn PropertyCipher>>,
    discovered: DashMap<String, Arc<[String]>>,
}

impl EncryptionInterceptor {
    /// Interceptor using `cipher`.
    pub fn new(cipher: Arc<dyn PropertyCipher>) -> Self {
        Self {
            cipher: Some(cipher),
            discovered: DashMap::new(),
        }
    }

    /// Interceptor without a key. Entities with encrypted properties fail.
    pub fn disabled() -> Self {
        Self {
            cipher: None,
            discovered: DashMap::new(),
        }
    }

    /// Whether a cipher is configured.
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypted properties of an entity type.
    pub fn encrypted_properties(&self, entity: &EntityDef) -> Result<Arc<[String]>, Error> {
        if let Some(known) = self.discovered.get(&entity.name) {
            return Ok(known.clone());
        }

        let mut properties = Vec::new();
        for field in entity.encrypted_fields() {
            if !field.field_type.is_string() {
                return Err(Error::Configuration(format!(
                    "`{}.{}` is marked encrypted but is not a string property",
                    entity.name, field.name
                )));
            }
            properties.push(field.name.clone());
        }

        let properties: Arc<[String]> = properties.into();
        if !properties.is_empty() {
            debug!(entity = %entity.name, count = properties.len(), "discovered encrypted properties");
        }
        self.discovered
            .insert(entity.name.clone(), properties.clone());
        Ok(properties)
    }

    /// Replace clear text with cipher text ahead of a save.
    pub fn on_saving(&self, entity: &EntityDef, record: &mut EntityRecord) -> Result<(), Error> {
        self.transform(entity, record, |cipher, text| cipher.encrypt(text))
    }

    /// Replace cipher text with clear text after a load.
    pub fn on_loaded(&self, entity: &EntityDef, record: &mut EntityRecord) -> Result<(), Error> {
        self.transform(entity, record, |cipher, text| cipher.decrypt(text))
    }

    fn transform<F>(&self, entity: &EntityDef, record: &mut EntityRecord, apply: F) -> Result<(), Error>
    where
        F: Fn(&dyn PropertyCipher, &str) -> Result<String, Error>,
    {
        let properties = self.encrypted_properties(entity)?;
        if properties.is_empty() {
            return Ok(());
        }
        let cipher = self.cipher.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "`{}` has encrypted properties but no encryption key is configured",
                entity.name
            ))
        })?;

        for property in properties.iter() {
            match record.fields.get_mut(property) {
                Some(Value::String(text)) if !text.is_empty() => *text = apply(cipher, text)?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncryptionInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionInterceptor")
            .field("enabled", &self.is_enabled())
            .field("discovered", &self.discovered.len())
            .finish()
    }
}
