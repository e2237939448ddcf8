//! Transparent property encryption.

mod cipher;
mod interceptor;

pub use cipher::{AesGcmCipher, PropertyCipher};
pub use interceptor::EncryptionInterceptor;
