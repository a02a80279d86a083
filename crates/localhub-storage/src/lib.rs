//! Concrete vault storage with encryption at rest.
//! AES-256-GCM with a single key persisted in a key file (or a test double).

pub mod cipher;
pub mod encrypted_vault;
pub mod key_provider;
