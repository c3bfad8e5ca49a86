//! Symmetric encryption for secrets stored at rest.

pub mod cipher;

pub use cipher::SecretCipher;
