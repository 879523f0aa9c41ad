//! Local key material and recipient key resolution

pub mod directory;
pub mod keypair;
pub mod keystore;

pub use directory::{KeyResolver, PublicKeyDirectory};
pub use keypair::{KeyPair, PrivateKey, PublicKey};
pub use keystore::{FileKeyStore, KeyRing, KeyStore, KeystoreError, MemoryKeyStore};
