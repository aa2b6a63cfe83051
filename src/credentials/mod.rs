//! Token encryption at the storage boundary.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       ConnectionRepository               │
//! │  - plain-text ConnectionData in memory   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (seal)               (open)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher                        │
//! │  - AES-256-GCM                           │
//! │  - Unique nonce per token                │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite `connections` table         │
//! │  - ciphertext + nonce columns            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Access tokens, secrets and refresh tokens are sealed separately
//! - Master key must be 32 bytes (256 bits), held in memory only
//! - Authenticated encryption: tampering fails with `ConnectError::Decryption`

mod encryption;

pub use encryption::{SealedToken, TokenCipher};
