//! Storage and verification of user credentials.
//!
//! Passwords are validated, then salted and hashed with argon2 before a user
//! row is written; logins are checked against the stored hash. Persistence
//! goes through diesel on PostgreSQL.

#[macro_use]
extern crate diesel;

pub mod config;
pub mod error;
pub mod hash;
pub mod hooks;
pub mod models;
pub mod schema;
pub mod secret;
pub mod store;

pub use config::{Config, DatabaseConfig};
pub use error::{Error, Result};
pub use hash::{verify_password, HashConfig, PasswordHasher};
pub use models::{NewUser, User, UserUpdate};
pub use store::UserStore;
