//! Transforms applied to a record before it is written.
//!
//! Both hooks validate first and hash second, so a too-short or otherwise
//! invalid password never reaches the hasher and a plaintext password never
//! reaches storage.

use crate::error::Result;
use crate::hash::PasswordHasher;
use crate::models::{NewUser, NewUserRow, UserChangeset, UserUpdate};
use validator::Validate;

pub fn before_insert(hasher: &PasswordHasher, user: NewUser) -> Result<NewUserRow> {
    user.validate()?;
    let password = hasher.hash_password(&user.password)?;

    Ok(NewUserRow {
        username: user.username,
        email: user.email,
        password,
    })
}

/// Only a password that is part of `update` is hashed; an absent one stays
/// absent so the stored hash is left alone.
pub fn before_update(hasher: &PasswordHasher, update: UserUpdate) -> Result<UserChangeset> {
    update.validate()?;
    let password = match update.password {
        Some(ref plaintext) => Some(hasher.hash_password(plaintext)?),
        None => None,
    };

    Ok(UserChangeset {
        username: update.username,
        email: update.email,
        password,
    })
}
