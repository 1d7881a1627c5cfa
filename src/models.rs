use crate::schema::users;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

const REDACTED: &str = "<redacted>";

/// A stored user. `password` always holds an encoded hash.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Input for creating a user. `password` is plaintext.
#[derive(Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 4))]
    pub password: String,
}

impl NewUser {
    pub fn new<S: Into<String>>(username: S, email: S, password: S) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Partial update of a user. Fields left as `None` are not touched; a
/// `Some` password is plaintext and gets hashed before it is written.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 1))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 4))]
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn password<S: Into<String>>(password: S) -> UserUpdate {
        UserUpdate {
            password: Some(password.into()),
            ..UserUpdate::default()
        }
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Row written on insert. Only built by [`crate::hooks::before_insert`].
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password: String,
}

impl NewUserRow {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password
    }
}

/// Columns written on update. Only built by [`crate::hooks::before_update`].
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub(crate) username: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) password: Option<String>,
}

impl UserChangeset {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_ref().map(String::as_str)
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password.as_ref().map(String::as_str)
    }
}
