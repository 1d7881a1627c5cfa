//! User persistence on top of diesel.
//!
//! The free functions take a connection so they can run inside a caller's
//! transaction; [`UserStore`] wraps them around a connection pool. Every
//! write goes through [`crate::hooks`] first.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::hash::{verify_password, PasswordHasher};
use crate::hooks;
use crate::models::{NewUser, User, UserUpdate};
use crate::schema::users;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::info;

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

pub fn connect(config: &DatabaseConfig) -> Result<Pool> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.as_str());
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)?;
    Ok(pool)
}

fn write_error(e: DieselError, email: Option<&str>) -> Error {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            Error::DuplicateEmail(email.unwrap_or_default().to_string())
        }
        e => Error::Database(e),
    }
}

pub fn create_user(
    conn: &mut PgConnection,
    hasher: &PasswordHasher,
    new_user: NewUser,
) -> Result<User> {
    let row = hooks::before_insert(hasher, new_user)?;

    let user = diesel::insert_into(users::table)
        .values(&row)
        .get_result::<User>(conn)
        .map_err(|e| write_error(e, Some(row.email())))?;

    info!("Created user {}", user.id);
    Ok(user)
}

pub fn update_user(
    conn: &mut PgConnection,
    hasher: &PasswordHasher,
    id: i32,
    update: UserUpdate,
) -> Result<User> {
    let changes = hooks::before_update(hasher, update)?;
    if changes.is_empty() {
        return find_user(conn, id)?.ok_or(Error::NotFound(id));
    }

    let user = diesel::update(users::table.find(id))
        .set(&changes)
        .get_result::<User>(conn)
        .optional()
        .map_err(|e| write_error(e, changes.email()))?
        .ok_or(Error::NotFound(id))?;

    info!(
        "Updated user {}{}",
        user.id,
        if changes.password_hash().is_some() {
            " (password changed)"
        } else {
            ""
        }
    );
    Ok(user)
}

/// Returns `false` if there was no such user.
pub fn delete_user(conn: &mut PgConnection, id: i32) -> Result<bool> {
    let deleted = diesel::delete(users::table.find(id)).execute(conn)?;
    if deleted > 0 {
        info!("Deleted user {}", id);
    }
    Ok(deleted > 0)
}

pub fn find_user(conn: &mut PgConnection, id: i32) -> Result<Option<User>> {
    let user = users::table.find(id).first::<User>(conn).optional()?;
    Ok(user)
}

pub fn find_user_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>> {
    let user = users::table
        .filter(users::email.eq(email))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}

/// Look up `email` and check `password` against the stored hash.
///
/// An unknown email and a wrong password both come back as `Ok(None)` and
/// cost the same hashing work. A stored hash that cannot be parsed is an
/// error. When the stored hash was made with an older work factor it is
/// replaced after a successful check.
pub fn authenticate(
    conn: &mut PgConnection,
    hasher: &PasswordHasher,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    let mut user = match find_user_by_email(conn, email)? {
        Some(user) => user,
        None => {
            hasher.verify_dummy(password);
            return Ok(None);
        }
    };

    if !verify_password(password, &user.password)? {
        return Ok(None);
    }

    if hasher.needs_rehash(&user.password)? {
        let upgraded = hasher.hash_password(password)?;
        diesel::update(users::table.find(user.id))
            .set(users::password.eq(&upgraded))
            .execute(conn)?;
        info!("Upgraded password hash for user {}", user.id);
        user.password = upgraded;
    }

    Ok(Some(user))
}

/// Pooled access to the user table.
#[derive(Clone)]
pub struct UserStore {
    pool: Pool,
    hasher: PasswordHasher,
}

impl UserStore {
    pub fn new(pool: Pool, hasher: PasswordHasher) -> UserStore {
        UserStore { pool, hasher }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    pub fn create(&self, new_user: NewUser) -> Result<User> {
        create_user(&mut *self.conn()?, &self.hasher, new_user)
    }

    pub fn update(&self, id: i32, update: UserUpdate) -> Result<User> {
        update_user(&mut *self.conn()?, &self.hasher, id, update)
    }

    pub fn delete(&self, id: i32) -> Result<bool> {
        delete_user(&mut *self.conn()?, id)
    }

    pub fn find(&self, id: i32) -> Result<Option<User>> {
        find_user(&mut *self.conn()?, id)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        find_user_by_email(&mut *self.conn()?, email)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        authenticate(&mut *self.conn()?, &self.hasher, email, password)
    }
}

// These need a PostgreSQL server at DATABASE_URL. Each test works on a
// temporary `users` table that shadows any real one, either inside a
// transaction that is rolled back or on a single-connection pool whose
// session ends with the test.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{test::cheap_hasher, HashConfig};
    use diesel::connection::SimpleConnection;

    const USERS_TABLE: &str = "CREATE TEMPORARY TABLE users (
        id SERIAL PRIMARY KEY,
        username VARCHAR NOT NULL,
        email VARCHAR NOT NULL UNIQUE,
        password VARCHAR NOT NULL
    )";

    fn database_url() -> String {
        dotenv::dotenv().ok();
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set")
    }

    fn establish() -> PgConnection {
        PgConnection::establish(&database_url()).expect("Error connecting to database")
    }

    /// A store whose pool holds one connection, so the temporary table
    /// created here is the one every later checkout sees.
    fn pooled_store() -> UserStore {
        let pool = connect(&DatabaseConfig {
            url: database_url(),
            pool_size: 1,
        })
        .expect("Pool creation failed.");
        pool.get()
            .expect("Error checking out a connection")
            .batch_execute(USERS_TABLE)
            .expect("Error creating users table");
        UserStore::new(pool, cheap_hasher())
    }

    fn with_table<F>(f: F)
    where
        F: FnOnce(&mut PgConnection) -> Result<()>,
    {
        let mut conn = establish();
        conn.test_transaction::<_, Error, _>(|conn| {
            conn.batch_execute(USERS_TABLE)?;
            f(conn)
        });
    }

    fn alice() -> NewUser {
        NewUser::new("alice", "alice@example.com", "pass1234")
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_create_and_authenticate() {
        with_table(|conn| {
            let hasher = cheap_hasher();
            let user = create_user(conn, &hasher, alice())?;
            assert_ne!(user.password, "pass1234");
            assert!(user.password.len() >= 50);

            let found = authenticate(conn, &hasher, "alice@example.com", "pass1234")?;
            assert_eq!(found.map(|u| u.id), Some(user.id));
            assert_eq!(
                authenticate(conn, &hasher, "alice@example.com", "wrongpass")?,
                None
            );
            assert_eq!(
                authenticate(conn, &hasher, "nobody@example.com", "pass1234")?,
                None
            );
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_duplicate_email() {
        with_table(|conn| {
            let hasher = cheap_hasher();
            create_user(conn, &hasher, alice())?;
            // the failed insert aborts the transaction, so check last
            match create_user(conn, &hasher, NewUser::new("alice2", "alice@example.com", "other123")) {
                Err(Error::DuplicateEmail(email)) => assert_eq!(email, "alice@example.com"),
                other => panic!("expected duplicate email, got {:?}", other),
            }
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_update_rehashes_only_when_password_changes() {
        with_table(|conn| {
            let hasher = cheap_hasher();
            let user = create_user(conn, &hasher, alice())?;

            let renamed = update_user(
                conn,
                &hasher,
                user.id,
                UserUpdate {
                    username: Some("alice2".to_string()),
                    ..UserUpdate::default()
                },
            )?;
            assert_eq!(renamed.username, "alice2");
            assert_eq!(renamed.password, user.password);

            let changed = update_user(conn, &hasher, user.id, UserUpdate::password("newpass1"))?;
            assert_ne!(changed.password, user.password);
            assert!(verify_password("newpass1", &changed.password)?);
            assert!(!verify_password("pass1234", &changed.password)?);

            let unchanged = update_user(conn, &hasher, user.id, UserUpdate::default())?;
            assert_eq!(unchanged, changed);
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_update_and_delete_missing_user() {
        with_table(|conn| {
            let hasher = cheap_hasher();
            match update_user(conn, &hasher, 42, UserUpdate::password("newpass1")) {
                Err(Error::NotFound(42)) => {}
                other => panic!("expected not found, got {:?}", other),
            }
            assert_eq!(delete_user(conn, 42)?, false);

            let user = create_user(conn, &hasher, alice())?;
            assert_eq!(delete_user(conn, user.id)?, true);
            assert_eq!(find_user(conn, user.id)?, None);
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_login_upgrades_work_factor() {
        with_table(|conn| {
            let old = cheap_hasher();
            let user = create_user(conn, &old, alice())?;

            let new = PasswordHasher::new(HashConfig {
                passes: 2,
                ..*old.config()
            })?;
            let found = authenticate(conn, &new, "alice@example.com", "pass1234")?
                .expect("credentials should match");
            assert_ne!(found.password, user.password);
            assert!(!new.needs_rehash(&found.password)?);

            let stored = find_user(conn, user.id)?.expect("user should exist");
            assert_eq!(stored.password, found.password);
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_corrupt_hash_is_an_error() {
        with_table(|conn| {
            let hasher = cheap_hasher();
            diesel::insert_into(users::table)
                .values((
                    users::username.eq("mallory"),
                    users::email.eq("mallory@example.com"),
                    users::password.eq("plaintext!"),
                ))
                .execute(conn)?;
            assert!(matches!(
                authenticate(conn, &hasher, "mallory@example.com", "plaintext!"),
                Err(Error::Format(_))
            ));
            Ok(())
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL instance
    fn test_pooled_store() {
        let users = pooled_store();

        let user = users.create(alice()).unwrap();
        assert_ne!(user.password, "pass1234");
        assert_eq!(users.find(user.id).unwrap(), Some(user.clone()));
        assert_eq!(
            users.find_by_email("alice@example.com").unwrap().map(|u| u.id),
            Some(user.id)
        );

        let found = users.authenticate("alice@example.com", "pass1234").unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert_eq!(users.authenticate("alice@example.com", "wrongpass").unwrap(), None);

        let changed = users
            .update(user.id, UserUpdate::password("newpass1"))
            .unwrap();
        assert_ne!(changed.password, user.password);
        assert_eq!(users.authenticate("alice@example.com", "pass1234").unwrap(), None);
        assert!(users
            .authenticate("alice@example.com", "newpass1")
            .unwrap()
            .is_some());

        match users.create(NewUser::new("alice2", "alice@example.com", "other123")) {
            Err(Error::DuplicateEmail(email)) => assert_eq!(email, "alice@example.com"),
            other => panic!("expected duplicate email, got {:?}", other),
        }

        assert_eq!(users.delete(user.id).unwrap(), true);
        assert_eq!(users.find(user.id).unwrap(), None);
    }
}
