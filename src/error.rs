use diesel::r2d2::PoolError;
use failure::Fail;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    /// A required field is missing or malformed, or the password is too short.
    #[fail(display = "invalid user record: {}", _0)]
    Validation(#[cause] ValidationErrors),

    /// A stored password hash could not be parsed. Usually means the row is corrupt.
    #[fail(display = "malformed password hash: {}", _0)]
    Format(String),

    #[fail(display = "password hashing failed: {}", _0)]
    Hash(String),

    #[fail(display = "a user with email {} already exists", _0)]
    DuplicateEmail(String),

    #[fail(display = "no user with id {}", _0)]
    NotFound(i32),

    #[fail(display = "database error: {}", _0)]
    Database(#[cause] diesel::result::Error),

    #[fail(display = "connection pool error: {}", _0)]
    Pool(#[cause] PoolError),

    #[fail(display = "configuration error: {}", _0)]
    Config(String),

    #[fail(display = "i/o error: {}", _0)]
    Io(#[cause] std::io::Error),
}

impl From<ValidationErrors> for Error {
    fn from(e: ValidationErrors) -> Error {
        Error::Validation(e)
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Error {
        Error::Database(e)
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Error {
        Error::Pool(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}
