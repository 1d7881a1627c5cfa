use crate::error::{Error, Result};
use crate::hash::HashConfig;
use crate::secret::{secret, DEFAULT_SECRETS_DIR};
use std::str::FromStr;

pub static DATABASE_URL: &'static str = "DATABASE_URL";
pub static DATABASE_POOL_SIZE: &'static str = "DATABASE_POOL_SIZE";
pub static HASH_PASSES: &'static str = "HASH_PASSES";
pub static HASH_LANES: &'static str = "HASH_LANES";
pub static HASH_MEMORY_KIB: &'static str = "HASH_MEMORY_KIB";
pub static SECRETS_DIR: &'static str = "SECRETS_DIR";

/// Secret file consulted when `DATABASE_URL` is not set.
pub static DATABASE_URL_SECRET: &'static str = "user_credentials_database_url";

const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

/// Everything the process needs at startup. Built once and handed to the
/// components that need it.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub hash: HashConfig,
    /// Absent when no database URL is configured. Commands that only hash
    /// and verify work without one.
    pub database: Option<DatabaseConfig>,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Config> {
        dotenv::dotenv().ok();
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = HashConfig::default();
        let hash = HashConfig {
            passes: parse_or(&lookup, HASH_PASSES, defaults.passes)?,
            lanes: parse_or(&lookup, HASH_LANES, defaults.lanes)?,
            memory_kib: parse_or(&lookup, HASH_MEMORY_KIB, defaults.memory_kib)?,
        };

        let url = match lookup(DATABASE_URL) {
            Some(url) => Some(url),
            None => {
                let dir = lookup(SECRETS_DIR).unwrap_or_else(|| DEFAULT_SECRETS_DIR.to_string());
                secret(dir, DATABASE_URL_SECRET)?
            }
        };
        let database = match url {
            Some(url) => Some(DatabaseConfig {
                url,
                pool_size: parse_or(&lookup, DATABASE_POOL_SIZE, DEFAULT_POOL_SIZE)?,
            }),
            None => None,
        };

        Ok(Config { hash, database })
    }

    pub fn database(&self) -> Result<&DatabaseConfig> {
        self.database.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "{} is not set and no {} secret was found",
                DATABASE_URL, DATABASE_URL_SECRET
            ))
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{}: cannot parse '{}'", name, raw))),
        None => Ok(default),
    }
}
