use crate::error::Result;
use log::{debug, error};
use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

/// Where Docker mounts secrets created with `docker secret create`.
pub static DEFAULT_SECRETS_DIR: &'static str = "/run/secrets";

/// Read the secret `name` from `dir`, without its trailing newline.
///
/// A missing file is `Ok(None)` so callers can fall back to something else;
/// any other failure to read it is an error.
pub fn secret<P, S>(dir: P, name: S) -> Result<Option<String>>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = dir.as_ref().join(name.as_ref());

    let mut f = match File::open(&path) {
        Ok(f) => f,
        Err(e) => match e.kind() {
            ErrorKind::NotFound => {
                debug!("{} not found", path.display());
                return Ok(None);
            }
            _ => {
                error!("Failed to open {}: {}", path.display(), e);
                return Err(e.into());
            }
        },
    };

    let mut data = String::new();
    f.read_to_string(&mut data)?;
    Ok(Some(data.trim_end_matches(&['\r', '\n'][..]).to_string()))
}
