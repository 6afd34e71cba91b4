//! Server configuration and the on-disk user registry.

pub mod crypt;
mod server;
mod user;

pub use server::{log_level_from_str, DriveConfig, ServerConfig, SessionPolicy, TlsConfig};
pub use user::{UserError, UserRegistry};

use std::path::Path;

use anyhow::{format_err, Error};

/// Atomically replace `path` with `data` (write to a temporary sibling,
/// then rename over the target).
pub fn replace_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)
        .map_err(|err| format_err!("unable to write {:?} - {}", tmp_path, err))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|err| format_err!("unable to replace {:?} - {}", path, err))?;
    Ok(())
}
