//! Handlers for the per-drive filesystem command surface.

use std::sync::Arc;

use lily_api_types::Actor;
use lily_datastore::Drive;

use crate::api::CommandContext;
use crate::LilyError;

pub mod fs;
pub mod io;
pub mod settings;

/// The shared prelude of every drive command: authenticate the caller and
/// dereference the target drive. The drive-map lock is held for the lookup
/// only.
fn target(ctx: &CommandContext<'_>) -> Result<(Arc<Drive>, Actor), LilyError> {
    let actor = ctx.authenticate()?;
    let drive = ctx.server.drive(ctx.params.str("drive")?)?;
    Ok((drive, actor))
}
