use std::path::PathBuf;

use lily_protocol::{Response, Value};

use crate::api::CommandContext;
use crate::LilyError;

/// Drive names are not secret; any authenticated user may list them.
pub async fn list_drives(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate()?;

    let mut response = Response::ok();
    response.set(
        "drives",
        Value::List(
            ctx.server
                .drive_names()
                .into_iter()
                .map(Value::Str)
                .collect(),
        ),
    );
    Ok(response)
}

pub async fn create_drive(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let name = ctx.params.str("name")?;
    let dir = PathBuf::from(ctx.params.str("dir")?);
    let file = match ctx.params.opt_str("file")? {
        Some(file) => PathBuf::from(file),
        // keep the snapshot as a sibling so it never shadows tree content
        None => PathBuf::from(format!("{}.drive", dir.display())),
    };

    ctx.server.create_drive(name, dir, file)?;
    log::info!("created drive '{}'", name);
    Ok(Response::ok())
}

pub async fn rename_drive(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let name = ctx.params.str("name")?;
    let new_name = ctx.params.str("newname")?;
    ctx.server.rename_drive(name, new_name).await?;
    log::info!("renamed drive '{}' to '{}'", name, new_name);
    Ok(Response::ok())
}

pub async fn delete_drive(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let name = ctx.params.str("name")?;
    ctx.server.delete_drive(name).await?;
    log::info!("deleted drive '{}'", name);
    Ok(Response::ok())
}
