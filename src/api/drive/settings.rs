//! Per-path access settings commands.
//!
//! All mutations check `modify` on the target path under the same lock as
//! the mutation itself - an authorisation failure never leaves a partial
//! update behind.

use lily_api_types::Clearance;
use lily_protocol::Response;

use crate::api::drive::target;
use crate::api::params::settings_to_value;
use crate::api::CommandContext;
use crate::LilyError;

pub async fn get_path_settings(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let path = ctx.params.str("path")?;

    let settings = drive.get_settings(path, &actor).await?;
    let mut response = Response::ok();
    response.set("settings", settings_to_value(&settings));
    Ok(response)
}

pub async fn set_path_settings(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let path = ctx.params.str("path")?;
    let settings = ctx.params.settings("settings")?;

    drive.set_settings(path, settings, &actor).await?;
    Ok(Response::ok())
}

pub async fn set_path_clearances(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let path = ctx.params.str("path")?;
    let access = Clearance::from_level(ctx.params.int("access")?)
        .map_err(|_| LilyError::InvalidClearances)?;
    let modify = Clearance::from_level(ctx.params.int("modify")?)
        .map_err(|_| LilyError::InvalidClearances)?;

    drive.set_clearances(path, access, modify, &actor).await?;
    Ok(Response::ok())
}

async fn update_lists(
    ctx: &mut CommandContext<'_>,
    whitelist: bool,
    add: bool,
) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let path = ctx.params.str("path")?;
    let users = ctx.params.str_list("users")?;
    // false targets the access list, true the modify list
    let modify_list = ctx.params.opt_bool("modify", false)?;

    drive
        .update_lists(path, whitelist, add, modify_list, &users, &actor)
        .await?;
    Ok(Response::ok())
}

pub async fn add_path_whitelist(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    update_lists(ctx, true, true).await
}

pub async fn remove_path_whitelist(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    update_lists(ctx, true, false).await
}

pub async fn add_path_blacklist(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    update_lists(ctx, false, true).await
}

pub async fn remove_path_blacklist(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    update_lists(ctx, false, false).await
}
