use std::collections::HashMap;

use lily_protocol::{Response, Value};

use crate::api::drive::target;
use crate::api::CommandContext;
use crate::LilyError;

fn paired_list(
    ctx: &CommandContext<'_>,
    name: &'static str,
    len: usize,
) -> Result<Vec<String>, LilyError> {
    let list = ctx.params.str_list(name)?;
    if list.len() != len {
        return Err(LilyError::InvalidParameters(format!(
            "'{}' must have one entry per path",
            name
        )));
    }
    Ok(list)
}

pub async fn create_dirs(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let settings = ctx.params.opt_settings_list("settings", paths.len())?;

    drive
        .create_dirs(&paths, settings.as_deref(), &actor)
        .await?;
    Ok(Response::ok())
}

pub async fn create_dirs_tree(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let parent = ctx.params.str("parent")?;
    let relative = ctx.params.str_list("paths")?;
    let parent_settings = ctx.params.opt_settings("parentsettings")?;
    let leaf_settings = ctx.params.opt_settings("settings")?;

    drive
        .create_dirs_tree(parent, &relative, parent_settings, leaf_settings, &actor)
        .await?;
    Ok(Response::ok())
}

pub async fn list_dir(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let path = ctx.params.str("path")?;

    let entries = drive.list_dir(path, &actor).await?;
    let rows = entries
        .into_iter()
        .map(|entry| {
            let mut row = HashMap::new();
            row.insert("name".to_string(), Value::Str(entry.name));
            row.insert("isdir".to_string(), Value::Bool(entry.is_dir));
            if let Some(length) = entry.length {
                row.insert("length".to_string(), Value::Int(length as i64));
            }
            if let Some(modified) = entry.modified {
                row.insert("modified".to_string(), Value::Int(modified));
            }
            Value::Map(row)
        })
        .collect();

    let mut response = Response::ok();
    response.set("entries", Value::List(rows));
    Ok(response)
}

pub async fn rename_dirs(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let new_names = paired_list(ctx, "newnames", paths.len())?;

    drive.rename_dirs(&paths, &new_names, &actor).await?;
    Ok(Response::ok())
}

pub async fn move_dirs(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let dests = paired_list(ctx, "dests", paths.len())?;

    drive.move_dirs(&paths, &dests, &actor).await?;
    Ok(Response::ok())
}

pub async fn delete_dirs(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;

    drive.delete_dirs(&paths, &actor).await?;
    Ok(Response::ok())
}

pub async fn create_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let settings = ctx.params.opt_settings_list("settings", paths.len())?;

    drive
        .create_files(&paths, settings.as_deref(), &actor)
        .await?;
    Ok(Response::ok())
}

pub async fn rename_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let new_names = paired_list(ctx, "newnames", paths.len())?;

    drive.rename_files(&paths, &new_names, &actor).await?;
    Ok(Response::ok())
}

pub async fn move_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let dests = paired_list(ctx, "dests", paths.len())?;

    drive.move_files(&paths, &dests, &actor).await?;
    Ok(Response::ok())
}

pub async fn delete_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;

    drive.delete_files(&paths, &actor).await?;
    Ok(Response::ok())
}

pub async fn stat(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;

    let results = drive.stat(&paths, &actor).await?;
    let rows = results
        .into_iter()
        .map(|result| {
            let mut row = HashMap::new();
            row.insert("path".to_string(), Value::Str(result.path));
            row.insert("exists".to_string(), Value::Bool(result.exists));
            row.insert("isdir".to_string(), Value::Bool(result.is_dir));
            row.insert("length".to_string(), Value::Int(result.length as i64));
            row.insert("modified".to_string(), Value::Int(result.modified));
            if let Some(hash) = result.hash {
                row.insert("hash".to_string(), Value::Str(hash));
            }
            Value::Map(row)
        })
        .collect();

    let mut response = Response::ok();
    response.set("entries", Value::List(rows));
    Ok(response)
}

pub async fn rehash_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;

    let digests = drive.rehash(&paths, &actor).await?;
    let mut response = Response::ok();
    response.set(
        "hashes",
        Value::List(digests.into_iter().map(Value::Str).collect()),
    );
    Ok(response)
}

pub async fn verify_hashes(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;

    let results = drive.verify_hashes(&paths, &actor).await?;
    let mut response = Response::ok();
    response.set(
        "results",
        Value::List(results.into_iter().map(Value::Bool).collect()),
    );
    Ok(response)
}
