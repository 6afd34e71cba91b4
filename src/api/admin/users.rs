use std::collections::HashMap;

use lily_api_types::Clearance;
use lily_protocol::{Response, Value};

use crate::api::CommandContext;
use crate::LilyError;

fn clearances_param(ctx: &CommandContext<'_>, len: usize) -> Result<Vec<Clearance>, LilyError> {
    let levels = ctx.params.int_list("clearances")?;
    if levels.len() != len {
        return Err(LilyError::InvalidParameters(
            "'clearances' must have one entry per user".to_string(),
        ));
    }
    levels
        .into_iter()
        .map(|level| Clearance::from_level(level).map_err(|_| LilyError::InvalidClearances))
        .collect()
}

pub async fn create_users(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.params.str_list("users")?;
    let passwords = ctx.params.str_list("passwords")?;
    if passwords.len() != names.len() {
        return Err(LilyError::InvalidParameters(
            "'passwords' must have one entry per user".to_string(),
        ));
    }
    let clearances = clearances_param(ctx, names.len())?;

    // validate the whole batch before the first insert
    for name in &names {
        lily_api_types::validate_username(name)
            .map_err(|err| LilyError::InvalidParameters(err.to_string()))?;
        if ctx.server.users.get(name).is_some() {
            return Err(LilyError::InvalidParameters(format!(
                "user '{}' already exists",
                name
            )));
        }
    }

    for ((name, password), clearance) in names.iter().zip(&passwords).zip(clearances) {
        ctx.server.users.create(name, password, clearance)?;
        log::info!("created user '{}' with clearance {}", name, clearance);
    }
    Ok(Response::ok())
}

pub async fn delete_users(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.params.str_list("users")?;
    ctx.server.users.remove_many(&names)?;

    // a deleted account must not keep working through old sessions
    for name in &names {
        ctx.server.sessions.remove_user_sessions(name);
        log::info!("deleted user '{}'", name);
    }
    Ok(Response::ok())
}

pub async fn list_users(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.server.users.list();
    let mut response = Response::ok();
    response.set(
        "users",
        Value::List(names.into_iter().map(Value::Str).collect()),
    );
    Ok(response)
}

pub async fn get_users(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.params.str_list("users")?;
    let users = ctx.server.users.get_many(&names)?;

    let rows = users
        .into_iter()
        .map(|user| {
            let mut row = HashMap::new();
            row.insert("name".to_string(), Value::Str(user.name));
            row.insert(
                "clearance".to_string(),
                Value::Int(user.clearance.level() as i64),
            );
            Value::Map(row)
        })
        .collect();

    let mut response = Response::ok();
    response.set("users", Value::List(rows));
    Ok(response)
}

pub async fn set_clearances(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.params.str_list("users")?;
    let clearances = clearances_param(ctx, names.len())?;

    // every named user must exist before anything changes
    ctx.server.users.get_many(&names)?;

    for (name, clearance) in names.iter().zip(clearances) {
        ctx.server.users.set_clearance(name, clearance)?;
    }
    Ok(Response::ok())
}

pub async fn set_passwords(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let names = ctx.params.str_list("users")?;
    let passwords = ctx.params.str_list("passwords")?;
    if passwords.len() != names.len() {
        return Err(LilyError::InvalidParameters(
            "'passwords' must have one entry per user".to_string(),
        ));
    }

    ctx.server.users.get_many(&names)?;

    for (name, password) in names.iter().zip(&passwords) {
        ctx.server.users.set_password(name, password)?;
        log::info!("password reset for user '{}'", name);
    }
    Ok(Response::ok())
}
