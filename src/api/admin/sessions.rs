use std::collections::HashMap;

use lily_api_types::Session;
use lily_protocol::{Response, Value};

use crate::api::CommandContext;
use crate::LilyError;

fn render(session: &Session) -> Value {
    let mut row = HashMap::new();
    row.insert("id".to_string(), Value::Str(session.id.to_string()));
    row.insert(
        "username".to_string(),
        Value::Str(session.username.clone()),
    );
    row.insert(
        "expireafter".to_string(),
        Value::Duration(session.expire_after.as_nanos() as i64),
    );
    row.insert("expireat".to_string(), Value::Int(session.expire_at));
    Value::Map(row)
}

pub async fn get_all_sessions(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let rows = ctx
        .server
        .sessions
        .all_sessions()
        .iter()
        .map(render)
        .collect();

    let mut response = Response::ok();
    response.set("sessions", Value::List(rows));
    Ok(response)
}

pub async fn get_user_sessions(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let username = ctx.params.str("user")?;
    let live_only = ctx.params.opt_bool("liveonly", false)?;

    let rows = ctx
        .server
        .sessions
        .user_sessions(username, live_only)
        .iter()
        .map(render)
        .collect();

    let mut response = Response::ok();
    response.set("sessions", Value::List(rows));
    Ok(response)
}

/// Expire an explicit batch of sessions. Strict: one unknown id fails the
/// whole batch with nothing removed.
pub async fn expire_sessions(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let ids = ctx.params.session_ids("ids")?;
    ctx.server.sessions.remove_many(&ids, true)?;
    log::info!("expired {} sessions by admin request", ids.len());
    Ok(Response::ok())
}

pub async fn expire_all_sessions(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let count = ctx.server.sessions.expire_all();
    log::info!("expired all {} sessions by admin request", count);

    let mut response = Response::ok();
    response.set("count", Value::Int(count as i64));
    Ok(response)
}
