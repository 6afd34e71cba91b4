//! Control over the running server process itself.

use lily_protocol::{Response, Value};

use crate::api::CommandContext;
use crate::LilyError;

/// Signal shutdown. The dispatcher flushes this response before the
/// connection layer raises the shutdown state, so the caller always sees
/// the acknowledgement.
pub async fn shutdown(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let actor = ctx.authenticate_admin()?;
    log::info!("shutdown requested by '{}'", actor.username);

    ctx.shutdown = true;
    Ok(Response::with_message("shutting down"))
}

pub async fn get_memory_usage(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let bytes = ctx.server.memory_usage()?;
    let mut response = Response::ok();
    response.set("bytes", Value::Int(bytes as i64));
    Ok(response)
}

pub async fn set_num_workers(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let count = ctx.params.int("workers")?;
    ctx.server.set_num_workers(count)?;
    log::info!("worker pool resized to {}", count);
    Ok(Response::ok())
}

pub async fn set_network_timeout(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let timeout = ctx.params.duration("timeout")?;
    ctx.server.set_network_timeout(timeout)?;
    log::info!("network timeout set to {:?}", timeout);
    Ok(Response::ok())
}

pub async fn set_log_level(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    ctx.authenticate_admin()?;

    let level = ctx.params.str("level")?;
    ctx.server.set_log_level(level)?;
    Ok(Response::ok())
}
