//! Cheap checks that the server is alive.

use lily_protocol::{Response, Value};

use crate::api::CommandContext;
use crate::LilyError;

/// No auth, no parameters, no work.
pub async fn ping(_ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    Ok(Response::with_message("pong"))
}

pub async fn info(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let mut response = Response::ok();
    response.set("name", ctx.server.config.name.as_str());
    response.set("version", env!("CARGO_PKG_VERSION"));
    response.set(
        "protocol",
        Value::Int(lily_protocol::wire::VERSION as i64),
    );
    response.set("uptime", Value::Int(ctx.server.uptime_secs() as i64));
    Ok(response)
}
