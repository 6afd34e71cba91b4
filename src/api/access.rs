//! Login, logout and the other session-facing commands.
//!
//! These commands are narrowed to a single auth variant: `login` and
//! `setpassword` require credentials, the rest require a session. The
//! wrong variant reports the same auth error as a failed authentication.

use std::time::Duration;

use lily_protocol::Response;

use crate::api::CommandContext;
use crate::{auth, LilyError};

pub async fn login(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    auth::require_credential(&ctx.auth)?;
    let actor = ctx.authenticate()?;

    let expire_after = match ctx.params.opt_duration("expireafter")? {
        Some(duration) => duration,
        None => Duration::from_secs(ctx.server.sessions.policy().default_expire_secs),
    };

    let session = ctx.server.sessions.create(&actor.username, expire_after)?;
    log::info!("user '{}' logged in", actor.username);

    let mut response = Response::ok();
    response.set("id", session.id.to_string());
    Ok(response)
}

pub async fn logout(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let id = auth::require_session(&ctx.auth)?;
    let actor = ctx.authenticate()?;

    ctx.server.sessions.remove(&id);
    log::info!("user '{}' logged out", actor.username);
    Ok(Response::ok())
}

/// A successful session authentication already refreshes the expiry; this
/// command exists so idle clients can keep a session alive explicitly.
pub async fn reauthenticate(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    auth::require_session(&ctx.auth)?;
    ctx.authenticate()?;
    Ok(Response::ok())
}

pub async fn set_expiration_time(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let id = auth::require_session(&ctx.auth)?;
    ctx.authenticate()?;

    let expire_after = ctx.params.duration("expireafter")?;
    ctx.server.sessions.set_expire_after(&id, expire_after)?;
    Ok(Response::ok())
}

/// Change one's own password. Requires credential auth so the old password
/// is proven, not just a possibly stolen session.
pub async fn set_password(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    auth::require_credential(&ctx.auth)?;
    let actor = ctx.authenticate()?;

    let password = ctx.params.str("password")?;
    ctx.server.users.set_password(&actor.username, password)?;
    log::info!("user '{}' changed their password", actor.username);
    Ok(Response::ok())
}
