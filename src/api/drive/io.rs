//! The chunked streaming commands.
//!
//! `readfiles` streams its payload through the chunk channel before the
//! response is written; `writefiles` consumes the client's streams between
//! the request header and the response. A failed write leaves the chunk
//! state of the connection unknown, so the connection is dropped after the
//! error response.

use lily_protocol::{Response, DEFAULT_CHUNK_SIZE};

use crate::api::drive::target;
use crate::api::CommandContext;
use crate::LilyError;

pub async fn read_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let starts = ctx.params.opt_int_list("start", paths.len(), 0)?;
    let ends = ctx.params.opt_int_list("end", paths.len(), -1)?;
    let chunk_size = ctx
        .params
        .opt_int("chunksize", DEFAULT_CHUNK_SIZE as i64)?;

    drive
        .read_files(&paths, &starts, &ends, chunk_size, &mut *ctx.chunks, &actor)
        .await?;
    Ok(Response::ok())
}

pub async fn write_files(ctx: &mut CommandContext<'_>) -> Result<Response, LilyError> {
    let (drive, actor) = target(ctx)?;
    let paths = ctx.params.str_list("paths")?;
    let starts = ctx.params.opt_int_list("start", paths.len(), 0)?;
    let clears = ctx.params.opt_bool_list("clear", paths.len(), false)?;

    match drive
        .write_files(&paths, &starts, &clears, &mut *ctx.chunks, &actor)
        .await
    {
        Ok(()) => Ok(Response::ok()),
        Err(err) => {
            // unread client frames would be misparsed as the next request
            ctx.close = true;
            Err(err.into())
        }
    }
}
