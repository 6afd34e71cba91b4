//! The command dispatcher: a case-insensitive name-to-handler table, the
//! command context handed to handlers, and the fault guard.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use lazy_static::lazy_static;

use lily_api_types::{response, Actor, Auth};
use lily_protocol::{ChunkLink, Request, Response};

use crate::server::Server;
use crate::{auth, LilyError};

pub mod access;
pub mod admin;
pub mod drive;
pub mod params;
pub mod ping;

pub use params::Params;

/// Everything a handler can reach: the server façade, the caller's auth
/// material, the coerced parameter bag and the connection's chunk
/// transport.
pub struct CommandContext<'a> {
    pub server: &'a Arc<Server>,
    pub auth: Auth,
    pub params: Params,
    pub chunks: &'a mut dyn ChunkLink,
    /// Set by `shutdown`: signal after the response is flushed.
    pub shutdown: bool,
    /// Set when the connection's chunk state is unknown and the connection
    /// must be dropped after the response.
    pub close: bool,
}

impl CommandContext<'_> {
    pub fn authenticate(&self) -> Result<Actor, LilyError> {
        auth::authenticate(&self.auth, &self.server.users, &self.server.sessions)
    }

    pub fn authenticate_admin(&self) -> Result<Actor, LilyError> {
        let actor = self.authenticate()?;
        auth::require_admin(&actor)?;
        Ok(actor)
    }
}

/// What the connection layer does with a finished command.
pub struct Outcome {
    pub response: Response,
    pub shutdown: bool,
    pub close: bool,
}

type HandlerFuture<'a> = BoxFuture<'a, Result<Response, LilyError>>;
type Handler = for<'a, 'b> fn(&'a mut CommandContext<'b>) -> HandlerFuture<'a>;

fn insert(map: &mut HashMap<&'static str, Handler>, name: &'static str, handler: Handler) {
    map.insert(name, handler);
}

lazy_static! {
    static ref COMMANDS: HashMap<&'static str, Handler> = {
        let mut map = HashMap::new();

        insert(&mut map, "ping", |ctx| ping::ping(ctx).boxed());
        insert(&mut map, "info", |ctx| ping::info(ctx).boxed());

        insert(&mut map, "login", |ctx| access::login(ctx).boxed());
        insert(&mut map, "logout", |ctx| access::logout(ctx).boxed());
        insert(&mut map, "reauthenticate", |ctx| {
            access::reauthenticate(ctx).boxed()
        });
        insert(&mut map, "setexpirationtime", |ctx| {
            access::set_expiration_time(ctx).boxed()
        });
        insert(&mut map, "setpassword", |ctx| {
            access::set_password(ctx).boxed()
        });

        insert(&mut map, "createusers", |ctx| {
            admin::users::create_users(ctx).boxed()
        });
        insert(&mut map, "deleteusers", |ctx| {
            admin::users::delete_users(ctx).boxed()
        });
        insert(&mut map, "listusers", |ctx| {
            admin::users::list_users(ctx).boxed()
        });
        insert(&mut map, "getusers", |ctx| {
            admin::users::get_users(ctx).boxed()
        });
        insert(&mut map, "setclearances", |ctx| {
            admin::users::set_clearances(ctx).boxed()
        });
        insert(&mut map, "setpasswords", |ctx| {
            admin::users::set_passwords(ctx).boxed()
        });

        insert(&mut map, "getallsessions", |ctx| {
            admin::sessions::get_all_sessions(ctx).boxed()
        });
        insert(&mut map, "getusersessions", |ctx| {
            admin::sessions::get_user_sessions(ctx).boxed()
        });
        insert(&mut map, "expiresessions", |ctx| {
            admin::sessions::expire_sessions(ctx).boxed()
        });
        insert(&mut map, "expireallsessions", |ctx| {
            admin::sessions::expire_all_sessions(ctx).boxed()
        });

        insert(&mut map, "listdrives", |ctx| {
            admin::drives::list_drives(ctx).boxed()
        });
        insert(&mut map, "createdrive", |ctx| {
            admin::drives::create_drive(ctx).boxed()
        });
        insert(&mut map, "renamedrive", |ctx| {
            admin::drives::rename_drive(ctx).boxed()
        });
        insert(&mut map, "deletedrive", |ctx| {
            admin::drives::delete_drive(ctx).boxed()
        });

        insert(&mut map, "shutdown", |ctx| admin::node::shutdown(ctx).boxed());
        insert(&mut map, "getmemoryusage", |ctx| {
            admin::node::get_memory_usage(ctx).boxed()
        });
        insert(&mut map, "setnumworkers", |ctx| {
            admin::node::set_num_workers(ctx).boxed()
        });
        insert(&mut map, "setnetworktimeout", |ctx| {
            admin::node::set_network_timeout(ctx).boxed()
        });
        insert(&mut map, "setloglevel", |ctx| {
            admin::node::set_log_level(ctx).boxed()
        });

        insert(&mut map, "createdirs", |ctx| {
            drive::fs::create_dirs(ctx).boxed()
        });
        insert(&mut map, "createdirstree", |ctx| {
            drive::fs::create_dirs_tree(ctx).boxed()
        });
        insert(&mut map, "listdir", |ctx| drive::fs::list_dir(ctx).boxed());
        insert(&mut map, "renamedirs", |ctx| {
            drive::fs::rename_dirs(ctx).boxed()
        });
        insert(&mut map, "movedirs", |ctx| drive::fs::move_dirs(ctx).boxed());
        insert(&mut map, "deletedirs", |ctx| {
            drive::fs::delete_dirs(ctx).boxed()
        });
        insert(&mut map, "createfiles", |ctx| {
            drive::fs::create_files(ctx).boxed()
        });
        insert(&mut map, "renamefiles", |ctx| {
            drive::fs::rename_files(ctx).boxed()
        });
        insert(&mut map, "movefiles", |ctx| {
            drive::fs::move_files(ctx).boxed()
        });
        insert(&mut map, "deletefiles", |ctx| {
            drive::fs::delete_files(ctx).boxed()
        });
        insert(&mut map, "stat", |ctx| drive::fs::stat(ctx).boxed());
        insert(&mut map, "rehashfiles", |ctx| {
            drive::fs::rehash_files(ctx).boxed()
        });
        insert(&mut map, "verifyhashes", |ctx| {
            drive::fs::verify_hashes(ctx).boxed()
        });

        insert(&mut map, "readfiles", |ctx| drive::io::read_files(ctx).boxed());
        insert(&mut map, "writefiles", |ctx| {
            drive::io::write_files(ctx).boxed()
        });

        insert(&mut map, "getpathsettings", |ctx| {
            drive::settings::get_path_settings(ctx).boxed()
        });
        insert(&mut map, "setpathsettings", |ctx| {
            drive::settings::set_path_settings(ctx).boxed()
        });
        insert(&mut map, "setpathclearances", |ctx| {
            drive::settings::set_path_clearances(ctx).boxed()
        });
        insert(&mut map, "addpathwhitelist", |ctx| {
            drive::settings::add_path_whitelist(ctx).boxed()
        });
        insert(&mut map, "removepathwhitelist", |ctx| {
            drive::settings::remove_path_whitelist(ctx).boxed()
        });
        insert(&mut map, "addpathblacklist", |ctx| {
            drive::settings::add_path_blacklist(ctx).boxed()
        });
        insert(&mut map, "removepathblacklist", |ctx| {
            drive::settings::remove_path_blacklist(ctx).boxed()
        });

        map
    };
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Dispatch one request.
///
/// Unknown names report code 1. Handlers map every anticipated error onto
/// its stable code; a panic or an escaped internal error is caught here and
/// reported as code 2 with the fault message, and always logged.
pub async fn handle_request(
    server: &Arc<Server>,
    request: Request,
    chunks: &mut dyn ChunkLink,
) -> Outcome {
    let name = request.command.to_lowercase();

    let handler = match COMMANDS.get(name.as_str()) {
        Some(handler) => *handler,
        None => {
            return Outcome {
                response: Response::error(
                    response::UNKNOWN_COMMAND,
                    format!("invalid command '{}'", request.command),
                ),
                shutdown: false,
                close: false,
            }
        }
    };

    let mut ctx = CommandContext {
        server,
        auth: request.auth,
        params: Params::new(request.params),
        chunks,
        shutdown: false,
        close: false,
    };

    let response = match AssertUnwindSafe(handler(&mut ctx)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => err.into_response(),
        Err(panic) => {
            let message = panic_message(panic);
            log::error!("command '{}' fault: {}", name, message);
            Response::error(response::FAULT, message)
        }
    };

    Outcome {
        response,
        shutdown: ctx.shutdown,
        close: ctx.close,
    }
}
