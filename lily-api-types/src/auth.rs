use crate::SessionId;

/// The authentication material attached to a request.
///
/// Most commands accept either authenticated variant; a handful narrow to
/// exactly one and reject the other. `Anonymous` is only good for the
/// handful of commands that require no authentication at all.
#[derive(Clone, Debug)]
pub enum Auth {
    Anonymous,
    Credential { username: String, password: String },
    Session { id: SessionId, username: String },
}

impl Auth {
    /// The username the caller claims to be, if any. Not authenticated -
    /// callers must go through the authenticator before trusting it.
    pub fn username(&self) -> Option<&str> {
        match self {
            Auth::Anonymous => None,
            Auth::Credential { username, .. } => Some(username),
            Auth::Session { username, .. } => Some(username),
        }
    }
}
