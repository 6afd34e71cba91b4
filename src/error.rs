use lily_api_types::response;
use lily_config::UserError;
use lily_datastore::FsError;
use lily_protocol::Response;

/// Classified command errors. Every variant maps onto exactly one stable
/// response code; anything that ends up in `Fault` is a programming error
/// caught by the dispatcher guard.
#[derive(Debug, thiserror::Error)]
pub enum LilyError {
    #[error("invalid or expired auth")]
    Auth,
    #[error("insufficient clearance")]
    Clearance,
    #[error("session id generation failed")]
    SessionIdExhausted,
    #[error("non-expiring sessions are not permitted")]
    NonExpiringForbidden,
    #[error("per-user session limit reached")]
    SessionLimit,
    #[error("session '{0}' does not exist")]
    NoSuchSession(String),
    #[error("missing parameter '{0}'")]
    MissingParameter(String),
    #[error("parameter '{0}' must be a {1}")]
    ParameterType(String, &'static str),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("drive '{0}' does not exist")]
    NoSuchDrive(String),
    #[error("drive '{0}' already exists")]
    DriveExists(String),
    #[error("invalid access settings: {0}")]
    InvalidAccessSettings(String),
    #[error("invalid access/modify clearances")]
    InvalidClearances,
    #[error("user '{0}' does not exist")]
    NoSuchUser(String),
    #[error("password hash failed")]
    HashFailed,
    #[error("invalid number of workers {0}")]
    InvalidNumWorkers(i64),
    #[error("invalid timeout interval")]
    InvalidTimeout,
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl LilyError {
    pub fn code(&self) -> i32 {
        match self {
            LilyError::Auth => response::AUTH,
            LilyError::Clearance => response::CLEARANCE,
            LilyError::SessionIdExhausted => response::SESSION_ID_EXHAUSTED,
            LilyError::NonExpiringForbidden => response::NON_EXPIRING_FORBIDDEN,
            LilyError::SessionLimit => response::SESSION_LIMIT,
            LilyError::NoSuchSession(_) => response::NO_SUCH_SESSION,
            LilyError::MissingParameter(_)
            | LilyError::ParameterType(..)
            | LilyError::InvalidParameters(_) => response::INVALID_PARAMETERS,
            LilyError::NoSuchDrive(_) => response::NO_SUCH_DRIVE,
            LilyError::DriveExists(_) => response::DRIVE_EXISTS,
            LilyError::InvalidAccessSettings(_) => response::INVALID_ACCESS_SETTINGS,
            LilyError::InvalidClearances => response::INVALID_CLEARANCES,
            LilyError::NoSuchUser(_) => response::NO_SUCH_USER,
            LilyError::HashFailed => response::HASH_FAILED,
            LilyError::InvalidNumWorkers(_) => response::INVALID_NUM_WORKERS,
            LilyError::InvalidTimeout => response::INVALID_TIMEOUT,
            LilyError::InvalidLogLevel(_) => response::INVALID_LOG_LEVEL,
            LilyError::Fs(err) => match err {
                FsError::InvalidChunkSize(_) => response::INVALID_CHUNK_SIZE,
                FsError::Clearance(_) => response::CLEARANCE,
                FsError::Clearances(_) => response::INVALID_CLEARANCES,
                FsError::DriveFile(_) => response::INVALID_DRIVE_FILE,
                FsError::Io(_) | FsError::Chunk(_) => response::FS_UNKNOWN,
                _ => response::FS_ARGUMENT,
            },
            LilyError::Fault(_) => response::FAULT,
        }
    }

    pub fn into_response(self) -> Response {
        if let LilyError::Fault(ref err) = self {
            log::error!("unhandled command error: {:?}", err);
        }
        Response::error(self.code(), self.to_string())
    }
}

impl From<UserError> for LilyError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(name) => LilyError::NoSuchUser(name),
            UserError::Exists(name) => {
                LilyError::InvalidParameters(format!("user '{}' already exists", name))
            }
            UserError::InvalidName(err) => LilyError::InvalidParameters(err.to_string()),
            UserError::HashFailed(_) => LilyError::HashFailed,
        }
    }
}

#[cfg(test)]
mod test {
    use lily_api_types::response;
    use lily_datastore::FsError;

    use super::LilyError;

    #[test]
    fn test_code_mapping_is_stable() {
        assert_eq!(LilyError::Auth.code(), 6);
        assert_eq!(LilyError::SessionLimit.code(), 11);
        assert_eq!(LilyError::NoSuchDrive("d".into()).code(), 13);
        assert_eq!(LilyError::InvalidClearances.code(), 19);
        assert_eq!(
            LilyError::Fs(FsError::InvalidRange).code(),
            response::FS_ARGUMENT
        );
        assert_eq!(LilyError::Fs(FsError::InvalidChunkSize(0)).code(), 18);
        assert_eq!(
            LilyError::Fs(FsError::Clearance("/x".into())).code(),
            response::CLEARANCE
        );
    }
}
