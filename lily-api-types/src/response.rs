//! The stable numeric response code taxonomy.
//!
//! These values are wire protocol - they must never be renumbered.

pub const OK: i32 = 0;
pub const UNKNOWN_COMMAND: i32 = 1;
pub const FAULT: i32 = 2;
pub const AUTH: i32 = 6;
pub const SESSION_ID_EXHAUSTED: i32 = 9;
pub const NON_EXPIRING_FORBIDDEN: i32 = 10;
pub const SESSION_LIMIT: i32 = 11;
pub const INVALID_PARAMETERS: i32 = 12;
pub const NO_SUCH_DRIVE: i32 = 13;
pub const INVALID_ACCESS_SETTINGS: i32 = 14;
pub const FS_ARGUMENT: i32 = 15;
pub const CLEARANCE: i32 = 16;
pub const FS_UNKNOWN: i32 = 17;
pub const INVALID_CHUNK_SIZE: i32 = 18;
pub const INVALID_CLEARANCES: i32 = 19;
pub const NO_SUCH_USER: i32 = 21;
pub const HASH_FAILED: i32 = 22;
pub const NO_SUCH_SESSION: i32 = 23;
pub const INVALID_DRIVE_FILE: i32 = 24;
pub const INVALID_NUM_WORKERS: i32 = 25;
pub const INVALID_TIMEOUT: i32 = 26;
pub const INVALID_LOG_LEVEL: i32 = 27;
pub const DRIVE_EXISTS: i32 = 28;
