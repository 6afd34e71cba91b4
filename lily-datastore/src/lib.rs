//! Drive storage for the lily file server.
//!
//! A drive is an in-memory tree of directories and files mirroring a
//! backing directory on disk. The tree is the source of truth for names,
//! access settings and file metadata; file contents live on disk and are
//! streamed through the chunk channel.

mod drive;
mod error;
mod hash;
mod io;
mod node;
mod path;
mod snapshot;

pub use drive::{DirEntry, Drive, StatResult};
pub use error::FsError;
pub use node::{FileMeta, Node, NodeRef};
pub use path::{join_path, split_path, validate_node_name};
