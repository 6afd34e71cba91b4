//! The lily wire protocol.
//!
//! Requests and responses travel as length-framed binary messages with a
//! small tagged value encoding for parameters and response data. Large file
//! payloads bypass the message framing entirely and stream through the
//! [chunk channel](chunk::ChunkChannel).

pub mod chunk;
pub mod value;
pub mod wire;

pub use chunk::{
    ChunkChannel, ChunkError, ChunkLink, ChunkSink, ChunkSource, NullChunks, DEFAULT_CHUNK_SIZE,
    MAX_CHUNK_SIZE,
};
pub use value::{DecodeError, Value};
pub use wire::{
    read_request, read_response, write_request, write_response, ProtocolError, Request, Response,
};
