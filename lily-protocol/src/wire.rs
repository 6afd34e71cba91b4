use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use lily_api_types::{Auth, SessionId};

use crate::value::{Decoder, Encoder};
use crate::{DecodeError, Value};

pub const MAGIC: [u8; 4] = *b"LILY";
pub const VERSION: u16 = 1;

// There's no reason for a command header to be larger than that; file
// payloads go through the chunk channel instead.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

const AUTH_ANONYMOUS: u8 = 0;
const AUTH_CREDENTIAL: u8 = 1;
const AUTH_SESSION: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Decode(#[from] DecodeError),
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported protocol version {0}")]
    BadVersion(u16),
    #[error("message of {0} bytes exceeds the protocol limit")]
    TooLarge(u32),
    #[error("unknown auth tag {0}")]
    BadAuthTag(u8),
}

/// A framed command request as delivered to the dispatcher.
#[derive(Debug)]
pub struct Request {
    pub auth: Auth,
    pub command: String,
    pub params: HashMap<String, Value>,
}

/// The dispatcher's reply.
#[derive(Clone, Debug)]
pub struct Response {
    pub code: i32,
    pub message: String,
    pub data: HashMap<String, Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            code: lily_api_types::response::OK,
            message: String::new(),
            data: HashMap::new(),
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            code: lily_api_types::response::OK,
            message: message.into(),
            data: HashMap::new(),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Read one framed message body. `Ok(None)` means the peer closed the
/// connection cleanly before the next message.
async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut magic = [0u8; 4];
    let got = reader.read(&mut magic).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < magic.len() {
        reader.read_exact(&mut magic[got..]).await?;
    }
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic);
    }

    let version = reader.read_u16_le().await?;
    if version != VERSION {
        return Err(ProtocolError::BadVersion(version));
    }

    let length = reader.read_u32_le().await?;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(length));
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(&MAGIC).await?;
    writer.write_u16_le(VERSION).await?;
    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

fn decode_auth(dec: &mut Decoder) -> Result<Auth, ProtocolError> {
    match dec.get_u8()? {
        AUTH_ANONYMOUS => Ok(Auth::Anonymous),
        AUTH_CREDENTIAL => Ok(Auth::Credential {
            username: dec.get_str()?,
            password: dec.get_str()?,
        }),
        AUTH_SESSION => {
            let raw: [u8; 16] = dec
                .get_raw(16)?
                .try_into()
                .expect("slice with checked length");
            Ok(Auth::Session {
                id: SessionId::from_bytes(raw),
                username: dec.get_str()?,
            })
        }
        other => Err(ProtocolError::BadAuthTag(other)),
    }
}

fn encode_auth(enc: &mut Encoder, auth: &Auth) {
    match auth {
        Auth::Anonymous => enc.put_u8(AUTH_ANONYMOUS),
        Auth::Credential { username, password } => {
            enc.put_u8(AUTH_CREDENTIAL);
            enc.put_str(username);
            enc.put_str(password);
        }
        Auth::Session { id, username } => {
            enc.put_u8(AUTH_SESSION);
            enc.put_raw(id.as_bytes());
            enc.put_str(username);
        }
    }
}

/// Read the next request off the control channel. `Ok(None)` on clean EOF.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request>, ProtocolError> {
    let body = match read_message(reader).await? {
        Some(body) => body,
        None => return Ok(None),
    };

    let mut dec = Decoder::new(&body);
    let auth = decode_auth(&mut dec)?;
    let command = dec.get_str()?;
    let params = dec.get_map()?;

    Ok(Some(Request {
        auth,
        command,
        params,
    }))
}

pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request,
) -> Result<(), ProtocolError> {
    let mut enc = Encoder::new();
    encode_auth(&mut enc, &request.auth);
    enc.put_str(&request.command);
    enc.put_map(&request.params);
    write_message(writer, &enc.buf).await
}

pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Response, ProtocolError> {
    let body = read_message(reader)
        .await?
        .ok_or(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()))?;

    let mut dec = Decoder::new(&body);
    Ok(Response {
        code: dec.get_i32()?,
        message: dec.get_str()?,
        data: dec.get_map()?,
    })
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> Result<(), ProtocolError> {
    let mut enc = Encoder::new();
    enc.put_i32(response.code);
    enc.put_str(&response.message);
    enc.put_map(&response.data);
    write_message(writer, &enc.buf).await
}
