use std::path::Path;

use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 of a file's on-disk bytes, streamed so large files never sit in
/// memory at once.
pub(crate) async fn hash_file(path: &Path) -> Result<[u8; 32], std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = openssl::sha::Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let got = file.read(&mut buf).await?;
        if got == 0 {
            break;
        }
        hasher.update(&buf[..got]);
    }
    Ok(hasher.finish())
}

pub(crate) fn empty_digest() -> [u8; 32] {
    openssl::sha::sha256(b"")
}
