//! Chunked streaming reads and writes against drive files.

use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use lily_api_types::{epoch_ms, Actor};
use lily_protocol::{ChunkLink, ChunkSink, ChunkSource, MAX_CHUNK_SIZE};

use crate::drive::Drive;
use crate::node::NodeRef;
use crate::path::{join_path, split_path};
use crate::FsError;

struct ReadPlan {
    components: Vec<String>,
    node: NodeRef,
    start: i64,
    end: i64,
}

struct WritePlan {
    components: Vec<String>,
    node: NodeRef,
    start: u64,
    clear: bool,
}

impl Drive {
    /// Stream byte ranges of a batch of files into the chunk channel, in
    /// the order given by the client. Each file produces frames of at most
    /// `chunk_size` bytes followed by a stream terminator.
    ///
    /// A `start` of 0 and an `end` of -1 select the whole file; ranges
    /// beyond the file length are clamped.
    pub async fn read_files(
        &self,
        paths: &[String],
        starts: &[i64],
        ends: &[i64],
        chunk_size: i64,
        chunks: &mut dyn ChunkLink,
        actor: &Actor,
    ) -> Result<(), FsError> {
        if chunk_size < 1 || chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(FsError::InvalidChunkSize(chunk_size));
        }
        let chunk_size = chunk_size as usize;

        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());
        for (idx, path) in paths.iter().enumerate() {
            let components = split_path(path)?;
            let node = self.resolve(&components).await?;
            let rendered = join_path(&components);
            self.check_access(&node, &rendered, actor).await?;
            node.state.read().await.file(&rendered)?;

            let start = starts.get(idx).copied().unwrap_or(0);
            let end = ends.get(idx).copied().unwrap_or(-1);
            if start < 0 || end < -1 || (end != -1 && end < start) {
                return Err(FsError::InvalidRange);
            }

            plan.push(ReadPlan {
                components,
                node,
                start,
                end,
            });
        }

        let mut buf = vec![0u8; chunk_size];
        for entry in plan {
            let state = entry.node.state.read().await;
            let length = state.file(&join_path(&entry.components))?.length;

            let start = (entry.start as u64).min(length);
            let end = if entry.end == -1 {
                length
            } else {
                (entry.end as u64).min(length)
            };
            let mut remaining = end.saturating_sub(start);

            let mut file = tokio::fs::File::open(self.disk_path(&entry.components)).await?;
            file.seek(SeekFrom::Start(start)).await?;

            while remaining > 0 {
                let want = remaining.min(chunk_size as u64) as usize;
                let got = file.read(&mut buf[..want]).await?;
                if got == 0 {
                    // disk file shorter than recorded; stop at actual EOF
                    break;
                }
                chunks.send(&buf[..got]).await?;
                remaining -= got as u64;
            }
            chunks.finish().await?;
        }
        Ok(())
    }

    /// Consume one chunk stream per file from the channel and write it into
    /// the file, in the order given by the client.
    ///
    /// With `clear` set the file is truncated to `start` first; otherwise
    /// the stream overwrites in place from `start`. A start beyond the
    /// current length is rejected. Completion updates length, modification
    /// time and modifier, and marks the stored hash stale.
    pub async fn write_files(
        &self,
        paths: &[String],
        starts: &[i64],
        clears: &[bool],
        chunks: &mut dyn ChunkLink,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());
        for (idx, path) in paths.iter().enumerate() {
            let components = split_path(path)?;
            let node = self.resolve(&components).await?;
            let rendered = join_path(&components);
            self.check_modify(&node, &rendered, actor).await?;
            let length = node.state.read().await.file(&rendered)?.length;

            let start = starts.get(idx).copied().unwrap_or(0);
            if start < 0 || start as u64 > length {
                return Err(FsError::InvalidRange);
            }

            plan.push(WritePlan {
                components,
                node,
                start: start as u64,
                clear: clears.get(idx).copied().unwrap_or(false),
            });
        }

        self.mark_dirty();
        for entry in plan {
            let rendered = join_path(&entry.components);
            let mut state = entry.node.state.write().await;

            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(self.disk_path(&entry.components))
                .await?;
            if entry.clear {
                file.set_len(entry.start).await?;
            }
            file.seek(SeekFrom::Start(entry.start)).await?;

            let mut written: u64 = 0;
            while let Some(data) = chunks.recv().await? {
                file.write_all(&data).await?;
                written += data.len() as u64;
            }
            file.flush().await?;

            let meta = state.file_mut(&rendered)?;
            let end = entry.start + written;
            meta.length = if entry.clear {
                end
            } else {
                meta.length.max(end)
            };
            meta.modified = epoch_ms();
            meta.modifier = actor.username.clone();
            meta.hash = None;
        }
        Ok(())
    }
}
