use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use lily_api_types::AccessSettings;

use crate::FsError;

pub type NodeRef = Arc<Node>;

/// A directory or file in a drive tree.
///
/// The node's name is the key under which its parent holds it, so renames
/// are single-point mutations. The per-node lock is held across the disk
/// I/O of streaming reads and writes, which is why it is an async lock.
pub struct Node {
    pub(crate) state: RwLock<NodeState>,
}

pub(crate) struct NodeState {
    pub settings: AccessSettings,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    Directory(BTreeMap<String, NodeRef>),
    File(FileMeta),
}

#[derive(Clone, Debug)]
pub struct FileMeta {
    pub length: u64,
    /// SHA-256 of the on-disk bytes as of the last rehash; `None` after a
    /// write made it stale.
    pub hash: Option<[u8; 32]>,
    /// Epoch milliseconds of the last completed write.
    pub modified: i64,
    pub modifier: String,
}

impl Node {
    pub fn new_dir(settings: AccessSettings) -> NodeRef {
        Arc::new(Node {
            state: RwLock::new(NodeState {
                settings,
                kind: NodeKind::Directory(BTreeMap::new()),
            }),
        })
    }

    pub(crate) fn new_dir_with(
        settings: AccessSettings,
        children: BTreeMap<String, NodeRef>,
    ) -> NodeRef {
        Arc::new(Node {
            state: RwLock::new(NodeState {
                settings,
                kind: NodeKind::Directory(children),
            }),
        })
    }

    pub fn new_file(settings: AccessSettings, meta: FileMeta) -> NodeRef {
        Arc::new(Node {
            state: RwLock::new(NodeState {
                settings,
                kind: NodeKind::File(meta),
            }),
        })
    }

    pub async fn settings(&self) -> AccessSettings {
        self.state.read().await.settings.clone()
    }

    pub async fn is_dir(&self) -> bool {
        matches!(self.state.read().await.kind, NodeKind::Directory(_))
    }
}

impl NodeState {
    pub fn children(&self, path: &str) -> Result<&BTreeMap<String, NodeRef>, FsError> {
        match &self.kind {
            NodeKind::Directory(children) => Ok(children),
            NodeKind::File(_) => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    pub fn children_mut(
        &mut self,
        path: &str,
    ) -> Result<&mut BTreeMap<String, NodeRef>, FsError> {
        match &mut self.kind {
            NodeKind::Directory(children) => Ok(children),
            NodeKind::File(_) => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    pub fn file(&self, path: &str) -> Result<&FileMeta, FsError> {
        match &self.kind {
            NodeKind::File(meta) => Ok(meta),
            NodeKind::Directory(_) => Err(FsError::NotAFile(path.to_string())),
        }
    }

    pub fn file_mut(&mut self, path: &str) -> Result<&mut FileMeta, FsError> {
        match &mut self.kind {
            NodeKind::File(meta) => Ok(meta),
            NodeKind::Directory(_) => Err(FsError::NotAFile(path.to_string())),
        }
    }
}
