//! Snapshot and restore of a drive's tree to its single snapshot file.
//!
//! Only the tree itself is persisted - names, access settings and file
//! metadata. File contents stay in the backing directory.

use std::collections::BTreeMap;
use std::path::Path;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use lily_api_types::{AccessSettings, Clearance};

use crate::drive::Drive;
use crate::node::{FileMeta, Node, NodeKind, NodeRef};
use crate::path::validate_node_name;
use crate::FsError;

#[derive(Serialize, Deserialize)]
struct FileForm {
    length: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    hash: Option<String>,
    modified: i64,
    modifier: String,
}

#[derive(Serialize, Deserialize)]
struct NodeForm {
    settings: AccessSettings,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    children: Option<BTreeMap<String, NodeForm>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    file: Option<FileForm>,
}

#[derive(Serialize, Deserialize)]
struct DriveForm {
    name: String,
    root: NodeForm,
}

fn freeze(node: NodeRef) -> BoxFuture<'static, NodeForm> {
    async move {
        let state = node.state.read().await;
        match &state.kind {
            NodeKind::Directory(children) => {
                let entries: Vec<(String, NodeRef)> = children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.clone()))
                    .collect();
                // the parent guard stays held while children freeze, so the
                // lock order matches every other root-to-leaf walk
                let mut frozen = BTreeMap::new();
                for (name, child) in entries {
                    frozen.insert(name, freeze(child).await);
                }
                NodeForm {
                    settings: state.settings.clone(),
                    children: Some(frozen),
                    file: None,
                }
            }
            NodeKind::File(meta) => NodeForm {
                settings: state.settings.clone(),
                children: None,
                file: Some(FileForm {
                    length: meta.length,
                    hash: meta.hash.map(hex::encode),
                    modified: meta.modified,
                    modifier: meta.modifier.clone(),
                }),
            },
        }
    }
    .boxed()
}

fn check_settings(settings: &AccessSettings) -> Result<(), FsError> {
    if settings.access() == Clearance::None
        || settings.modify() == Clearance::None
        || settings.access() > settings.modify()
    {
        return Err(FsError::DriveFile(
            "access settings violate the clearance invariant".to_string(),
        ));
    }
    Ok(())
}

fn thaw(form: NodeForm) -> Result<NodeRef, FsError> {
    check_settings(&form.settings)?;

    match (form.children, form.file) {
        (Some(children), None) => {
            let mut map = BTreeMap::new();
            for (name, child_form) in children {
                validate_node_name(&name)
                    .map_err(|_| FsError::DriveFile(format!("invalid node name '{}'", name)))?;
                map.insert(name, thaw(child_form)?);
            }
            Ok(Node::new_dir_with(form.settings, map))
        }
        (None, Some(file)) => {
            let hash = match file.hash {
                Some(text) => {
                    let raw = hex::decode(&text)
                        .map_err(|_| FsError::DriveFile("malformed file hash".to_string()))?;
                    let digest: [u8; 32] = raw
                        .try_into()
                        .map_err(|_| FsError::DriveFile("malformed file hash".to_string()))?;
                    Some(digest)
                }
                None => None,
            };
            Ok(Node::new_file(
                form.settings,
                FileMeta {
                    length: file.length,
                    hash,
                    modified: file.modified,
                    modifier: file.modifier,
                },
            ))
        }
        _ => Err(FsError::DriveFile(
            "node must be exactly one of directory or file".to_string(),
        )),
    }
}

/// Parse a snapshot file into a tree. Corruption of any kind reports as an
/// invalid drive file.
pub(crate) fn load_tree(file: &Path) -> Result<NodeRef, FsError> {
    let raw = std::fs::read(file)?;
    let form: DriveForm = serde_json::from_slice(&raw)
        .map_err(|err| FsError::DriveFile(err.to_string()))?;

    if form.root.file.is_some() || form.root.children.is_none() {
        return Err(FsError::DriveFile("root is not a directory".to_string()));
    }
    thaw(form.root)
}

impl Drive {
    /// Serialise the tree to the snapshot file, atomically replacing the
    /// previous snapshot. Holds the drive write lock, so all drive
    /// operations are blocked for the duration.
    pub async fn snapshot(&self) -> Result<(), FsError> {
        let _guard = self.lock.write().await;

        let form = DriveForm {
            name: self.name(),
            root: freeze(self.root.clone()).await,
        };
        let raw = serde_json::to_vec_pretty(&form)
            .map_err(|err| FsError::DriveFile(err.to_string()))?;

        let tmp = self.snapshot_file().with_extension("tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, self.snapshot_file()).await?;

        self.clear_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use lily_api_types::{Actor, Clearance};

    use crate::{Drive, FsError};

    fn actor() -> Actor {
        Actor::new("user", Clearance::Level1)
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let file = dir.path().join("main.drive");

        let drive = Drive::create("main", data.clone(), file.clone()).unwrap();
        drive
            .create_dirs(&paths(&["/a", "/a/b"]), None, &actor())
            .await
            .unwrap();
        drive
            .create_files(&paths(&["/a/b/f"]), None, &actor())
            .await
            .unwrap();
        drive
            .set_clearances("/a", Clearance::Level2, Clearance::Level3, &actor())
            .await
            .unwrap();

        drive.snapshot().await.unwrap();
        assert!(!drive.is_dirty());
        drop(drive);

        let restored = Drive::open("main", data, file).unwrap();
        assert!(!restored.is_dirty());

        let admin = Actor::new("root", Clearance::Level5);
        let stat = restored
            .stat(&paths(&["/a", "/a/b/f"]), &admin)
            .await
            .unwrap();
        assert!(stat[0].exists && stat[0].is_dir);
        assert!(stat[1].exists && !stat[1].is_dir);
        assert!(stat[1].hash.is_some());

        let settings = restored.get_settings("/a", &admin).await.unwrap();
        assert_eq!(settings.access(), Clearance::Level2);
        assert_eq!(settings.modify(), Clearance::Level3);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.drive");
        std::fs::write(&file, b"{ not json").unwrap();

        match Drive::open("bad", dir.path().join("data"), file) {
            Err(FsError::DriveFile(_)) => {}
            other => panic!("expected invalid drive file, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_snapshot_with_invariant_violation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.drive");
        // access 3 > modify 1 violates the settings invariant
        let raw = r#"{
            "name": "bad",
            "root": {
                "settings": { "access": 3, "modify": 1 },
                "children": {}
            }
        }"#;
        std::fs::write(&file, raw).unwrap();

        match Drive::open("bad", dir.path().join("data"), file) {
            Err(FsError::DriveFile(_)) => {}
            other => panic!("expected invalid drive file, got {:?}", other.err()),
        }
    }
}
