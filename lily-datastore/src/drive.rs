use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock as StdRwLock;

use lily_api_types::{epoch_ms, AccessSettings, Actor, Clearance};

use crate::hash;
use crate::node::{FileMeta, Node, NodeKind, NodeRef};
use crate::path::{is_prefix, join_path, split_path, validate_node_name};
use crate::FsError;

/// One row of a directory listing.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub length: Option<u64>,
    pub modified: Option<i64>,
}

/// One row of a stat batch. Missing paths report `exists = false` instead
/// of failing the batch.
#[derive(Clone, Debug)]
pub struct StatResult {
    pub path: String,
    pub exists: bool,
    pub is_dir: bool,
    pub length: u64,
    pub modified: i64,
    pub hash: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum EntryKind {
    Dir,
    File,
}

/// A named, isolated filesystem tree backed by a directory on disk.
///
/// The in-memory tree is the source of truth for names, settings and file
/// metadata. The coarse drive lock only blocks everything during snapshot
/// and drive-level rename/remove; all regular operations take its read side
/// and rely on the per-node locks.
///
/// Every batch mutator validates all paths and clearances before touching
/// anything; the first validation failure fails the whole batch with the
/// tree unchanged. Past the first applied entry, an I/O error aborts the
/// remainder but leaves applied entries applied.
pub struct Drive {
    name: StdRwLock<String>,
    dir: PathBuf,
    file: PathBuf,
    pub(crate) root: NodeRef,
    pub(crate) lock: tokio::sync::RwLock<()>,
    dirty: AtomicBool,
}

impl Drive {
    /// Create a fresh drive. The backing directory is created if missing;
    /// the tree starts out empty with an allow-all root.
    pub fn create(name: &str, dir: PathBuf, file: PathBuf) -> Result<Self, FsError> {
        validate_node_name(name)?;
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: StdRwLock::new(name.to_string()),
            dir,
            file,
            root: Node::new_dir(AccessSettings::allow_all()),
            lock: tokio::sync::RwLock::new(()),
            dirty: AtomicBool::new(true),
        })
    }

    /// Open a drive, restoring the tree from its snapshot file when one
    /// exists.
    pub fn open(name: &str, dir: PathBuf, file: PathBuf) -> Result<Self, FsError> {
        validate_node_name(name)?;
        if !file.exists() {
            return Self::create(name, dir, file);
        }
        std::fs::create_dir_all(&dir)?;
        let root = crate::snapshot::load_tree(&file)?;
        Ok(Self {
            name: StdRwLock::new(name.to_string()),
            dir,
            file,
            root,
            lock: tokio::sync::RwLock::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    /// Rename the drive itself. The caller must already hold the drive
    /// write lock (drive-level operations block the whole drive).
    pub fn set_name(&self, name: &str) -> Result<(), FsError> {
        validate_node_name(name)?;
        *self.name.write().unwrap() = name.to_string();
        self.mark_dirty();
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_file(&self) -> &Path {
        &self.file
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// The coarse drive lock. Drive-level admin operations take the write
    /// side to wait out and block every regular operation.
    pub fn admin_lock(&self) -> &tokio::sync::RwLock<()> {
        &self.lock
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub(crate) fn disk_path(&self, components: &[String]) -> PathBuf {
        let mut path = self.dir.clone();
        for component in components {
            path.push(component);
        }
        path
    }

    /// Walk the tree hand over hand: each directory's read lock is dropped
    /// once the child reference is obtained.
    pub(crate) async fn resolve(&self, components: &[String]) -> Result<NodeRef, FsError> {
        let mut node = self.root.clone();
        for (idx, component) in components.iter().enumerate() {
            let next = {
                let state = node.state.read().await;
                let children = state.children(&join_path(&components[..idx]))?;
                children
                    .get(component)
                    .cloned()
                    .ok_or_else(|| FsError::NotFound(join_path(&components[..=idx])))?
            };
            node = next;
        }
        Ok(node)
    }

    pub(crate) async fn resolve_parent(
        &self,
        components: &[String],
    ) -> Result<(NodeRef, String), FsError> {
        let leaf = match components.last() {
            Some(leaf) => leaf.clone(),
            // the root has no parent
            None => return Err(FsError::InvalidName("/".to_string())),
        };
        let parent = self.resolve(&components[..components.len() - 1]).await?;
        Ok((parent, leaf))
    }

    pub(crate) async fn check_access(
        &self,
        node: &NodeRef,
        path: &str,
        actor: &Actor,
    ) -> Result<(), FsError> {
        if !node.state.read().await.settings.can_access(actor) {
            return Err(FsError::Clearance(path.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn check_modify(
        &self,
        node: &NodeRef,
        path: &str,
        actor: &Actor,
    ) -> Result<(), FsError> {
        if !node.state.read().await.settings.can_modify(actor) {
            return Err(FsError::Clearance(path.to_string()));
        }
        Ok(())
    }

    pub async fn create_dirs(
        &self,
        paths: &[String],
        settings: Option<&[AccessSettings]>,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;
        let plan = self.plan_creates(paths, settings, actor).await?;
        // dirty from the first possible side effect, not from completion, so
        // a partially applied batch still reaches the next snapshot
        self.mark_dirty();
        for entry in plan {
            self.apply_create(entry, EntryKind::Dir, actor).await?;
        }
        Ok(())
    }

    pub async fn create_files(
        &self,
        paths: &[String],
        settings: Option<&[AccessSettings]>,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;
        let plan = self.plan_creates(paths, settings, actor).await?;
        self.mark_dirty();
        for entry in plan {
            self.apply_create(entry, EntryKind::File, actor).await?;
        }
        Ok(())
    }

    async fn plan_creates(
        &self,
        paths: &[String],
        settings: Option<&[AccessSettings]>,
        actor: &Actor,
    ) -> Result<Vec<CreateEntry>, FsError> {
        let mut plan = Vec::with_capacity(paths.len());
        let mut seen = std::collections::HashSet::new();

        for (idx, path) in paths.iter().enumerate() {
            let components = split_path(path)?;
            let (parent, leaf) = self.resolve_parent(&components).await?;
            let parent_path = join_path(&components[..components.len() - 1]);
            self.check_modify(&parent, &parent_path, actor).await?;

            let state = parent.state.read().await;
            if state.children(&parent_path)?.contains_key(&leaf) {
                return Err(FsError::AlreadyExists(join_path(&components)));
            }
            drop(state);

            if !seen.insert(join_path(&components)) {
                return Err(FsError::AlreadyExists(join_path(&components)));
            }

            plan.push(CreateEntry {
                components,
                parent,
                leaf,
                settings: settings.and_then(|s| s.get(idx).cloned()),
            });
        }
        Ok(plan)
    }

    async fn apply_create(
        &self,
        entry: CreateEntry,
        kind: EntryKind,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let mut state = entry.parent.state.write().await;
        let parent_path = join_path(&entry.components[..entry.components.len() - 1]);
        let settings = entry
            .settings
            .unwrap_or_else(|| state.settings.clone());

        // a concurrent create may have won the race since validation
        if state.children(&parent_path)?.contains_key(&entry.leaf) {
            return Err(FsError::AlreadyExists(join_path(&entry.components)));
        }

        let disk = self.disk_path(&entry.components);
        let node = match kind {
            EntryKind::Dir => {
                tokio::fs::create_dir(&disk).await?;
                Node::new_dir(settings)
            }
            EntryKind::File => {
                tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&disk)
                    .await?;
                Node::new_file(
                    settings,
                    FileMeta {
                        length: 0,
                        hash: Some(hash::empty_digest()),
                        modified: epoch_ms(),
                        modifier: actor.username.clone(),
                    },
                )
            }
        };

        state.children_mut(&parent_path)?.insert(entry.leaf, node);
        Ok(())
    }

    /// Create `parent` if absent, then bulk-create the relative subtree
    /// below it. The relative paths share a single clearance check on the
    /// parent; missing intermediate directories are created along the way.
    pub async fn create_dirs_tree(
        &self,
        parent_path: &str,
        relative: &[String],
        parent_settings: Option<AccessSettings>,
        leaf_settings: Option<AccessSettings>,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;

        let parent_components = split_path(parent_path)?;
        let mut relatives = Vec::with_capacity(relative.len());
        for rel in relative {
            let components = split_path(rel)?;
            if components.is_empty() {
                return Err(FsError::InvalidName(rel.clone()));
            }
            relatives.push(components);
        }
        // depth ascending so intermediates created by shallower entries are
        // reused by deeper ones
        relatives.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        self.mark_dirty();
        let parent = match self.resolve(&parent_components).await {
            Ok(node) => {
                if !node.is_dir().await {
                    return Err(FsError::NotADirectory(join_path(&parent_components)));
                }
                self.check_modify(&node, &join_path(&parent_components), actor)
                    .await?;
                node
            }
            Err(FsError::NotFound(_)) => {
                let (grandparent, leaf) = self.resolve_parent(&parent_components).await?;
                let grandparent_path =
                    join_path(&parent_components[..parent_components.len() - 1]);
                self.check_modify(&grandparent, &grandparent_path, actor)
                    .await?;

                self.apply_create(
                    CreateEntry {
                        components: parent_components.clone(),
                        parent: grandparent,
                        leaf,
                        settings: parent_settings,
                    },
                    EntryKind::Dir,
                    actor,
                )
                .await?;
                self.resolve(&parent_components).await?
            }
            Err(err) => return Err(err),
        };

        for rel in relatives {
            let mut node = parent.clone();
            let mut walked = parent_components.clone();
            for component in &rel {
                walked.push(component.clone());
                let walked_path = join_path(&walked);
                let parent_of_walked = join_path(&walked[..walked.len() - 1]);

                let mut state = node.state.write().await;
                let existing = state.children(&parent_of_walked)?.get(component).cloned();
                let next = match existing {
                    Some(child) => {
                        drop(state);
                        if !child.is_dir().await {
                            return Err(FsError::NotADirectory(walked_path));
                        }
                        child
                    }
                    None => {
                        let settings = leaf_settings
                            .clone()
                            .unwrap_or_else(|| state.settings.clone());
                        tokio::fs::create_dir(self.disk_path(&walked)).await?;
                        let child = Node::new_dir(settings);
                        state
                            .children_mut(&parent_of_walked)?
                            .insert(component.clone(), child.clone());
                        drop(state);
                        child
                    }
                };
                node = next;
            }
        }
        Ok(())
    }

    pub async fn list_dir(&self, path: &str, actor: &Actor) -> Result<Vec<DirEntry>, FsError> {
        let _guard = self.lock.read().await;

        let components = split_path(path)?;
        let node = self.resolve(&components).await?;
        self.check_access(&node, &join_path(&components), actor)
            .await?;

        let state = node.state.read().await;
        let children = state.children(&join_path(&components))?;

        let mut entries = Vec::with_capacity(children.len());
        for (name, child) in children {
            let child_state = child.state.read().await;
            let entry = match &child_state.kind {
                NodeKind::Directory(_) => DirEntry {
                    name: name.clone(),
                    is_dir: true,
                    length: None,
                    modified: None,
                },
                NodeKind::File(meta) => DirEntry {
                    name: name.clone(),
                    is_dir: false,
                    length: Some(meta.length),
                    modified: Some(meta.modified),
                },
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    pub async fn rename_dirs(
        &self,
        paths: &[String],
        new_names: &[String],
        actor: &Actor,
    ) -> Result<(), FsError> {
        self.rename_entries(paths, new_names, EntryKind::Dir, actor)
            .await
    }

    pub async fn rename_files(
        &self,
        paths: &[String],
        new_names: &[String],
        actor: &Actor,
    ) -> Result<(), FsError> {
        self.rename_entries(paths, new_names, EntryKind::File, actor)
            .await
    }

    async fn rename_entries(
        &self,
        paths: &[String],
        new_names: &[String],
        kind: EntryKind,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());
        let mut seen = std::collections::HashSet::new();

        for (path, new_name) in paths.iter().zip(new_names) {
            validate_node_name(new_name)?;
            let components = split_path(path)?;
            let (parent, leaf) = self.resolve_parent(&components).await?;
            let parent_path = join_path(&components[..components.len() - 1]);
            self.check_modify(&parent, &parent_path, actor).await?;

            let state = parent.state.read().await;
            let children = state.children(&parent_path)?;
            let child = children
                .get(&leaf)
                .cloned()
                .ok_or_else(|| FsError::NotFound(join_path(&components)))?;
            if new_name != &leaf && children.contains_key(new_name) {
                return Err(FsError::AlreadyExists(format!(
                    "{}/{}",
                    parent_path, new_name
                )));
            }
            drop(state);

            self.check_kind(&child, kind, &join_path(&components)).await?;

            let mut target = components[..components.len() - 1].to_vec();
            target.push(new_name.clone());
            if !seen.insert(join_path(&target)) {
                return Err(FsError::AlreadyExists(join_path(&target)));
            }

            plan.push((components, leaf, new_name.clone(), parent));
        }

        self.mark_dirty();
        for (components, leaf, new_name, parent) in plan {
            if leaf == new_name {
                continue;
            }
            let mut state = parent.state.write().await;
            let parent_path = join_path(&components[..components.len() - 1]);
            let children = state.children_mut(&parent_path)?;
            if children.contains_key(&new_name) {
                return Err(FsError::AlreadyExists(format!(
                    "{}/{}",
                    parent_path, new_name
                )));
            }
            let node = children
                .remove(&leaf)
                .ok_or_else(|| FsError::NotFound(join_path(&components)))?;

            let old_disk = self.disk_path(&components);
            let mut new_components = components[..components.len() - 1].to_vec();
            new_components.push(new_name.clone());
            if let Err(err) = tokio::fs::rename(&old_disk, self.disk_path(&new_components)).await
            {
                // put the node back so the tree keeps mirroring the disk
                state
                    .children_mut(&parent_path)?
                    .insert(leaf, node);
                return Err(err.into());
            }
            state.children_mut(&parent_path)?.insert(new_name, node);
        }
        Ok(())
    }

    pub async fn move_dirs(
        &self,
        paths: &[String],
        dests: &[String],
        actor: &Actor,
    ) -> Result<(), FsError> {
        self.move_entries(paths, dests, EntryKind::Dir, actor).await
    }

    pub async fn move_files(
        &self,
        paths: &[String],
        dests: &[String],
        actor: &Actor,
    ) -> Result<(), FsError> {
        self.move_entries(paths, dests, EntryKind::File, actor).await
    }

    async fn move_entries(
        &self,
        paths: &[String],
        dests: &[String],
        kind: EntryKind,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());

        for (path, dest) in paths.iter().zip(dests) {
            let components = split_path(path)?;
            let dest_components = split_path(dest)?;

            // moving a directory into its own subtree would detach it from
            // the drive
            if is_prefix(&components, &dest_components) {
                return Err(FsError::MoveCycle(join_path(&components)));
            }

            let (src_parent, leaf) = self.resolve_parent(&components).await?;
            let src_parent_path = join_path(&components[..components.len() - 1]);
            self.check_modify(&src_parent, &src_parent_path, actor)
                .await?;

            let child = {
                let state = src_parent.state.read().await;
                state
                    .children(&src_parent_path)?
                    .get(&leaf)
                    .cloned()
                    .ok_or_else(|| FsError::NotFound(join_path(&components)))?
            };
            self.check_kind(&child, kind, &join_path(&components)).await?;

            let dest_node = self.resolve(&dest_components).await?;
            if !dest_node.is_dir().await {
                return Err(FsError::NotADirectory(join_path(&dest_components)));
            }
            self.check_modify(&dest_node, &join_path(&dest_components), actor)
                .await?;
            {
                let state = dest_node.state.read().await;
                if state
                    .children(&join_path(&dest_components))?
                    .contains_key(&leaf)
                {
                    let mut target = dest_components.clone();
                    target.push(leaf.clone());
                    return Err(FsError::AlreadyExists(join_path(&target)));
                }
            }

            plan.push(MoveEntry {
                components,
                dest_components,
                leaf,
                src_parent,
                dest_node,
            });
        }

        self.mark_dirty();
        for entry in plan {
            self.apply_move(entry).await?;
        }
        Ok(())
    }

    async fn apply_move(&self, entry: MoveEntry) -> Result<(), FsError> {
        let src_parent_path = join_path(&entry.components[..entry.components.len() - 1]);
        let dest_path = join_path(&entry.dest_components);

        // both parents are locked at once; acquire in canonical order
        // (depth ascending, then path lexicographic) so concurrent batches
        // on overlapping subtrees cannot deadlock
        let src_key = (entry.components.len() - 1, src_parent_path.clone());
        let dest_key = (entry.dest_components.len(), dest_path.clone());

        let (mut src_state, mut dest_state) =
            if std::sync::Arc::ptr_eq(&entry.src_parent, &entry.dest_node) {
                // same directory serves both roles; one lock covers it
                (entry.src_parent.state.write().await, None)
            } else if src_key <= dest_key {
                let src = entry.src_parent.state.write().await;
                let dest = entry.dest_node.state.write().await;
                (src, Some(dest))
            } else {
                let dest = entry.dest_node.state.write().await;
                let src = entry.src_parent.state.write().await;
                (src, Some(dest))
            };

        let node = src_state
            .children_mut(&src_parent_path)?
            .remove(&entry.leaf)
            .ok_or_else(|| FsError::NotFound(join_path(&entry.components)))?;

        let mut target = entry.dest_components.clone();
        target.push(entry.leaf.clone());

        // a concurrent create may have claimed the target name since
        // validation
        let occupied = match dest_state.as_ref() {
            Some(dest) => dest.children(&dest_path)?.contains_key(&entry.leaf),
            None => src_state.children(&dest_path)?.contains_key(&entry.leaf),
        };
        if occupied {
            src_state
                .children_mut(&src_parent_path)?
                .insert(entry.leaf, node);
            return Err(FsError::AlreadyExists(join_path(&target)));
        }

        if let Err(err) =
            tokio::fs::rename(self.disk_path(&entry.components), self.disk_path(&target)).await
        {
            src_state
                .children_mut(&src_parent_path)?
                .insert(entry.leaf, node);
            return Err(err.into());
        }

        match dest_state.as_mut() {
            Some(dest) => dest.children_mut(&dest_path)?.insert(entry.leaf, node),
            None => src_state.children_mut(&dest_path)?.insert(entry.leaf, node),
        };
        Ok(())
    }

    pub async fn delete_dirs(&self, paths: &[String], actor: &Actor) -> Result<(), FsError> {
        self.delete_entries(paths, EntryKind::Dir, actor).await
    }

    pub async fn delete_files(&self, paths: &[String], actor: &Actor) -> Result<(), FsError> {
        self.delete_entries(paths, EntryKind::File, actor).await
    }

    async fn delete_entries(
        &self,
        paths: &[String],
        kind: EntryKind,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());
        for path in paths {
            let components = split_path(path)?;
            let (parent, leaf) = self.resolve_parent(&components).await?;
            let parent_path = join_path(&components[..components.len() - 1]);
            self.check_modify(&parent, &parent_path, actor).await?;

            let child = {
                let state = parent.state.read().await;
                state
                    .children(&parent_path)?
                    .get(&leaf)
                    .cloned()
                    .ok_or_else(|| FsError::NotFound(join_path(&components)))?
            };
            self.check_kind(&child, kind, &join_path(&components)).await?;

            plan.push((components, leaf, parent));
        }

        self.mark_dirty();
        for (components, leaf, parent) in plan {
            let mut state = parent.state.write().await;
            let parent_path = join_path(&components[..components.len() - 1]);
            let node = state
                .children_mut(&parent_path)?
                .remove(&leaf)
                .ok_or_else(|| FsError::NotFound(join_path(&components)))?;

            let disk = self.disk_path(&components);
            let removed = match kind {
                EntryKind::Dir => tokio::fs::remove_dir_all(&disk).await,
                EntryKind::File => tokio::fs::remove_file(&disk).await,
            };
            if let Err(err) = removed {
                if err.kind() != std::io::ErrorKind::NotFound {
                    state.children_mut(&parent_path)?.insert(leaf, node);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    pub async fn stat(&self, paths: &[String], actor: &Actor) -> Result<Vec<StatResult>, FsError> {
        let _guard = self.lock.read().await;

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let components = split_path(path)?;
            let rendered = join_path(&components);

            let node = match self.resolve(&components).await {
                Ok(node) => node,
                Err(FsError::NotFound(_)) => {
                    results.push(StatResult {
                        path: rendered,
                        exists: false,
                        is_dir: false,
                        length: 0,
                        modified: 0,
                        hash: None,
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            self.check_access(&node, &rendered, actor).await?;

            let state = node.state.read().await;
            let result = match &state.kind {
                NodeKind::Directory(_) => StatResult {
                    path: rendered,
                    exists: true,
                    is_dir: true,
                    length: 0,
                    modified: 0,
                    hash: None,
                },
                NodeKind::File(meta) => StatResult {
                    path: rendered,
                    exists: true,
                    is_dir: false,
                    length: meta.length,
                    modified: meta.modified,
                    hash: meta.hash.map(hex::encode),
                },
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Recompute the stored hash of each file from its on-disk bytes.
    pub async fn rehash(&self, paths: &[String], actor: &Actor) -> Result<Vec<String>, FsError> {
        let _guard = self.lock.read().await;

        let mut plan = Vec::with_capacity(paths.len());
        for path in paths {
            let components = split_path(path)?;
            let node = self.resolve(&components).await?;
            let rendered = join_path(&components);
            self.check_modify(&node, &rendered, actor).await?;
            node.state.read().await.file(&rendered)?;
            plan.push((components, rendered, node));
        }

        self.mark_dirty();
        let mut digests = Vec::with_capacity(plan.len());
        for (components, rendered, node) in plan {
            let mut state = node.state.write().await;
            let digest = hash::hash_file(&self.disk_path(&components)).await?;
            state.file_mut(&rendered)?.hash = Some(digest);
            digests.push(hex::encode(digest));
        }
        Ok(digests)
    }

    /// Compare each file's stored hash against its on-disk bytes. A stale
    /// (never rehashed since last write) or missing hash reports `false`.
    pub async fn verify_hashes(
        &self,
        paths: &[String],
        actor: &Actor,
    ) -> Result<Vec<bool>, FsError> {
        let _guard = self.lock.read().await;

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let components = split_path(path)?;
            let node = self.resolve(&components).await?;
            let rendered = join_path(&components);
            self.check_access(&node, &rendered, actor).await?;

            let state = node.state.read().await;
            let stored = state.file(&rendered)?.hash;
            let matches = match stored {
                Some(stored) => {
                    let disk = hash::hash_file(&self.disk_path(&components)).await?;
                    stored == disk
                }
                None => false,
            };
            results.push(matches);
        }
        Ok(results)
    }

    pub async fn get_settings(&self, path: &str, actor: &Actor) -> Result<AccessSettings, FsError> {
        let _guard = self.lock.read().await;
        let components = split_path(path)?;
        let node = self.resolve(&components).await?;
        self.check_access(&node, &join_path(&components), actor)
            .await?;
        Ok(node.settings().await)
    }

    /// Replace a path's access settings. The clearance check happens under
    /// the same lock as the mutation, so an authorisation failure can never
    /// leave a partial update behind.
    pub async fn set_settings(
        &self,
        path: &str,
        settings: AccessSettings,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;
        let components = split_path(path)?;
        let node = self.resolve(&components).await?;

        let mut state = node.state.write().await;
        if !state.settings.can_modify(actor) {
            return Err(FsError::Clearance(join_path(&components)));
        }
        state.settings = settings;
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    pub async fn set_clearances(
        &self,
        path: &str,
        access: Clearance,
        modify: Clearance,
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;
        let components = split_path(path)?;
        let node = self.resolve(&components).await?;

        let mut state = node.state.write().await;
        if !state.settings.can_modify(actor) {
            return Err(FsError::Clearance(join_path(&components)));
        }
        state.settings.set_clearances(access, modify)?;
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    /// Add or remove users on one of a path's four allow/deny lists.
    pub async fn update_lists(
        &self,
        path: &str,
        whitelist: bool,
        add: bool,
        modify_list: bool,
        users: &[String],
        actor: &Actor,
    ) -> Result<(), FsError> {
        let _guard = self.lock.read().await;
        let components = split_path(path)?;
        let node = self.resolve(&components).await?;

        let mut state = node.state.write().await;
        if !state.settings.can_modify(actor) {
            return Err(FsError::Clearance(join_path(&components)));
        }
        for user in users {
            match (whitelist, add) {
                (true, true) => state.settings.add_whitelist(modify_list, user),
                (true, false) => state.settings.remove_whitelist(modify_list, user),
                (false, true) => state.settings.add_blacklist(modify_list, user),
                (false, false) => state.settings.remove_blacklist(modify_list, user),
            }
        }
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    async fn check_kind(
        &self,
        node: &NodeRef,
        kind: EntryKind,
        path: &str,
    ) -> Result<(), FsError> {
        let state = node.state.read().await;
        match (&state.kind, kind) {
            (NodeKind::Directory(_), EntryKind::Dir) => Ok(()),
            (NodeKind::File(_), EntryKind::File) => Ok(()),
            (NodeKind::Directory(_), EntryKind::File) => {
                Err(FsError::NotAFile(path.to_string()))
            }
            (NodeKind::File(_), EntryKind::Dir) => {
                Err(FsError::NotADirectory(path.to_string()))
            }
        }
    }
}

struct CreateEntry {
    components: Vec<String>,
    parent: NodeRef,
    leaf: String,
    settings: Option<AccessSettings>,
}

struct MoveEntry {
    components: Vec<String>,
    dest_components: Vec<String>,
    leaf: String,
    src_parent: NodeRef,
    dest_node: NodeRef,
}

#[cfg(test)]
mod test {
    use lily_api_types::{AccessSettings, Actor, Clearance};

    use super::{Drive, FsError};

    fn admin() -> Actor {
        Actor::new("root", Clearance::Level5)
    }

    fn user(level: i64) -> Actor {
        Actor::new("user", Clearance::from_level(level).unwrap())
    }

    fn scratch_drive(dir: &tempfile::TempDir) -> Drive {
        Drive::create(
            "main",
            dir.path().join("data"),
            dir.path().join("main.drive"),
        )
        .unwrap()
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/docs", "/media"]), None, &actor)
            .await
            .unwrap();
        drive
            .create_files(&paths(&["/docs/readme"]), None, &actor)
            .await
            .unwrap();

        let entries = drive.list_dir("/", &actor).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "media"]);

        let entries = drive.list_dir("/docs", &actor).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_dir);
        assert_eq!(entries[0].length, Some(0));

        // disk mirrors the tree
        assert!(dir.path().join("data/docs/readme").is_file());
        assert!(dir.path().join("data/media").is_dir());
    }

    #[tokio::test]
    async fn test_create_existing_fails_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/a"]), None, &actor)
            .await
            .unwrap();

        // "/b" is fine, "/a" exists: validation fails before any mutation
        let err = drive
            .create_dirs(&paths(&["/b", "/a"]), None, &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
        assert!(matches!(
            drive.list_dir("/b", &actor).await.unwrap_err(),
            FsError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_create_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);

        let err = drive
            .create_files(&paths(&["/nope/f"]), None, &user(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clearance_blocks_create() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let admin = admin();

        let settings = AccessSettings::new(Clearance::Level1, Clearance::Level3).unwrap();
        drive
            .create_dirs(&paths(&["/locked"]), Some(&[settings]), &admin)
            .await
            .unwrap();

        let err = drive
            .create_files(&paths(&["/locked/f"]), None, &user(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Clearance(_)));

        // level 3 clears the threshold, admins always pass
        drive
            .create_files(&paths(&["/locked/f"]), None, &user(3))
            .await
            .unwrap();
        drive
            .create_files(&paths(&["/locked/g"]), None, &admin)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rename_moves_identity() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/old"]), None, &actor)
            .await
            .unwrap();
        drive
            .rename_dirs(&paths(&["/old"]), &paths(&["new"]), &actor)
            .await
            .unwrap();

        assert!(matches!(
            drive.list_dir("/old", &actor).await.unwrap_err(),
            FsError::NotFound(_)
        ));
        drive.list_dir("/new", &actor).await.unwrap();
        assert!(dir.path().join("data/new").is_dir());
        assert!(!dir.path().join("data/old").exists());
    }

    #[tokio::test]
    async fn test_rename_collision() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/a", "/b"]), None, &actor)
            .await
            .unwrap();
        let err = drive
            .rename_dirs(&paths(&["/a"]), &paths(&["b"]), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_move_and_cycle_guard() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/a", "/a/b", "/c"]), None, &actor)
            .await
            .unwrap();

        // /a cannot move into its own subtree
        let err = drive
            .move_dirs(&paths(&["/a"]), &paths(&["/a/b"]), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::MoveCycle(_)));

        drive
            .move_dirs(&paths(&["/a/b"]), &paths(&["/c"]), &actor)
            .await
            .unwrap();
        drive.list_dir("/c/b", &actor).await.unwrap();
        assert!(matches!(
            drive.list_dir("/a/b", &actor).await.unwrap_err(),
            FsError::NotFound(_)
        ));
        assert!(dir.path().join("data/c/b").is_dir());
    }

    #[tokio::test]
    async fn test_delete_removes_disk_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs(&paths(&["/d"]), None, &actor)
            .await
            .unwrap();
        drive
            .create_files(&paths(&["/d/f"]), None, &actor)
            .await
            .unwrap();

        drive.delete_files(&paths(&["/d/f"]), &actor).await.unwrap();
        assert!(!dir.path().join("data/d/f").exists());

        let stat = drive.stat(&paths(&["/d/f"]), &actor).await.unwrap();
        assert!(!stat[0].exists);

        drive.delete_dirs(&paths(&["/d"]), &actor).await.unwrap();
        assert!(!dir.path().join("data/d").exists());
    }

    #[tokio::test]
    async fn test_stat_mixed_batch() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_files(&paths(&["/f"]), None, &actor)
            .await
            .unwrap();
        let results = drive
            .stat(&paths(&["/f", "/ghost", "/"]), &actor)
            .await
            .unwrap();

        assert!(results[0].exists && !results[0].is_dir);
        assert!(results[0].hash.is_some());
        assert!(!results[1].exists);
        assert!(results[2].exists && results[2].is_dir);
    }

    #[tokio::test]
    async fn test_create_dirs_tree() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let actor = user(1);

        drive
            .create_dirs_tree(
                "/proj",
                &paths(&["src/core", "src/api", "docs"]),
                None,
                None,
                &actor,
            )
            .await
            .unwrap();

        drive.list_dir("/proj/src/core", &actor).await.unwrap();
        drive.list_dir("/proj/docs", &actor).await.unwrap();
        assert!(dir.path().join("data/proj/src/api").is_dir());
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_guarded_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let drive = scratch_drive(&dir);
        let admin = admin();

        drive
            .create_dirs(&paths(&["/s"]), None, &admin)
            .await
            .unwrap();
        drive
            .set_clearances("/s", Clearance::Level2, Clearance::Level4, &admin)
            .await
            .unwrap();

        let settings = drive.get_settings("/s", &admin).await.unwrap();
        assert_eq!(settings.access(), Clearance::Level2);
        assert_eq!(settings.modify(), Clearance::Level4);

        // a < m violation leaves the settings untouched
        let err = drive
            .set_clearances("/s", Clearance::Level3, Clearance::Level2, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Clearances(_)));
        let settings = drive.get_settings("/s", &admin).await.unwrap();
        assert_eq!(settings.access(), Clearance::Level2);

        // a level 3 user cannot modify (threshold is 4), and the failed
        // check must not mutate
        let err = drive
            .update_lists("/s", true, true, false, &paths(&["eve"]), &user(3))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Clearance(_)));
        let settings = drive.get_settings("/s", &admin).await.unwrap();
        assert!(settings.whitelist(false).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let drive = std::sync::Arc::new(scratch_drive(&dir));
        let actor = user(1);

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let drive = drive.clone();
            let actor = actor.clone();
            tasks.push(tokio::spawn(async move {
                drive
                    .create_files(&["/same".to_string()], None, &actor)
                    .await
            }));
        }

        let mut ok = 0;
        let mut exists = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => ok += 1,
                Err(FsError::AlreadyExists(_)) => exists += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!((ok, exists), (1, 1));
    }
}
