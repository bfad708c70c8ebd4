//! Hierarchical path-addressed storage.
//!
//! The storage is a tree of named branches whose leaves are [`Item`]s (node or
//! parameter ids owned by the [`crate::Model`]). Children keep insertion order, so
//! iteration is stable and depth-first pre-order.
//!
//! A lookup that stops on a branch returns a [`StorageView`]: a borrowed, narrowed view
//! of the same tree. No data is copied.

use std::slice;

use dyb_core::{Error, IntoPathKey, PathKey, Result};

use crate::node::{NodeId, ParameterId};

/// What a storage leaf refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Node(NodeId),
    Parameter(ParameterId),
}

#[derive(Debug, Clone, Default)]
struct Branch {
    children: Vec<(String, TreeEntry)>,
}

#[derive(Debug, Clone)]
enum TreeEntry {
    Leaf(Item),
    Branch(Branch),
}

impl Branch {
    fn child(&self, name: &str) -> Option<&TreeEntry> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut TreeEntry> {
        self.children.iter_mut().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    fn lookup<'a>(&'a self, prefix: &PathKey, rel: &PathKey) -> Result<Entry<'a>> {
        let mut branch = self;
        let mut walked = prefix.clone();
        let segments = rel.segments();
        for (i, segment) in segments.iter().enumerate() {
            walked = walked.join_segment(segment);
            match branch.child(segment) {
                None => return Err(Error::KeyNotFound(walked.to_dotted())),
                Some(TreeEntry::Leaf(item)) => {
                    if i + 1 == segments.len() {
                        return Ok(Entry::Item(*item));
                    }
                    // A leaf cannot have children.
                    return Err(Error::KeyNotFound(prefix.join(rel).to_dotted()));
                }
                Some(TreeEntry::Branch(b)) => branch = b,
            }
        }
        Ok(Entry::Storage(StorageView { prefix: walked, branch }))
    }

    fn count(&self) -> usize {
        self.children
            .iter()
            .map(|(_, e)| match e {
                TreeEntry::Leaf(_) => 1,
                TreeEntry::Branch(b) => b.count(),
            })
            .sum()
    }
}

/// Result of a storage lookup.
#[derive(Debug, Clone)]
pub enum Entry<'a> {
    /// Exact leaf match
    Item(Item),
    /// Non-leaf prefix: a view over everything below it
    Storage(StorageView<'a>),
}

/// Path-addressed container of node and parameter ids.
#[derive(Debug, Clone, Default)]
pub struct Storage {
    root: Branch,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` under `path`.
    ///
    /// Fails with [`Error::PathConflict`] when the path is taken, when a leaf already
    /// sits on one of its prefixes, or when the path is itself a prefix of other entries.
    pub fn insert(&mut self, path: impl IntoPathKey, item: Item) -> Result<PathKey> {
        let path = path.into_path_key()?;
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(Error::InvalidPath("cannot insert at the storage root".to_string()));
        };

        let mut branch = &mut self.root;
        for segment in parents {
            if branch.child(segment).is_none() {
                branch.children.push((segment.clone(), TreeEntry::Branch(Branch::default())));
            }
            branch = match branch.child_mut(segment) {
                Some(TreeEntry::Branch(b)) => b,
                _ => return Err(Error::PathConflict(path.to_dotted())),
            };
        }

        if branch.child(last).is_some() {
            return Err(Error::PathConflict(path.to_dotted()));
        }
        branch.children.push((last.clone(), TreeEntry::Leaf(item)));
        Ok(path)
    }

    /// Look up a leaf or a sub-storage.
    pub fn get(&self, path: impl IntoPathKey) -> Result<Entry<'_>> {
        let path = path.into_path_key()?;
        self.root.lookup(&PathKey::root(), &path)
    }

    pub fn contains(&self, path: impl IntoPathKey) -> bool {
        self.get(path).is_ok()
    }

    /// View of the whole tree.
    pub fn as_view(&self) -> StorageView<'_> {
        StorageView { prefix: PathKey::root(), branch: &self.root }
    }

    /// Narrowed view below `prefix`. Fails if `prefix` names a leaf.
    pub fn view(&self, prefix: impl IntoPathKey) -> Result<StorageView<'_>> {
        let prefix = prefix.into_path_key()?;
        match self.root.lookup(&PathKey::root(), &prefix)? {
            Entry::Storage(view) => Ok(view),
            Entry::Item(_) => Err(Error::Validation(format!(
                "'{prefix}' is a leaf, not a storage prefix"
            ))),
        }
    }

    /// All full keys, in insertion order. Same as `keys_under(root)`.
    pub fn keys(&self) -> Keys<'_> {
        self.as_view().keys()
    }

    /// Full keys of the leaves below `prefix`, in insertion order.
    pub fn keys_under(&self, prefix: impl IntoPathKey) -> Result<Keys<'_>> {
        Ok(self.view(prefix)?.keys())
    }

    /// Depth-first walk over `(path, item)` pairs.
    pub fn walk_items(&self) -> Walk<'_> {
        self.as_view().walk_items()
    }

    /// Depth-first walk over the leaves below `prefix`.
    pub fn walk_items_under(&self, prefix: impl IntoPathKey) -> Result<Walk<'_>> {
        Ok(self.view(prefix)?.walk_items())
    }

    /// Number of leaves (aliases count separately).
    pub fn len(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }
}

/// Borrowed view of a storage subtree. Keys it yields are absolute.
#[derive(Debug, Clone)]
pub struct StorageView<'a> {
    prefix: PathKey,
    branch: &'a Branch,
}

impl<'a> StorageView<'a> {
    pub fn prefix(&self) -> &PathKey {
        &self.prefix
    }

    /// Look up relative to this view's prefix.
    pub fn get(&self, rel: impl IntoPathKey) -> Result<Entry<'a>> {
        let rel = rel.into_path_key()?;
        self.branch.lookup(&self.prefix, &rel)
    }

    /// Names of the immediate children.
    pub fn child_names(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.branch.children.iter().map(|(n, _)| n.as_str())
    }

    pub fn keys(&self) -> Keys<'a> {
        Keys(self.walk_items())
    }

    pub fn walk_items(&self) -> Walk<'a> {
        Walk { stack: vec![(self.prefix.clone(), self.branch.children.iter())] }
    }

    pub fn len(&self) -> usize {
        self.branch.count()
    }

    pub fn is_empty(&self) -> bool {
        self.branch.children.is_empty()
    }
}

/// Lazy depth-first pre-order walk. Cloning restarts nothing: the clone continues
/// from the same position independently.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<(PathKey, slice::Iter<'a, (String, TreeEntry)>)>,
}

impl Iterator for Walk<'_> {
    type Item = (PathKey, Item);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let Some((name, entry)) = top.1.next() else {
                self.stack.pop();
                continue;
            };
            let path = top.0.join_segment(name);
            match entry {
                TreeEntry::Leaf(item) => return Some((path, *item)),
                TreeEntry::Branch(b) => self.stack.push((path, b.children.iter())),
            }
        }
    }
}

/// Iterator over full keys.
#[derive(Debug, Clone)]
pub struct Keys<'a>(Walk<'a>);

impl Iterator for Keys<'_> {
    type Item = PathKey;

    fn next(&mut self) -> Option<PathKey> {
        self.0.next().map(|(path, _)| path)
    }
}
