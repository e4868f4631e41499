//! Paths addressing nodes within one wire tree.
//!
//! A path is the ordered key sequence from the root to a node. Paths are
//! interned in a [`PathTable`] so that each visited node costs one arena slot
//! instead of a full copy of its ancestor keys.

use std::fmt;

use rustc_hash::FxHashMap;

/// Wire key holding a tagged node's positional arguments.
///
/// This is the "empty key" sentinel. It appears in wire paths (encode side)
/// and is stripped from reference targets when resolving them on decode.
pub const ARGS_KEY: &str = "";

/// One step of a path: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathKey {
    /// Mapping key (attribute name or wire key).
    Key(String),
    /// Sequence index.
    Index(usize),
}

impl PathKey {
    /// Returns true if this is the positional-arguments sentinel.
    pub fn is_args(&self) -> bool {
        matches!(self, PathKey::Key(k) if k == ARGS_KEY)
    }

    /// Returns the key as a string slice, if it is a mapping key.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathKey::Key(k) => Some(k),
            PathKey::Index(_) => None,
        }
    }

    /// Parses a textual segment, coercing decimal integers to indices.
    pub fn from_segment(segment: &str) -> PathKey {
        match segment.parse::<usize>() {
            Ok(i) if !segment.starts_with('+') => PathKey::Index(i),
            _ => PathKey::Key(segment.to_string()),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Key(k) => f.write_str(k),
            PathKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// Formats keys as a slash-separated address, for diagnostics.
pub fn format_path(keys: &[PathKey]) -> String {
    let mut out = String::new();
    for key in keys {
        out.push('/');
        out.push_str(&key.to_string());
    }
    out
}

/// Handle to an interned path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(usize);

impl PathId {
    /// The empty path.
    pub const ROOT: PathId = PathId(0);
}

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathId({})", self.0)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct PathNode {
    parent: PathId,
    key: Option<PathKey>,
    depth: usize,
}

/// Arena of interned paths for one pass.
///
/// Each path is stored as (parent, last key); interning the same
/// (parent, key) pair twice returns the same [`PathId`].
#[derive(Debug, Clone)]
pub struct PathTable {
    nodes: Vec<PathNode>,
    children: FxHashMap<(PathId, PathKey), PathId>,
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTable {
    /// Creates a table holding only the root path.
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode {
                parent: PathId::ROOT,
                key: None,
                depth: 0,
            }],
            children: FxHashMap::default(),
        }
    }

    /// Returns the number of interned paths, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if only the root path is interned.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Interns `parent + key`.
    pub fn child(&mut self, parent: PathId, key: PathKey) -> PathId {
        if let Some(&id) = self.children.get(&(parent, key.clone())) {
            return id;
        }
        let id = PathId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        self.nodes.push(PathNode {
            parent,
            key: Some(key.clone()),
            depth,
        });
        self.children.insert((parent, key), id);
        id
    }

    /// Returns the parent of `id`, or `None` for the root.
    pub fn parent(&self, id: PathId) -> Option<PathId> {
        if id == PathId::ROOT {
            None
        } else {
            Some(self.nodes[id.0].parent)
        }
    }

    /// Returns the number of keys in `id`.
    pub fn depth(&self, id: PathId) -> usize {
        self.nodes[id.0].depth
    }

    /// Materializes the full key sequence of `id`.
    pub fn keys(&self, id: PathId) -> Vec<PathKey> {
        let mut keys = Vec::with_capacity(self.depth(id));
        let mut cur = id;
        while let Some(key) = &self.nodes[cur.0].key {
            keys.push(key.clone());
            cur = self.nodes[cur.0].parent;
        }
        keys.reverse();
        keys
    }

    /// Returns the keys of `id` below ancestor `ancestor`, or `None` if
    /// `ancestor` is not an ancestor of (or equal to) `id`.
    pub fn keys_below(&self, ancestor: PathId, id: PathId) -> Option<Vec<PathKey>> {
        let mut keys = Vec::new();
        let mut cur = id;
        while cur != ancestor {
            let node = &self.nodes[cur.0];
            keys.push(node.key.clone()?);
            cur = node.parent;
        }
        keys.reverse();
        Some(keys)
    }

    /// Interns every prefix of `keys` and returns the full path.
    pub fn intern(&mut self, keys: &[PathKey]) -> PathId {
        keys.iter()
            .fold(PathId::ROOT, |cur, key| self.child(cur, key.clone()))
    }

    /// Formats `id` as a slash-separated address, for diagnostics.
    pub fn display(&self, id: PathId) -> String {
        format_path(&self.keys(id))
    }
}
