//! Identity tracking, link tables and deferred reference patching.
//!
//! A [`ReferenceScheme`] owns the wire syntax of reference markers. The
//! per-call [`LinkManager`] owns everything else:
//!
//! - encode: identity -> destination path, and the link table used by the
//!   labeling pass
//! - decode: path -> constructed object, and the deferred patches applied
//!   once every object exists
//!
//! Paths are interned in the manager's [`PathTable`].

pub mod json;

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::deconstruct::TypeBinding;
use crate::error::{PreserializeError, Result};
use crate::model::{Node, ObjRef, Object, PathId, PathKey, PathTable};

pub use json::JsonReference;

/// Wire syntax of reference markers.
pub trait ReferenceScheme: fmt::Debug + Send + Sync {
    /// Marker key. Its first character is the escape character of the
    /// reserved type and version keys.
    fn key(&self) -> &str;

    /// Returns true if `value` is a reference marker.
    fn is_ref(&self, value: &Value) -> bool;

    /// Builds a marker addressing `path`.
    fn make_ref(&self, path: &[PathKey]) -> Value;

    /// Reads the address of a marker, with decimal segments as indices.
    fn ref_path(&self, marker: &Value) -> Result<Vec<PathKey>>;

    /// Returns true if destinations must be rewritten by
    /// [`label_destination`](ReferenceScheme::label_destination).
    fn labels_destinations(&self) -> bool {
        false
    }

    /// Rewrites the `index`-th destination subtree.
    fn label_destination(&self, _index: usize, value: Value) -> Value {
        value
    }

    /// Returns the subtree wrapped by a labelled destination.
    fn unlabel_destination<'v>(&self, value: &'v mut Value) -> &'v mut Value {
        value
    }
}

/// A destination and every source that refers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Path of the first encounter.
    pub destination: PathId,
    /// Paths of the later encounters, in visit order.
    pub sources: Vec<PathId>,
    /// Insertion index, used by schemes that assign sequential labels.
    pub index: usize,
}

#[derive(Debug, Default)]
struct LinkTable {
    links: Vec<Link>,
    by_destination: FxHashMap<PathId, usize>,
}

impl LinkTable {
    fn add(&mut self, source: PathId, destination: PathId) {
        let index = *self.by_destination.entry(destination).or_insert_with(|| {
            self.links.push(Link {
                destination,
                sources: Vec::new(),
                index: self.links.len(),
            });
            self.links.len() - 1
        });
        self.links[index].sources.push(source);
    }

    fn sources(&self) -> usize {
        self.links.iter().map(|link| link.sources.len()).sum()
    }
}

/// How a deferred reference is written back into its parent.
#[derive(Debug, Clone)]
pub(crate) struct Slot<'r> {
    /// Key passed to `setattr`: the decoded attribute name or the index.
    pub key: PathKey,
    /// Deconstructor of the parent, or `None` for a plain list.
    pub parent: Option<&'r TypeBinding>,
    /// Nearest tagged node whose positional arguments contain the source
    /// through plain lists only.
    pub owner: Option<(PathId, &'r TypeBinding)>,
}

/// Per-call link state.
#[derive(Debug)]
pub struct LinkManager<'r, S: ReferenceScheme + ?Sized> {
    scheme: &'r S,
    paths: PathTable,
    links: LinkTable,
    /// Encode: identity -> (kept-alive object, destination).
    identities: FxHashMap<usize, (ObjRef, PathId)>,
    /// Decode: path -> constructed object.
    objects: FxHashMap<PathId, Object>,
    slots: FxHashMap<PathId, Slot<'r>>,
}

impl<'r, S: ReferenceScheme + ?Sized> LinkManager<'r, S> {
    /// Creates empty state for one call.
    pub fn new(scheme: &'r S) -> Self {
        Self {
            scheme,
            paths: PathTable::new(),
            links: LinkTable::default(),
            identities: FxHashMap::default(),
            objects: FxHashMap::default(),
            slots: FxHashMap::default(),
        }
    }

    /// Returns the reference scheme.
    pub fn scheme(&self) -> &'r S {
        self.scheme
    }

    /// Returns the path table.
    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// Interns `parent + key`.
    pub fn child(&mut self, parent: PathId, key: PathKey) -> PathId {
        self.paths.child(parent, key)
    }

    /// Returns the links recorded so far, in insertion order.
    pub fn links(&self) -> &[Link] {
        &self.links.links
    }

    // ===== ENCODING =====

    /// Returns the destination of an already visited object.
    pub fn destination_of(&self, obj: &ObjRef) -> Option<PathId> {
        self.identities.get(&obj.identity()).map(|(_, path)| *path)
    }

    /// Records `path` as the destination of `obj`.
    ///
    /// The handle is kept so the identity cannot be reused by another
    /// allocation during the call.
    pub fn remember(&mut self, obj: &ObjRef, path: PathId) {
        self.identities.insert(obj.identity(), (obj.clone(), path));
    }

    /// Records a repeat visit and returns the marker to emit at `source`.
    pub fn link_to(&mut self, source: PathId, destination: PathId) -> Value {
        trace!(
            source = %self.paths.display(source),
            destination = %self.paths.display(destination),
            "shared reference"
        );
        self.links.add(source, destination);
        self.scheme.make_ref(&self.paths.keys(destination))
    }

    /// Rewrites every destination through the scheme's label hook.
    pub fn label(&self, mut data: Value) -> Result<Value> {
        if !self.scheme.labels_destinations() {
            return Ok(data);
        }
        for link in &self.links.links {
            if link.destination == PathId::ROOT {
                data = self.scheme.label_destination(link.index, data);
                continue;
            }
            let keys = self.paths.keys(link.destination);
            let slot = self.wire_slot(&mut data, &keys)?;
            let value = std::mem::take(slot);
            *slot = self.scheme.label_destination(link.index, value);
        }
        Ok(data)
    }

    fn wire_slot<'v>(&self, data: &'v mut Value, keys: &[PathKey]) -> Result<&'v mut Value> {
        let mut cur = data;
        for key in keys {
            if self.scheme.is_ref(cur) {
                cur = self.scheme.unlabel_destination(cur);
            }
            let next = match (cur, key) {
                (Value::Object(map), PathKey::Key(k)) => map.get_mut(k.as_str()),
                (Value::Array(items), PathKey::Index(i)) => items.get_mut(*i),
                _ => None,
            };
            cur = next.ok_or_else(|| PreserializeError::MalformedData {
                path: crate::model::format_path(keys),
                context: "labelled destination is not in the wire tree",
            })?;
        }
        Ok(cur)
    }

    // ===== DECODING =====

    /// Records the object constructed at `path`.
    pub fn cache(&mut self, path: PathId, obj: Object) {
        self.objects.insert(path, obj);
    }

    /// Resolves the marker found at `source`.
    ///
    /// Returns the target if it is already constructed. Otherwise records a
    /// deferred patch and returns a null placeholder.
    pub(crate) fn resolve(&mut self, source: PathId, marker: &Value, slot: Slot<'r>) -> Result<Object> {
        let keys: Vec<PathKey> = self
            .scheme
            .ref_path(marker)?
            .into_iter()
            .filter(|key| !key.is_args())
            .collect();
        let target = self.paths.intern(&keys);

        if let Some(obj) = self.objects.get(&target) {
            return Ok(obj.clone());
        }

        trace!(
            source = %self.paths.display(source),
            target = %self.paths.display(target),
            "deferred reference"
        );
        self.links.add(source, target);
        self.slots.insert(source, slot);
        Ok(Object::Null)
    }

    /// Applies every deferred patch, grouped by target in first-seen order.
    pub fn set_sources(&self) -> Result<usize> {
        for link in &self.links.links {
            let target = self.objects.get(&link.destination).ok_or_else(|| {
                PreserializeError::DanglingReference {
                    path: self.paths.display(link.destination),
                }
            })?;
            for &source in &link.sources {
                self.patch(source, target)?;
            }
        }
        Ok(self.links.sources())
    }

    fn patch(&self, source: PathId, target: &Object) -> Result<()> {
        let dangling = || PreserializeError::DanglingReference {
            path: self.paths.display(source),
        };
        let slot = self.slots.get(&source).ok_or_else(dangling)?;
        let parent = self
            .paths
            .parent(source)
            .and_then(|path| self.objects.get(&path))
            .ok_or_else(dangling)?;

        match slot.parent {
            Some(binding) => binding.setattr(parent, &slot.key, target.clone())?,
            None => set_list_item(parent, &slot.key, target.clone()).ok_or_else(|| {
                PreserializeError::MalformedData {
                    path: self.paths.display(source),
                    context: "reference parent is not a list",
                }
            })?,
        }

        if let Some((owner_path, owner)) = slot.owner {
            if let (Some(owner_obj), Some(arg_path)) = (
                self.objects.get(&owner_path),
                self.paths.keys_below(owner_path, source),
            ) {
                owner.relink_arg(owner_obj, &arg_path, target)?;
            }
        }
        Ok(())
    }
}

fn set_list_item(list: &Object, key: &PathKey, value: Object) -> Option<()> {
    let PathKey::Index(i) = key else {
        return None;
    };
    match &mut *list.as_ref_obj()?.borrow_mut() {
        Node::List(items) => {
            *items.get_mut(*i)? = value;
            Some(())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ARGS_KEY;

    #[test]
    fn test_link_table_groups_by_destination() {
        let scheme = JsonReference;
        let mut links = LinkManager::new(&scheme);
        let a = links.child(PathId::ROOT, PathKey::Index(0));
        let b = links.child(PathId::ROOT, PathKey::Index(1));
        let c = links.child(PathId::ROOT, PathKey::Index(2));

        links.link_to(b, a);
        links.link_to(c, PathId::ROOT);
        let marker = links.link_to(c, a);

        assert_eq!(marker, serde_json::json!({"$ref": "#/0"}));
        assert_eq!(links.links().len(), 2);
        assert_eq!(links.links()[0].sources, vec![b, c]);
        assert_eq!(links.links()[1].destination, PathId::ROOT);
        assert_eq!(links.links()[1].index, 1);
    }

    #[test]
    fn test_identity_cache() {
        let scheme = JsonReference;
        let mut links = LinkManager::new(&scheme);
        let shared = Object::list([]);
        let other = Object::list([]);
        let r = shared.as_ref_obj().unwrap();

        assert_eq!(links.destination_of(r), None);
        links.remember(r, PathId::ROOT);
        assert_eq!(links.destination_of(r), Some(PathId::ROOT));
        assert_eq!(links.destination_of(other.as_ref_obj().unwrap()), None);
    }

    #[test]
    fn test_resolve_strips_args_key() {
        let scheme = JsonReference;
        let mut links = LinkManager::new(&scheme);
        let list = Object::list([Object::Null]);
        let pair = links.child(PathId::ROOT, PathKey::Index(2));
        links.cache(pair, list.clone());

        let slot = Slot {
            key: PathKey::Index(0),
            parent: None,
            owner: None,
        };
        let source = links.child(PathId::ROOT, PathKey::Index(0));
        let marker = scheme.make_ref(&[PathKey::from(ARGS_KEY), PathKey::Index(2)]);
        let resolved = links.resolve(source, &marker, slot).unwrap();
        assert!(resolved.ptr_eq(&list));
        assert!(links.links().is_empty());
    }

    #[test]
    fn test_deferred_patch_and_dangling() {
        let scheme = JsonReference;
        let mut links = LinkManager::new(&scheme);
        let root = Object::list([Object::Null]);
        let source = links.child(PathId::ROOT, PathKey::Index(0));
        let slot = || Slot {
            key: PathKey::Index(0),
            parent: None,
            owner: None,
        };

        let placeholder = links.resolve(source, &serde_json::json!({"$ref": "#"}), slot()).unwrap();
        assert_eq!(placeholder, Object::Null);
        links.cache(PathId::ROOT, root.clone());
        assert_eq!(links.set_sources().unwrap(), 1);
        assert!(root.item(0).unwrap().ptr_eq(&root));

        let mut links = LinkManager::new(&scheme);
        let source = links.child(PathId::ROOT, PathKey::Index(0));
        links
            .resolve(source, &serde_json::json!({"$ref": "#/9"}), slot())
            .unwrap();
        links.cache(PathId::ROOT, Object::list([Object::Null]));
        assert!(matches!(
            links.set_sources(),
            Err(PreserializeError::DanglingReference { path }) if path == "/9"
        ));

        // break the cycle so the list is freed
        if let Node::List(items) = &mut *root.as_ref_obj().unwrap().borrow_mut() {
            items.clear();
        }
    }
}
