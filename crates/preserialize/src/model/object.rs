//! The object graph: typed, shared, possibly cyclic values.
//!
//! Scalars are held inline. Everything else lives behind an [`ObjRef`], a
//! shared `Rc<RefCell<Node>>` whose allocation address is the object's
//! identity. Two distinct nodes may be structurally equal and are still
//! tracked as distinct objects.
//!
//! Strong cycles are never freed by reference counting. Use
//! [`Node::Weak`] for back-edges when the graph must be dropped.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::error::{PreserializeError, Result};
use crate::model::types::{Class, RuntimeType};

/// Ordered attribute mapping of an instance (or kwargs of a deconstruction).
pub type Attributes = IndexMap<String, Object>;

/// A value in the object graph.
#[derive(Debug, Clone)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Shared, identity-bearing node.
    Ref(ObjRef),
}

impl Object {
    /// Wraps `node` in a new shared object.
    pub fn new(node: Node) -> Self {
        Object::Ref(ObjRef::new(node))
    }

    /// Creates a new list object.
    pub fn list(items: impl IntoIterator<Item = Object>) -> Self {
        Object::new(Node::List(items.into_iter().collect()))
    }

    /// Creates a new tuple object.
    pub fn tuple(items: impl IntoIterator<Item = Object>) -> Self {
        Object::new(Node::Tuple(items.into_iter().collect()))
    }

    /// Creates a new set object.
    ///
    /// Duplicate members are dropped: scalars compare by value, shared nodes
    /// by identity. The first occurrence keeps its position.
    pub fn set(items: impl IntoIterator<Item = Object>) -> Self {
        let mut members: Vec<Object> = Vec::new();
        for item in items {
            if !members.iter().any(|member| same_member(member, &item)) {
                members.push(item);
            }
        }
        Object::new(Node::Set(members))
    }

    /// Creates a new mapping object.
    pub fn dict(entries: impl IntoIterator<Item = (DictKey, Object)>) -> Self {
        Object::new(Node::Dict(entries.into_iter().collect()))
    }

    /// Creates a new instance of `class` with the given fields.
    pub fn instance(class: Class, fields: impl IntoIterator<Item = (String, Object)>) -> Self {
        Object::new(Node::Instance(Instance {
            class,
            fields: fields.into_iter().collect(),
        }))
    }

    /// Creates a class value.
    pub fn class(class: Class) -> Self {
        Object::new(Node::Class(class))
    }

    /// Creates a weak reference to `target`.
    pub fn weak(target: &ObjRef, callback: Option<Object>) -> Self {
        Object::new(Node::Weak(WeakRef {
            target: target.downgrade(),
            callback,
        }))
    }

    /// Returns the runtime type used for registry dispatch.
    pub fn runtime_type(&self) -> RuntimeType {
        match self {
            Object::Null => RuntimeType::Null,
            Object::Bool(_) => RuntimeType::Bool,
            Object::Int(_) => RuntimeType::Int,
            Object::Float(_) => RuntimeType::Float,
            Object::Str(_) => RuntimeType::Str,
            Object::Ref(r) => r.runtime_type(),
        }
    }

    /// Returns the shared node, if this is not a scalar.
    pub fn as_ref_obj(&self) -> Option<&ObjRef> {
        match self {
            Object::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Returns true if both values are the same shared object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Ref(a), Object::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Reads an attribute: an instance field, or a string-keyed mapping entry.
    pub fn attr(&self, name: &str) -> Option<Object> {
        let r = self.as_ref_obj()?;
        match &*r.borrow() {
            Node::Instance(inst) => inst.fields.get(name).cloned(),
            Node::Dict(map) => map.get(&DictKey::Str(name.to_string())).cloned(),
            _ => None,
        }
    }

    /// Reads the `index`-th element of a list, tuple or set.
    pub fn item(&self, index: usize) -> Option<Object> {
        let r = self.as_ref_obj()?;
        match &*r.borrow() {
            Node::List(items) | Node::Tuple(items) | Node::Set(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Cycle-aware structural equality.
    ///
    /// Shared nodes compare by content; a pair of nodes already under
    /// comparison is assumed equal, which makes cyclic graphs terminate.
    pub fn structurally_eq(&self, other: &Object) -> bool {
        structural_eq(self, other)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Object) -> bool {
        structural_eq(self, other)
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Bool(v)
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Int(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Object::Int(v.into())
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Object::Float(v)
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Object::Str(v.to_string())
    }
}

impl From<String> for Object {
    fn from(v: String) -> Self {
        Object::Str(v)
    }
}

impl From<ObjRef> for Object {
    fn from(v: ObjRef) -> Self {
        Object::Ref(v)
    }
}

/// Shared handle to a graph node. Cloning shares; it never copies the node.
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Node>>);

impl ObjRef {
    /// Allocates a new node.
    pub fn new(node: Node) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    /// Borrows the node.
    pub fn borrow(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    /// Mutably borrows the node.
    pub fn borrow_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the node's identity: its allocation address.
    ///
    /// Only meaningful while the node is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Creates a non-owning handle.
    pub fn downgrade(&self) -> WeakObj {
        WeakObj(Rc::downgrade(&self.0))
    }

    /// Returns the runtime type of the node.
    pub fn runtime_type(&self) -> RuntimeType {
        self.borrow().runtime_type()
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never recurse: the graph may be cyclic.
        match self.0.try_borrow() {
            Ok(node) => write!(f, "ObjRef({}@{:#x})", node.runtime_type(), self.identity()),
            Err(_) => write!(f, "ObjRef(<borrowed>@{:#x})", self.identity()),
        }
    }
}

impl Drop for ObjRef {
    /// Releases a uniquely owned node without native recursion.
    ///
    /// The children of every node whose last handle is going away are moved
    /// onto a local worklist, so each handle dropped from there finds an
    /// empty node.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_children(&self.0, &mut pending);
        while let Some(obj) = pending.pop() {
            if let Object::Ref(r) = &obj {
                detach_children(&r.0, &mut pending);
            }
        }
    }
}

fn detach_children(node: &Rc<RefCell<Node>>, pending: &mut Vec<Object>) {
    if Rc::strong_count(node) != 1 {
        return;
    }
    let Ok(mut node) = node.try_borrow_mut() else {
        return;
    };
    match &mut *node {
        Node::List(items) | Node::Tuple(items) | Node::Set(items) => pending.append(items),
        Node::Dict(map) => pending.extend(map.drain(..).map(|(_, value)| value)),
        Node::Instance(inst) => pending.extend(inst.fields.drain(..).map(|(_, value)| value)),
        Node::Weak(weak) => pending.extend(weak.callback.take()),
        Node::Class(_) => {}
    }
}

/// Non-owning handle to a graph node.
#[derive(Clone, Default)]
pub struct WeakObj(Weak<RefCell<Node>>);

impl WeakObj {
    /// Creates a handle that never upgrades.
    pub fn new() -> Self {
        Self(Weak::new())
    }

    /// Returns the target if it is still alive.
    pub fn upgrade(&self) -> Option<ObjRef> {
        self.0.upgrade().map(ObjRef)
    }
}

impl fmt::Debug for WeakObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(target) => write!(f, "WeakObj({:?})", target),
            None => f.write_str("WeakObj(<dead>)"),
        }
    }
}

/// The content of a shared object.
#[derive(Debug, Clone)]
pub enum Node {
    List(Vec<Object>),
    Tuple(Vec<Object>),
    /// Set members. Positions are only used for addressing; equality
    /// ignores order.
    Set(Vec<Object>),
    Dict(IndexMap<DictKey, Object>),
    Instance(Instance),
    /// A class value.
    Class(Class),
    Weak(WeakRef),
}

impl Node {
    /// Returns the runtime type of this node.
    pub fn runtime_type(&self) -> RuntimeType {
        match self {
            Node::List(_) => RuntimeType::List,
            Node::Tuple(_) => RuntimeType::Tuple,
            Node::Set(_) => RuntimeType::Set,
            Node::Dict(_) => RuntimeType::Dict,
            Node::Instance(inst) => RuntimeType::Class(inst.class.clone()),
            Node::Class(_) => RuntimeType::Type,
            Node::Weak(_) => RuntimeType::WeakRef,
        }
    }
}

/// An instance of a user-defined class: a class plus ordered fields.
#[derive(Debug, Clone)]
pub struct Instance {
    pub class: Class,
    pub fields: Attributes,
}

impl Instance {
    /// Creates an instance with no fields (an allocated, unpopulated shell).
    pub fn shell(class: Class) -> Self {
        Self {
            class,
            fields: Attributes::new(),
        }
    }
}

/// Weak reference node with an optional release callback.
#[derive(Debug, Clone, Default)]
pub struct WeakRef {
    pub target: WeakObj,
    pub callback: Option<Object>,
}

/// Hashable mapping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl DictKey {
    /// Converts a key back to a graph value.
    pub fn to_object(&self) -> Object {
        match self {
            DictKey::Null => Object::Null,
            DictKey::Bool(b) => Object::Bool(*b),
            DictKey::Int(i) => Object::Int(*i),
            DictKey::Str(s) => Object::Str(s.clone()),
        }
    }

    /// Converts a graph value to a key. Floats and shared nodes are unhashable.
    pub fn from_object(obj: &Object) -> Result<DictKey> {
        match obj {
            Object::Null => Ok(DictKey::Null),
            Object::Bool(b) => Ok(DictKey::Bool(*b)),
            Object::Int(i) => Ok(DictKey::Int(*i)),
            Object::Str(s) => Ok(DictKey::Str(s.clone())),
            other => Err(PreserializeError::UnhashableKey {
                type_name: other.runtime_type().to_string(),
            }),
        }
    }

    /// Returns the key as a string slice, if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DictKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for DictKey {
    fn from(v: &str) -> Self {
        DictKey::Str(v.to_string())
    }
}

impl From<i64> for DictKey {
    fn from(v: i64) -> Self {
        DictKey::Int(v)
    }
}

impl From<i32> for DictKey {
    fn from(v: i32) -> Self {
        DictKey::Int(v.into())
    }
}

/// Set membership test: shared nodes by identity, scalars by value.
fn same_member(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Ref(p), Object::Ref(q)) => p.ptr_eq(q),
        (Object::Ref(_), _) | (_, Object::Ref(_)) => false,
        _ => structural_eq(a, b),
    }
}

fn structural_eq(a: &Object, b: &Object) -> bool {
    let mut seen: FxHashSet<(usize, usize)> = FxHashSet::default();
    eq_with(a, b, &mut seen)
}

/// Pairs in `seen` are assumed equal. A set member match is tried against a
/// copy of `seen`, so a failed candidate leaves no assumptions behind.
fn eq_with(a: &Object, b: &Object, seen: &mut FxHashSet<(usize, usize)>) -> bool {
    let mut stack = vec![(a.clone(), b.clone())];

    while let Some((x, y)) = stack.pop() {
        let (x, y) = match (x, y) {
            (Object::Null, Object::Null) => continue,
            (Object::Bool(p), Object::Bool(q)) if p == q => continue,
            (Object::Int(p), Object::Int(q)) if p == q => continue,
            (Object::Float(p), Object::Float(q)) if p == q => continue,
            (Object::Str(p), Object::Str(q)) if p == q => continue,
            (Object::Ref(p), Object::Ref(q)) => (p, q),
            _ => return false,
        };
        if x.ptr_eq(&y) || !seen.insert((x.identity(), y.identity())) {
            continue;
        }

        let xn = x.borrow();
        let yn = y.borrow();
        match (&*xn, &*yn) {
            (Node::List(p), Node::List(q)) | (Node::Tuple(p), Node::Tuple(q)) => {
                if p.len() != q.len() {
                    return false;
                }
                stack.extend(p.iter().cloned().zip(q.iter().cloned()));
            }
            (Node::Set(p), Node::Set(q)) => {
                if p.len() != q.len() {
                    return false;
                }
                let mut matched = vec![false; q.len()];
                for pv in p {
                    let found = q.iter().enumerate().find_map(|(i, qv)| {
                        if matched[i] {
                            return None;
                        }
                        let mut trial = seen.clone();
                        eq_with(pv, qv, &mut trial).then_some((i, trial))
                    });
                    match found {
                        Some((i, trial)) => {
                            matched[i] = true;
                            *seen = trial;
                        }
                        None => return false,
                    }
                }
            }
            (Node::Dict(p), Node::Dict(q)) => {
                if p.len() != q.len() {
                    return false;
                }
                for (key, pv) in p {
                    match q.get(key) {
                        Some(qv) => stack.push((pv.clone(), qv.clone())),
                        None => return false,
                    }
                }
            }
            (Node::Instance(p), Node::Instance(q)) => {
                if p.class != q.class || p.fields.len() != q.fields.len() {
                    return false;
                }
                for (name, pv) in &p.fields {
                    match q.fields.get(name) {
                        Some(qv) => stack.push((pv.clone(), qv.clone())),
                        None => return false,
                    }
                }
            }
            (Node::Class(p), Node::Class(q)) => {
                if p != q {
                    return false;
                }
            }
            (Node::Weak(p), Node::Weak(q)) => {
                match (p.target.upgrade(), q.target.upgrade()) {
                    (Some(pt), Some(qt)) => stack.push((Object::Ref(pt), Object::Ref(qt))),
                    (None, None) => {}
                    _ => return false,
                }
                match (&p.callback, &q.callback) {
                    (Some(pc), Some(qc)) => stack.push((pc.clone(), qc.clone())),
                    (None, None) => {}
                    _ => return false,
                }
            }
            _ => return false,
        }
    }
    true
}
