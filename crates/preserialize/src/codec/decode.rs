//! Wire tree to object graph.
//!
//! Objects are built bottom-up: a frame constructs its object once every
//! child is decoded. A reference to an object that is not finished yet (an
//! ancestor, in a cycle) yields a null placeholder and a deferred patch that
//! is applied after the walk.

use serde_json::{Map, Value};
use tracing::debug;

use crate::codec::Preserializer;
use crate::deconstruct::TypeBinding;
use crate::error::{PreserializeError, Result};
use crate::link::{LinkManager, ReferenceScheme, Slot};
use crate::model::{ARGS_KEY, Attributes, Object, PathId, PathKey, RuntimeType, Version};

#[derive(Debug)]
enum ChildKey {
    Item(usize),
    Arg(usize),
    Attr {
        /// Key as written on the wire; used for paths.
        wire: String,
        /// Decoded attribute name; used for construction.
        name: String,
    },
}

#[derive(Debug)]
enum Kind<'p> {
    List(Vec<Object>),
    Tagged {
        binding: &'p TypeBinding,
        args: Vec<Object>,
        kwargs: Attributes,
    },
}

impl Kind<'_> {
    fn accept(&mut self, key: ChildKey, obj: Object) {
        match (self, key) {
            (Kind::List(items), _) => items.push(obj),
            (Kind::Tagged { kwargs, .. }, ChildKey::Attr { name, .. }) => {
                kwargs.insert(name, obj);
            }
            (Kind::Tagged { args, .. }, _) => args.push(obj),
        }
    }
}

#[derive(Debug)]
struct Frame<'v, 'p> {
    path: PathId,
    kind: Kind<'p>,
    /// Owner inherited by the items of a plain list.
    owner: Option<(PathId, &'p TypeBinding)>,
    children: std::vec::IntoIter<(ChildKey, &'v Value)>,
}

impl<'p> Frame<'_, 'p> {
    /// How a deferred reference in child `key` is written back.
    fn slot(&self, key: &ChildKey) -> Slot<'p> {
        match (&self.kind, key) {
            (Kind::List(_), ChildKey::Item(i)) | (Kind::List(_), ChildKey::Arg(i)) => Slot {
                key: PathKey::Index(*i),
                parent: None,
                owner: self.owner,
            },
            (Kind::List(_), ChildKey::Attr { name, .. }) => Slot {
                key: PathKey::Key(name.clone()),
                parent: None,
                owner: None,
            },
            (Kind::Tagged { binding, .. }, ChildKey::Attr { name, .. }) => Slot {
                key: PathKey::Key(name.clone()),
                parent: Some(*binding),
                owner: None,
            },
            (Kind::Tagged { binding, .. }, ChildKey::Item(i)) | (Kind::Tagged { binding, .. }, ChildKey::Arg(i)) => {
                Slot {
                    key: PathKey::Index(*i),
                    parent: Some(*binding),
                    owner: Some((self.path, *binding)),
                }
            }
        }
    }

    fn finish(self) -> Result<Object> {
        match self.kind {
            Kind::List(items) => Ok(Object::list(items)),
            Kind::Tagged { binding, args, kwargs } => binding.construct(args, kwargs),
        }
    }
}

enum Step<'v, 'p> {
    Leaf(Object),
    Open(Frame<'v, 'p>),
}

struct Decoder<'p, S: ReferenceScheme> {
    p: &'p Preserializer<S>,
    links: LinkManager<'p, S>,
    nodes: usize,
}

pub(crate) fn depreserialize<S: ReferenceScheme>(p: &Preserializer<S>, data: &Value) -> Result<Object> {
    let mut decoder = Decoder {
        p,
        links: LinkManager::new(p.scheme()),
        nodes: 0,
    };
    let root_slot = Slot {
        key: PathKey::Index(0),
        parent: None,
        owner: None,
    };
    let obj = decoder.run(data, root_slot)?;
    let patched = decoder.links.set_sources()?;

    debug!(
        nodes = decoder.nodes,
        paths = decoder.links.paths().len(),
        deferred = patched,
        "depreserialized object graph"
    );
    Ok(obj)
}

impl<'p, S: ReferenceScheme> Decoder<'p, S> {
    fn run<'v>(&mut self, data: &'v Value, root_slot: Slot<'p>) -> Result<Object> {
        let mut stack = match self.enter(data, PathId::ROOT, root_slot)? {
            Step::Leaf(obj) => return Ok(obj),
            Step::Open(frame) => vec![(ChildKey::Item(0), frame)],
        };
        let mut result = Object::Null;

        while let Some((_, top)) = stack.last_mut() {
            match top.children.next() {
                Some((key, child)) => {
                    let path = self.child_path(top.path, &key);
                    let slot = top.slot(&key);
                    match self.enter(child, path, slot)? {
                        Step::Leaf(obj) => top.kind.accept(key, obj),
                        Step::Open(frame) => {
                            self.p.limits().check_depth(stack.len() + 1)?;
                            stack.push((key, frame));
                        }
                    }
                }
                None => {
                    if let Some((key, frame)) = stack.pop() {
                        let path = frame.path;
                        let obj = frame.finish()?;
                        self.links.cache(path, obj.clone());
                        match stack.last_mut() {
                            Some((_, parent)) => parent.kind.accept(key, obj),
                            None => result = obj,
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Decode paths omit the positional-arguments key and use wire keys for
    /// attributes, so they match reference addresses once the empty key is
    /// stripped from those.
    fn child_path(&mut self, parent: PathId, key: &ChildKey) -> PathId {
        match key {
            ChildKey::Item(i) | ChildKey::Arg(i) => self.links.child(parent, PathKey::Index(*i)),
            ChildKey::Attr { wire, .. } => self.links.child(parent, PathKey::Key(wire.clone())),
        }
    }

    fn enter<'v>(&mut self, data: &'v Value, path: PathId, slot: Slot<'p>) -> Result<Step<'v, 'p>> {
        let p = self.p;
        self.nodes += 1;
        p.limits().check_nodes(self.nodes)?;

        match data {
            Value::Array(items) => Ok(Step::Open(Frame {
                path,
                kind: Kind::List(Vec::with_capacity(items.len())),
                owner: slot.owner,
                children: items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (ChildKey::Item(i), item))
                    .collect::<Vec<_>>()
                    .into_iter(),
            })),
            Value::Object(_) if p.scheme().is_ref(data) => {
                if path == PathId::ROOT {
                    return Err(PreserializeError::MalformedData {
                        path: String::new(),
                        context: "the root cannot be a reference",
                    });
                }
                self.links.resolve(path, data, slot).map(Step::Leaf)
            }
            Value::Object(map) => self.tagged(map, path).map(Step::Open),
            scalar => self.scalar(scalar, path).map(Step::Leaf),
        }
    }

    fn tagged<'v>(&self, map: &'v Map<String, Value>, path: PathId) -> Result<Frame<'v, 'p>> {
        let p = self.p;
        let malformed = |context| PreserializeError::MalformedData {
            path: self.links.paths().display(path),
            context,
        };

        let tag = match map.get(p.type_key()) {
            Some(Value::String(tag)) => tag,
            Some(_) => return Err(malformed("type tag is not a string")),
            None => {
                return Err(PreserializeError::MissingTypeTag {
                    path: self.links.paths().display(path),
                });
            }
        };
        let version = match map.get(p.version_key()) {
            Some(value) => Some(Version::from_wire(value).ok_or_else(|| malformed("version is not an integer or string"))?),
            None => None,
        };
        let binding = p.registry().binding_for_tag(tag, version.as_ref())?;

        let mut children = Vec::with_capacity(map.len());
        for (key, value) in map {
            if key == ARGS_KEY {
                let Value::Array(args) = value else {
                    return Err(malformed("positional arguments are not a list"));
                };
                children.extend(args.iter().enumerate().map(|(i, arg)| (ChildKey::Arg(i), arg)));
            } else if key != p.type_key() && key != p.version_key() {
                let name = p.key_encoder().decode(key)?;
                children.push((
                    ChildKey::Attr {
                        wire: key.clone(),
                        name,
                    },
                    value,
                ));
            }
        }

        Ok(Frame {
            path,
            kind: Kind::Tagged {
                binding,
                args: Vec::new(),
                kwargs: Attributes::new(),
            },
            owner: None,
            children: children.into_iter(),
        })
    }

    fn scalar(&self, data: &Value, path: PathId) -> Result<Object> {
        let obj = match data {
            Value::Null => Object::Null,
            Value::Bool(b) => Object::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Object::Int(i),
                (None, _) if n.is_u64() => {
                    return Err(PreserializeError::MalformedData {
                        path: self.links.paths().display(path),
                        context: "integer out of range",
                    });
                }
                (None, Some(f)) => Object::Float(f),
                (None, None) => {
                    return Err(PreserializeError::MalformedData {
                        path: self.links.paths().display(path),
                        context: "number is not representable",
                    });
                }
            },
            Value::String(s) => Object::Str(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(PreserializeError::MalformedData {
                    path: self.links.paths().display(path),
                    context: "expected a scalar",
                });
            }
        };

        let ty: RuntimeType = obj.runtime_type();
        match self.p.registry().binding_for_type(&ty)? {
            None => Ok(obj),
            Some(_) => Err(PreserializeError::MalformedData {
                path: self.links.paths().display(path),
                context: "scalar value for a type that is written as a tagged mapping",
            }),
        }
    }
}
