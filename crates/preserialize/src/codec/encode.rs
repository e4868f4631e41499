//! Object graph to wire tree.

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::codec::{Preserializer, dispose};
use crate::deconstruct::TypeBinding;
use crate::error::{PreserializeError, Result};
use crate::link::{LinkManager, ReferenceScheme};
use crate::model::{ARGS_KEY, Node, Object, PathId, PathKey, RuntimeType};

/// Position of a child within its parent's output.
#[derive(Debug)]
enum ChildKey {
    Item(usize),
    Arg(usize),
    /// Encoded attribute key.
    Attr(String),
}

#[derive(Debug)]
enum Output {
    List(Vec<Value>),
    Tagged {
        map: Map<String, Value>,
        /// Positional arguments, flushed under the empty key before the
        /// first attribute.
        args: Option<Vec<Value>>,
    },
}

impl Output {
    fn accept(&mut self, key: ChildKey, value: Value) {
        match (self, key) {
            (Output::List(items), _) => items.push(value),
            (Output::Tagged { map, args }, ChildKey::Attr(key)) => {
                if let Some(args) = args.take() {
                    map.insert(ARGS_KEY.to_string(), Value::Array(args));
                }
                map.insert(key, value);
            }
            (Output::Tagged { args, .. }, _) => args.get_or_insert_with(Vec::new).push(value),
        }
    }

    fn dispose(self) {
        match self {
            Output::List(items) => items.into_iter().for_each(dispose),
            Output::Tagged { map, args } => {
                map.into_iter().for_each(|(_, value)| dispose(value));
                args.into_iter().flatten().for_each(dispose);
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Output::List(items) => Value::Array(items),
            Output::Tagged { mut map, args } => {
                if let Some(args) = args {
                    map.insert(ARGS_KEY.to_string(), Value::Array(args));
                }
                Value::Object(map)
            }
        }
    }
}

#[derive(Debug)]
struct Frame {
    path: PathId,
    output: Output,
    children: std::vec::IntoIter<(ChildKey, Object)>,
}

enum Step {
    Leaf(Value),
    Open(Frame),
}

struct Encoder<'p, S: ReferenceScheme> {
    p: &'p Preserializer<S>,
    links: LinkManager<'p, S>,
    nodes: usize,
}

pub(crate) fn preserialize<S: ReferenceScheme>(p: &Preserializer<S>, root: &Object) -> Result<Value> {
    let mut encoder = Encoder {
        p,
        links: LinkManager::new(p.scheme()),
        nodes: 0,
    };
    let data = encoder.run(root)?;
    let data = encoder.links.label(data)?;

    debug!(
        nodes = encoder.nodes,
        destinations = encoder.links.links().len(),
        references = encoder.links.links().iter().map(|l| l.sources.len()).sum::<usize>(),
        "preserialized object graph"
    );
    Ok(data)
}

impl<'p, S: ReferenceScheme> Encoder<'p, S> {
    fn run(&mut self, root: &Object) -> Result<Value> {
        let mut stack = match self.enter(root, PathId::ROOT)? {
            Step::Leaf(value) => return Ok(value),
            Step::Open(frame) => vec![(ChildKey::Item(0), frame)],
        };
        let result = self.walk(&mut stack);
        if result.is_err() {
            // Finished subtrees may be arbitrarily deep.
            for (_, frame) in stack {
                frame.output.dispose();
            }
        }
        result
    }

    fn walk(&mut self, stack: &mut Vec<(ChildKey, Frame)>) -> Result<Value> {
        let mut result = Value::Null;

        while let Some((_, top)) = stack.last_mut() {
            match top.children.next() {
                Some((key, child)) => {
                    let path = self.child_path(top.path, &key);
                    match self.enter(&child, path)? {
                        Step::Leaf(value) => top.output.accept(key, value),
                        Step::Open(frame) => {
                            self.p.limits().check_depth(stack.len() + 1)?;
                            stack.push((key, frame));
                        }
                    }
                }
                None => {
                    if let Some((slot, frame)) = stack.pop() {
                        let value = frame.output.finish();
                        match stack.last_mut() {
                            Some((_, parent)) => parent.output.accept(slot, value),
                            None => result = value,
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    fn child_path(&mut self, parent: PathId, key: &ChildKey) -> PathId {
        match key {
            ChildKey::Item(i) => self.links.child(parent, PathKey::Index(*i)),
            ChildKey::Arg(i) => {
                let args = self.links.child(parent, PathKey::from(ARGS_KEY));
                self.links.child(args, PathKey::Index(*i))
            }
            ChildKey::Attr(key) => self.links.child(parent, PathKey::Key(key.clone())),
        }
    }

    fn enter(&mut self, obj: &Object, path: PathId) -> Result<Step> {
        let p = self.p;
        self.nodes += 1;
        p.limits().check_nodes(self.nodes)?;

        let r = match obj {
            Object::Ref(r) => r,
            scalar => {
                return match p.registry().binding_for_type(&scalar.runtime_type())? {
                    None => scalar_to_wire(scalar).map(Step::Leaf),
                    Some(binding) => self.tagged(binding, obj, path).map(Step::Open),
                };
            }
        };

        let ty = r.runtime_type();
        let binding = match ty {
            RuntimeType::List => None,
            _ => Some(
                p.registry()
                    .binding_for_type(&ty)?
                    .ok_or_else(|| PreserializeError::NotPassthrough {
                        type_name: ty.to_string(),
                    })?,
            ),
        };

        if let Some(destination) = self.links.destination_of(r) {
            return Ok(Step::Leaf(self.links.link_to(path, destination)));
        }
        self.links.remember(r, path);

        match binding {
            Some(binding) => self.tagged(binding, obj, path).map(Step::Open),
            None => {
                let items = match &*r.borrow() {
                    Node::List(items) => items.clone(),
                    _ => Vec::new(),
                };
                Ok(Step::Open(Frame {
                    path,
                    output: Output::List(Vec::with_capacity(items.len())),
                    children: items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| (ChildKey::Item(i), item))
                        .collect::<Vec<_>>()
                        .into_iter(),
                }))
            }
        }
    }

    fn tagged(&self, binding: &TypeBinding, obj: &Object, path: PathId) -> Result<Frame> {
        let parts = binding.deconstruct(obj)?;

        let mut map = Map::new();
        map.insert(self.p.type_key().to_string(), Value::String(binding.name().to_string()));
        if let Some(version) = binding.version() {
            map.insert(self.p.version_key().to_string(), version.to_wire());
        }

        let mut children = Vec::new();
        if let Some(args) = parts.args {
            children.extend(args.into_iter().enumerate().map(|(i, arg)| (ChildKey::Arg(i), arg)));
        }
        if let Some(kwargs) = parts.kwargs {
            for (key, value) in kwargs {
                let encoded = self.p.key_encoder().encode(&key)?;
                if self.p.is_reserved(&encoded) {
                    return Err(PreserializeError::ReservedKeyCollision { key: encoded });
                }
                children.push((ChildKey::Attr(encoded), value));
            }
        }

        Ok(Frame {
            path,
            output: Output::Tagged { map, args: None },
            children: children.into_iter(),
        })
    }
}

fn scalar_to_wire(obj: &Object) -> Result<Value> {
    Ok(match obj {
        Object::Null => Value::Null,
        Object::Bool(b) => Value::Bool(*b),
        Object::Int(i) => Value::from(*i),
        Object::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or(PreserializeError::NonFiniteFloat { value: *f })?,
        Object::Str(s) => Value::String(s.clone()),
        Object::Ref(r) => {
            return Err(PreserializeError::NotPassthrough {
                type_name: r.runtime_type().to_string(),
            });
        }
    })
}
