//! Built-in deconstructors for instances, sequences, mappings and class values.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::deconstruct::{Deconstructor, Parts, TypeBinding};
use crate::error::{PreserializeError, Result};
use crate::key::is_identifier;
use crate::model::{Attributes, Class, DictKey, Instance, Node, Object, PathKey, RuntimeType};

/// Deconstructor for class instances: fields become attributes.
///
/// Fields listed in the binding's `ignore` set are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceDeconstructor;

impl Deconstructor for InstanceDeconstructor {
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &*r.borrow() {
            Node::Instance(inst) => Ok(Parts::kwargs(
                inst.fields
                    .iter()
                    .filter(|(key, _)| !binding.ignores(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            )),
            _ => Err(binding.mismatch(obj)),
        }
    }

    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object> {
        if !args.is_empty() {
            return Err(binding.bad_arguments("instances take no positional arguments"));
        }
        match binding.runtime_type() {
            RuntimeType::Class(class) => Ok(Object::new(Node::Instance(Instance::shell(class.clone())))),
            _ => Err(binding.bad_arguments("instance deconstructor bound to a non-class type")),
        }
    }

    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match (&mut *r.borrow_mut(), key) {
            (Node::Instance(inst), PathKey::Key(name)) => {
                inst.fields.insert(name.clone(), value);
                Ok(())
            }
            (Node::Instance(_), PathKey::Index(_)) => Err(binding.unsupported_attribute(key)),
            _ => Err(binding.mismatch(obj)),
        }
    }
}

/// Deconstructor for lists, tuples and sets.
///
/// The items become one positional argument list, repacked on construct.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterableDeconstructor;

impl Deconstructor for IterableDeconstructor {
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &*r.borrow() {
            Node::List(items) | Node::Tuple(items) | Node::Set(items) => Ok(Parts::args(items.clone())),
            _ => Err(binding.mismatch(obj)),
        }
    }

    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object> {
        let node = match binding.runtime_type() {
            RuntimeType::List => Node::List(args),
            RuntimeType::Tuple => Node::Tuple(args),
            RuntimeType::Set => Node::Set(args),
            _ => return Err(binding.bad_arguments("iterable deconstructor bound to a non-sequence type")),
        };
        Ok(Object::new(node))
    }

    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &mut *r.borrow_mut() {
            Node::List(items) | Node::Tuple(items) | Node::Set(items) => {
                let slot = match key {
                    PathKey::Index(i) => items.get_mut(*i),
                    PathKey::Key(_) => None,
                };
                match slot {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(binding.unsupported_attribute(key)),
                }
            }
            _ => Err(binding.mismatch(obj)),
        }
    }
}

/// Deconstructor for mappings.
///
/// Mappings whose keys are all identifier strings decompose into
/// attributes. Any other mapping decomposes into a positional list of
/// `[key, value]` pairs, which keeps non-string keys unambiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictDeconstructor;

impl Deconstructor for DictDeconstructor {
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        let node = r.borrow();
        let Node::Dict(map) = &*node else {
            return Err(binding.mismatch(obj));
        };

        if map.keys().all(|key| key.as_str().is_some_and(is_identifier)) {
            let kwargs = map
                .iter()
                .filter_map(|(key, value)| key.as_str().map(|k| (k.to_string(), value.clone())))
                .collect();
            Ok(Parts::kwargs(kwargs))
        } else {
            let pairs = map
                .iter()
                .map(|(key, value)| Object::list([key.to_object(), value.clone()]))
                .collect();
            Ok(Parts::args(pairs))
        }
    }

    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object> {
        let mut map = IndexMap::with_capacity(args.len());
        for pair in &args {
            let (key, value) = match pair.as_ref_obj().map(|r| r.borrow().clone()) {
                Some(Node::List(items)) | Some(Node::Tuple(items)) if items.len() == 2 => {
                    (items[0].clone(), items[1].clone())
                }
                _ => return Err(binding.bad_arguments("mapping arguments must be [key, value] pairs")),
            };
            map.insert(DictKey::from_object(&key)?, value);
        }
        Ok(Object::new(Node::Dict(map)))
    }

    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &mut *r.borrow_mut() {
            Node::Dict(map) => {
                let key = match key {
                    PathKey::Key(k) => DictKey::Str(k.clone()),
                    PathKey::Index(i) => {
                        let i = i64::try_from(*i).map_err(|_| binding.unsupported_attribute(key))?;
                        DictKey::Int(i)
                    }
                };
                map.insert(key, value);
                Ok(())
            }
            _ => Err(binding.mismatch(obj)),
        }
    }

    /// Values are copied out of their `[key, value]` pair on construct, so a
    /// reference resolved inside pair `i` is copied into entry `i` as well.
    fn relink_arg(&self, binding: &TypeBinding, obj: &Object, arg_path: &[PathKey], value: &Object) -> Result<()> {
        let [PathKey::Index(i), PathKey::Index(1)] = arg_path else {
            return Ok(());
        };
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &mut *r.borrow_mut() {
            Node::Dict(map) => {
                if let Some((_, slot)) = map.get_index_mut(*i) {
                    *slot = value.clone();
                }
                Ok(())
            }
            _ => Err(binding.mismatch(obj)),
        }
    }
}

/// Resolves class values by module and name when decoding.
pub trait ClassResolver: fmt::Debug + Send + Sync {
    /// Returns the class named `name` in `module`, if it exists.
    fn resolve(&self, module: &str, name: &str) -> Option<Class>;
}

/// A fixed set of resolvable classes.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: FxHashSet<Class>,
}

impl ClassTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    pub fn with(mut self, class: Class) -> Self {
        self.classes.insert(class);
        self
    }
}

impl ClassResolver for ClassTable {
    fn resolve(&self, module: &str, name: &str) -> Option<Class> {
        self.classes.get(&Class::in_module(module, name)).cloned()
    }
}

/// Deconstructor for class values: `{name, module}` attributes.
///
/// The shell is an unresolved class that `setattr` fills in; `construct`
/// then checks the class against the resolver.
#[derive(Debug, Clone)]
pub struct TypeDeconstructor {
    resolver: Arc<dyn ClassResolver>,
}

impl TypeDeconstructor {
    /// Creates a deconstructor resolving classes through `resolver`.
    pub fn new(resolver: impl ClassResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl Deconstructor for TypeDeconstructor {
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        match &*r.borrow() {
            Node::Class(class) => {
                let mut kwargs = Attributes::new();
                kwargs.insert("name".to_string(), Object::from(class.name()));
                kwargs.insert("module".to_string(), Object::from(class.module()));
                Ok(Parts::kwargs(kwargs))
            }
            _ => Err(binding.mismatch(obj)),
        }
    }

    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object> {
        if !args.is_empty() {
            return Err(binding.bad_arguments("class values take no positional arguments"));
        }
        Ok(Object::class(Class::new("")))
    }

    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        let r = obj.as_ref_obj().ok_or_else(|| binding.mismatch(obj))?;
        let mut node = r.borrow_mut();
        let Node::Class(class) = &mut *node else {
            return Err(binding.mismatch(obj));
        };
        let Object::Str(text) = value else {
            return Err(binding.unsupported_attribute(key));
        };
        *class = match key.as_key() {
            Some("name") => Class::in_module(class.module(), text),
            Some("module") => Class::in_module(text, class.name()),
            _ => return Err(binding.unsupported_attribute(key)),
        };
        Ok(())
    }

    fn construct(&self, binding: &TypeBinding, args: Vec<Object>, kwargs: Attributes) -> Result<Object> {
        let obj = self.make_shell(binding, args)?;
        for (key, value) in kwargs {
            self.setattr(binding, &obj, &PathKey::Key(key), value)?;
        }
        let class = match obj.as_ref_obj().map(|r| r.borrow().clone()) {
            Some(Node::Class(class)) => class,
            _ => return Err(binding.mismatch(&obj)),
        };
        match self.resolver.resolve(class.module(), class.name()) {
            Some(resolved) => Ok(Object::class(resolved)),
            None => Err(PreserializeError::UnknownClass {
                module: class.module().to_string(),
                name: class.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(ty: RuntimeType, deconstructor: impl Deconstructor + 'static) -> TypeBinding {
        let name = ty.default_tag();
        TypeBinding::new(ty, name, None, FxHashSet::default(), Arc::new(deconstructor))
    }

    #[test]
    fn test_instance_ignores_fields() {
        let mut ignore = FxHashSet::default();
        ignore.insert("cache".to_string());
        let binding = TypeBinding::new(
            RuntimeType::Class(Class::new("Parrot")),
            "parrot".to_string(),
            None,
            ignore,
            Arc::new(InstanceDeconstructor),
        );
        let parrot = Object::instance(
            Class::new("Parrot"),
            [
                ("is_dead".to_string(), Object::Bool(true)),
                ("cache".to_string(), Object::Int(7)),
            ],
        );

        let parts = binding.deconstruct(&parrot).unwrap();
        let kwargs = parts.kwargs.unwrap();
        assert_eq!(kwargs.len(), 1);
        assert!(kwargs.contains_key("is_dead"));
        assert!(parts.args.is_none());
    }

    #[test]
    fn test_instance_two_phase() {
        let binding = bind(RuntimeType::Class(Class::new("Egg")), InstanceDeconstructor);
        let shell = binding.construct(vec![], Attributes::new()).unwrap();
        assert_eq!(shell.runtime_type(), RuntimeType::Class(Class::new("Egg")));
        assert!(shell.attr("from_parrot").is_none());

        binding.setattr(&shell, &PathKey::from("from_parrot"), Object::Int(1)).unwrap();
        assert_eq!(shell.attr("from_parrot"), Some(Object::Int(1)));

        assert!(binding.construct(vec![Object::Int(1)], Attributes::new()).is_err());
        assert!(binding.setattr(&shell, &PathKey::Index(0), Object::Null).is_err());
    }

    #[test]
    fn test_iterable_repacks() {
        let binding = bind(RuntimeType::Tuple, IterableDeconstructor);
        let tuple = Object::tuple([Object::Int(1), Object::from("two")]);

        let parts = binding.deconstruct(&tuple).unwrap();
        let args = parts.args.unwrap();
        assert_eq!(args.len(), 2);

        let rebuilt = binding.construct(args, Attributes::new()).unwrap();
        assert_eq!(rebuilt, tuple);
        assert_eq!(rebuilt.runtime_type(), RuntimeType::Tuple);

        binding.setattr(&rebuilt, &PathKey::Index(1), Object::Null).unwrap();
        assert_eq!(rebuilt.item(1), Some(Object::Null));
        assert!(binding.setattr(&rebuilt, &PathKey::Index(5), Object::Null).is_err());
    }

    #[test]
    fn test_dict_identifier_keys_use_kwargs() {
        let binding = bind(RuntimeType::Dict, DictDeconstructor);
        let dict = Object::dict([(DictKey::from("brian"), Object::from("naughty boy"))]);

        let parts = binding.deconstruct(&dict).unwrap();
        assert!(parts.args.is_none());
        assert_eq!(parts.kwargs.unwrap().get("brian"), Some(&Object::from("naughty boy")));
    }

    #[test]
    fn test_dict_mixed_keys_use_pairs() {
        let binding = bind(RuntimeType::Dict, DictDeconstructor);
        let dict = Object::dict([
            (DictKey::from("brian"), Object::from("naughty boy")),
            (DictKey::from(3), Object::from("Antioch")),
        ]);

        let parts = binding.deconstruct(&dict).unwrap();
        assert!(parts.kwargs.is_none());
        let args = parts.args.unwrap();
        assert_eq!(args[1], Object::list([Object::Int(3), Object::from("Antioch")]));

        let rebuilt = binding.construct(args, Attributes::new()).unwrap();
        assert_eq!(rebuilt, dict);
    }

    #[test]
    fn test_dict_relink_pair_value() {
        let binding = bind(RuntimeType::Dict, DictDeconstructor);
        let dict = binding
            .construct(
                vec![Object::list([Object::Int(3), Object::Null])],
                Attributes::new(),
            )
            .unwrap();

        binding
            .relink_arg(&dict, &[PathKey::Index(0), PathKey::Index(1)], &dict)
            .unwrap();

        match &*dict.as_ref_obj().unwrap().borrow() {
            Node::Dict(map) => assert!(map[&DictKey::Int(3)].ptr_eq(&dict)),
            _ => panic!("expected dict"),
        }
    }

    #[test]
    fn test_dict_setattr_keys() {
        let binding = bind(RuntimeType::Dict, DictDeconstructor);
        let dict = Object::dict([]);

        binding.setattr(&dict, &PathKey::Index(3), Object::from("Antioch")).unwrap();
        binding.setattr(&dict, &PathKey::from("brian"), Object::from("naughty boy")).unwrap();
        assert_eq!(
            dict,
            Object::dict([
                (DictKey::from(3), Object::from("Antioch")),
                (DictKey::from("brian"), Object::from("naughty boy")),
            ])
        );

        assert!(matches!(
            binding.setattr(&dict, &PathKey::Index(usize::MAX), Object::Null),
            Err(PreserializeError::UnsupportedAttribute { .. })
        ));
    }

    #[test]
    fn test_dict_rejects_bad_pairs() {
        let binding = bind(RuntimeType::Dict, DictDeconstructor);
        assert!(binding.construct(vec![Object::Int(1)], Attributes::new()).is_err());
        let float_key = Object::list([Object::Float(1.5), Object::Null]);
        assert!(matches!(
            binding.construct(vec![float_key], Attributes::new()),
            Err(PreserializeError::UnhashableKey { .. })
        ));
    }

    #[test]
    fn test_type_deconstructor() {
        let parrot = Class::in_module("zoo", "Parrot");
        let binding = bind(
            RuntimeType::Type,
            TypeDeconstructor::new(ClassTable::new().with(parrot.clone())),
        );

        let parts = binding.deconstruct(&Object::class(parrot.clone())).unwrap();
        let kwargs = parts.kwargs.unwrap();
        assert_eq!(kwargs.get("name"), Some(&Object::from("Parrot")));
        assert_eq!(kwargs.get("module"), Some(&Object::from("zoo")));

        let rebuilt = binding.construct(vec![], kwargs).unwrap();
        assert_eq!(rebuilt, Object::class(parrot));

        let mut unknown = Attributes::new();
        unknown.insert("name".to_string(), Object::from("Shrubbery"));
        unknown.insert("module".to_string(), Object::from("ni"));
        assert!(matches!(
            binding.construct(vec![], unknown),
            Err(PreserializeError::UnknownClass { .. })
        ));
    }
}
