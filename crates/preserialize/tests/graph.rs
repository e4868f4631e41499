//! Shared references, cycles, versions, adapters and reference schemes.

use preserialize::model::format_path;
use preserialize::{
    Class, ClassTable, DictKey, DoubleQuoteEncoder, InstanceDeconstructor, JsonPreserializer, JsonReference,
    KeyEncoder, Limits, Node, Object, PathKey, PreserializeError, Preserializer, ReferenceScheme, Result,
    RuntimeType, TypeDeconstructor, TypeOptions, TypeRow, Version, WeakRefDeconstructor, json_types,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn set_field(obj: &Object, name: &str, value: Object) {
    if let Node::Instance(inst) = &mut *obj.as_ref_obj().unwrap().borrow_mut() {
        inst.fields.insert(name.to_string(), value);
    }
}

fn with_instances(classes: &[&str]) -> JsonPreserializer {
    let mut p = JsonPreserializer::json().unwrap();
    for name in classes {
        p.register(TypeRow::with(Class::new(*name), InstanceDeconstructor)).unwrap();
    }
    p
}

// ===== SHARING AND CYCLES =====

#[test]
fn test_fan_in_shares_one_substructure() {
    let p = with_instances(&[]);
    let shared = Object::list([Object::Int(1), Object::Int(2)]);
    let obj = Object::list([shared.clone(), shared.clone(), Object::list([shared])]);

    let data = p.preserialize(&obj).unwrap();
    assert_eq!(data, json!([[1, 2], {"$ref": "#/0"}, [{"$ref": "#/0"}]]));

    let decoded = p.depreserialize(&data).unwrap();
    let first = decoded.item(0).unwrap();
    assert!(first.ptr_eq(&decoded.item(1).unwrap()));
    assert!(first.ptr_eq(&decoded.item(2).unwrap().item(0).unwrap()));
    assert_eq!(decoded, obj);
}

#[test]
fn test_equal_but_distinct_objects_are_not_linked() {
    let p = with_instances(&[]);
    let obj = Object::list([Object::list([Object::Int(1)]), Object::list([Object::Int(1)])]);
    assert_eq!(p.preserialize(&obj).unwrap(), json!([[1], [1]]));
}

#[test]
fn test_parrot_egg_cycle() {
    let p = with_instances(&["Parrot", "Egg"]);
    let parrot = Object::instance(Class::new("Parrot"), [("is_dead".to_string(), Object::Bool(true))]);
    let egg = Object::instance(Class::new("Egg"), [("from_parrot".to_string(), parrot.clone())]);
    set_field(&parrot, "from_egg", egg);

    let data = p.preserialize(&parrot).unwrap();
    assert_eq!(
        data,
        json!({
            "$type": "parrot",
            "is_dead": true,
            "from_egg": {"$type": "egg", "from_parrot": {"$ref": "#"}}
        })
    );

    let decoded = p.depreserialize(&data).unwrap();
    assert_eq!(decoded, parrot);
    let back = decoded.attr("from_egg").unwrap().attr("from_parrot").unwrap();
    assert!(back.ptr_eq(&decoded));
}

#[test]
fn test_self_referencing_list() {
    let p = with_instances(&[]);
    let obj = Object::list([Object::Int(1)]);
    if let Node::List(items) = &mut *obj.as_ref_obj().unwrap().borrow_mut() {
        items.push(obj.clone());
    }

    let data = p.preserialize(&obj).unwrap();
    assert_eq!(data, json!([1, {"$ref": "#"}]));

    let decoded = p.depreserialize(&data).unwrap();
    assert!(decoded.item(1).unwrap().ptr_eq(&decoded));
}

#[test]
fn test_self_referencing_mixed_key_dict() {
    let p = with_instances(&[]);
    let obj = Object::dict([(DictKey::from(3), Object::Null)]);
    if let Node::Dict(map) = &mut *obj.as_ref_obj().unwrap().borrow_mut() {
        map.insert(DictKey::from("brian"), obj.clone());
    }

    let data = p.preserialize(&obj).unwrap();
    assert_eq!(
        data,
        json!({"$type": "dict", "": [[3, null], ["brian", {"$ref": "#"}]]})
    );

    let decoded = p.depreserialize(&data).unwrap();
    match &*decoded.as_ref_obj().unwrap().borrow() {
        Node::Dict(map) => {
            assert_eq!(map[&DictKey::Int(3)], Object::Null);
            assert!(map[&DictKey::from("brian")].ptr_eq(&decoded));
        }
        _ => panic!("expected dict"),
    }
}

#[test]
fn test_reference_into_tuple_arguments() {
    let p = with_instances(&["Knight"]);
    let knight = Object::instance(Class::new("Knight"), []);
    let tuple = Object::tuple([Object::from("ni"), knight.clone()]);
    set_field(&knight, "quest", tuple.clone());

    let data = p.preserialize(&tuple).unwrap();
    assert_eq!(
        data,
        json!({"$type": "tuple", "": ["ni", {"$type": "knight", "quest": {"$ref": "#"}}]})
    );

    let decoded = p.depreserialize(&data).unwrap();
    let decoded_knight = decoded.item(1).unwrap();
    assert!(decoded_knight.attr("quest").unwrap().ptr_eq(&decoded));
}

// ===== REGISTRATION AND VERSIONS =====

#[test]
fn test_versioned_decode_and_reencode() {
    let mut p = with_instances(&[]);
    let parrot = Class::new("Parrot");
    p.register(TypeRow::with_options(parrot.clone(), InstanceDeconstructor, TypeOptions::new().version(1)))
        .unwrap();
    p.register(TypeRow::with_options(parrot.clone(), InstanceDeconstructor, TypeOptions::new().version(2)))
        .unwrap();

    let old = json!({"$type": "parrot", "$version": 1, "is_dead": true});
    let decoded = p.depreserialize(&old).unwrap();
    assert_eq!(decoded.runtime_type(), RuntimeType::Class(parrot));
    assert_eq!(decoded.attr("is_dead"), Some(Object::Bool(true)));

    let data = p.preserialize(&decoded).unwrap();
    assert_eq!(data, json!({"$type": "parrot", "$version": 2, "is_dead": true}));
    assert_eq!(p.registry().binding_for_tag("parrot", Some(&Version::from(2))).unwrap().name(), "parrot");
}

#[test]
fn test_invalid_type_name_at_registration() {
    let result = Preserializer::builder(JsonReference)
        .register(TypeRow::with_options(
            Class::new("Parrot"),
            InstanceDeconstructor,
            TypeOptions::new().name("norwegian-blue"),
        ))
        .build();
    assert!(matches!(result, Err(PreserializeError::InvalidTypeName { name }) if name == "norwegian-blue"));
}

#[test]
fn test_custom_name_and_ignore() {
    let mut p = with_instances(&[]);
    p.register(TypeRow::with_options(
        Class::in_module("zoo", "Parrot"),
        InstanceDeconstructor,
        TypeOptions::new().name("zoo.parrot").ignore(["cache"]),
    ))
    .unwrap();

    let parrot = Object::instance(
        Class::in_module("zoo", "Parrot"),
        [
            ("is_dead".to_string(), Object::Bool(true)),
            ("cache".to_string(), Object::Int(99)),
        ],
    );
    assert_eq!(
        p.preserialize(&parrot).unwrap(),
        json!({"$type": "zoo.parrot", "is_dead": true})
    );
}

// ===== KEYS =====

#[test]
fn test_composed_key_encoder() {
    let p = Preserializer::builder(JsonReference)
        .types(json_types())
        .register(TypeRow::with(Class::new("Knight"), InstanceDeconstructor))
        .key_encoder(DoubleQuoteEncoder)
        .build()
        .unwrap();

    let knight = Object::instance(Class::new("Knight"), [("ni".to_string(), Object::Bool(true))]);
    let data = p.preserialize(&knight).unwrap();
    assert_eq!(data, json!({"$type": "knight", "\"ni\"": true}));
    assert_eq!(p.depreserialize(&data).unwrap(), knight);
}

#[derive(Debug)]
struct TypeKeyEncoder;

impl KeyEncoder for TypeKeyEncoder {
    fn encode(&self, _key: &str) -> Result<String> {
        Ok("$type".to_string())
    }

    fn decode(&self, key: &str) -> Result<String> {
        Ok(key.to_string())
    }
}

#[test]
fn test_reserved_key_collision() {
    let p = Preserializer::builder(JsonReference)
        .register(TypeRow::with(Class::new("Knight"), InstanceDeconstructor))
        .key_encoder(TypeKeyEncoder)
        .build()
        .unwrap();
    let knight = Object::instance(Class::new("Knight"), [("ni".to_string(), Object::Bool(true))]);
    assert!(matches!(
        p.preserialize(&knight),
        Err(PreserializeError::ReservedKeyCollision { key }) if key == "$type"
    ));
}

// ===== ADAPTERS =====

#[test]
fn test_weak_back_reference() {
    let mut p = with_instances(&["Tree", "Leaf"]);
    p.register(TypeRow::with(RuntimeType::WeakRef, WeakRefDeconstructor)).unwrap();

    let tree = Object::instance(Class::new("Tree"), []);
    let leaf = Object::instance(
        Class::new("Leaf"),
        [("parent".to_string(), Object::weak(tree.as_ref_obj().unwrap(), None))],
    );
    set_field(&tree, "child", leaf);

    let data = p.preserialize(&tree).unwrap();
    assert_eq!(
        data,
        json!({
            "$type": "tree",
            "child": {"$type": "leaf", "parent": {"$type": "weakref", "object": {"$ref": "#"}}}
        })
    );

    let decoded = p.depreserialize(&data).unwrap();
    let weak = decoded.attr("child").unwrap().attr("parent").unwrap();
    match &*weak.as_ref_obj().unwrap().borrow() {
        Node::Weak(w) => assert!(w.target.upgrade().unwrap().ptr_eq(decoded.as_ref_obj().unwrap())),
        _ => panic!("expected weak reference"),
    }
}

#[test]
fn test_class_values() {
    let parrot = Class::in_module("zoo", "Parrot");
    let mut p = with_instances(&[]);
    p.register(TypeRow::with(
        RuntimeType::Type,
        TypeDeconstructor::new(ClassTable::new().with(parrot.clone())),
    ))
    .unwrap();

    let data = p.preserialize(&Object::class(parrot.clone())).unwrap();
    assert_eq!(data, json!({"$type": "type", "name": "Parrot", "module": "zoo"}));
    assert_eq!(p.depreserialize(&data).unwrap(), Object::class(parrot));

    let unknown = json!({"$type": "type", "name": "Shrubbery", "module": "ni"});
    assert!(matches!(
        p.depreserialize(&unknown),
        Err(PreserializeError::UnknownClass { .. })
    ));
}

// ===== REFERENCE SCHEMES =====

/// Labels every destination with a sequential anchor.
#[derive(Debug)]
struct AnchorReference;

impl ReferenceScheme for AnchorReference {
    fn key(&self) -> &str {
        "&ref"
    }

    fn is_ref(&self, value: &Value) -> bool {
        value.get("&ref").is_some()
    }

    fn make_ref(&self, path: &[PathKey]) -> Value {
        json!({"&ref": format_path(path)})
    }

    fn ref_path(&self, marker: &Value) -> Result<Vec<PathKey>> {
        match marker.get("&ref") {
            Some(Value::String(path)) => Ok(path.split('/').skip(1).map(PathKey::from_segment).collect()),
            _ => Err(PreserializeError::UnsupportedReference {
                reference: marker.to_string(),
            }),
        }
    }

    fn labels_destinations(&self) -> bool {
        true
    }

    fn label_destination(&self, index: usize, value: Value) -> Value {
        json!({"&ref": index, "&": value})
    }

    fn unlabel_destination<'v>(&self, value: &'v mut Value) -> &'v mut Value {
        if value.get("&").is_some() { &mut value["&"] } else { value }
    }
}

#[test]
fn test_destination_labels() {
    let p = Preserializer::builder(AnchorReference)
        .types(json_types())
        .register(TypeRow::with(Class::new("Knight"), InstanceDeconstructor))
        .build()
        .unwrap();
    assert_eq!(p.type_key(), "&type");

    let shrub = Object::list([Object::Int(1)]);
    let knight = Object::instance(Class::new("Knight"), [("shrub".to_string(), shrub.clone())]);
    let obj = Object::list([knight.clone(), knight, shrub]);

    assert_eq!(
        p.preserialize(&obj).unwrap(),
        json!([
            {"&ref": 0, "&": {"&type": "knight", "shrub": {"&ref": 1, "&": [1]}}},
            {"&ref": "/0"},
            {"&ref": "/0/shrub"}
        ])
    );
}

#[test]
fn test_address_scheme_does_not_label() {
    let p = with_instances(&[]);
    let shared = Object::list([]);
    let obj = Object::list([shared.clone(), shared]);
    assert_eq!(p.preserialize(&obj).unwrap(), json!([[], {"$ref": "#/0"}]));
}

// ===== LIMITS =====

#[test]
fn test_deep_nesting_is_stack_safe() {
    const DEPTH: usize = 100_000;
    let p = with_instances(&[]);

    let mut obj = Object::list([Object::Int(0)]);
    for _ in 0..DEPTH {
        obj = Object::list([obj]);
    }

    let data = p.preserialize(&obj).unwrap();
    let decoded = p.depreserialize(&data).unwrap();

    let mut depth = 0;
    let mut cur = decoded.clone();
    while let Some(next) = cur.item(0) {
        depth += 1;
        cur = next;
    }
    assert_eq!(cur, Object::Int(0));
    assert_eq!(depth, DEPTH + 1);

    drop(cur);
    drop(decoded);
    drop(obj);
    // serde_json drops values recursively.
    std::mem::forget(data);
}

#[test]
fn test_deep_decode_error_returns_error() {
    const DEPTH: usize = 100_000;
    let p = with_instances(&[]);

    let mut deep = json!([0]);
    for _ in 0..DEPTH {
        deep = Value::Array(vec![deep]);
    }
    let data = Value::Array(vec![deep, json!({"$ref": "#/9"})]);

    assert!(matches!(
        p.depreserialize(&data),
        Err(PreserializeError::DanglingReference { path }) if path == "/9"
    ));
    std::mem::forget(data);
}

#[test]
fn test_deep_encode_error_returns_error() {
    const DEPTH: usize = 100_000;
    let p = with_instances(&[]);

    let mut deep = Object::list([Object::Int(0)]);
    for _ in 0..DEPTH {
        deep = Object::list([deep]);
    }
    let obj = Object::list([deep, Object::Float(f64::NAN)]);

    assert!(matches!(
        p.preserialize(&obj),
        Err(PreserializeError::NonFiniteFloat { .. })
    ));
}

#[test]
fn test_limits() {
    let p = Preserializer::builder(JsonReference)
        .types(json_types())
        .limits(Limits::new().max_depth(3))
        .build()
        .unwrap();

    let shallow = Object::list([Object::list([Object::Int(1)])]);
    assert!(p.preserialize(&shallow).is_ok());

    let deep = json!([[[[[1]]]]]);
    assert!(matches!(
        p.depreserialize(&deep),
        Err(PreserializeError::LimitExceeded { limit: "depth", max: 3 })
    ));

    let p = Preserializer::builder(JsonReference)
        .types(json_types())
        .limits(Limits::new().max_nodes(4))
        .build()
        .unwrap();
    let wide = Object::list((0..10).map(Object::Int));
    let err = p.preserialize(&wide).unwrap_err();
    assert_eq!(err.code(), "P006");
}

// ===== ROUND TRIPS =====

#[derive(Debug, Clone)]
enum Tree {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Tree>),
    Tuple(Vec<Tree>),
    Dict(Vec<(DictKey, Tree)>),
}

impl Tree {
    fn to_object(&self) -> Object {
        match self {
            Tree::Null => Object::Null,
            Tree::Bool(b) => Object::Bool(*b),
            Tree::Int(i) => Object::Int(*i),
            Tree::Float(f) => Object::Float(*f),
            Tree::Str(s) => Object::from(s.as_str()),
            Tree::List(items) => Object::list(items.iter().map(Tree::to_object)),
            Tree::Tuple(items) => Object::tuple(items.iter().map(Tree::to_object)),
            Tree::Dict(entries) => Object::dict(entries.iter().map(|(k, v)| (k.clone(), v.to_object()))),
        }
    }
}

fn dict_key() -> impl Strategy<Value = DictKey> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,6}".prop_map(DictKey::Str),
        any::<i64>().prop_map(DictKey::Int),
    ]
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        Just(Tree::Null),
        any::<bool>().prop_map(Tree::Bool),
        any::<i64>().prop_map(Tree::Int),
        (-1e9f64..1e9).prop_map(Tree::Float),
        "[a-zA-Z $]{0,8}".prop_map(Tree::Str),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::List),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::Tuple),
            prop::collection::vec((dict_key(), inner), 0..4).prop_map(Tree::Dict),
        ]
    })
}

proptest! {
    #[test]
    fn prop_acyclic_round_trip(tree in tree()) {
        let p = JsonPreserializer::json().unwrap();
        let obj = tree.to_object();
        let data = p.preserialize(&obj).unwrap();
        let decoded = p.depreserialize(&data).unwrap();
        prop_assert_eq!(decoded, obj);
    }
}
