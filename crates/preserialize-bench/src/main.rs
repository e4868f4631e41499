//! Benchmark for pre-serialization of a large, shared and cyclic graph.
//!
//! Builds a synthetic atlas: countries, states whose capital refers back to
//! one of their cities, and cities that all share their state and country.
//! A long linked chain is appended to exercise deep nesting.
//!
//! Usage: `bench-graph [cities] [chain-depth]`. Set `RUST_LOG=preserialize=debug`
//! to see per-pass summaries.

use std::time::Instant;

use preserialize::{Class, InstanceDeconstructor, JsonPreserializer, Node, Object, TypeOptions, TypeRow};
use tracing_subscriber::EnvFilter;

const COUNTRIES: usize = 20;
const STATES_PER_COUNTRY: usize = 10;

fn class(name: &str) -> Class {
    Class::in_module("atlas", name)
}

fn instance(name: &str, fields: Vec<(&str, Object)>) -> Object {
    Object::instance(
        class(name),
        fields.into_iter().map(|(key, value)| (key.to_string(), value)),
    )
}

fn set_field(obj: &Object, name: &str, value: Object) {
    if let Some(r) = obj.as_ref_obj() {
        if let Node::Instance(inst) = &mut *r.borrow_mut() {
            inst.fields.insert(name.to_string(), value);
        }
    }
}

fn build_atlas(city_count: usize, chain_depth: usize) -> Object {
    let countries: Vec<Object> = (0..COUNTRIES)
        .map(|i| instance("Country", vec![("code", Object::from(format!("C{:02}", i)))]))
        .collect();

    let states: Vec<Object> = (0..COUNTRIES * STATES_PER_COUNTRY)
        .map(|i| {
            instance(
                "State",
                vec![
                    ("name", Object::from(format!("State {}", i))),
                    ("country", countries[i / STATES_PER_COUNTRY].clone()),
                    ("capital", Object::Null),
                ],
            )
        })
        .collect();

    let cities: Vec<Object> = (0..city_count)
        .map(|i| {
            let state = &states[i % states.len()];
            let city = instance(
                "City",
                vec![
                    ("name", Object::from(format!("City {}", i))),
                    ("population", Object::Int((i as i64 * 7919) % 1_000_000)),
                    ("location", Object::tuple([Object::Float(i as f64 * 0.01), Object::Float(-(i as f64) * 0.02)])),
                    ("state", state.clone()),
                ],
            );
            if i < states.len() {
                set_field(state, "capital", city.clone());
            }
            city
        })
        .collect();

    let mut chain = Object::Null;
    for i in 0..chain_depth {
        chain = instance("Link", vec![("index", Object::Int(i as i64)), ("next", chain)]);
    }

    Object::list([Object::list(countries), Object::list(cities), chain])
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let city_count: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let chain_depth: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);

    let mut preserializer = JsonPreserializer::json().expect("Failed to build preserializer");
    preserializer
        .register(TypeRow::with_options(
            class("City"),
            InstanceDeconstructor,
            TypeOptions::new().name("atlas.city").version(2),
        ))
        .expect("Failed to register City");
    for name in ["Country", "State", "Link"] {
        preserializer
            .register(TypeRow::with_options(
                class(name),
                InstanceDeconstructor,
                TypeOptions::new().name(format!("atlas.{}", name.to_lowercase())),
            ))
            .expect("Failed to register type");
    }

    let build_start = Instant::now();
    let atlas = build_atlas(city_count, chain_depth);
    println!(
        "Built {} cities, {} states, {} countries, chain depth {} in {:?}",
        city_count,
        COUNTRIES * STATES_PER_COUNTRY,
        COUNTRIES,
        chain_depth,
        build_start.elapsed()
    );

    // Benchmark pre-serialization
    let encode_start = Instant::now();
    let data = preserializer.preserialize(&atlas).expect("Failed to preserialize");
    let encode_time = encode_start.elapsed();
    println!("\nPreserialize: {:?}", encode_time);

    let text = serde_json::to_string(&data).expect("Failed to write JSON");
    println!("  JSON size: {} bytes", text.len());
    println!(
        "  Throughput: {:.2} MB/s",
        (text.len() as f64 / 1_000_000.0) / encode_time.as_secs_f64()
    );

    // Benchmark de-pre-serialization
    let decode_start = Instant::now();
    let decoded = preserializer.depreserialize(&data).expect("Failed to depreserialize");
    let decode_time = decode_start.elapsed();
    println!("\nDepreserialize: {:?}", decode_time);
    println!(
        "  Throughput: {:.2} MB/s",
        (text.len() as f64 / 1_000_000.0) / decode_time.as_secs_f64()
    );

    // Shared states must come back shared
    let cities = decoded.item(1).expect("missing cities");
    if let (Some(first), Some(again)) = (cities.item(0), cities.item(COUNTRIES * STATES_PER_COUNTRY)) {
        assert!(
            first.attr("state").zip(again.attr("state")).is_some_and(|(a, b)| a.ptr_eq(&b)),
            "Shared state should decode to one object"
        );
    }

    // serde_json drops the deep wire tree recursively.
    std::mem::forget(data);
}
