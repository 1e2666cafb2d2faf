use std::sync::Arc;

use serde::Serialize;
use test_log::test;

use crate::error::Error;
use crate::mem::{generate_with_state, get_with_state, NamespaceCache};
use crate::tests::{Counter, Key};

#[derive(Debug, Clone, Copy, Serialize)]
struct Params {
    width: f64,
    height: f64,
}

#[test]
fn generates_once_and_caches_values() {
    let mut cache = NamespaceCache::new();
    let mut runs = 0;

    let p = Params {
        width: 2.,
        height: 3.5,
    };
    let v1 = cache
        .generate::<_, _, Error>("rect", p, |p| {
            runs += 1;
            Ok(p.width * p.height)
        })
        .unwrap();
    let v2 = cache
        .generate::<_, f64, Error>("rect", p, |_| {
            runs += 1;
            Ok(0.)
        })
        .unwrap();

    assert_eq!(*v1, 7.);
    assert!(Arc::ptr_eq(&v1, &v2));
    assert_eq!(runs, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn keys_are_compared_by_content() {
    let mut cache = NamespaceCache::new();
    let a = cache
        .generate::<_, _, Error>("rect", (1.5f64, "a".to_string()), |_| Ok(1u32))
        .unwrap();
    let b = cache
        .generate::<_, _, Error>("rect", (1.5f64, "a".to_string()), |_| Ok(2u32))
        .unwrap();
    let c = cache
        .generate::<_, _, Error>("rect", (1.5f64, "b".to_string()), |_| Ok(3u32))
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*c, 3);
    assert_eq!(cache.len(), 2);
}

#[test]
fn namespaces_are_independent() {
    let mut cache = NamespaceCache::new();
    let a = cache
        .generate::<_, _, Error>("first", 1u64, |_| Ok(10u64))
        .unwrap();
    let b = cache
        .generate::<_, _, Error>("second", 1u64, |_| Ok(20u64))
        .unwrap();
    assert_eq!(*a, 10);
    assert_eq!(*b, 20);
    assert!(cache.contains("first", &1u64).unwrap());
    assert!(!cache.contains("third", &1u64).unwrap());
}

#[test]
fn failed_generation_is_not_cached() {
    let mut cache = NamespaceCache::new();
    assert!(cache.get(Key(5)).is_err());
    assert!(!cache.contains("tests.key", &Key(5)).unwrap());
    assert!(cache.is_empty());

    assert_eq!(*cache.get(Key(6)).unwrap(), 6);
    assert_eq!(cache.len(), 1);
}

#[test]
fn mismatched_types_are_reported() {
    let mut cache = NamespaceCache::new();
    cache
        .generate::<_, _, Error>("value", 1u64, |_| Ok(1u64))
        .unwrap();
    let err = cache
        .generate::<_, String, Error>("value", 1u64, |_| Ok(String::new()))
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));
}

#[test]
fn clear_discards_all_values() {
    let mut cache = NamespaceCache::new();
    let first = cache.get(Key(1)).unwrap();
    cache.get(Key(2)).unwrap();
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());

    let second = cache.get(Key(1)).unwrap();
    assert_eq!(first, second);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn generators_can_request_nested_values() {
    let mut state = Counter::default();

    let outer = generate_with_state::<_, _, _, anyhow::Error>(
        &mut state,
        "outer",
        3u64,
        |key, state| {
            let a = get_with_state(state, Key(*key))?;
            let b = get_with_state(state, Key(*key))?;
            Ok(*a + *b)
        },
    )
    .unwrap();

    assert_eq!(*outer, 6);
    assert_eq!(state.runs.get(), 1);
    assert_eq!(state.cache.len(), 2);
}

#[test]
fn nested_failures_propagate() {
    let mut state = Counter::default();
    let result = generate_with_state::<_, _, u64, anyhow::Error>(
        &mut state,
        "outer",
        5u64,
        |key, state| Ok(*get_with_state(state, Key(*key))?),
    );
    assert!(result.is_err());
    assert!(state.cache.is_empty());
}

#[test]
#[should_panic]
fn panics_on_invalid_namespace() {
    let _ = crate::Namespace::new("not a namespace");
}
