//! The universal *Store isolation* invariant from spec.md §8: disjoint
//! logical requests sharing one [`RequestStore`] handle never observe each
//! other's writes, whether accessed sequentially or from separate threads.

use std::thread;

use hogtrace::request_store::{RequestId, RequestStore};
use hogtrace::value::Value;
use pretty_assertions::assert_eq;

#[test]
fn two_requests_sharing_a_store_handle_never_see_each_others_writes() {
    let store = RequestStore::new();
    let a = RequestId::new(100);
    let b = RequestId::new(200);

    let writer_a = {
        let store = store.clone();
        thread::spawn(move || {
            for i in 0..500 {
                store.set(a, "count", Value::Int(i));
            }
        })
    };
    let writer_b = {
        let store = store.clone();
        thread::spawn(move || {
            for i in 0..500 {
                store.set(b, "count", Value::Int(-i));
            }
        })
    };
    writer_a.join().unwrap();
    writer_b.join().unwrap();

    // Whatever each thread's last write was, it must be a value only that
    // thread ever wrote: non-negative for A, non-positive for B. A torn or
    // cross-request write would show up as the wrong sign.
    let Some(Value::Int(a_count)) = store.get(a, "count") else {
        panic!("expected request A to have a count");
    };
    let Some(Value::Int(b_count)) = store.get(b, "count") else {
        panic!("expected request B to have a count");
    };
    assert!(a_count >= 0, "request A observed request B's write: {a_count}");
    assert!(b_count <= 0, "request B observed request A's write: {b_count}");
}

#[test]
fn clearing_one_request_leaves_another_untouched() {
    let store = RequestStore::new();
    let keep = RequestId::new(1);
    store.set(keep, "persisted", Value::Int(1));

    store.clear(RequestId::new(2));

    assert_eq!(store.get(keep, "persisted"), Some(Value::Int(1)));
}

#[test]
fn a_scope_only_clears_its_own_request_on_drop() {
    let store = RequestStore::new();
    let keep = RequestId::new(1);
    store.set(keep, "persisted", Value::Int(1));
    {
        let scope = store.scope(RequestId::new(2));
        scope.set("temp", Value::Int(9));
        assert_eq!(scope.get("temp"), Some(Value::Int(9)));
    }
    assert_eq!(store.get(keep, "persisted"), Some(Value::Int(1)));
    assert_eq!(store.get(RequestId::new(2), "temp"), None);
}

#[test]
fn reentering_the_same_request_id_after_with_request_starts_empty() {
    let store = RequestStore::new();
    let id = RequestId::new(42);
    store.with_request(id, |s| {
        s.set(id, "x", Value::Int(1));
        assert_eq!(s.get(id, "x"), Some(Value::Int(1)));
    });
    store.with_request(id, |s| {
        assert_eq!(s.get(id, "x"), None, "a fresh scope over the same id must not see the prior scope's data");
    });
}
