//! Integration Tests for the Reactive Engine and Mutable Layer
//!
//! These tests verify that signals, reactions, batching, pairing and the
//! mutable object layer work together correctly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use weave_core::reactive::{MeasureOfChange, Reactive};
use weave_core::{
    apply_patch, deserialize, mutable_object, serialize, AutoFlush, MutableObject, Node, PatchOp,
    ReactiveConfig,
};

fn manual() -> Reactive {
    Reactive::with_config(ReactiveConfig::default().with_auto_flush(AutoFlush::Manual))
}

fn tracked(json: serde_json::Value) -> MutableObject {
    mutable_object(Node::from_json(json).unwrap(), true)
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// A reaction reading two signals written in one batch runs once and only
/// sees the final values.
#[test]
fn batch_is_glitch_free() {
    let rx = manual();
    let first = rx.create_signal(String::from("Ada"));
    let last = rx.create_signal(String::from("Lovelace"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (f, l, out) = (first.clone(), last.clone(), seen.clone());
    rx.create_reaction(move || {
        out.lock().unwrap().push(format!("{} {}", f.get(), l.get()));
    });

    rx.batch_reactions(|| {
        first.set(String::from("Grace"));
        last.set(String::from("Hopper"));
    });

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["Ada Lovelace".to_string(), "Grace Hopper".to_string()]
    );
}

/// Signal `a = 12`, reaction `r = a + 1`; setting 13 in a batch runs `r`
/// exactly once and it observes 13.
#[test]
fn batched_set_runs_reaction_once() {
    let rx = manual();
    let a = rx.create_signal_with(12, MeasureOfChange::Full);
    let runs = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(AtomicI32::new(0));

    let (a2, r, s) = (a.clone(), runs.clone(), seen.clone());
    rx.create_reaction(move || {
        s.store(a2.get(), Ordering::SeqCst);
        r.fetch_add(1, Ordering::SeqCst);
    });
    let a3 = a.clone();
    let plus_one = rx.create_derived(move || a3.get() + 1);

    rx.batch_reactions(|| a.set(13));

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 13);
    assert_eq!(plus_one.get(), 14);
}

/// A producer created after its consumer still runs first.
#[test]
fn producer_runs_before_consumer() {
    let rx = manual();
    let base = rx.create_signal(1);
    let derived_slot = rx.create_signal(10);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (b, d, out) = (base.clone(), derived_slot.clone(), seen.clone());
    rx.create_reaction(move || {
        out.lock().unwrap().push((b.get(), d.get()));
    });

    let (b2, d2) = (base.clone(), derived_slot.clone());
    rx.create_reaction(move || d2.set(b2.get() * 10));

    rx.batch_reactions(|| base.set(2));

    // The consumer never sees base=2 with a stale slot.
    assert_eq!(seen.lock().unwrap().last(), Some(&(2, 20)));
    assert!(!seen.lock().unwrap().contains(&(2, 10)));
}

/// A reaction that panics inside a batch does not stop the batch from
/// flushing, and the panic reaches the caller.
#[test]
fn panic_in_batch_still_flushes() {
    let rx = manual();
    let a = rx.create_signal(0);
    let seen = Arc::new(AtomicI32::new(0));
    let (a2, s) = (a.clone(), seen.clone());
    rx.create_reaction(move || s.store(a2.get(), Ordering::SeqCst));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        rx.batch_reactions(|| {
            a.set(7);
            panic!("boom");
        })
    }));

    assert!(result.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 7);
    assert!(rx.is_clean());
}

/// A panicking reaction mid-flush leaves the rest pending.
#[test]
fn panic_mid_flush_leaves_remainder_pending() {
    let rx = manual();
    let a = rx.create_signal(0);
    let later = Arc::new(AtomicI32::new(0));

    let a2 = a.clone();
    rx.create_reaction(move || {
        if a2.get() == 1 {
            panic!("first reaction failed");
        }
    });
    let (a3, l) = (a.clone(), later.clone());
    rx.create_reaction(move || l.store(a3.get(), Ordering::SeqCst));

    a.set(1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| rx.flush()));
    assert!(result.is_err());
    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert_eq!(rx.pending_count(), 1);

    rx.flush();
    assert_eq!(later.load(Ordering::SeqCst), 1);
}

#[test]
fn disable_defers_until_enable() {
    let rx = manual();
    let a = rx.create_signal(0);
    let runs = Arc::new(AtomicI32::new(0));
    let (a2, r) = (a.clone(), runs.clone());
    rx.create_reaction(move || {
        a2.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    rx.disable();
    assert!(rx.is_disabled());
    rx.batch_reactions(|| a.set(1));
    rx.batch_reactions(|| a.set(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    rx.enable();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Without a runtime and without a batch, writes wait for `flush`.
#[test]
fn manual_flush_without_runtime() {
    let rx = Reactive::new();
    let a = rx.create_signal(1);
    let seen = Arc::new(AtomicI32::new(0));
    let (a2, s) = (a.clone(), seen.clone());
    rx.create_reaction(move || s.store(a2.get(), Ordering::SeqCst));

    a.set(2);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    rx.flush();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn writes_outside_batch_flush_automatically() {
    let rx = Reactive::new();
    let a = rx.create_signal(0);
    let b = rx.create_signal(0);
    let runs = Arc::new(AtomicI32::new(0));
    let (a2, b2, r) = (a.clone(), b.clone(), runs.clone());
    rx.create_reaction(move || {
        a2.get();
        b2.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    a.set(1);
    b.set(2);
    tokio::task::yield_now().await;
    rx.to_be_clean().await;

    // Both writes land in the same deferred flush.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(rx.is_clean());
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// B owns `b1`; A is paired to B and reads `b1`. A batch on B re-runs A's
/// reaction once without A calling any setter.
#[test]
fn paired_reader_reruns_once() {
    let a = manual();
    let b = manual();
    a.enable_pairing(&b);

    let b1 = b.create_signal(1);
    let runs = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(AtomicI32::new(0));
    let (sig, r, s) = (b1.clone(), runs.clone(), seen.clone());
    a.create_reaction(move || {
        s.store(sig.get(), Ordering::SeqCst);
        r.fetch_add(1, Ordering::SeqCst);
    });

    b.batch_reactions(|| b1.set(4));

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
    assert!(a.is_clean());
}

/// Without pairing, reading another instance's signal is a snapshot.
#[test]
fn unpaired_read_is_a_snapshot() {
    let a = manual();
    let b = manual();

    let b1 = b.create_signal(1);
    let runs = Arc::new(AtomicI32::new(0));
    let (sig, r) = (b1.clone(), runs.clone());
    a.create_reaction(move || {
        sig.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    b.batch_reactions(|| b1.set(4));
    a.flush();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(b1.subscriber_count(), 0);
}

#[test]
fn pairing_cascades_transitively() {
    let a = manual();
    let b = manual();
    let c = manual();
    b.enable_pairing(&a);
    c.enable_pairing(&b);

    let source = a.create_signal(1);
    let middle = b.create_signal(0);
    let seen = Arc::new(AtomicI32::new(0));

    let (src, mid) = (source.clone(), middle.clone());
    b.create_reaction(move || mid.set(src.get() * 2));
    let (mid, s) = (middle.clone(), seen.clone());
    c.create_reaction(move || s.store(mid.get(), Ordering::SeqCst));
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    a.batch_reactions(|| source.set(5));
    assert_eq!(seen.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn to_be_clean_waits_for_paired_instances() {
    let a = manual();
    let b = manual();
    a.enable_pairing(&b);

    let b1 = b.create_signal(0);
    let seen = Arc::new(AtomicI32::new(0));
    let (sig, s) = (b1.clone(), seen.clone());
    a.create_reaction(move || s.store(sig.get(), Ordering::SeqCst));

    b1.set(3);
    a.to_be_clean().await;
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(b.is_clean());
}

/// A reader settling from its own side still sees the source's derived
/// signal updated together with its input.
#[tokio::test]
async fn paired_reader_is_glitch_free_under_to_be_clean() {
    let a = manual();
    let b = manual();
    a.enable_pairing(&b);

    let src = b.create_signal(1);
    let s = src.clone();
    let doubled = b.create_derived(move || s.get() * 2);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (s, d, l) = (src.clone(), doubled.clone(), log.clone());
    a.create_reaction(move || l.lock().unwrap().push((s.get(), d.get())));

    src.set(5);
    a.to_be_clean().await;
    assert_eq!(*log.lock().unwrap(), vec![(1, 2), (5, 10)]);
    assert!(b.is_clean());
}

/// On a multi-thread runtime writes wait for an explicit settle instead of
/// racing a worker, so one synchronous section is still one flush.
#[tokio::test(flavor = "multi_thread")]
async fn multi_thread_runtime_does_not_auto_flush() {
    let rx = Reactive::new();
    let x = rx.create_signal(0);
    let y = rx.create_signal(0);
    let runs = Arc::new(AtomicI32::new(0));
    let (x2, y2, r) = (x.clone(), y.clone(), runs.clone());
    rx.create_reaction(move || {
        x2.get();
        y2.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    x.set(1);
    std::thread::sleep(std::time::Duration::from_millis(50));
    y.set(1);
    assert_eq!(rx.pending_count(), 1);

    rx.to_be_clean().await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Mutable objects
// ---------------------------------------------------------------------------

#[test]
fn replace_patch_then_empty() {
    let m = tracked(json!({"a": 1, "b": 2}));
    m.set("a", 3);
    assert_eq!(
        serde_json::to_value(m.take_patch()).unwrap(),
        json!([{"op": "replace", "path": ["a"], "value": 3}])
    );
    assert!(m.take_patch().is_empty());
}

#[test]
fn unshift_patch_and_result() {
    let arr = tracked(json!([1, 2, 3]));
    arr.unshift([4, 5]);
    assert_eq!(
        arr.take_patch(),
        vec![
            PatchOp::add(vec!["0".into()], json!(4)),
            PatchOp::add(vec!["1".into()], json!(5)),
        ]
    );
    assert_eq!(arr.to_json(), json!([4, 5, 1, 2, 3]));
}

/// Replaying the drained patch over a copy of the old state reproduces the
/// new state.
#[test]
fn patch_replays_onto_previous_state() {
    let before = json!({
        "title": "groceries",
        "items": [{"name": "milk", "done": false}, {"name": "eggs", "done": false}],
        "meta": {"tags": ["home"]}
    });
    let m = tracked(before.clone());

    let items = m.get("items").unwrap().into_mutable().unwrap();
    let first = items.get(0).unwrap().into_mutable().unwrap();
    first.set("done", true);
    items.push(json!({"name": "bread", "done": false}));
    items.splice(1, 1, [json!({"name": "butter", "done": true})]);
    items.reverse();
    m.set("title", "weekend groceries");
    m.delete("meta");
    m.set("count", 3);

    let mut replayed = before;
    apply_patch(&mut replayed, &m.take_patch()).unwrap();
    assert_eq!(replayed, m.to_json());
}

#[test]
fn revision_increases_with_every_mutation() {
    let m = tracked(json!({"list": []}));
    let list = m.get("list").unwrap().into_mutable().unwrap();
    let mut last = m.revision().raw();
    for i in 0..10 {
        list.push(i);
        let now = m.revision().raw();
        assert!(now > last, "revision did not increase at step {i}");
        last = now;
    }
}

#[test]
fn freeze_reuses_untouched_subtrees() {
    let m = tracked(json!({"left": {"deep": {"x": 1}}, "right": {"y": [1, 2]}}));
    let first = m.freeze();
    let again = m.freeze();
    assert!(first.ptr_eq(&again));

    let right = m.get("right").unwrap().into_mutable().unwrap();
    right.set("y", json!([3]));
    let after = m.freeze();

    assert!(!first.ptr_eq(&after));
    assert!(first.get("left").unwrap().ptr_eq(after.get("left").unwrap()));
    assert_eq!(after.to_json(), m.to_json());
}

/// Deep edits inside a signal's value re-run the reactions that read it.
#[test]
fn deep_mutation_triggers_signal_readers() {
    let rx = manual();
    let state = tracked(json!({"todos": [{"done": false}]}));
    let signal = rx.create_signal(state.clone());
    let done = Arc::new(AtomicI32::new(0));

    let (sig, d) = (signal.clone(), done.clone());
    rx.create_reaction(move || {
        let todos = sig.get().get("todos").unwrap().into_mutable().unwrap();
        let finished = todos
            .filter(|todo, _| {
                todo.as_mutable()
                    .and_then(|t| t.get("done"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
            .len();
        d.store(finished as i32, Ordering::SeqCst);
    });
    assert_eq!(done.load(Ordering::SeqCst), 0);

    let todos = state.get("todos").unwrap().into_mutable().unwrap();
    let todo = todos.get(0).unwrap().into_mutable().unwrap();
    rx.batch_reactions(|| todo.set("done", true));

    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[test]
fn serialized_state_round_trips_with_revisions() {
    let m = tracked(json!({"user": {"name": "Ada"}, "tags": ["a"]}));
    m.get("user");
    m.get("tags");

    let restored = deserialize(&serialize(&m).unwrap())
        .unwrap()
        .into_mutable()
        .unwrap();
    assert_eq!(restored.to_json(), m.to_json());
    assert_eq!(restored.revision(), m.revision());

    let user = restored.get("user").unwrap().into_mutable().unwrap();
    user.set("name", "Grace");
    assert_ne!(restored.revision(), m.revision());
}
