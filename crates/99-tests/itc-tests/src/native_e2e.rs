#![cfg(all(test, not(target_arch = "wasm32")))]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use itc_core::Expected;
use itc_mailbox::{defer_call, defer_call_timeout, DeferError, PostError, Task, TaskMailbox, Timeout};
use itc_runtime_native::{spawn_worker, WorkerConfig, WorkerHandle};
use parking_lot::Mutex;

const SLOTS: usize = 8;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn worker(name: &str) -> WorkerHandle<SLOTS> {
    spawn_worker(WorkerConfig::named(name), Arc::new(TaskMailbox::new())).expect("spawn worker")
}

/// State confined to one worker; other threads reach it only through calls.
#[derive(Default)]
struct Ledger {
    entries: Vec<u64>,
}

thread_local! {
    static LEDGER: std::cell::RefCell<Ledger> = std::cell::RefCell::new(Ledger::default());
}

#[test]
fn worker_confined_state_through_deferred_calls() {
    init_logging();
    let ledger = worker("ledger");
    let mailbox = Arc::clone(ledger.mailbox());

    thread::scope(|scope| {
        for producer in 0..4u64 {
            let mailbox = &*mailbox;
            scope.spawn(move || {
                for i in 0..100 {
                    let appended = defer_call(mailbox, move || {
                        LEDGER.with(|l| l.borrow_mut().entries.push(producer * 1000 + i))
                    });
                    assert_eq!(appended, Expected::default());
                }
            });
        }
    });

    let (len, sum) = defer_call(&*mailbox, || {
        LEDGER.with(|l| {
            let l = l.borrow();
            (l.entries.len(), l.entries.iter().sum::<u64>())
        })
    })
    .into_value();
    let expected: u64 = (0..4u64)
        .flat_map(|p| (0..100u64).map(move |i| p * 1000 + i))
        .sum();
    assert_eq!(len, 400);
    assert_eq!(sum, expected);

    let confined_here = LEDGER.with(|l| l.borrow().entries.len());
    assert_eq!(confined_here, 0, "test thread has its own, untouched ledger");

    ledger.shutdown().expect("shutdown");
}

#[test]
fn chained_workers_forward_calls() {
    init_logging();
    let front = worker("front");
    let back = worker("back");
    let back_mailbox = Arc::clone(back.mailbox());
    let back_id = back.thread_id();

    let result = defer_call(&**front.mailbox(), move || {
        let on_front = thread::current().name().map(str::to_owned);
        let inner = defer_call(&*back_mailbox, || {
            (thread::current().id(), 6 * 7)
        })
        .into_value();
        (on_front, inner)
    });
    let (front_name, (ran_on, answer)) = result.into_value();
    assert_eq!(front_name.as_deref(), Some("front"));
    assert_eq!(Some(ran_on), back_id);
    assert_eq!(answer, 42);

    front.shutdown().expect("front shutdown");
    back.shutdown().expect("back shutdown");
}

#[test]
fn nested_call_into_own_mailbox_is_refused() {
    init_logging();
    let handle = worker("self-call");
    let mailbox = Arc::clone(handle.mailbox());

    let inner = defer_call(&**handle.mailbox(), move || defer_call(&*mailbox, || 1));
    assert_eq!(inner, Expected::Value(Expected::Error(DeferError::SameThread)));

    handle.shutdown().expect("shutdown");
}

#[test]
fn fire_and_forget_mixed_with_deferred_calls_keeps_order() {
    init_logging();
    let handle = worker("mixed");
    let mailbox = handle.mailbox();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50u32 {
        let sink = Arc::clone(&log);
        mailbox
            .post(Task::new(move || sink.lock().push(i)), Timeout::Forever)
            .expect("post");
        if i % 10 == 9 {
            let seen = defer_call(&*mailbox, || log.lock().len());
            assert_eq!(seen.into_value(), i as usize + 1, "earlier posts ran first");
        }
    }
    assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());

    handle.shutdown().expect("shutdown");
}

#[test]
fn backpressure_is_visible_in_metrics() {
    init_logging();
    let handle = worker("busy");
    let mailbox = Arc::clone(handle.mailbox());

    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    mailbox
        .post(
            Task::new(move || {
                entered_tx.send(()).expect("entered");
                let _ = release_rx.recv();
            }),
            Timeout::Forever,
        )
        .expect("post blocker");
    entered_rx.recv().expect("blocker running");

    let mut refused = 0;
    for _ in 0..SLOTS + 3 {
        if mailbox.post_fn(|| {}, Timeout::Immediate) == Err(PostError::TimedOut) {
            refused += 1;
        }
    }
    assert_eq!(refused, 4, "one slot is held by the running blocker");
    assert_eq!(
        defer_call_timeout(&*mailbox, || (), Timeout::millis(5)),
        Expected::Error(DeferError::Post(PostError::TimedOut))
    );

    release_tx.send(()).expect("release");
    assert_eq!(defer_call(&*mailbox, || ()), Expected::default());

    handle.shutdown().expect("shutdown");
    let metrics = mailbox.metrics();
    assert_eq!(metrics.timed_out, 5);
    assert_eq!(metrics.posted as usize, 1 + (SLOTS - 1) + 1);
    assert_eq!(metrics.executed, metrics.posted);
}

#[test]
#[ignore]
fn slow_many_callers_many_workers() {
    init_logging();
    const WORKERS: usize = 4;
    const CALLERS: u64 = 16;
    const CALLS: u64 = 2_000;

    let workers: Vec<_> = (0..WORKERS).map(|i| worker(&format!("stress-{i}"))).collect();
    let total = AtomicU64::new(0);

    thread::scope(|scope| {
        for caller in 0..CALLERS {
            let workers = &workers;
            let total = &total;
            scope.spawn(move || {
                for call in 0..CALLS {
                    let target = workers[((caller + call) as usize) % WORKERS].mailbox();
                    let value = defer_call(&**target, move || caller + call).into_value();
                    total.fetch_add(value, Ordering::Relaxed);
                }
            });
        }
    });

    let expected: u64 = (0..CALLERS)
        .flat_map(|c| (0..CALLS).map(move |k| c + k))
        .sum();
    assert_eq!(total.load(Ordering::Relaxed), expected);
    for handle in workers {
        handle.shutdown().expect("shutdown");
    }
}
