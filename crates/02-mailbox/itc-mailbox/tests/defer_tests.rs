//! Deferred-call integration tests: results, thread affinity and failure paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use itc_mailbox::{
    defer_call, defer_call_timeout, DeferError, Expected, PostError, Task, TaskMailbox, Timeout,
};

const CAPACITY: usize = 4;

fn add(a: i32, b: i32) -> i32 {
    a + b
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Worker {
    mailbox: Arc<TaskMailbox<CAPACITY>>,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn() -> Self {
        let mailbox = Arc::new(TaskMailbox::new());
        let (ready_tx, ready_rx) = bounded(1);
        let handle = {
            let mailbox = Arc::clone(&mailbox);
            thread::Builder::new()
                .name("defer-consumer".into())
                .spawn(move || {
                    let consumer = mailbox.start().expect("start mailbox");
                    ready_tx.send(()).expect("report start");
                    consumer.serve();
                })
                .expect("spawn consumer")
        };
        ready_rx.recv().expect("consumer started");
        Self { mailbox, handle }
    }

    fn shutdown(self) {
        self.mailbox.close();
        self.handle.join().expect("consumer exits cleanly");
    }
}

#[test]
fn returns_the_value_computed_on_the_consumer() {
    init_logging();
    let worker = Worker::spawn();
    let consumer_id = worker.handle.thread().id();

    let result = defer_call(&*worker.mailbox, || (add(2, 3), thread::current().id()));
    assert!(result.has_value());
    let (sum, ran_on) = result.into_value();
    assert_eq!(sum, 5);
    assert_eq!(ran_on, consumer_id);
    assert_ne!(ran_on, thread::current().id());

    worker.shutdown();
}

#[test]
fn concurrent_callers_get_their_own_results() {
    init_logging();
    let worker = Worker::spawn();

    thread::scope(|scope| {
        let mailbox = &*worker.mailbox;
        let first = scope.spawn(move || defer_call(mailbox, || add(1, 1)));
        let second = scope.spawn(move || defer_call(mailbox, || add(2, 2)));
        assert_eq!(first.join().expect("first caller"), Expected::Value(2));
        assert_eq!(second.join().expect("second caller"), Expected::Value(4));
    });

    worker.shutdown();
}

#[test]
fn many_callers_all_complete() {
    init_logging();
    let worker = Worker::spawn();

    thread::scope(|scope| {
        let mailbox = &*worker.mailbox;
        let callers: Vec<_> = (0..16)
            .map(|i| {
                scope.spawn(move || {
                    (0..50)
                        .map(|j| defer_call(mailbox, move || add(i, j)).into_value())
                        .sum::<i32>()
                })
            })
            .collect();
        for (i, caller) in callers.into_iter().enumerate() {
            let i = i as i32;
            let expected: i32 = (0..50).map(|j| i + j).sum();
            assert_eq!(caller.join().expect("caller"), expected);
        }
    });

    let mailbox = Arc::clone(&worker.mailbox);
    worker.shutdown();
    assert_eq!(mailbox.metrics().executed, 16 * 50);
}

#[test]
fn saturated_mailbox_fails_without_invoking() {
    init_logging();
    let worker = Worker::spawn();
    let mailbox = &*worker.mailbox;

    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    mailbox
        .post(
            Task::new(move || {
                entered_tx.send(()).expect("report entry");
                let _ = release_rx.recv();
            }),
            Timeout::Forever,
        )
        .expect("post blocker");
    entered_rx.recv().expect("blocker running");
    for _ in 1..CAPACITY {
        mailbox
            .post_fn(|| {}, Timeout::Immediate)
            .expect("fill remaining slots");
    }

    let invoked = AtomicBool::new(false);
    let result = defer_call_timeout(
        mailbox,
        || {
            invoked.store(true, Ordering::SeqCst);
            add(1, 1)
        },
        Timeout::Immediate,
    );
    assert_eq!(result, Expected::Error(DeferError::Post(PostError::TimedOut)));
    assert!(!invoked.load(Ordering::SeqCst));

    release_tx.send(()).expect("release blocker");
    assert_eq!(defer_call(mailbox, || add(20, 22)), Expected::Value(42));
    assert!(!invoked.load(Ordering::SeqCst));

    worker.shutdown();
}

#[test]
fn closed_mailbox_refuses_calls() {
    init_logging();
    let worker = Worker::spawn();
    let mailbox = Arc::clone(&worker.mailbox);
    worker.shutdown();

    assert_eq!(
        defer_call(&*mailbox, || add(1, 2)),
        Expected::Error(DeferError::Post(PostError::Closed))
    );
}

#[test]
fn panicking_call_is_abandoned_and_queued_calls_are_released() {
    init_logging();
    let mailbox = Arc::new(TaskMailbox::<CAPACITY>::new());
    let (ready_tx, ready_rx) = bounded(1);
    let (go_tx, go_rx) = bounded::<()>(1);
    let consumer = {
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || {
            let mut consumer = mailbox.start().expect("start mailbox");
            ready_tx.send(()).expect("report start");
            go_rx.recv().expect("go signal");
            consumer.poll();
        })
    };
    ready_rx.recv().expect("consumer started");

    thread::scope(|scope| {
        let mailbox = &*mailbox;
        let failing = scope.spawn(move || defer_call(mailbox, || -> i32 { panic!("sensor fault") }));
        while mailbox.pending() < 1 {
            thread::yield_now();
        }
        let queued = scope.spawn(move || defer_call(mailbox, || add(1, 1)));
        while mailbox.pending() < 2 {
            thread::yield_now();
        }
        go_tx.send(()).expect("start draining");

        assert_eq!(
            failing.join().expect("failing caller"),
            Expected::Error(DeferError::Abandoned)
        );
        assert_eq!(
            queued.join().expect("queued caller"),
            Expected::Error(DeferError::Abandoned)
        );
    });

    assert!(consumer.join().is_err(), "panic propagates out of the consumer");
    assert!(mailbox.is_closed());
}

#[test]
fn consumer_dropped_without_serving_fails_calls() {
    init_logging();
    let mailbox = Arc::new(TaskMailbox::<CAPACITY>::new());
    {
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || {
            let _consumer = mailbox.start().expect("start mailbox");
        })
        .join()
        .expect("starter thread");
    }

    assert!(mailbox.is_closed());
    assert_eq!(
        defer_call(&*mailbox, || add(2, 3)),
        Expected::Error(DeferError::Post(PostError::Closed))
    );
}

#[test]
fn consumer_dropped_with_queued_call_abandons_it() {
    init_logging();
    let mailbox = Arc::new(TaskMailbox::<CAPACITY>::new());
    let (ready_tx, ready_rx) = bounded(1);
    let (go_tx, go_rx) = bounded::<()>(1);
    let starter = {
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || {
            let consumer = mailbox.start().expect("start mailbox");
            ready_tx.send(()).expect("report start");
            go_rx.recv().expect("go signal");
            drop(consumer);
        })
    };
    ready_rx.recv().expect("consumer started");

    thread::scope(|scope| {
        let mailbox = &*mailbox;
        let caller = scope.spawn(move || defer_call(mailbox, || add(1, 1)));
        while mailbox.pending() < 1 {
            thread::yield_now();
        }
        go_tx.send(()).expect("drop consumer");
        assert_eq!(
            caller.join().expect("caller"),
            Expected::Error(DeferError::Abandoned)
        );
    });

    starter.join().expect("starter thread");
    assert!(mailbox.is_closed());
}
