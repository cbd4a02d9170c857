//! Integration tests for the task factory
//!
//! Covers scheduling order, concurrency limits, cancellation and teardown.

use jboot::error::ProcedureError;
use jboot::{Context, Procedure, Status, Task, TaskDescriptor, TaskFactory};
use parking_lot::{Condvar, Mutex};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn factory(max_threads: usize) -> TaskFactory {
    let max_threads = max_threads.to_string();
    TaskFactory::from_settings(&[
        ("max-threads", max_threads.as_str()),
        ("thread-timeout-ms", "100"),
    ])
    .unwrap()
}

/// One-shot latch a test opens to let a procedure continue
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        self.cv.wait_while(&mut open, |open| !*open);
    }
}

/// Procedure that reports when it starts and blocks until released
struct Blocking {
    started: Arc<Gate>,
    release: Arc<Gate>,
}

impl Blocking {
    fn new() -> (Arc<Self>, Arc<Gate>, Arc<Gate>) {
        let started = Arc::new(Gate::default());
        let release = Arc::new(Gate::default());
        let procedure = Arc::new(Self {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        });
        (procedure, started, release)
    }
}

impl Procedure for Blocking {
    fn run(&self, _context: &mut Context) -> Result<(), ProcedureError> {
        self.started.open();
        self.release.wait();
        Ok(())
    }
}

/// Procedure that loops until its cancel hook is called
struct Cancellable {
    started: Arc<Gate>,
    canceled: AtomicBool,
}

impl Procedure for Cancellable {
    fn run(&self, _context: &mut Context) -> Result<(), ProcedureError> {
        self.started.open();
        let deadline = Instant::now() + WAIT;
        while !self.canceled.load(Ordering::SeqCst) {
            if Instant::now() > deadline {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(1));
        }
        Err("canceled".into())
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_single_task_runs_to_done() {
    let factory = factory(2);
    let task = factory.create_task(TaskDescriptor::from_fn(|ctx| {
        ctx.add_object("answer", 42_u32)?;
        Ok(())
    }));

    assert_eq!(task.wait_timeout(WAIT), Status::Done);
    assert!(task.exception().is_none());
    assert_eq!(task.context().unwrap().find_object::<u32>("answer"), Some(&42));
}

#[test]
fn test_failing_procedure_reports_exception() {
    let factory = factory(1);
    let task = factory.create_task(TaskDescriptor::from_fn(|_| Err("x".into())));

    assert_eq!(task.wait_timeout(WAIT), Status::Exception);
    let failure = task.exception().unwrap();
    assert_eq!(failure.to_string(), "x");
    assert_eq!(failure.rethrow().unwrap_err().to_string(), "x");
}

#[test]
fn test_panicking_procedure_does_not_kill_pool() {
    let factory = factory(1);
    let bad = factory.create_task(TaskDescriptor::from_fn(|_| panic!("worker must survive")));
    let good = factory.create_task(TaskDescriptor::from_fn(|_| Ok(())));

    assert_eq!(bad.wait_timeout(WAIT), Status::Exception);
    assert_eq!(good.wait_timeout(WAIT), Status::Done);
}

#[test]
fn test_second_task_waits_for_single_worker() {
    let factory = factory(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let (blocking, started, release) = Blocking::new();
    let first_order = Arc::clone(&order);
    let first = factory.create_task(
        TaskDescriptor::new(blocking)
            .on_state_changed(move |status| {
                if status == Status::Done {
                    first_order.lock().push("first");
                }
            }),
    );
    started.wait();

    let second_order = Arc::clone(&order);
    let second = factory.create_task(TaskDescriptor::from_fn(move |_| {
        second_order.lock().push("second");
        Ok(())
    }));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(first.status(), Status::Running);
    assert_eq!(second.status(), Status::Waiting);
    assert!(second.context().is_none());
    assert_eq!(factory.live_workers(), 1);

    release.open();
    assert_eq!(second.wait_timeout(WAIT), Status::Done);
    assert_eq!(first.status(), Status::Done);
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn test_fifo_order_with_one_worker() {
    let factory = factory(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<Task> = (0..20)
        .map(|i| {
            let order = Arc::clone(&order);
            factory.create_task(TaskDescriptor::from_fn(move |_| {
                order.lock().push(i);
                Ok(())
            }))
        })
        .collect();

    for task in &tasks {
        assert_eq!(task.wait_timeout(WAIT), Status::Done);
    }
    assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_max_threads_bounds_concurrency() {
    const MAX: usize = 3;
    let factory = factory(MAX);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<Task> = (0..24)
        .map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            factory.create_task(TaskDescriptor::from_fn(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }))
        })
        .collect();

    while tasks.iter().any(|task| !task.status().is_terminal()) {
        assert!(factory.live_workers() <= MAX);
        thread::sleep(Duration::from_millis(1));
    }

    assert!(peak.load(Ordering::SeqCst) <= MAX);
    assert!(tasks.iter().all(|task| task.status() == Status::Done));
}

#[test]
fn test_cancel_queued_task_never_runs() {
    let factory = factory(1);
    let (blocking, started, release) = Blocking::new();
    let first = factory.create_task(TaskDescriptor::new(blocking));
    started.wait();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    let queued = factory.create_task(
        TaskDescriptor::from_fn(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .on_state_changed(move |status| sink.lock().push(status)),
    );

    queued.cancel();
    assert_eq!(queued.status(), Status::Canceled);
    assert_eq!(factory.queued_count(), 0);

    release.open();
    assert_eq!(first.wait_timeout(WAIT), Status::Done);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(*statuses.lock(), vec![Status::Canceled]);
}

#[test]
fn test_cancel_running_task_signals_procedure() {
    let factory = factory(1);
    let started = Arc::new(Gate::default());
    let procedure = Arc::new(Cancellable {
        started: Arc::clone(&started),
        canceled: AtomicBool::new(false),
    });

    let task = factory.create_task(TaskDescriptor::new(procedure.clone()));
    started.wait();
    task.cancel();

    assert_eq!(task.wait_timeout(WAIT), Status::Exception);
    assert!(procedure.canceled.load(Ordering::SeqCst));
    assert_eq!(task.exception().unwrap().to_string(), "canceled");
}

#[test]
fn test_cancel_finished_task_is_noop() {
    let factory = factory(1);
    let done = factory.create_task(TaskDescriptor::from_fn(|_| Ok(())));
    let failed = factory.create_task(TaskDescriptor::from_fn(|_| Err("nope".into())));

    assert_eq!(done.wait_timeout(WAIT), Status::Done);
    assert_eq!(failed.wait_timeout(WAIT), Status::Exception);

    done.cancel();
    failed.cancel();
    done.cancel();

    assert_eq!(done.status(), Status::Done);
    assert_eq!(failed.status(), Status::Exception);
    assert!(failed.exception().is_some());
}

#[test]
fn test_callback_sees_each_transition_once() {
    let factory = factory(1);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);

    let task = factory.create_task(
        TaskDescriptor::from_fn(|_| Ok(()))
            .on_state_changed(move |status| sink.lock().push(status)),
    );
    assert_eq!(task.wait_timeout(WAIT), Status::Done);
    task.cancel();

    assert_eq!(*statuses.lock(), vec![Status::Running, Status::Done]);
}

#[test]
fn test_tasks_snapshot_never_duplicates() {
    let factory = factory(2);
    let (blocking, started, release) = Blocking::new();
    let running = factory.create_task(TaskDescriptor::new(blocking.clone()));
    started.wait();

    let second = factory.create_task(TaskDescriptor::new(blocking));
    let queued: Vec<Task> = (0..5)
        .map(|_| factory.create_task(TaskDescriptor::from_fn(|_| Ok(()))))
        .collect();

    let snapshot = factory.tasks();
    let ids: HashSet<_> = snapshot.iter().map(Task::id).collect();
    assert_eq!(ids.len(), snapshot.len());
    assert!(ids.contains(&running.id()));
    assert!(ids.contains(&second.id()));
    for task in &queued {
        assert!(ids.contains(&task.id()));
    }

    release.open();
    for task in queued.iter().chain([&running, &second]) {
        assert_eq!(task.wait_timeout(WAIT), Status::Done);
    }

    let deadline = Instant::now() + WAIT;
    while !factory.tasks().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(factory.tasks().is_empty());
}

#[test]
fn test_drop_cancels_queued_and_waits_for_workers() {
    let factory = factory(1);
    let (blocking, started, release) = Blocking::new();
    let running = factory.create_task(TaskDescriptor::new(blocking));
    started.wait();

    let queued: Vec<Task> = (0..3)
        .map(|_| factory.create_task(TaskDescriptor::from_fn(|_| Ok(()))))
        .collect();

    let releaser = {
        let release = Arc::clone(&release);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.open();
        })
    };

    drop(factory);

    // Drop only returns once the running task's worker has exited.
    assert_eq!(running.status(), Status::Done);
    for task in &queued {
        assert_eq!(task.status(), Status::Canceled);
        assert!(task.context().is_none());
        task.cancel();
        assert_eq!(task.status(), Status::Canceled);
    }
    releaser.join().unwrap();
}

#[test]
fn test_idle_worker_is_reused_for_sequential_tasks() {
    let factory = TaskFactory::from_settings(&[
        ("max-threads", "4"),
        ("thread-timeout-ms", "10000"),
    ])
    .unwrap();

    for _ in 0..10 {
        let task = factory.create_task(TaskDescriptor::from_fn(|_| Ok(())));
        assert_eq!(task.wait_timeout(WAIT), Status::Done);

        let deadline = Instant::now() + WAIT;
        while factory.idle_workers() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(factory.live_workers(), 1);
        assert_eq!(factory.idle_workers(), 1);
    }
}

#[test]
fn test_cancel_racing_workers_is_all_or_nothing() {
    let factory = factory(2);

    let submitted: Vec<(Task, Arc<AtomicBool>, Arc<Mutex<Vec<Status>>>)> = (0..500)
        .map(|_| {
            let ran = Arc::new(AtomicBool::new(false));
            let statuses = Arc::new(Mutex::new(Vec::new()));
            let flag = Arc::clone(&ran);
            let sink = Arc::clone(&statuses);
            let task = factory.create_task(
                TaskDescriptor::from_fn(move |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .on_state_changed(move |status| sink.lock().push(status)),
            );
            task.cancel();
            (task, ran, statuses)
        })
        .collect();

    for (task, ran, statuses) in &submitted {
        match task.wait_timeout(WAIT) {
            Status::Canceled => {
                assert!(!ran.load(Ordering::SeqCst));
                assert_eq!(*statuses.lock(), vec![Status::Canceled]);
            }
            Status::Done => {
                assert!(ran.load(Ordering::SeqCst));
                assert_eq!(*statuses.lock(), vec![Status::Running, Status::Done]);
            }
            other => panic!("task {} ended as {other}", task.id()),
        }
    }
    assert_eq!(factory.queued_count(), 0);
}

#[test]
fn test_invalid_settings_fail_construction() {
    for settings in [
        vec![("max-threads", "0")],
        vec![("max-threads", "1001")],
        vec![("max-threads", "2"), ("max-threads", "3")],
        vec![("max-threads", "2"), ("thread-timeout-ms", "0")],
        vec![("max-threads", "2"), ("priority", "high")],
        vec![("thread-timeout-ms", "10")],
    ] {
        assert!(
            TaskFactory::from_settings(settings.as_slice()).is_err(),
            "settings should be rejected: {settings:?}"
        );
    }
}
