//! Pipeline engine tests: ordering, chaining, backpressure, cancellation and faults.

use pipeworks::{Pipeline, PipelineError, StageBehavior, StageKind, StageOpts};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn add_sync(s: String) -> anyhow::Result<String> {
    Ok(format!("{s} sync"))
}

/// Future that resolves after `ms` without needing a runtime.
fn delay(ms: u64) -> impl Future<Output = ()> {
    let (tx, rx) = futures::channel::oneshot::channel::<()>();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(ms));
        let _ = tx.send(());
    });
    async move {
        let _ = rx.await;
    }
}

async fn add_async(s: String) -> anyhow::Result<String> {
    delay(100).await;
    Ok(format!("{s} async"))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn opts(workers: usize) -> StageOpts {
    StageOpts::default().workers(workers)
}

fn wait_until_completed<T, U>(p: &Pipeline<T, U>, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if p.is_completed() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    p.is_completed()
}

fn as_set(v: Vec<String>) -> HashSet<String> {
    v.into_iter().collect()
}

// --- single stage ---

#[test]
fn test_sync_pipeline_single_worker_keeps_order() {
    let pipe = Pipeline::new(add_sync, opts(1)).unwrap();
    pipe.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe.complete_adding();

    let results = pipe.to_list().unwrap().wait().unwrap();
    assert_eq!(results, strings(&["1 sync", "2 sync", "3 sync"]));
}

#[test]
fn test_single_worker_output_matches_elementwise_transform() {
    let pipe = Pipeline::new(|x: u64| Ok(x * 2), opts(1)).unwrap();
    pipe.add_all(0..500).unwrap();
    pipe.complete_adding();

    let results = pipe.to_list().unwrap().wait().unwrap();
    let expected: Vec<u64> = (0..500).map(|x| x * 2).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_multi_worker_output_is_permutation() {
    let pipe = Pipeline::new(|x: u64| Ok(x + 1_000), opts(4)).unwrap();
    pipe.add_all(0..1_000).unwrap();
    pipe.complete_adding();

    let mut results = pipe.to_list().unwrap().wait().unwrap();
    results.sort_unstable();
    let expected: Vec<u64> = (1_000..2_000).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_async_pipeline() {
    let pipe = Pipeline::new_async(add_async, opts(3)).unwrap();
    assert_eq!(pipe.kind(), StageKind::Async);
    pipe.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe.complete_adding();

    let results = pipe.to_list().unwrap().wait().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(
        as_set(results),
        as_set(strings(&["1 async", "2 async", "3 async"]))
    );
}

#[test]
fn test_async_workers_run_in_parallel() {
    // Three workers, three 100ms items: well under the 300ms a single worker would need.
    let pipe = Pipeline::new_async(add_async, opts(3)).unwrap();
    let start = Instant::now();
    pipe.add_all(strings(&["a", "b", "c"])).unwrap();
    pipe.complete_adding();
    let results = pipe.to_list().unwrap().wait().unwrap();
    assert_eq!(results.len(), 3);
    assert!(start.elapsed() < Duration::from_millis(280));
}

#[test]
fn test_empty_input_completes() {
    let pipe = Pipeline::new(add_sync, opts(2)).unwrap();
    pipe.complete_adding();
    let results = pipe.to_list().unwrap().wait().unwrap();
    assert!(results.is_empty());
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
}

#[test]
fn test_custom_behavior() {
    struct Upper;
    impl StageBehavior<String, String> for Upper {
        fn process(&self, item: String) -> anyhow::Result<String> {
            Ok(item.to_uppercase())
        }
    }

    let pipe = Pipeline::with_behavior(Upper, StageOpts::named("upper")).unwrap();
    assert_eq!(pipe.name(), "upper");
    assert_eq!(pipe.kind(), StageKind::Sync);
    pipe.add("abc".to_string()).unwrap();
    pipe.complete_adding();
    assert_eq!(pipe.to_list().unwrap().wait().unwrap(), strings(&["ABC"]));
}

// --- chaining ---

#[test]
fn test_multi_sync_pipeline() {
    let pipe1 = Pipeline::new(add_sync, opts(3)).unwrap();
    let pipe2 = pipe1.attach_new(add_sync, opts(3)).unwrap();
    let pipe3 = pipe2.attach_new(add_sync, opts(3)).unwrap();

    pipe1.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe1.complete_adding();

    let results = pipe3.to_list().unwrap().wait().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(
        as_set(results),
        as_set(strings(&["1 sync sync sync", "2 sync sync sync", "3 sync sync sync"]))
    );
}

#[test]
fn test_multi_async_pipeline_manual_attach() {
    let pipe1 = Pipeline::new_async(add_async, opts(3)).unwrap();
    let pipe2 = Pipeline::new_async(add_async, opts(3)).unwrap();
    let pipe3 = Pipeline::new_async(add_async, opts(3)).unwrap();

    pipe1.attach_output_to(&pipe2).unwrap();
    pipe2.attach_output_to(&pipe3).unwrap();

    pipe1.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe1.complete_adding();

    let results = pipe3.to_list().unwrap().wait().unwrap();
    assert_eq!(
        as_set(results),
        as_set(strings(&[
            "1 async async async",
            "2 async async async",
            "3 async async async"
        ]))
    );
}

#[test]
fn test_multi_sync_and_async_pipeline() {
    let pipe1 = Pipeline::new(add_sync, opts(1)).unwrap();
    let pipe2 = pipe1.attach_new_async(add_async, opts(1)).unwrap();
    let pipe3 = pipe2.attach_new(add_sync, opts(1)).unwrap();

    pipe1.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe1.complete_adding();

    let results = pipe3.to_list().unwrap().wait().unwrap();
    assert_eq!(
        as_set(results),
        as_set(strings(&[
            "1 sync async sync",
            "2 sync async sync",
            "3 sync async sync"
        ]))
    );
    for done in [
        wait_until_completed(&pipe1, Duration::from_secs(5)),
        wait_until_completed(&pipe2, Duration::from_secs(5)),
        wait_until_completed(&pipe3, Duration::from_secs(5)),
    ] {
        assert!(done);
    }
}

#[test]
fn test_chain_changes_item_type() {
    let parse = Pipeline::new(|s: String| Ok(s.parse::<u32>()?), opts(2)).unwrap();
    let square = parse.attach_new(|n: u32| Ok(n * n), opts(2)).unwrap();
    parse.add_all(strings(&["1", "2", "3", "4"])).unwrap();
    parse.complete_adding();

    let mut out = square.to_list().unwrap().wait().unwrap();
    out.sort_unstable();
    assert_eq!(out, vec![1, 4, 9, 16]);
}

#[test]
fn test_delayed_add_pipeline() {
    let pipe1 = Pipeline::new(add_sync, opts(3)).unwrap();
    let pipe2 = pipe1.attach_new_async(add_async, opts(3)).unwrap();
    let pipe3 = pipe2.attach_new(add_sync, opts(3)).unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let consumer = pipe3
        .consume_output(move |s| sink.lock().unwrap().push(s))
        .unwrap();

    pipe1.add_all(strings(&["1", "2", "3"])).unwrap();
    pipe1.complete_adding();
    consumer.wait().unwrap();

    let results = results.lock().unwrap().clone();
    assert_eq!(
        as_set(results),
        as_set(strings(&[
            "1 sync async sync",
            "2 sync async sync",
            "3 sync async sync"
        ]))
    );
}

// --- backpressure ---

#[test]
fn test_input_cap_blocks_add() {
    let pipe = Pipeline::new_async(add_async, opts(1).input_capacity(1)).unwrap();

    pipe.add("1".to_string()).unwrap(); // taken by the worker
    pipe.add("2".to_string()).unwrap(); // waits in the queue
    let mut t = Instant::now();
    for i in 3..=6 {
        pipe.add(i.to_string()).unwrap();
        let waited = t.elapsed();
        assert!(
            waited > Duration::from_millis(80),
            "add {} returned after {:?}",
            i,
            waited
        );
        t = Instant::now();
    }
    pipe.complete_adding();

    let results = pipe.to_list().unwrap().wait().unwrap();
    assert_eq!(results.len(), 6);
}

#[test]
fn test_blocked_add_returns_cancelled() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let pipe = Pipeline::new(
        move |x: u32| {
            let _ = gate_rx.recv();
            Ok(x)
        },
        opts(1).input_capacity(1),
    )
    .unwrap();

    pipe.add(1).unwrap();
    pipe.add(2).unwrap();
    let blocked = {
        let pipe = pipe.clone();
        thread::spawn(move || pipe.add(3))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());

    pipe.cancel_processing();
    let res = blocked.join().unwrap();
    assert!(matches!(res, Err(PipelineError::Cancelled)));

    drop(gate_tx);
    let results = pipe.to_list().unwrap().wait().unwrap();
    assert!(results.len() <= 1);
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
}

// --- cancellation ---

#[test]
fn test_cancellation_returns_partial_results() {
    let pipe = Pipeline::new_async(add_async, opts(1)).unwrap();
    pipe.add_all((0..100).map(|i| i.to_string())).unwrap();
    pipe.complete_adding();

    let drain = pipe.to_list().unwrap();
    let drain = match drain.wait_timeout(Duration::from_millis(500)) {
        Ok(_) => panic!("did not time out when expected"),
        Err(drain) => drain,
    };
    pipe.cancel_processing();
    let results = drain.wait().unwrap();

    assert!(results.len() < 10, "got {} results", results.len());
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
    assert!(pipe.fault().is_none());
}

#[test]
fn test_cancel_is_idempotent() {
    let pipe = Pipeline::new(add_sync, opts(2)).unwrap();
    pipe.cancel_processing();
    pipe.cancel_processing();
    assert!(pipe.is_cancelled());
    assert!(matches!(
        pipe.add("x".to_string()),
        Err(PipelineError::Cancelled)
    ));
    assert!(pipe.to_list().unwrap().wait().unwrap().is_empty());
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
}

#[test]
fn test_cancel_propagates_downstream_not_upstream() {
    let a = Pipeline::new(add_sync, opts(1)).unwrap();
    let b = a.attach_new(add_sync, opts(1)).unwrap();
    let c = b.attach_new(add_sync, opts(1)).unwrap();

    b.cancel_processing();
    assert!(!a.is_cancelled());
    assert!(b.is_cancelled());
    assert!(c.is_cancelled());

    a.complete_adding();
    let results = c.to_list().unwrap().wait().unwrap();
    assert!(results.is_empty());
    assert!(wait_until_completed(&a, Duration::from_secs(5)));
}

#[test]
fn test_attach_after_cancel_replays_cancellation() {
    let a = Pipeline::new(add_sync, opts(1)).unwrap();
    a.cancel_processing();
    let b = a.attach_new(add_sync, opts(1)).unwrap();
    assert!(b.is_cancelled());
}

// --- faults ---

fn fail_on_bad(s: String) -> anyhow::Result<String> {
    if s == "bad" {
        anyhow::bail!("cannot process '{}'", s);
    }
    Ok(s)
}

#[test]
fn test_transform_fault_surfaces_at_drain() {
    let pipe = Pipeline::new(fail_on_bad, StageOpts::named("checker")).unwrap();
    pipe.add_all(strings(&["ok", "bad", "never"])).unwrap();
    pipe.complete_adding();

    let err = pipe.to_list().unwrap().wait().unwrap_err();
    match &err {
        PipelineError::TransformFault { stage, cause } => {
            assert_eq!(stage, "checker");
            assert!(cause.to_string().contains("cannot process 'bad'"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_fault());
    assert!(pipe.is_cancelled());
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
}

#[test]
fn test_fault_after_partial_results_is_deterministic() {
    let pipe = Pipeline::new(
        |x: u32| {
            if x == 4 {
                anyhow::bail!("four");
            }
            Ok(x)
        },
        opts(1),
    )
    .unwrap();
    pipe.add_all(1..=6).unwrap();
    pipe.complete_adding();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let res = pipe
        .consume_output(move |x| sink.lock().unwrap().push(x))
        .unwrap()
        .wait();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert!(matches!(res, Err(PipelineError::TransformFault { .. })));
}

#[test]
fn test_first_fault_wins() {
    let pipe = Pipeline::new(
        |x: u32| -> anyhow::Result<u32> { anyhow::bail!("fault {}", x) },
        opts(4),
    )
    .unwrap();
    pipe.add_all(0..64).unwrap();
    pipe.complete_adding();

    let err = pipe.to_list().unwrap().wait().unwrap_err();
    let captured = pipe.fault().expect("fault captured");
    assert_eq!(err.to_string(), captured.to_string());
}

#[test]
fn test_fault_propagates_down_the_chain() {
    let first = Pipeline::new(fail_on_bad, StageOpts::named("first")).unwrap();
    let second = first
        .attach_new_async(add_async, StageOpts::named("second"))
        .unwrap();
    let third = second.attach_new(add_sync, StageOpts::named("third")).unwrap();

    first.add_all(strings(&["a", "bad", "b"])).unwrap();
    first.complete_adding();

    let err = third.to_list().unwrap().wait().unwrap_err();
    match err {
        PipelineError::TransformFault { stage, .. } => assert_eq!(stage, "first"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(second.is_cancelled());
    assert!(third.is_cancelled());
    for p in [&second, &third] {
        assert!(wait_until_completed(p, Duration::from_secs(5)));
    }
    assert!(wait_until_completed(&first, Duration::from_secs(5)));
}

#[test]
fn test_async_fault_aborts_stage() {
    let pipe = Pipeline::new_async(
        |x: u32| async move {
            delay(10).await;
            if x == 2 {
                anyhow::bail!("async failure");
            }
            Ok::<u32, anyhow::Error>(x)
        },
        opts(1),
    )
    .unwrap();
    pipe.add_all(1..=50).unwrap();
    pipe.complete_adding();

    let err = pipe.to_list().unwrap().wait().unwrap_err();
    assert!(matches!(err, PipelineError::TransformFault { .. }));
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
}

#[test]
fn test_panicking_transform_is_a_fault() {
    let pipe = Pipeline::new(
        |x: u32| {
            if x == 3 {
                panic!("boom");
            }
            Ok(x)
        },
        StageOpts::named("panicky"),
    )
    .unwrap();
    pipe.add_all(1..=5).unwrap();
    pipe.complete_adding();

    let err = pipe.to_list().unwrap().wait().unwrap_err();
    assert!(matches!(err, PipelineError::WorkerPanicked { ref stage } if stage == "panicky"));
}

// --- API misuse ---

#[test]
fn test_consume_output_twice_fails() {
    let pipe = Pipeline::new(add_sync, opts(1)).unwrap();
    let first = pipe.consume_output(|_| {}).unwrap();
    assert!(matches!(
        pipe.consume_output(|_| {}),
        Err(PipelineError::ConsumerAlreadyAttached)
    ));
    assert!(matches!(
        pipe.to_list(),
        Err(PipelineError::ConsumerAlreadyAttached)
    ));

    let other = Pipeline::new(add_sync, opts(1)).unwrap();
    assert!(matches!(
        pipe.attach_output_to(&other),
        Err(PipelineError::ConsumerAlreadyAttached)
    ));

    pipe.complete_adding();
    first.wait().unwrap();
    other.complete_adding();
}

#[test]
fn test_add_after_complete_fails() {
    let pipe = Pipeline::new(add_sync, opts(1)).unwrap();
    pipe.add("1".to_string()).unwrap();
    pipe.complete_adding();
    assert!(matches!(
        pipe.add("2".to_string()),
        Err(PipelineError::ChannelClosed)
    ));
    assert_eq!(pipe.to_list().unwrap().wait().unwrap(), strings(&["1 sync"]));
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
    assert!(matches!(
        pipe.add("3".to_string()),
        Err(PipelineError::ChannelClosed)
    ));
}

#[test]
fn test_zero_workers_rejected() {
    let res = Pipeline::new(add_sync, opts(0));
    assert!(matches!(res, Err(PipelineError::InvalidWorkerCount)));
}

#[test]
fn test_completed_flag_lifecycle() {
    let pipe = Pipeline::new(add_sync, opts(2)).unwrap();
    assert!(!pipe.is_completed());
    assert_eq!(pipe.worker_count(), 2);
    pipe.add("1".to_string()).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(!pipe.is_completed());

    pipe.complete_adding();
    pipe.to_list().unwrap().wait().unwrap();
    assert!(wait_until_completed(&pipe, Duration::from_secs(5)));
    assert_eq!(pipe.pending_input(), 0);
}
