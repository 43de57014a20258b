//! Integration tests for fan-out/join.
//!
//! Covers:
//! - caller-order results from `execute_multi`
//! - failure propagation and recovery on the next batch
//! - argument and overlap checks
//! - join timeouts for `execute_multi` and `await_sub_coroutines`

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use strand_runtime::{
    current_id, BoxError, CoroutineConfig, CoroutineError, CoroutineManager, Rebind,
};
use strand_types::{CoroutineId, ErrorCode};

// =============================================================================
// Fixtures
// =============================================================================

fn manager() -> CoroutineManager {
    CoroutineManager::new(CoroutineConfig {
        max_subcoroutine_exec_time: 2,
        ..Default::default()
    })
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Row that records the hand-over hooks it went through.
#[derive(Debug)]
struct Row {
    value: u32,
    producer: CoroutineId,
    released_by: Option<CoroutineId>,
    owner: Option<CoroutineId>,
}

impl Rebind for Row {
    fn release(&mut self, from: CoroutineId) {
        self.released_by = Some(from);
        self.owner = None;
    }

    fn rebind(&mut self, new_owner: CoroutineId) {
        self.owner = Some(new_owner);
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_follow_caller_order() {
    let manager = manager();
    let worker = manager.clone();
    let finished = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&finished);

    let results = manager
        .init((), async move {
            let bodies = [(50_u64, 1_i32), (0, 2)].map(|(delay, value)| {
                let log = Arc::clone(&log);
                async move {
                    sleep_ms(delay).await;
                    log.lock().push(value);
                    Ok::<_, BoxError>(value)
                }
            });
            worker.execute_multi(bodies).await
        })
        .await
        .unwrap();

    assert_eq!(results, vec![1, 2]);
    assert_eq!(*finished.lock(), vec![2, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn larger_batch_is_reordered() {
    let manager = manager();
    let worker = manager.clone();

    let results = manager
        .init((), async move {
            let bodies = (0..10_u64).map(|n| async move {
                sleep_ms((10 - n) * 3).await;
                Ok::<_, BoxError>(n * n)
            });
            worker.execute_multi(bodies).await
        })
        .await
        .unwrap();

    assert_eq!(results, (0..10_u64).map(|n| n * n).collect::<Vec<_>>());
}

#[tokio::test]
async fn values_are_rebound_to_the_caller() {
    let manager = manager();
    let worker = manager.clone();

    let (root, rows) = manager
        .init((), async move {
            let root = current_id()?;
            let bodies = (1..=2_u32).map(|value| async move {
                let producer = current_id()?;
                Ok::<_, BoxError>(Row {
                    value,
                    producer,
                    released_by: None,
                    owner: Some(producer),
                })
            });
            let rows = worker.execute_multi(bodies).await?;
            Ok::<_, CoroutineError>((root, rows))
        })
        .await
        .unwrap();

    assert_eq!(rows.iter().map(|r| r.value).collect::<Vec<_>>(), vec![1, 2]);
    for row in rows {
        assert_ne!(row.producer, root);
        assert_eq!(row.released_by, Some(row.producer));
        assert_eq!(row.owner, Some(root));
    }
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_body_is_reraised_and_next_batch_runs() {
    let manager = manager();
    let worker = manager.clone();

    let (first, second) = manager
        .init((), async move {
            let first = worker
                .execute_multi([0_u32, 1, 2].map(|n| async move {
                    if n == 1 {
                        return Err::<u32, BoxError>("duplicate key".into());
                    }
                    sleep_ms(30).await;
                    Ok(n)
                }))
                .await;

            // Outlives the late siblings of the first batch.
            let second = worker
                .execute_multi([10_u32, 20].map(|n| async move {
                    sleep_ms(60).await;
                    Ok::<_, BoxError>(n)
                }))
                .await;

            Ok::<_, CoroutineError>((first, second))
        })
        .await
        .unwrap();

    let err = first.unwrap_err();
    assert_eq!(err.code(), "COROUTINE_CHILD_FAILURE");
    let CoroutineError::ChildFailure(failure) = err else {
        panic!("expected ChildFailure");
    };
    assert_eq!(failure.message(), "duplicate key");
    assert!(!failure.is_panic());
    assert!(failure.key().is_some());

    assert_eq!(second.unwrap(), vec![10, 20]);
}

#[tokio::test]
async fn panicking_body_becomes_child_failure() {
    let manager = manager();
    let worker = manager.clone();

    let err = manager
        .init((), async move {
            worker
                .execute_multi([true].map(|explode| async move {
                    if explode {
                        panic!("cursor overflow");
                    }
                    Ok::<_, BoxError>(0_u8)
                }))
                .await
        })
        .await
        .unwrap_err();

    let CoroutineError::ChildFailure(failure) = err else {
        panic!("expected ChildFailure, got {err:?}");
    };
    assert!(failure.is_panic());
    assert_eq!(failure.message(), "cursor overflow");

    let backtrace = failure.backtrace().unwrap();
    assert_eq!(
        backtrace.coroutines(),
        vec![failure.coroutine(), CoroutineId::from_raw(1)]
    );
    assert!(backtrace.is_captured());
}

#[tokio::test]
async fn anyhow_errors_are_accepted() {
    let manager = manager();
    let worker = manager.clone();

    let err = manager
        .init((), async move {
            worker
                .execute_multi([7_u8].map(|shard| async move {
                    anyhow::ensure!(shard < 5, "shard {shard} out of range");
                    Ok::<_, anyhow::Error>(shard)
                }))
                .await
        })
        .await
        .unwrap_err();

    let CoroutineError::ChildFailure(failure) = err else {
        panic!("expected ChildFailure, got {err:?}");
    };
    assert_eq!(failure.message(), "shard 7 out of range");
}

#[tokio::test]
async fn root_error_is_keyless_child_failure() {
    let manager = manager();
    let err = manager
        .init((), async { Err::<(), BoxError>("render failed".into()) })
        .await
        .unwrap_err();

    let CoroutineError::ChildFailure(failure) = err else {
        panic!("expected ChildFailure, got {err:?}");
    };
    assert_eq!(failure.key(), None);
    assert_eq!(failure.coroutine(), CoroutineId::from_raw(1));
    assert_eq!(failure.message(), "render failed");
}

// =============================================================================
// Argument checks
// =============================================================================

#[tokio::test]
async fn empty_batch_is_rejected_without_spawning() {
    let manager = manager();
    let worker = manager.clone();

    let err = manager
        .init((), async move {
            worker
                .execute_multi(std::iter::empty::<std::future::Ready<Result<u8, BoxError>>>())
                .await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoroutineError::InvalidArgument(_)));
    assert_eq!(manager.stats().spawned, 1);
}

#[tokio::test]
async fn overlapping_batches_are_rejected() {
    let manager = manager();
    let worker = manager.clone();

    let (first, second) = manager
        .init((), async move {
            let slow = [1_u8].map(|n| async move {
                sleep_ms(20).await;
                Ok::<_, BoxError>(n)
            });
            let fast = [2_u8].map(|n| async move { Ok::<_, BoxError>(n) });

            let results = tokio::join!(worker.execute_multi(slow), worker.execute_multi(fast));
            Ok::<_, CoroutineError>(results)
        })
        .await
        .unwrap();

    assert_eq!(first.unwrap(), vec![1]);
    assert_eq!(
        second.unwrap_err(),
        CoroutineError::AlreadyRunning(CoroutineId::from_raw(1))
    );
}

#[tokio::test]
async fn batch_flag_clears_after_failure() {
    let manager = manager();
    let worker = manager.clone();

    let running = manager
        .init((), async move {
            let _ = worker
                .execute_multi([()].map(|_| async { Err::<u8, BoxError>("nope".into()) }))
                .await;
            Ok::<_, CoroutineError>(strand_runtime::current()?.is_batch_running())
        })
        .await
        .unwrap();

    assert!(!running);
}

#[tokio::test]
async fn outside_a_coroutine_is_rejected() {
    let manager = manager();

    let created = manager.create(async { Ok::<_, BoxError>(1_u8) });
    assert_eq!(created.unwrap_err(), CoroutineError::NotInCoroutine);

    let joined = manager
        .execute_multi([async { Ok::<_, BoxError>(1_u8) }])
        .await;
    assert_eq!(joined.unwrap_err(), CoroutineError::NotInCoroutine);

    let awaited = manager.await_sub_coroutines(1, Duration::from_millis(5)).await;
    assert_eq!(awaited.unwrap_err(), CoroutineError::NotInCoroutine);
    assert_eq!(manager.stats().spawned, 0);
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test]
async fn execute_multi_times_out() {
    let manager = manager();
    let worker = manager.clone();
    let timeout = Duration::from_millis(20);

    let err = manager
        .init((), async move {
            worker
                .execute_multi_with_timeout(
                    [300_u64].map(|ms| async move {
                        sleep_ms(ms).await;
                        Ok::<_, BoxError>(ms)
                    }),
                    timeout,
                )
                .await
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CoroutineError::Timeout {
            expected: 1,
            received: 0,
            timeout
        }
    );
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn await_sub_coroutines_collects_envelopes() {
    let manager = manager();
    let worker = manager.clone();

    let envelopes = manager
        .init((), async move {
            let fast = worker.create(async { Ok::<_, BoxError>(7_u32) })?;
            let failing = worker.create(async { Err::<u32, BoxError>("gone".into()) })?;
            let envelopes = worker.await_sub_coroutines(2, Duration::from_secs(1)).await?;
            Ok::<_, CoroutineError>((fast, failing, envelopes))
        })
        .await
        .unwrap();

    let (fast, failing, envelopes) = envelopes;
    assert_eq!(envelopes.len(), 2);
    for envelope in envelopes {
        if envelope.coroutine == fast {
            assert_eq!(envelope.into_value::<u32>(), Some(7));
        } else {
            assert_eq!(envelope.coroutine, failing);
            assert!(envelope.is_failure());
        }
    }
}

#[tokio::test]
async fn await_sub_coroutines_times_out() {
    let manager = manager();
    let worker = manager.clone();
    let timeout = Duration::from_millis(30);

    let err = manager
        .init((), async move {
            worker.create(async { Ok::<_, BoxError>(1_u8) })?;
            worker.await_sub_coroutines(2, timeout).await
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CoroutineError::Timeout {
            expected: 2,
            received: 1,
            timeout
        }
    );
}
