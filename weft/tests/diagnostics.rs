use std::future::poll_fn;
use std::task::Poll;
use std::time::Duration;
use weft::diagnostics::{TaskEvent, TaskEventKind};
use weft::runtime::Builder;
use weft::spawn;
use weft::time::{sleep, timeout};

fn explode(message: &'static str) {
    panic!("{message}")
}

fn kinds_of(events: &[TaskEvent], id: weft::task::Id) -> Vec<TaskEventKind> {
    events.iter().filter(|e| e.id == id).map(|e| e.kind).collect()
}

#[test]
fn test_disabled_by_default() {
    let rt = Builder::new_current_thread().build().unwrap();
    assert!(rt.diagnostics().is_none());
}

#[test]
fn test_lifecycle_of_a_completed_task() {
    let rt = Builder::new_current_thread().enable_diagnostics(64).build().unwrap();
    let diagnostics = rt.diagnostics().unwrap();

    let id = rt.block_on(async {
        let handle = spawn(async {});
        let id = handle.id();
        handle.await.unwrap();
        id
    });

    let events = diagnostics.drain();
    assert_eq!(
        kinds_of(&events, id),
        [TaskEventKind::Scheduled, TaskEventKind::Running, TaskEventKind::Completed]
    );

    let completed = events.iter().find(|e| e.kind == TaskEventKind::Completed).unwrap();
    assert!(completed.poll_duration.is_some());
}

#[test]
fn test_suspend_and_wake_are_recorded() {
    let rt = Builder::new_current_thread().enable_diagnostics(64).build().unwrap();
    let diagnostics = rt.diagnostics().unwrap();

    let id = rt.block_on(async {
        let handle = spawn(sleep(Duration::from_millis(5)));
        let id = handle.id();
        handle.await.unwrap();
        id
    });

    assert_eq!(
        kinds_of(&diagnostics.drain(), id),
        [
            TaskEventKind::Scheduled,
            TaskEventKind::Running,
            TaskEventKind::Suspended,
            TaskEventKind::Scheduled,
            TaskEventKind::Running,
            TaskEventKind::Completed,
        ]
    );
}

#[test]
fn test_observed_and_unobserved_panics() {
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_diagnostics(64)
        .build()
        .unwrap();
    let diagnostics = rt.diagnostics().unwrap();

    let unobserved_panic = TaskEventKind::Panicked { observed: false };

    let (observed, unobserved, events) = rt.block_on(async {
        let observed = spawn(async { explode("observed") });
        let observed_id = observed.id();
        assert!(observed.await.unwrap_err().is_panic());

        let unobserved = spawn(async {
            sleep(Duration::from_millis(5)).await;
            explode("unobserved")
        });
        let unobserved_id = unobserved.id();
        drop(unobserved);

        let mut events = Vec::new();
        timeout(Duration::from_secs(5), async {
            while !events.iter().any(|e: &TaskEvent| e.kind == unobserved_panic) {
                events.extend(diagnostics.drain());
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        (observed_id, unobserved_id, events)
    });

    assert!(kinds_of(&events, observed).contains(&TaskEventKind::Panicked { observed: true }));
    assert!(!kinds_of(&events, observed).contains(&unobserved_panic));
    assert!(kinds_of(&events, unobserved).contains(&unobserved_panic));
}

#[test]
fn test_pending_without_waker_is_reported() {
    let rt = Builder::new_current_thread().enable_diagnostics(64).build().unwrap();
    let diagnostics = rt.diagnostics().unwrap();

    let id = rt.block_on(async {
        let handle = spawn(poll_fn(|_cx| Poll::<()>::Pending));
        let id = handle.id();
        weft::yield_now().await;
        handle.abort();
        id
    });

    assert_eq!(
        kinds_of(&diagnostics.drain(), id),
        [
            TaskEventKind::Scheduled,
            TaskEventKind::Running,
            TaskEventKind::Suspended,
            TaskEventKind::LivenessViolation,
            TaskEventKind::Cancelled,
        ]
    );
}

#[test]
fn test_full_queue_drops_events_but_not_wakes() {
    let rt = Builder::new_current_thread().enable_diagnostics(4).build().unwrap();
    let diagnostics = rt.diagnostics().unwrap();

    let sum = rt.block_on(async {
        let handles: Vec<_> = (0..50u32)
            .map(|i| {
                spawn(async move {
                    sleep(Duration::from_millis(1)).await;
                    i
                })
            })
            .collect();

        let mut sum = 0;
        for handle in handles {
            sum += handle.await.unwrap();
        }
        sum
    });

    assert_eq!(sum, (0..50).sum::<u32>());
    assert_eq!(diagnostics.len(), 4);
    assert!(diagnostics.dropped() > 0);
}
