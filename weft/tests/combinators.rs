use std::time::{Duration, Instant};
use weft::future::{Either, FutureExt, join, join_all, select};
use weft::runtime::Builder;
use weft::spawn;
use weft::time::sleep;

#[test]
fn test_join_runs_both_concurrently() {
    let rt = Builder::new_current_thread().build().unwrap();

    let start = Instant::now();
    let out = rt.block_on(join(
        sleep(Duration::from_millis(20)).map(|()| 'a'),
        sleep(Duration::from_millis(20)).map(|()| 'b'),
    ));

    assert_eq!(out, ('a', 'b'));
    // Both timers ran at the same time.
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_join_all_of_spawned_tasks() {
    let rt = Builder::new_multi_thread().worker_threads(2).build().unwrap();

    let out = rt.block_on(async {
        let handles = (0..8u64).map(|i| {
            spawn(async move {
                sleep(Duration::from_millis(8 - i)).await;
                i
            })
        });

        join_all(handles).await
    });

    let values: Vec<_> = out.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>());
}

#[test]
fn test_select_drops_the_loser_timer() {
    let rt = Builder::new_current_thread().build().unwrap();
    let reactor = rt.handle().reactor().clone();

    rt.block_on(async {
        let fast = Box::pin(sleep(Duration::from_millis(1)));
        let slow = Box::pin(sleep(Duration::from_secs(60)));

        match select(fast, slow).await {
            Either::Left(((), loser)) => {
                assert_eq!(reactor.timer_count(), 1);
                drop(loser);
            }
            Either::Right(_) => panic!("the 60s sleep won"),
        }

        assert_eq!(reactor.timer_count(), 0);
    });
}

#[test]
fn test_then_chains_async_stages() {
    let rt = Builder::new_multi_thread().worker_threads(2).build().unwrap();

    let out = rt.block_on(
        spawn(async { 20 })
            .map(Result::unwrap)
            .then(|n| async move {
                sleep(Duration::from_millis(1)).await;
                n + 1
            })
            .map(|n| n * 2),
    );

    assert_eq!(out, 42);
}
