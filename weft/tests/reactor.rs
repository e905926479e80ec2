use rstest::rstest;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;
use weft::io::Async;
use weft::reactor::{Direction, Interest, ResourceError};
use weft::runtime::Builder;
use weft::task::TaskState;
use weft::time::{sleep, timeout};
use weft::spawn;

async fn wait_for_state<T: Send + 'static>(handle: &weft::task::JoinHandle<T>, state: TaskState) {
    timeout(Duration::from_secs(5), async {
        while handle.state() != state {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("task never reached the expected state");
}

#[test]
fn test_readiness_wakes_only_its_task() {
    let rt = Builder::new_multi_thread().worker_threads(2).build().unwrap();
    let reactor = rt.handle().reactor().clone();

    rt.block_on(async {
        let (a_rx, mut a_tx) = UnixStream::pair().unwrap();
        let (b_rx, _b_tx) = UnixStream::pair().unwrap();

        let a_rx = Async::new(a_rx).unwrap();
        let b_rx = Async::new(b_rx).unwrap();

        let a = spawn(async move {
            let mut buf = [0; 4];
            let n = a_rx.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });
        let b = spawn(async move {
            let mut buf = [0; 4];
            b_rx.read(&mut buf).await.unwrap()
        });

        wait_for_state(&a, TaskState::Suspended).await;
        wait_for_state(&b, TaskState::Suspended).await;
        assert_eq!(reactor.registration_count(), 2);

        a_tx.write_all(b"ping").unwrap();
        assert_eq!(a.await.unwrap(), b"ping");

        // Give a stray wake the time to show up.
        sleep(Duration::from_millis(20)).await;
        assert_eq!(b.state(), TaskState::Suspended);
        assert!(!b.is_finished());

        b.abort();
        assert!(b.await.unwrap_err().is_cancelled());
    });

    assert_eq!(reactor.registration_count(), 0);
}

#[test]
fn test_large_write_waits_for_reader() {
    let rt = Builder::new_multi_thread().worker_threads(2).build().unwrap();
    const LEN: usize = 4 * 1024 * 1024;

    rt.block_on(async {
        let (tx, rx) = UnixStream::pair().unwrap();
        let tx = Async::new(tx).unwrap();
        let rx = Async::new(rx).unwrap();

        let writer = spawn(async move {
            let data = vec![7u8; LEN];
            tx.write_all(&data).await.unwrap();
        });

        let mut received = 0;
        let mut buf = vec![0; 64 * 1024];
        while received < LEN {
            let n = rx.read(&mut buf).await.unwrap();
            assert!(n > 0);
            assert!(buf[..n].iter().all(|&b| b == 7));
            received += n;
        }

        writer.await.unwrap();
        assert_eq!(received, LEN);
    });
}

#[test]
fn test_timeout_loser_releases_registration() {
    let rt = Builder::new_current_thread().build().unwrap();
    let reactor = rt.handle().reactor().clone();

    rt.block_on(async {
        let (rx, _tx) = UnixStream::pair().unwrap();

        let out = timeout(Duration::from_millis(10), async move {
            let rx = Async::new(rx).unwrap();
            let mut buf = [0; 1];
            rx.read(&mut buf).await
        })
        .await;

        assert!(out.is_err());
        assert_eq!(reactor.registration_count(), 0);
        assert_eq!(reactor.timer_count(), 0);
    });
}

#[test]
fn test_raw_registration_errors() {
    let rt = Builder::new_current_thread().build().unwrap();
    let reactor = rt.handle().reactor().clone();

    rt.block_on(async {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();

        let token = reactor.register(a.as_raw_fd(), Interest::READABLE).unwrap();

        let err = reactor.readiness(token, Direction::Write).await.unwrap_err();
        assert!(matches!(err, ResourceError::InterestNotRegistered { .. }));

        b.write_all(b"x").unwrap();
        reactor.readiness(token, Direction::Read).await.unwrap();

        let mut byte = [0; 1];
        (&a).read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"x");

        reactor.deregister(token);
        assert!(matches!(
            reactor.readiness(token, Direction::Read).await,
            Err(ResourceError::UnknownToken(_))
        ));
    });
}

#[test]
fn test_reactor_handle_from_context() {
    let rt = Builder::new_current_thread().build().unwrap();

    assert!(weft::reactor::Handle::try_current().is_none());
    rt.block_on(async {
        let reactor = weft::reactor::Handle::current();
        assert_eq!(reactor.registration_count(), 0);
    });
}

#[derive(Clone, Copy, Debug)]
enum GiveUp {
    Abort,
    Timeout,
}

#[rstest]
#[case::abort(GiveUp::Abort)]
#[case::timeout(GiveUp::Timeout)]
fn test_abandoned_read_leaves_no_waiter(#[case] give_up: GiveUp) {
    let rt = Builder::new_multi_thread().worker_threads(2).build().unwrap();
    let reactor = rt.handle().reactor().clone();

    rt.block_on(async {
        let (rx, mut tx) = UnixStream::pair().unwrap();
        let rx = Arc::new(Async::new(rx).unwrap());
        let marker = Arc::new(());

        match give_up {
            GiveUp::Abort => {
                let reader = {
                    let (rx, marker) = (rx.clone(), marker.clone());
                    spawn(async move {
                        let _marker = marker;
                        let mut buf = [0; 4];
                        rx.read(&mut buf).await
                    })
                };
                wait_for_state(&reader, TaskState::Suspended).await;
                assert_eq!(reactor.waiter_count(), 1);

                reader.abort();
                assert!(reader.await.unwrap_err().is_cancelled());
            }
            GiveUp::Timeout => {
                let mut buf = [0; 4];
                let out = timeout(Duration::from_millis(10), rx.read(&mut buf)).await;
                assert!(out.is_err());
            }
        }

        // The `Async` is still alive and registered, but nobody waits on it.
        assert_eq!(reactor.registration_count(), 1);
        assert_eq!(reactor.waiter_count(), 0);
        assert_eq!(Arc::strong_count(&marker), 1);

        // A later reader still gets woken.
        tx.write_all(b"pong").unwrap();
        let mut buf = [0; 4];
        assert_eq!(rx.read(&mut buf).await.unwrap(), 4);
    });

    assert_eq!(reactor.registration_count(), 0);
}

struct WakeCounter(AtomicUsize);

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_failed_rearm_wakes_the_other_direction() {
    let rt = Builder::new_current_thread().build().unwrap();
    let reactor = rt.handle().reactor().clone();

    let (mut a, _b) = UnixStream::pair().unwrap();
    a.set_nonblocking(true).unwrap();

    // Fill the send buffer so that a writer has to wait.
    let chunk = [0u8; 4096];
    loop {
        match a.write(&chunk) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => panic!("unexpected write error: {err}"),
        }
    }

    let token = reactor.register(a.as_raw_fd(), Interest::BOTH).unwrap();

    let writer = Arc::new(WakeCounter(AtomicUsize::new(0)));
    let writer_waker = Waker::from(writer.clone());
    let mut writer_cx = Context::from_waker(&writer_waker);
    assert!(reactor.poll_ready(token, Direction::Write, &mut writer_cx).is_pending());

    // Closing the descriptor makes the next re-arm fail.
    drop(a);

    let mut reader_cx = Context::from_waker(Waker::noop());
    assert!(matches!(
        reactor.poll_ready(token, Direction::Read, &mut reader_cx),
        Poll::Ready(Err(ResourceError::Io(_)))
    ));

    assert_eq!(writer.0.load(Ordering::SeqCst), 1);
    assert!(matches!(
        reactor.poll_ready(token, Direction::Write, &mut writer_cx),
        Poll::Ready(Err(ResourceError::Io(_)))
    ));
    assert_eq!(reactor.waiter_count(), 0);

    reactor.deregister(token);
    assert_eq!(reactor.registration_count(), 0);
}
