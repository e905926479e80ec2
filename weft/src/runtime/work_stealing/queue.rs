use crate::runtime::task::Notified;

use crossbeam_deque::{Steal, Stealer, Worker};
use std::iter;

/// A per-worker local run queue.
///
/// Only the owning worker pushes and pops. Peers take work through the
/// matching [`Stealer`]. The queue is FIFO on both ends so that a task
/// re-queued after a wake runs after the tasks that were already waiting.
pub(crate) type LocalQueue = Worker<Notified>;

/// Upper bound on consecutive `Steal::Retry` results before a search gives
/// up for this round.
const MAX_STEAL_RETRIES: usize = 8;

/// Creates `n` local queues and the stealers that view them, index for index.
pub(crate) fn local_queues(n: usize) -> (Vec<LocalQueue>, Vec<Stealer<Notified>>) {
    (0..n)
        .map(|_| {
            let local = Worker::new_fifo();
            let stealer = local.stealer();
            (local, stealer)
        })
        .unzip()
}

/// Steals a batch of tasks from a peer queue into `dest` and pops one.
///
/// Victims are visited round-robin starting at `start`, skipping `own`.
/// The first successful steal wins; when every victim reports `Retry` the
/// search is repeated a bounded number of times.
pub(crate) fn steal_from_peers(
    stealers: &[Stealer<Notified>],
    own: usize,
    start: usize,
    dest: &LocalQueue,
) -> Option<Notified> {
    let len = stealers.len();

    if len <= 1 {
        return None;
    }

    iter::repeat_with(|| {
        (0..len)
            .map(|i| (start + i) % len)
            .filter(|&victim| victim != own)
            .map(|victim| stealers[victim].steal_batch_and_pop(dest))
            .collect::<Steal<Notified>>()
    })
    .take(MAX_STEAL_RETRIES)
    .find(|steal| !steal.is_retry())
    .and_then(|steal| steal.success())
}

/// Returns `true` if any peer queue other than `own` holds work.
pub(crate) fn peers_have_work(stealers: &[Stealer<Notified>], own: usize) -> bool {
    stealers
        .iter()
        .enumerate()
        .any(|(i, stealer)| i != own && !stealer.is_empty())
}
