use crate::runtime::task::Task;

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Returns the `RawWakerVTable` for a task of type `T`.
///
/// Besides reference counting the task, every vtable entry keeps the task's
/// count of live wakers up to date. The scheduler reads that count after a
/// `Pending` poll to detect tasks that suspended without leaving a way to be
/// woken.
fn vtable<T: Send + 'static>() -> &'static RawWakerVTable {
    &RawWakerVTable::new(
        clone_raw::<T>,
        wake_raw::<T>,
        wake_by_ref_raw::<T>,
        drop_raw::<T>,
    )
}

/// Creates a [`Waker`] bound to a runtime task.
///
/// The pointer stored in the `RawWaker` comes from `Arc::into_raw` and every
/// vtable function below restores it with `Arc::from_raw`, keeping the strong
/// count balanced.
pub(crate) fn make_waker<T: Send + 'static>(task: Arc<Task<T>>) -> Waker {
    task.header.wakers.fetch_add(1, Ordering::Relaxed);

    unsafe {
        Waker::from_raw(RawWaker::new(
            Arc::into_raw(task) as *const (),
            vtable::<T>(),
        ))
    }
}

/// Borrows the task behind a raw waker pointer without touching its
/// reference count.
fn borrow_task<T: Send + 'static>(ptr: *const ()) -> ManuallyDrop<Arc<Task<T>>> {
    ManuallyDrop::new(unsafe { Arc::from_raw(ptr as *const Task<T>) })
}

fn clone_raw<T: Send + 'static>(ptr: *const ()) -> RawWaker {
    let task = borrow_task::<T>(ptr);
    task.header.wakers.fetch_add(1, Ordering::Relaxed);

    let cloned = Arc::clone(&task);
    RawWaker::new(Arc::into_raw(cloned) as *const (), vtable::<T>())
}

/// Wakes the task and consumes the waker.
///
/// The live-waker count is only decremented after the wake so that the
/// task is never observed suspended with no waker while a wake is in
/// flight.
fn wake_raw<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) };
    Task::wake_by_ref(&task);
    task.header.wakers.fetch_sub(1, Ordering::Release);
}

fn wake_by_ref_raw<T: Send + 'static>(ptr: *const ()) {
    let task = borrow_task::<T>(ptr);
    Task::wake_by_ref(&task);
}

fn drop_raw<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) };
    task.header.wakers.fetch_sub(1, Ordering::Release);
}
