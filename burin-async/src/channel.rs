//! One-way, thread-safe submission of closures to a main-loop consumer.
//!
//! A channel is created as a linked [`Source`]/[`Dest`] pair. The source end,
//! typically moved into a worker thread, submits closures with
//! [`Source::run`]; the destination end stays with the loop that created the
//! channel and drains them with [`Dest::poll`] or [`Dest::wait`]. Closing
//! either end stops all further execution: every accepted closure either runs
//! or is dropped on the destination's thread.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};

type Closure = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    state: Mutex<State>,
}

struct State {
    open: bool,
    log: Vec<Closure>,
}

impl Shared {
    fn is_open(&self) -> bool {
        self.state.lock().map(|state| state.open).unwrap_or(false)
    }
}

/// The submitting end of a channel.
///
/// Movable across threads, but deliberately not cloneable; closure ordering
/// is only defined per source.
pub struct Source {
    shared: Arc<Shared>,
    wake: Sender<()>,
}

impl Source {
    /// Submit a closure for execution on the destination's thread.
    ///
    /// Returns whether the channel was still open at the time of the call. A
    /// return value of true does not mean the closure will run: the channel
    /// can close in the meantime, in which case the closure is dropped on the
    /// destination's thread. It will never run after [`Dest::close`].
    pub fn run(&self, f: impl FnOnce() + Send + 'static) -> bool {
        let Ok(mut state) = self.shared.state.lock() else {
            return false;
        };
        if !state.open {
            return false;
        }
        if state.log.is_empty() {
            // First pending closure since the last drain; wake the consumer.
            let _ = self.wake.send(());
        }
        state.log.push(Box::new(f));
        true
    }

    /// Check whether the channel is still open.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Release this end of the channel. No more closures can be submitted.
    pub fn close(self) {}
}

/// The consuming end of a channel.
///
/// Must be polled from the thread whose loop should execute the submitted
/// closures. Dropping the destination closes the channel.
pub struct Dest {
    shared: Arc<Shared>,
    wake: Receiver<()>,
}

impl Dest {
    /// Execute all currently pending closures, in submission order.
    ///
    /// The open flag is re-checked between closures, so a closure that closes
    /// the channel prevents the remaining ones from running; they are dropped
    /// on this thread. Returns the number of closures executed.
    pub fn poll(&self) -> usize {
        let mut executed = 0;
        loop {
            let grabbed = {
                let Ok(mut state) = self.shared.state.lock() else {
                    return executed;
                };
                if !state.open || state.log.is_empty() {
                    return executed;
                }
                std::mem::take(&mut state.log)
            };
            for f in grabbed {
                if !self.shared.is_open() {
                    // The rest of the batch is dropped here, on our thread.
                    return executed;
                }
                f();
                executed += 1;
            }
        }
    }

    /// Block until at least one closure has been submitted, then poll.
    ///
    /// Returns false without polling if the channel is closed or every source
    /// has been released.
    pub fn wait(&self) -> bool {
        if !self.shared.is_open() {
            return false;
        }
        match self.wake.recv() {
            Ok(()) => {
                self.poll();
                true
            }
            Err(_) => {
                // All sources are gone; drain whatever they left behind.
                self.poll();
                false
            }
        }
    }

    /// Check whether [`close`](Self::close) has not been called yet.
    ///
    /// This does not reflect whether the source end is still alive; that
    /// condition is meaningless without further synchronisation.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Close the channel.
    ///
    /// All pending closures are dropped on the calling thread and every
    /// future [`Source::run`] returns false without running its closure.
    pub fn close(&self) {
        let dropped = {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };
            state.open = false;
            std::mem::take(&mut state.log)
        };
        // Dropped outside the lock; a closure's destructor may touch the
        // channel again.
        drop(dropped);
    }
}

impl Drop for Dest {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create a linked source/destination pair forming a channel.
pub fn create() -> (Source, Dest) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            open: true,
            log: Vec::new(),
        }),
    });
    let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
    (
        Source {
            shared: Arc::clone(&shared),
            wake: wake_tx,
        },
        Dest {
            shared,
            wake: wake_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_run_in_submission_order() {
        let (src, dst) = create();
        let results = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let results = Arc::clone(&results);
            assert!(src.run(move || results.lock().unwrap().push(i)));
        }
        assert_eq!(dst.poll(), 3);
        assert_eq!(*results.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn run_fails_after_dest_close() {
        let (src, dst) = create();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran1 = Arc::clone(&ran);
        let ran2 = Arc::clone(&ran);
        assert!(src.run(move || {
            ran1.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(src.run(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        dst.close();
        assert!(!src.is_open());

        let ran3 = Arc::clone(&ran);
        assert!(!src.run(move || {
            ran3.fetch_add(1, Ordering::SeqCst);
        }));

        // Nothing runs after close, including the accepted closures.
        assert_eq!(dst.poll(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_dest_closes_the_channel() {
        let (src, dst) = create();
        assert!(src.is_open());
        drop(dst);
        assert!(!src.is_open());
        assert!(!src.run(|| {}));
    }

    #[test]
    fn pending_closures_drop_on_dest_close() {
        struct NoteDrop(Arc<AtomicUsize>);
        impl Drop for NoteDrop {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (src, dst) = create();
        let drops = Arc::new(AtomicUsize::new(0));
        let note = NoteDrop(Arc::clone(&drops));
        assert!(src.run(move || {
            let _keep = &note;
            unreachable!("must not run after close");
        }));

        dst.close();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_thread_submissions_drain_fifo() {
        let (src, dst) = create();
        let results = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let results = Arc::clone(&results);
            std::thread::spawn(move || {
                for i in 0..100 {
                    let results = Arc::clone(&results);
                    assert!(src.run(move || results.lock().unwrap().push(i)));
                }
            })
        };
        worker.join().unwrap();

        while dst.wait() {
            if results.lock().unwrap().len() == 100 {
                break;
            }
        }
        dst.poll();

        let results = results.lock().unwrap();
        assert_eq!(*results, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn wait_returns_false_once_sources_are_gone() {
        let (src, dst) = create();
        drop(src);
        assert!(!dst.wait());
    }
}
