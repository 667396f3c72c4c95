//! Progress reporting and cooperative cancellation.

use std::cell::Cell;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The error signalling that an operation noticed it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// An interface for tasks to report progress and check for cancellation.
///
/// Implementations are not required to be thread-safe; tasks running on a
/// worker thread should report through a thread-safe adapter such as
/// [`BackgroundProgress`](crate::BackgroundProgress).
pub trait Progress {
    /// Return whether the task should keep going.
    fn keepgoing(&self) -> bool;

    /// Record a progress sample in `[0, 1]`, returning false if cancelled.
    fn report(&self, fraction: f64) -> bool;

    /// Record a progress sample, failing with [`Cancelled`] if cancelled.
    fn report_or_cancel(&self, fraction: f64) -> Result<(), Cancelled> {
        if self.report(fraction) {
            Ok(())
        } else {
            Err(Cancelled)
        }
    }

    /// Fail with [`Cancelled`] if cancelled.
    fn check(&self) -> Result<(), Cancelled> {
        if self.keepgoing() { Ok(()) } else { Err(Cancelled) }
    }
}

/// A progress object representing a sub-task of a parent progress.
///
/// Reports in `[0, 1]` are remapped into `[from, from + amount]` of the
/// parent's range.
#[derive(Clone, Copy)]
pub struct SubProgress<'a> {
    root: &'a dyn Progress,
    from: f64,
    amount: f64,
}

impl<'a> SubProgress<'a> {
    /// Construct a progress object for a sub-task spanning
    /// `[from, from + amount]` of `parent`.
    pub fn new(parent: &'a dyn Progress, from: f64, amount: f64) -> Self {
        Self {
            root: parent,
            from,
            amount,
        }
    }

    /// Construct a nested sub-task of this sub-task.
    ///
    /// The affine maps are composed on construction and the result reports
    /// directly to the shared root, so chains of nested sub-tasks cost the
    /// same as a single one.
    pub fn sub(&self, from: f64, amount: f64) -> Self {
        Self {
            root: self.root,
            from: self.from + self.amount * from,
            amount: self.amount * amount,
        }
    }
}

impl Progress for SubProgress<'_> {
    fn keepgoing(&self) -> bool {
        self.root.keepgoing()
    }

    fn report(&self, fraction: f64) -> bool {
        self.root.report(self.from + self.amount * fraction)
    }
}

/// A progress object that forwards a report only when the value has moved at
/// least `step` since the last forwarded report.
pub struct ProgressStepThrottler<'a> {
    parent: &'a dyn Progress,
    step: f64,
    last: Cell<f64>,
}

impl<'a> ProgressStepThrottler<'a> {
    /// Construct a throttler forwarding to `parent` with the given step size.
    pub fn new(parent: &'a dyn Progress, step: f64) -> Self {
        Self {
            parent,
            step,
            last: Cell::new(0.0),
        }
    }
}

impl Progress for ProgressStepThrottler<'_> {
    fn keepgoing(&self) -> bool {
        self.parent.keepgoing()
    }

    fn report(&self, fraction: f64) -> bool {
        if fraction - self.last.get() < self.step {
            self.parent.keepgoing()
        } else {
            self.last.set(fraction);
            self.parent.report(fraction)
        }
    }
}

/// A progress object that forwards a report only when a wall-clock interval
/// has elapsed since the last forwarded report.
pub struct ProgressTimeThrottler<'a> {
    parent: &'a dyn Progress,
    interval: Duration,
    last: Cell<Instant>,
}

impl<'a> ProgressTimeThrottler<'a> {
    /// Construct a throttler forwarding to `parent` at most once per
    /// `interval`.
    pub fn new(parent: &'a dyn Progress, interval: Duration) -> Self {
        Self {
            parent,
            interval,
            last: Cell::new(Instant::now()),
        }
    }
}

impl Progress for ProgressTimeThrottler<'_> {
    fn keepgoing(&self) -> bool {
        self.parent.keepgoing()
    }

    fn report(&self, fraction: f64) -> bool {
        let now = Instant::now();
        if now - self.last.get() < self.interval {
            self.parent.keepgoing()
        } else {
            self.last.set(now);
            self.parent.report(fraction)
        }
    }
}

/// A progress object that never reports cancellation and discards samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressAlways;

impl Progress for ProgressAlways {
    fn keepgoing(&self) -> bool {
        true
    }

    fn report(&self, _fraction: f64) -> bool {
        true
    }
}

/// A builder for splitting a progress range into a dynamically-determined
/// collection of weighted sub-tasks.
///
/// Each [`add`](Self::add) or [`add_if`](Self::add_if) call reserves one
/// output slot; [`split`](Self::split) normalises the weights and yields one
/// [`SubProgress`] per slot, `None` where the condition was false.
pub struct ProgressSplitter<'a> {
    parent: &'a dyn Progress,
    entries: Vec<Option<f64>>,
}

impl<'a> ProgressSplitter<'a> {
    /// Construct a splitter for the given parent progress.
    pub fn new(parent: &'a dyn Progress) -> Self {
        Self {
            parent,
            entries: Vec::new(),
        }
    }

    /// Add a sub-task with the given relative weight.
    pub fn add(mut self, weight: f64) -> Self {
        self.entries.push(Some(weight));
        self
    }

    /// Add a sub-task with the given relative weight if `condition` holds,
    /// otherwise reserve an empty slot.
    pub fn add_if(mut self, condition: bool, weight: f64) -> Self {
        self.entries.push(condition.then_some(weight));
        self
    }

    /// Apportion the parent's range over the added sub-tasks.
    pub fn split(self) -> Vec<Option<SubProgress<'a>>> {
        let total: f64 = self.entries.iter().flatten().sum();
        if total <= 0.0 {
            return self.entries.iter().map(|_| None).collect();
        }

        let mut from = 0.0;
        self.entries
            .into_iter()
            .map(|weight| {
                weight.map(|weight| {
                    let sub = SubProgress::new(self.parent, from / total, weight / total);
                    from += weight;
                    sub
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mock {
        keepgoing: Cell<bool>,
        saved: Cell<f64>,
        reports: Cell<u32>,
        checks: Cell<u32>,
    }

    impl Mock {
        fn new(keepgoing: bool) -> Self {
            Self {
                keepgoing: Cell::new(keepgoing),
                saved: Cell::new(-1.0),
                reports: Cell::new(0),
                checks: Cell::new(0),
            }
        }
    }

    impl Progress for Mock {
        fn keepgoing(&self) -> bool {
            self.checks.set(self.checks.get() + 1);
            self.keepgoing.get()
        }

        fn report(&self, fraction: f64) -> bool {
            self.saved.set(fraction);
            self.reports.set(self.reports.get() + 1);
            self.keepgoing.get()
        }
    }

    #[test]
    fn subprogress_composes_affinely() {
        for keepgoing in [true, false] {
            let root = Mock::new(keepgoing);
            let b = SubProgress::new(&root, 0.25, 0.5);
            let c = b.sub(0.1, 0.2);

            let mut fraction = 0.0;
            while fraction < 1.0 {
                assert_eq!(c.report(fraction), keepgoing);
                let expected = 0.25 + 0.5 * (0.1 + 0.2 * fraction);
                assert!((root.saved.get() - expected).abs() < 1e-9);
                fraction += 0.3;
            }

            // keepgoing consults the root without reporting.
            root.saved.set(-1.0);
            assert_eq!(c.keepgoing(), keepgoing);
            assert_eq!(root.saved.get(), -1.0);
        }
    }

    #[test]
    fn cancellation_helpers() {
        let root = Mock::new(false);
        let sub = SubProgress::new(&root, 0.0, 1.0);
        assert_eq!(sub.report_or_cancel(0.5), Err(Cancelled));
        assert_eq!(sub.check(), Err(Cancelled));

        root.keepgoing.set(true);
        assert_eq!(sub.report_or_cancel(0.5), Ok(()));
        assert_eq!(sub.check(), Ok(()));
    }

    #[test]
    fn step_throttler_bounds_forwarded_reports() {
        let root = Mock::new(true);
        let throttled = ProgressStepThrottler::new(&root, 0.1);

        let n = 1000;
        for i in 0..n {
            let fraction = f64::from(i) / f64::from(n);
            throttled.report(fraction);
            assert!((fraction - root.saved.get().max(0.0)).abs() <= 0.11);
        }
        assert!(root.reports.get() >= 9);
        assert!(root.reports.get() <= 11);
    }

    #[test]
    fn time_throttler_passes_after_interval() {
        let root = Mock::new(true);
        let throttled = ProgressTimeThrottler::new(&root, Duration::ZERO);
        assert!(throttled.report(0.5));
        assert_eq!(root.reports.get(), 1);

        let root = Mock::new(true);
        let throttled = ProgressTimeThrottler::new(&root, Duration::from_secs(3600));
        assert!(throttled.report(0.5));
        // Within the interval the report is swallowed but keepgoing is polled.
        assert_eq!(root.reports.get(), 0);
        assert_eq!(root.checks.get(), 1);
    }

    #[test]
    fn splitter_apportions_normalised_weights() {
        let root = Mock::new(true);
        let parts = ProgressSplitter::new(&root)
            .add(0.25)
            .add(0.5)
            .add(0.25)
            .split();
        let [x, y, z] = parts.as_slice() else {
            panic!("expected three slots");
        };

        x.as_ref().unwrap().report(0.5);
        assert!((root.saved.get() - 0.125).abs() < 1e-9);
        y.as_ref().unwrap().report(0.5);
        assert!((root.saved.get() - 0.5).abs() < 1e-9);
        z.as_ref().unwrap().report(0.5);
        assert!((root.saved.get() - 0.875).abs() < 1e-9);
    }

    #[test]
    fn splitter_skips_disabled_entries() {
        let root = Mock::new(true);
        let parts = ProgressSplitter::new(&root)
            .add(1.0)
            .add_if(false, 2.0)
            .add(3.0)
            .split();
        let [x, y, z] = parts.as_slice() else {
            panic!("expected three slots");
        };

        assert!(y.is_none());
        let x = x.as_ref().unwrap();
        let z = z.as_ref().unwrap();

        x.report(0.0);
        assert!((root.saved.get() - 0.0).abs() < 1e-9);
        x.report(1.0);
        assert!((root.saved.get() - 0.25).abs() < 1e-9);
        z.report(0.0);
        assert!((root.saved.get() - 0.25).abs() < 1e-9);
        z.report(1.0);
        assert!((root.saved.get() - 1.0).abs() < 1e-9);
    }
}
