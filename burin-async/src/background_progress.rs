//! A progress object that reports thread-safely over a channel.

use crate::channel;
use crate::progress::Progress;
use std::sync::Arc;

/// A [`Progress`] that becomes cancelled as soon as its channel closes and
/// delivers progress samples by running a callback on the channel's
/// destination thread.
///
/// This is the bridge between a worker thread and main-thread progress UI:
/// the worker reports into this object, and the callback runs wherever the
/// [`Dest`](channel::Dest) is polled.
pub struct BackgroundProgress {
    source: channel::Source,
    on_progress: Arc<dyn Fn(f64) + Send + Sync>,
}

impl BackgroundProgress {
    /// Construct a background progress reporting over `source`.
    pub fn new(source: channel::Source, on_progress: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            source,
            on_progress: Arc::new(on_progress),
        }
    }

    /// Access the underlying channel source, e.g. to submit a final result.
    pub fn source(&self) -> &channel::Source {
        &self.source
    }
}

impl Progress for BackgroundProgress {
    fn keepgoing(&self) -> bool {
        self.source.is_open()
    }

    fn report(&self, fraction: f64) -> bool {
        let on_progress = Arc::clone(&self.on_progress);
        self.source.run(move || on_progress(fraction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reports_are_delivered_through_the_channel() {
        let (src, dst) = channel::create();
        let samples = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&samples);
        let progress = BackgroundProgress::new(src, move |fraction| {
            sink.lock().unwrap().push(fraction);
        });

        assert!(progress.report(0.25));
        assert!(progress.report(0.75));
        assert!(samples.lock().unwrap().is_empty());

        dst.poll();
        assert_eq!(*samples.lock().unwrap(), vec![0.25, 0.75]);

        dst.close();
        assert!(!progress.keepgoing());
        assert!(!progress.report(1.0));
    }
}
