//! The asynchronous trace task: worker thread, progress plumbing and
//! result delivery.

use crate::engine::{SioxFilter, TraceResult, TracingEngine};
use burin_async::channel;
use burin_async::{BackgroundProgress, Progress, ProgressSplitter, ProgressTimeThrottler};
use image::{GrayImage, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Progress reports reaching the main loop are throttled to this interval.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

/// Failures to launch a trace; after an error no background work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TraceError {
    /// The image has no pixels.
    #[error("image has no bitmap data")]
    EmptyImage,
    /// The SIOX mask does not cover the image.
    #[error("mask dimensions do not match the image")]
    MaskMismatch,
    /// SIOX was requested but no mask was supplied, or vice versa.
    #[error("foreground mask and SIOX filter must be supplied together")]
    MaskWithoutFilter,
}

/// The validated input of a trace: the image and, when SIOX is enabled,
/// the rasterised foreground mask.
///
/// Resolving a document selection into this structure (and rasterising the
/// mask items) is the caller's job; the pipeline only checks consistency.
#[derive(Clone)]
pub struct TraceSetup {
    /// The image pixels. Shared immutably; the worker copies them before
    /// mutating.
    pub pixbuf: Arc<RgbaImage>,
    /// The foreground mask for SIOX, same dimensions as the image.
    pub siox_mask: Option<Arc<GrayImage>>,
}

impl TraceSetup {
    fn validate(&self, siox_enabled: bool) -> Result<(), TraceError> {
        if self.pixbuf.width() == 0 || self.pixbuf.height() == 0 {
            return Err(TraceError::EmptyImage);
        }
        if siox_enabled != self.siox_mask.is_some() {
            return Err(TraceError::MaskWithoutFilter);
        }
        if let Some(mask) = &self.siox_mask {
            if mask.dimensions() != self.pixbuf.dimensions() {
                return Err(TraceError::MaskMismatch);
            }
        }
        Ok(())
    }
}

/// A handle to a running trace.
///
/// The owner must pump [`poll`](Self::poll) (or [`wait`](Self::wait)) from
/// its main loop to receive progress and completion callbacks. Dropping
/// the future cancels the trace: the worker notices the closed channel and
/// exits without delivering anything.
pub struct TraceFuture {
    dest: channel::Dest,
}

impl TraceFuture {
    /// Cancel the trace. No callbacks run after this returns.
    pub fn cancel(&self) {
        self.dest.close();
    }

    /// Whether the future has not been cancelled yet.
    pub fn is_active(&self) -> bool {
        self.dest.is_open()
    }

    /// Run all pending callbacks; returns how many ran.
    pub fn poll(&self) -> usize {
        self.dest.poll()
    }

    /// Block until the worker submits callbacks, then run them. Returns
    /// false once the worker is gone and everything has been delivered.
    pub fn wait(&self) -> bool {
        self.dest.wait()
    }
}

/// Launch an asynchronous trace.
///
/// A worker thread copies the image, runs SIOX (when `siox` is supplied)
/// and then the engine, reporting throttled progress through `on_progress`.
/// `on_finished` runs exactly once afterwards with the result — empty when
/// the trace failed — unless the future is cancelled first, in which case
/// neither callback runs again.
pub fn launch_trace(
    mut engine: Box<dyn TracingEngine>,
    siox: Option<Box<dyn SioxFilter>>,
    setup: TraceSetup,
    on_progress: impl Fn(f64) + Send + Sync + 'static,
    on_finished: impl FnOnce(TraceResult) + Send + 'static,
) -> Result<TraceFuture, TraceError> {
    let siox_enabled = siox.is_some();
    setup.validate(siox_enabled)?;

    let (source, dest) = channel::create();

    std::thread::spawn(move || {
        let progress = BackgroundProgress::new(source, on_progress);
        let throttled = ProgressTimeThrottler::new(&progress, PROGRESS_INTERVAL);

        let mut parts = ProgressSplitter::new(&throttled)
            .add_if(siox_enabled, 0.1)
            .add(0.9)
            .split()
            .into_iter();
        let sub_siox = parts.next().flatten();
        let sub_trace = parts.next().flatten();

        // The shared pixbuf stays immutable; work on an owned copy.
        let mut pixbuf = (*setup.pixbuf).clone();

        if let (Some(mut siox), Some(mask), Some(sub)) = (siox, setup.siox_mask, sub_siox) {
            if siox
                .extract_foreground(&mut pixbuf, &mask, &sub)
                .and_then(|()| sub.report_or_cancel(1.0))
                .is_err()
            {
                return; // cancelled; exit without signalling
            }
        }

        let result = match sub_trace {
            Some(sub) => engine.trace(&pixbuf, &sub),
            None => engine.trace(&pixbuf, &progress),
        };
        let result = match result {
            Ok(result) => result,
            Err(_) => return, // cancelled
        };
        drop(pixbuf);

        if progress.report_or_cancel(1.0).is_err() {
            return;
        }

        // Hand the result to the main loop; if the channel closed in the
        // meantime the closure is simply dropped over there.
        let source = progress.source();
        if !source.run(move || on_finished(result)) {
            log::debug!("trace finished after cancellation; result discarded");
        }
    });

    Ok(TraceFuture { dest })
}

/// Launch an asynchronous preview.
///
/// Follows the same pipeline as [`launch_trace`] but calls the engine's
/// preview instead of tracing, and never touches the caller's document:
/// `on_finished` just receives the preview image, or `None` on failure.
pub fn launch_preview(
    mut engine: Box<dyn TracingEngine>,
    siox: Option<Box<dyn SioxFilter>>,
    setup: TraceSetup,
    on_finished: impl FnOnce(Option<RgbaImage>) + Send + 'static,
) -> Result<TraceFuture, TraceError> {
    let siox_enabled = siox.is_some();
    setup.validate(siox_enabled)?;

    let (source, dest) = channel::create();

    std::thread::spawn(move || {
        let progress = BackgroundProgress::new(source, |_| {});
        let mut pixbuf = (*setup.pixbuf).clone();

        if let (Some(mut siox), Some(mask)) = (siox, setup.siox_mask) {
            if siox
                .extract_foreground(&mut pixbuf, &mask, &progress)
                .is_err()
            {
                return;
            }
        }

        let preview = engine.preview(&pixbuf);
        let source = progress.source();
        if !source.run(move || on_finished(preview)) {
            log::debug!("preview finished after cancellation; result discarded");
        }
    });

    Ok(TraceFuture { dest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burin_async::Cancelled;
    use kurbo::BezPath;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubEngine {
        steps: u32,
    }

    impl TracingEngine for StubEngine {
        fn trace(
            &mut self,
            pixbuf: &RgbaImage,
            progress: &dyn Progress,
        ) -> Result<TraceResult, Cancelled> {
            for i in 0..self.steps {
                progress.report_or_cancel(f64::from(i) / f64::from(self.steps))?;
            }
            let mut path = BezPath::new();
            path.move_to((0.0, 0.0));
            path.line_to((pixbuf.width() as f64, 0.0));
            path.close_path();
            Ok(vec![crate::TraceItem {
                style: "fill:#000000".to_owned(),
                path,
            }])
        }

        fn preview(&mut self, pixbuf: &RgbaImage) -> Option<RgbaImage> {
            Some(pixbuf.clone())
        }
    }

    struct InvertSiox;

    impl SioxFilter for InvertSiox {
        fn extract_foreground(
            &mut self,
            image: &mut RgbaImage,
            mask: &GrayImage,
            progress: &dyn Progress,
        ) -> Result<(), Cancelled> {
            progress.check()?;
            for (x, y, pixel) in image.enumerate_pixels_mut() {
                if mask.get_pixel(x, y).0[0] == 0 {
                    pixel.0 = [0, 0, 0, 0];
                }
            }
            Ok(())
        }
    }

    fn setup(with_mask: bool) -> TraceSetup {
        let pixbuf = Arc::new(RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255])));
        let siox_mask = with_mask.then(|| Arc::new(GrayImage::from_pixel(8, 8, image::Luma([255]))));
        TraceSetup { pixbuf, siox_mask }
    }

    #[test]
    fn trace_delivers_result_and_final_progress() {
        let progress_log = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(None));

        let log = Arc::clone(&progress_log);
        let fin = Arc::clone(&finished);
        let future = launch_trace(
            Box::new(StubEngine { steps: 4 }),
            None,
            setup(false),
            move |p| log.lock().unwrap().push(p),
            move |result| *fin.lock().unwrap() = Some(result),
        )
        .unwrap();

        while future.wait() {}
        future.poll();

        let result = finished.lock().unwrap().take().expect("finished ran");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].style, "fill:#000000");
        // The final 1.0 report always goes through.
        assert_eq!(progress_log.lock().unwrap().last().copied(), Some(1.0));
    }

    #[test]
    fn trace_with_siox_runs_the_filter_first() {
        let finished = Arc::new(Mutex::new(None));
        let fin = Arc::clone(&finished);
        let future = launch_trace(
            Box::new(StubEngine { steps: 1 }),
            Some(Box::new(InvertSiox)),
            setup(true),
            |_| {},
            move |result| *fin.lock().unwrap() = Some(result),
        )
        .unwrap();

        while future.wait() {}
        future.poll();
        assert!(finished.lock().unwrap().is_some());
    }

    #[test]
    fn cancelling_suppresses_all_callbacks() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let fired3 = Arc::clone(&fired);
        let future = launch_trace(
            Box::new(StubEngine { steps: 1000 }),
            None,
            setup(false),
            move |_| fired2.store(true, Ordering::SeqCst),
            move |_| fired3.store(true, Ordering::SeqCst),
        )
        .unwrap();

        future.cancel();
        // Drain anything that slipped in before the close; close dropped
        // it all, so nothing may run.
        future.poll();
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!future.is_active());
    }

    #[test]
    fn launch_validates_the_setup() {
        assert_eq!(
            launch_trace(
                Box::new(StubEngine { steps: 1 }),
                None,
                setup(true),
                |_| {},
                |_| {},
            )
            .err(),
            Some(TraceError::MaskWithoutFilter)
        );

        let empty = TraceSetup {
            pixbuf: Arc::new(RgbaImage::new(0, 0)),
            siox_mask: None,
        };
        assert_eq!(
            launch_trace(Box::new(StubEngine { steps: 1 }), None, empty, |_| {}, |_| {}).err(),
            Some(TraceError::EmptyImage)
        );
    }

    #[test]
    fn preview_delivers_an_image() {
        let finished = Arc::new(Mutex::new(None));
        let fin = Arc::clone(&finished);
        let future = launch_preview(
            Box::new(StubEngine { steps: 1 }),
            None,
            setup(false),
            move |image| *fin.lock().unwrap() = Some(image),
        )
        .unwrap();

        while future.wait() {}
        future.poll();
        let delivered = finished.lock().unwrap().take().expect("finished ran");
        assert_eq!(delivered.map(|i| i.dimensions()), Some((8, 8)));
    }
}
