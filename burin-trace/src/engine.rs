//! The plug-in interfaces for tracing engines and the SIOX foreground
//! extractor.

use burin_async::{Cancelled, Progress};
use image::{GrayImage, RgbaImage};
use kurbo::BezPath;

/// One traced path together with the style it should be drawn with.
#[derive(Debug, Clone)]
pub struct TraceItem {
    /// A CSS style string for the resulting path element.
    pub style: String,
    /// The traced outline.
    pub path: BezPath,
}

/// The outcome of a trace: any number of styled paths, in z-order.
pub type TraceResult = Vec<TraceItem>;

/// A generic interface for plugging different autotracers into the
/// pipeline.
///
/// All methods are called off the main thread, so implementations must be
/// thread-safe in the `Send` sense; they are not required to be re-entrant.
pub trait TracingEngine: Send {
    /// Trace `pixbuf` into styled paths.
    ///
    /// Implementations should call
    /// [`Progress::report_or_cancel`] at loop boundaries so long traces
    /// stay cancellable.
    fn trace(
        &mut self,
        pixbuf: &RgbaImage,
        progress: &dyn Progress,
    ) -> Result<TraceResult, Cancelled>;

    /// Generate a quick preview of what the trace would see, without any
    /// actual tracing.
    fn preview(&mut self, pixbuf: &RgbaImage) -> Option<RgbaImage>;

    /// Whether the user should be warned that this image is large enough
    /// to make tracing slow.
    fn check_image_size(&self, _size: (u32, u32)) -> bool {
        false
    }
}

/// The SIOX foreground-extraction step, injected by the caller.
///
/// When enabled, it refines the image in place before tracing, guided by a
/// mask marking the assumed foreground.
pub trait SioxFilter: Send {
    /// Extract the foreground of `image` in place. `mask` holds the
    /// rasterised foreground markers; higher values mean more certainly
    /// foreground.
    fn extract_foreground(
        &mut self,
        image: &mut RgbaImage,
        mask: &GrayImage,
        progress: &dyn Progress,
    ) -> Result<(), Cancelled>;
}
