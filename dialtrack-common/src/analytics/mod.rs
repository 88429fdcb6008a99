//! Analytics event pipeline
//!
//! Events are flat `name + scalar params` records tied to the client identity
//! and sent fire-and-forget through a [`Transport`]. Dedup state for scroll
//! depth and FAQ clicks is per page view ([`PageViewContext`]); experiment
//! exposures are deduplicated per browsing session ([`ExposureLog`]).

pub mod emitter;
pub mod event;
pub mod listeners;
pub mod page_view;
pub mod transport;
pub mod wire;

pub use emitter::{AnalyticsEmitter, EventTags, PageContext};
pub use event::{EventParams, ParamValue, StandardEvent};
pub use listeners::{CallClickListener, FaqListener, Interaction, ScrollListener, FAQ_MARKER_ATTR};
pub use page_view::{ExposureLog, PageViewContext, SCROLL_THRESHOLDS};
pub use transport::{HttpTransport, MemoryTransport, NullTransport, Transport};
pub use wire::{TelemetryBatch, WireEvent};
