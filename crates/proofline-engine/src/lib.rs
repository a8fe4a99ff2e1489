pub mod annotations;
pub mod cache;
pub mod editing;
pub mod error;
pub mod extract;
pub mod render;
pub mod schedule;
pub mod session;
pub mod span;
pub mod surface;
pub mod text;

// Re-export key types for easier usage
pub use annotations::{
    AnnotationStatus, CheckResponse, PositionValidator, RawAnnotation, TrackedError,
    ValidatorConfig, parse_check_response,
};
pub use cache::{AnnotationCache, CacheConfig, CacheStats, SharedCache, spawn_sweeper};
pub use editing::{ChangeClass, ChangeKind, TextChange, classify, diff, reconcile};
pub use error::EngineError;
pub use extract::{FlatText, PositionEntry, PositionMap, extract};
pub use render::{RenderReport, clear_markers, render};
pub use schedule::{Debouncer, SchedulePolicy, Trigger};
pub use session::{
    AnnotationSession, AnnotatorClient, CheckOutcome, CheckStatus, CheckTicket, InputOutcome,
    RevalidationPolicy, SessionConfig, run_check,
};
pub use span::Span;
pub use surface::{EditableSurface, MarkerSpec, NodeKind, TextTree};
