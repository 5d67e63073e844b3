pub mod controller;
pub mod frame;
pub mod reconciler;

pub use controller::{CancelHandle, StreamController, StreamOutcome, StreamSnapshot, StreamState};
pub use frame::{FrameBuffer, Frames, Utf8Decoder};
pub use reconciler::{apply_event, upsert_trace, Applied, MessageReconciler, TraceUpsert};
