pub mod event;
pub mod message;
pub mod request;

pub use event::{decode_frame, parse_frame, FrameDecode, ParsedFrame, StreamEvent};
pub use message::{ChartConfig, ChartType, Message, Role, TableRow, ToolTrace, TraceStatus};
pub use request::{ChatRequest, HistoryEntry};
