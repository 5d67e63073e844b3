use std::time::Duration;
use tracing::info;

use crate::protocol::event::FrameDecode;
use crate::stream::reconciler::Applied;

/// Counters for one stream, from first byte to terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes: u64,
    pub chunks: u64,
    pub frames: u64,
    pub events_applied: u64,
    /// Frames without the `data: ` prefix.
    pub frames_ignored: u64,
    pub parse_failures: u64,
    pub unknown_kinds: u64,
    pub duplicate_traces: u64,
    pub keep_alives: u64,
    /// Complete frames left unread after the stream ended.
    pub frames_dropped: u64,
}

impl StreamStats {
    pub fn record_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len as u64;
    }

    /// Count a decoded frame by outcome.
    pub fn record_frame(&mut self, decoded: &FrameDecode) {
        self.frames += 1;
        match decoded {
            FrameDecode::Event(_) | FrameDecode::Done => {}
            FrameDecode::NotData => self.frames_ignored += 1,
            FrameDecode::Malformed(_) => self.parse_failures += 1,
            FrameDecode::UnknownKind(_) => self.unknown_kinds += 1,
        }
    }

    pub fn record_applied(&mut self, applied: Applied) {
        match applied {
            Applied::Merged => self.events_applied += 1,
            Applied::DuplicateTrace => self.duplicate_traces += 1,
            Applied::Ignored => self.keep_alives += 1,
        }
    }
}

/// Emit one summary line for a finished stream.
pub fn log_stream_stats(state: &str, stats: &StreamStats, duration: Duration) {
    info!(
        state = state,
        bytes = stats.bytes,
        chunks = stats.chunks,
        frames = stats.frames,
        events_applied = stats.events_applied,
        parse_failures = stats.parse_failures,
        unknown_kinds = stats.unknown_kinds,
        duplicate_traces = stats.duplicate_traces,
        frames_dropped = stats.frames_dropped,
        duration_seconds = duration.as_secs_f64(),
        "stream finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::protocol::event::StreamEvent;

    #[test]
    fn test_record_frame_by_outcome() {
        let mut stats = StreamStats::default();
        stats.record_frame(&FrameDecode::Event(StreamEvent::Ping));
        stats.record_frame(&FrameDecode::NotData);
        stats.record_frame(&FrameDecode::Malformed(ChatError::Decode("x".to_string())));
        stats.record_frame(&FrameDecode::UnknownKind("citation".to_string()));
        stats.record_frame(&FrameDecode::Done);
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.frames_ignored, 1);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.unknown_kinds, 1);
    }

    #[test]
    fn test_record_chunk_and_applied() {
        let mut stats = StreamStats::default();
        stats.record_chunk(10);
        stats.record_chunk(5);
        stats.record_applied(Applied::Merged);
        stats.record_applied(Applied::DuplicateTrace);
        stats.record_applied(Applied::Ignored);
        assert_eq!(stats.bytes, 15);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.events_applied, 1);
        assert_eq!(stats.duplicate_traces, 1);
        assert_eq!(stats.keep_alives, 1);
    }
}
