//! Structured run logging.
//!
//! Every line carries the video id and run sequence number so a single
//! processing run can be followed across interleaved output.

use tracing::{error, info, warn, Span};
use vguard_models::VideoId;

#[derive(Debug, Clone)]
pub struct RunLogger {
    video_id: String,
    run_seq: u64,
}

impl RunLogger {
    pub fn new(video_id: &VideoId, run_seq: u64) -> Self {
        Self {
            video_id: video_id.to_string(),
            run_seq,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(video_id = %self.video_id, run_seq = self.run_seq, "Run started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(video_id = %self.video_id, run_seq = self.run_seq, "Run progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(video_id = %self.video_id, run_seq = self.run_seq, "Run warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(video_id = %self.video_id, run_seq = self.run_seq, "Run error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_id = %self.video_id, run_seq = self.run_seq, "Run completed: {}", message);
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn run_seq(&self) -> u64 {
        self.run_seq
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("processing_run", video_id = %self.video_id, run_seq = self.run_seq)
    }
}
