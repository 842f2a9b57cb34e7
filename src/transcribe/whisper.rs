use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::engine::TranscriptionEngine;
use crate::error::TranscribeError;

/// Whisper-backed engine. The context is loaded once and kept resident.
pub struct WhisperEngine {
    model_path: String,
    ctx: Option<WhisperContext>,
}

impl WhisperEngine {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            ctx: None,
        }
    }
}

impl TranscriptionEngine for WhisperEngine {
    fn load(&mut self) -> Result<(), TranscribeError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let ctx = WhisperContext::new_with_params(
            &self.model_path,
            WhisperContextParameters::default(),
        )
        .map_err(|e| {
            TranscribeError::ModelLoad(format!("{} ({})", e, self.model_path))
        })?;

        info!("Whisper model loaded from {}", self.model_path);
        self.ctx = Some(ctx);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.ctx.is_some()
    }

    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscribeError> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| TranscribeError::Inference("model not loaded".into()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_translate(false);

        let mut state = ctx
            .create_state()
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;
        state
            .full(params, samples)
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;

        let mut text = String::new();
        for i in 0..num_segments {
            if let Ok(segment) = state.full_get_segment_text(i) {
                text.push_str(&segment);
                text.push(' ');
            }
        }

        Ok(text.trim().to_string())
    }
}
