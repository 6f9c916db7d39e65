use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use maxwell_common::openai::ChatModel;
use tracing::{info, warn};

use crate::extract::{AnalysisResult, CircuitExtractor, ResponseExtractor};
use crate::prompts;

/// An image the user picked, held in memory until the next pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitImage {
    bytes: Vec<u8>,
    media_type: String,
}

impl CircuitImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(bytes, media_type_for(path)))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

/// Media type from the file extension; anything unknown is sent as JPEG.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Please select an image first")]
    NoImage,

    #[error("an analysis is already in progress")]
    AlreadyPending,

    #[error("no analysis is in progress")]
    NotPending,
}

/// Circuit Analyzer view state. Every transition returns a new value and leaves
/// `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerState {
    image: Option<CircuitImage>,
    pending: bool,
    result: Option<AnalysisResult>,
    error: Option<String>,
}

impl AnalyzerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&CircuitImage> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Alert text from the last failed analysis, until dismissed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The analyze trigger is disabled without an image or while a request is out.
    pub fn can_analyze(&self) -> bool {
        self.image.is_some() && !self.pending
    }

    pub fn select_image(&self, image: CircuitImage) -> Self {
        Self {
            image: Some(image),
            ..self.clone()
        }
    }

    pub fn dismiss_error(&self) -> Self {
        Self {
            error: None,
            ..self.clone()
        }
    }

    /// Marks the request as outstanding and drops the previous result.
    pub fn begin_analysis(&self) -> Result<Self, AnalyzerError> {
        if self.pending {
            return Err(AnalyzerError::AlreadyPending);
        }
        if self.image.is_none() {
            return Err(AnalyzerError::NoImage);
        }
        Ok(Self {
            pending: true,
            result: None,
            error: None,
            ..self.clone()
        })
    }

    /// Either stores the extracted result or surfaces the failure; no partial result
    /// is kept on failure.
    pub fn finish_analysis<E: std::fmt::Display>(
        &self,
        outcome: Result<String, E>,
    ) -> Result<Self, AnalyzerError> {
        if !self.pending {
            return Err(AnalyzerError::NotPending);
        }
        let (result, error) = match outcome {
            Ok(text) => (Some(CircuitExtractor.extract(&text)), None),
            Err(e) => (None, Some(format!("Failed to analyze circuit: {e}. Please try again."))),
        };
        Ok(Self {
            pending: false,
            result,
            error,
            ..self.clone()
        })
    }
}

/// Runs analyses against the model through the relay.
#[derive(Clone)]
pub struct Analyzer {
    model: Arc<dyn ChatModel>,
    model_id: String,
}

impl Analyzer {
    pub fn new(model: Arc<dyn ChatModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    pub async fn analyze(&self, state: &AnalyzerState) -> Result<AnalyzerState, AnalyzerError> {
        let pending = state.begin_analysis()?;
        let Some(image) = pending.image() else {
            return Err(AnalyzerError::NoImage);
        };
        info!(
            bytes = image.len(),
            media_type = image.media_type(),
            "sending circuit image for analysis"
        );

        let outcome = self
            .model
            .complete(prompts::analysis_request(&self.model_id, image))
            .await
            .inspect_err(|e| warn!(error = %e, "analysis failed"));
        pending.finish_analysis(outcome)
    }
}
