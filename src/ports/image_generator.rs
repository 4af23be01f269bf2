//! Image generator port - Interface for visitor-requested images.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual style of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    Illustration,
    TarotCard,
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageStyle::Illustration => f.write_str("illustration"),
            ImageStyle::TarotCard => f.write_str("tarot card"),
        }
    }
}

/// A generated image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
    pub style: ImageStyle,
}

/// Port for image generation.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, style: ImageStyle) -> Result<GeneratedImage, ImageError>;
}

/// Errors from image generation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageError {
    #[error("image service unavailable: {0}")]
    Unavailable(String),

    #[error("prompt rejected: {0}")]
    Rejected(String),
}
