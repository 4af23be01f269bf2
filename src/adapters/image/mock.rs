//! Mock image generator for tests and offline runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ports::{GeneratedImage, ImageError, ImageGenerator, ImageStyle};

/// Returns a placeholder URL per request, or fails every time.
#[derive(Debug, Default)]
pub struct MockImageGenerator {
    fail: bool,
    calls: AtomicUsize,
}

impl MockImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of generate calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, prompt: &str, style: ImageStyle) -> Result<GeneratedImage, ImageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(ImageError::Unavailable("mock image generator failure".to_string()));
        }
        Ok(GeneratedImage {
            url: format!("mock://images/{n}.png"),
            prompt: prompt.to_string(),
            style,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_numbered_placeholder() {
        let images = MockImageGenerator::new();

        let first = images.generate("a bull", ImageStyle::Illustration).await.unwrap();
        let second = images.generate("the tower", ImageStyle::TarotCard).await.unwrap();

        assert_eq!(first.url, "mock://images/1.png");
        assert_eq!(second.style, ImageStyle::TarotCard);
        assert_eq!(images.calls(), 2);
    }

    #[tokio::test]
    async fn failing_counts_calls() {
        let images = MockImageGenerator::failing();

        assert!(images.generate("a bull", ImageStyle::Illustration).await.is_err());
        assert_eq!(images.calls(), 1);
    }
}
