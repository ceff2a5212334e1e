use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{ContentGenerator, ContentRequest, ContentResult, GeneratedMessage};

/// Chains two generators: tries the primary and falls back on any error.
///
/// Warmup dispatch must not stall on a flaky completion endpoint, so the
/// fallback slot is normally a [`super::TemplateBank`].
pub struct FallbackGenerator {
    primary: Arc<dyn ContentGenerator>,
    fallback: Arc<dyn ContentGenerator>,
}

impl FallbackGenerator {
    pub fn new(primary: Arc<dyn ContentGenerator>, fallback: Arc<dyn ContentGenerator>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ContentGenerator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, request: &ContentRequest) -> ContentResult<GeneratedMessage> {
        match self.primary.generate(request).await {
            Ok(message) => Ok(message),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "content generation failed, using fallback"
                );
                self.fallback.generate(request).await
            }
        }
    }
}
