//! Message content generation for warmup traffic.

mod fallback;
mod openai;
mod templates;
mod traits;

pub use fallback::FallbackGenerator;
pub use openai::OpenAiGenerator;
pub use templates::TemplateBank;
pub use traits::{
    reply_subject, ContentError, ContentGenerator, ContentKind, ContentRequest, ContentResult,
    GeneratedMessage,
};
