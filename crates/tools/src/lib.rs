pub mod backend;
pub mod http;
pub mod imagen;
pub mod slides;
pub mod summarizer;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use backend::{DeckBackend, ImageBackend, SlideContent, SummarizerBackend};
pub use imagen::{ImageGenerateParams, ImageGenerateTool};
pub use slides::{SlidesCreateParams, SlidesCreateResult, SlidesCreateTool};
pub use summarizer::{SummarizeParams, SummarizeTool};
