//! Deterministic canned-output backends (feature `test-support`).
//!
//! Grounded in `sa_providers`'s pattern of one adapter per capability: here
//! each `Mock*` backend implements the same trait an `Http*` adapter does,
//! but returns/consumes a pre-seeded queue instead of calling a network, so
//! the retry envelope (§8 property 8) and cache/idempotency properties
//! (§8 properties 1 and 4) are testable without one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use reportdeck_domain::Error;

use crate::backend::{DeckBackend, ImageBackend, SlideContent, SummarizerBackend};

/// Queues canned text responses for `summarize`/`complete`; counts calls so
/// tests can assert "zero backend calls on a cache hit" (§8 property 4).
pub struct MockSummarizerBackend {
    responses: Mutex<VecDeque<Result<String, Error>>>,
    calls: AtomicUsize,
}

impl MockSummarizerBackend {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_results(results: Vec<Result<String, Error>>) -> Self {
        Self {
            responses: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::backend_permanent("mock backend exhausted")))
    }
}

#[async_trait]
impl SummarizerBackend for MockSummarizerBackend {
    async fn summarize(&self, _prompt: &str) -> Result<String, Error> {
        self.next()
    }

    async fn complete(&self, _prompt: &str) -> Result<String, Error> {
        self.next()
    }
}

/// Queues canned image bytes; counts calls the same way.
pub struct MockImageBackend {
    generate_results: Mutex<VecDeque<Result<Vec<u8>, Error>>>,
    upload_results: Mutex<VecDeque<Result<String, Error>>>,
    generate_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl MockImageBackend {
    pub fn with_images(images: Vec<Vec<u8>>) -> Self {
        Self {
            generate_results: Mutex::new(images.into_iter().map(Ok).collect()),
            upload_results: Mutex::new(VecDeque::new()),
            generate_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_generate_results(results: Vec<Result<Vec<u8>, Error>>) -> Self {
        Self {
            generate_results: Mutex::new(results.into_iter().collect()),
            upload_results: Mutex::new(VecDeque::new()),
            generate_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_upload_urls(mut self, urls: Vec<String>) -> Self {
        self.upload_results = Mutex::new(urls.into_iter().map(Ok).collect());
        self
    }

    pub fn generate_call_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageBackend for MockImageBackend {
    async fn generate(
        &self,
        _prompt: &str,
        _width: u32,
        _height: u32,
        _safety_tier: &str,
    ) -> Result<Vec<u8>, Error> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generate_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::backend_permanent("mock image backend exhausted")))
    }

    async fn upload_public(&self, _bytes: &[u8]) -> Result<String, Error> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.upload_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("https://images.example/shared/mock.png".to_string()))
    }
}

/// In-memory deck backend: presentations/slides are ids minted from
/// atomic counters, notes/fallback state tracked so tests can assert on
/// which path a call took.
pub struct MockDeckBackend {
    next_presentation: AtomicUsize,
    next_slide: AtomicUsize,
    pub fail_notes: bool,
    fail_insert_after: Option<usize>,
    create_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl Default for MockDeckBackend {
    fn default() -> Self {
        Self {
            next_presentation: AtomicUsize::new(1),
            next_slide: AtomicUsize::new(1),
            fail_notes: false,
            fail_insert_after: None,
            create_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }
}

impl MockDeckBackend {
    pub fn with_notes_failing() -> Self {
        Self {
            fail_notes: true,
            ..Self::default()
        }
    }

    /// Fail every `insert_slide` call after the first `n` succeed, so
    /// orchestrator tests can exercise the "deck renderer fails on slide
    /// i>1" partial-failure path.
    pub fn with_insert_failing_after(n: usize) -> Self {
        Self {
            fail_insert_after: Some(n),
            ..Self::default()
        }
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn insert_call_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeckBackend for MockDeckBackend {
    async fn create_presentation(&self, title: &str) -> Result<(String, String), Error> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_presentation.fetch_add(1, Ordering::SeqCst);
        let id = format!("pres_{n}");
        let url = format!("https://slides.example/presentation/{id}");
        tracing::debug!(%id, %title, "mock: created presentation");
        Ok((id, url))
    }

    async fn delete_first_slide(&self, _presentation_id: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn insert_slide(
        &self,
        _presentation_id: &str,
        _content: &SlideContent,
    ) -> Result<String, Error> {
        let call_index = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.fail_insert_after {
            if call_index > limit {
                return Err(Error::backend_permanent("mock: insert_slide disabled"));
            }
        }
        let n = self.next_slide.fetch_add(1, Ordering::SeqCst);
        Ok(format!("slide_{n}"))
    }

    async fn set_speaker_notes(
        &self,
        _presentation_id: &str,
        _slide_id: &str,
        _script: &str,
    ) -> Result<(), Error> {
        if self.fail_notes {
            return Err(Error::backend_permanent("mock: speaker notes path disabled"));
        }
        Ok(())
    }

    async fn insert_fallback_script_textbox(
        &self,
        _presentation_id: &str,
        _slide_id: &str,
        _script: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn upload_image(&self, _local_path: &str, make_public: bool) -> Result<(String, Option<String>), Error> {
        let handle = "mock_file_id".to_string();
        let url = make_public.then(|| "https://images.example/shared/mock.png".to_string());
        Ok((handle, url))
    }
}
