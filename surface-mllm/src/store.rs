//! Session-owned response and variation stores
//!
//! All state lives in one `Session` passed by reference. Every load or
//! generation takes a ticket from a monotonically increasing counter and its
//! result is applied only while that ticket is still the newest, so a slow
//! response can never overwrite a newer selection. Updates are whole-value
//! replacements under a short lock that is never held across an `.await`.

use crate::client::{GenerationService, ServiceError};
use crate::display::DisplayController;
use crate::image::{ImageError, ImageInput};
use crate::model::{ExampleMetadata, ModelId, PromptVariation, ResponseSet, VariationSummary};
use crate::protocol::GenerateRequest;
use crate::provider::{fetch_json, ExampleDocument, ExampleSource, SourceError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Form validation failures, raised before any network call
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Please provide an image")]
    NoImage,

    #[error("Please select at least one model")]
    NoModels,

    #[error("Number of trials must be at least 1")]
    InvalidTrials,

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Errors from a live generation
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GenerateError {
    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            GenerateError::Validation(e) => e.to_string(),
            GenerateError::Service(e) => e.user_message(),
        }
    }
}

/// Which tab the session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Browsing pre-computed examples
    #[default]
    Examples,
    /// Generating descriptions for the user's own image
    Generate,
}

/// Everything the views read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub mode: SessionMode,
    pub responses: ResponseSet,
    pub summary: VariationSummary,
    pub metadata: ExampleMetadata,
    /// Key of the example whose documents are shown
    pub example_key: Option<String>,
    /// Identifier the service assigned to the last generated image
    pub image_id: Option<String>,
}

impl SessionState {
    /// Trials per model for percentage renderings
    pub fn num_trials(&self) -> u32 {
        self.metadata.num_trials.unwrap_or(3)
    }

    /// Models that took part, for percentage renderings
    pub fn num_models(&self) -> usize {
        match &self.metadata.selected_models {
            Some(models) if !models.is_empty() => models.len(),
            _ if !self.responses.is_empty() => self.responses.models().len(),
            _ => ModelId::defaults().len(),
        }
    }
}

/// Inputs of the generation form
#[derive(Debug, Clone)]
pub struct GenerationForm {
    pub image: Option<ImageInput>,
    pub prompt: String,
    pub num_trials: u32,
    pub models: Vec<ModelId>,
    pub prompt_variation: PromptVariation,
}

impl Default for GenerationForm {
    fn default() -> Self {
        Self {
            image: None,
            prompt: crate::default_prompt(),
            num_trials: 3,
            models: ModelId::defaults(),
            prompt_variation: PromptVariation::default(),
        }
    }
}

impl GenerationForm {
    /// Validate the form and build the request body
    ///
    /// In-memory images become base64 data URLs, remote URLs are passed
    /// through and session-scoped references are rejected.
    pub fn to_request(&self) -> Result<GenerateRequest, ValidationError> {
        let image = self.image.as_ref().ok_or(ValidationError::NoImage)?;
        if self.models.is_empty() {
            return Err(ValidationError::NoModels);
        }
        if self.num_trials == 0 {
            return Err(ValidationError::InvalidTrials);
        }
        let (image, source) = image.to_payload()?;

        let prompt = if self.prompt.trim().is_empty() {
            crate::default_prompt()
        } else {
            self.prompt.clone()
        };

        let mut models = Vec::with_capacity(self.models.len());
        for model in &self.models {
            if !models.contains(model) {
                models.push(*model);
            }
        }

        Ok(GenerateRequest {
            image,
            prompt,
            num_trials: self.num_trials,
            selected_models: models,
            prompt_variation: self.prompt_variation,
            source,
            openai_key: None,
            gemini_key: None,
            claude_key: None,
        })
    }
}

/// What an example load did
#[derive(Debug, Default)]
pub struct LoadReport {
    pub applied: Vec<ExampleDocument>,
    pub failed: Vec<(ExampleDocument, SourceError)>,
    /// A newer load or generation started first; nothing was applied
    pub superseded: bool,
}

/// Result of a generation that passed validation and reached the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Applied { runs: usize },
    /// A newer load or generation started first; the result was discarded
    Superseded,
}

/// One user session: stores, display state and the external collaborators
pub struct Session {
    state: RwLock<SessionState>,
    ticket: AtomicU64,
    display: DisplayController,
    source: Arc<dyn ExampleSource>,
    service: Arc<dyn GenerationService>,
}

impl Session {
    pub fn new(source: Arc<dyn ExampleSource>, service: Arc<dyn GenerationService>) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            ticket: AtomicU64::new(0),
            display: DisplayController::default(),
            source,
            service,
        }
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    pub fn service(&self) -> &dyn GenerationService {
        self.service.as_ref()
    }

    pub fn source(&self) -> &dyn ExampleSource {
        self.source.as_ref()
    }

    /// Copy of the current stores
    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn mode(&self) -> SessionMode {
        self.state.read().mode
    }

    /// Switch tabs; entering Generate from Examples clears both stores
    pub fn set_mode(&self, mode: SessionMode) {
        let previous = self.mode();
        if previous == mode {
            return;
        }
        if previous == SessionMode::Examples && mode == SessionMode::Generate {
            self.clear();
        }
        self.state.write().mode = mode;
        debug!(?mode, "Session mode changed");
    }

    /// Empty the stores and invalidate every in-flight request
    pub fn clear(&self) {
        self.next_ticket();
        let mut state = self.state.write();
        let mode = state.mode;
        *state = SessionState {
            mode,
            ..Default::default()
        };
    }

    /// Load the three documents of an example concurrently
    ///
    /// Each document that arrives is applied on its own; a failed one is
    /// logged and leaves its field as it was. Nothing is retried.
    pub async fn load_example(&self, key: &str) -> LoadReport {
        let ticket = self.next_ticket();
        info!(key, ticket, source = self.source.name(), "Loading example");

        let source = self.source.as_ref();
        let (metadata, descriptions, summary) = tokio::join!(
            fetch_json::<ExampleMetadata>(source, key, ExampleDocument::Metadata),
            fetch_json::<ResponseSet>(source, key, ExampleDocument::Descriptions),
            fetch_json::<VariationSummary>(source, key, ExampleDocument::Summary),
        );

        let mut report = LoadReport::default();
        let mut state = self.state.write();
        if !self.is_current(ticket) {
            debug!(key, ticket, "Discarding stale example load");
            report.superseded = true;
            return report;
        }

        match metadata {
            Ok(metadata) => {
                state.metadata = metadata;
                report.applied.push(ExampleDocument::Metadata);
            }
            Err(e) => report.failed.push((ExampleDocument::Metadata, e)),
        }
        match descriptions {
            Ok(descriptions) => {
                state.responses = descriptions;
                report.applied.push(ExampleDocument::Descriptions);
            }
            Err(e) => report.failed.push((ExampleDocument::Descriptions, e)),
        }
        match summary {
            Ok(mut summary) => {
                summary.fill_renderings(state.num_trials(), state.num_models());
                state.summary = summary;
                report.applied.push(ExampleDocument::Summary);
            }
            Err(e) => report.failed.push((ExampleDocument::Summary, e)),
        }
        if !report.applied.is_empty() {
            state.example_key = Some(key.to_string());
            state.image_id = None;
        }
        drop(state);

        for (document, error) in &report.failed {
            warn!(key, %document, "Failed to load example document: {}", error);
        }
        report
    }

    /// Validate the form, call the generation service and replace the stores
    ///
    /// Validation happens before any network call. On failure the stores are
    /// left exactly as they were.
    pub async fn generate(
        &self,
        form: &GenerationForm,
        keys: Option<&crate::keys::KeyStore>,
    ) -> Result<GenerateOutcome, GenerateError> {
        let mut request = form.to_request()?;
        if let Some(keys) = keys {
            keys.apply(&mut request);
        }

        let ticket = self.next_ticket();
        let response = self.service.generate(&request).await.map_err(|e| {
            warn!(ticket, "Generation failed: {}", e);
            e
        })?;

        let mut summary = response.variation_summary;
        summary.fill_renderings(request.num_trials, request.selected_models.len());

        let mut state = self.state.write();
        if !self.is_current(ticket) {
            info!(ticket, "Discarding generation superseded by a newer request");
            return Ok(GenerateOutcome::Superseded);
        }

        let runs = response.descriptions.len();
        state.responses = response.descriptions;
        state.summary = summary;
        state.image_id = response.image_id;
        state.example_key = None;
        state.metadata = ExampleMetadata {
            image: match request.source {
                crate::model::ImageSource::Url => Some(request.image),
                crate::model::ImageSource::Base64 => None,
            },
            prompt: Some(request.prompt),
            num_trials: Some(request.num_trials),
            selected_models: Some(request.selected_models),
            prompt_variation: Some(request.prompt_variation),
            source: Some(request.source),
            scenario: None,
        };
        drop(state);

        info!(ticket, runs, "Generation applied");
        Ok(GenerateOutcome::Applied { runs })
    }

    fn next_ticket(&self) -> u64 {
        self.ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.ticket.load(Ordering::SeqCst) == ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageSource, ModelRun};
    use crate::protocol::{
        DatasetList, DescriptionsResponse, GenerateResponse, HealthResponse, ServiceConfig,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// In-memory example documents; fetches of `gated_key` wait for a permit
    struct FakeSource {
        docs: HashMap<(String, ExampleDocument), String>,
        gated_key: Option<String>,
        gate: Arc<Semaphore>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                docs: HashMap::new(),
                gated_key: None,
                gate: Arc::new(Semaphore::new(0)),
            }
        }

        fn with_example(mut self, key: &str, description: &str) -> Self {
            let descriptions = serde_json::json!({
                "1": {"id": 1, "model": "gpt", "prompt": "Describe.", "description": description}
            });
            let summary = serde_json::json!({
                "similarity": format!("- {}", description),
                "model_diff": format!("{} (1 of 1 GPT)", description)
            });
            self.docs.insert(
                (key.into(), ExampleDocument::Metadata),
                r#"{"numTrials": 1, "selectedModels": ["gpt"]}"#.into(),
            );
            self.docs.insert((key.into(), ExampleDocument::Descriptions), descriptions.to_string());
            self.docs.insert((key.into(), ExampleDocument::Summary), summary.to_string());
            self
        }

        fn without(mut self, key: &str, document: ExampleDocument) -> Self {
            self.docs.remove(&(key.to_string(), document));
            self
        }

        fn gated(mut self, key: &str) -> Self {
            self.gated_key = Some(key.to_string());
            self
        }
    }

    #[async_trait]
    impl ExampleSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch(&self, key: &str, document: ExampleDocument) -> Result<Vec<u8>, SourceError> {
            if self.gated_key.as_deref() == Some(key) {
                let _permit = self.gate.acquire().await.unwrap();
            }
            self.docs
                .get(&(key.to_string(), document))
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| SourceError::NotFound(format!("{}/{}", key, document)))
        }

        async fn list(&self) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    type Respond = Box<dyn Fn() -> Result<GenerateResponse, ServiceError> + Send + Sync>;

    struct FakeService {
        respond: Respond,
        calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeService {
        fn new(respond: Respond) -> Self {
            Self {
                respond,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl GenerationService for FakeService {
        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            (self.respond)()
        }

        async fn config(&self) -> Result<ServiceConfig, ServiceError> {
            unimplemented!()
        }

        async fn datasets(&self) -> Result<DatasetList, ServiceError> {
            Ok(DatasetList::default())
        }

        async fn get_descriptions(&self, _: &str) -> Result<DescriptionsResponse, ServiceError> {
            Ok(DescriptionsResponse::default())
        }

        async fn health(&self) -> Result<HealthResponse, ServiceError> {
            unimplemented!()
        }
    }

    fn generated() -> Result<GenerateResponse, ServiceError> {
        let mut descriptions = ResponseSet::new();
        descriptions.insert("1", ModelRun::new(1, ModelId::Gpt, "Describe.", "generated gpt"));
        descriptions.insert("2", ModelRun::new(2, ModelId::Claude, "Describe.", "generated claude"));
        Ok(GenerateResponse {
            success: true,
            descriptions,
            variation_summary: VariationSummary {
                model_diff: Some("A cat (1 of 1 GPT, 1 of 1 Claude)".into()),
                ..Default::default()
            },
            image_id: Some("img-42".into()),
        })
    }

    fn failing() -> Result<GenerateResponse, ServiceError> {
        Err(ServiceError::Upstream {
            status: 500,
            message: "Failed to generate descriptions".into(),
        })
    }

    fn form() -> GenerationForm {
        GenerationForm {
            image: Some(ImageInput::RemoteUrl("https://example.com/cat.jpg".into())),
            num_trials: 1,
            models: vec![ModelId::Gpt, ModelId::Claude],
            ..Default::default()
        }
    }

    fn session(source: FakeSource, service: FakeService) -> Session {
        Session::new(Arc::new(source), Arc::new(service))
    }

    #[tokio::test]
    async fn test_load_example_applies_all_documents() {
        let s = session(
            FakeSource::new().with_example("1", "a shirt"),
            FakeService::new(Box::new(generated)),
        );
        let report = s.load_example("1").await;
        assert_eq!(report.applied.len(), 3);
        assert!(report.failed.is_empty());

        let state = s.snapshot();
        assert_eq!(state.example_key.as_deref(), Some("1"));
        assert_eq!(state.responses.get("1").unwrap().description, "a shirt");
        assert_eq!(state.metadata.num_trials, Some(1));
        // Derived from model_diff with 1 trial and 1 model
        assert_eq!(state.summary.percentage.as_deref(), Some("a shirt (100%)"));
    }

    #[tokio::test]
    async fn test_partial_load_keeps_prior_field() {
        let source = FakeSource::new()
            .with_example("1", "first")
            .with_example("2", "second")
            .without("2", ExampleDocument::Summary);
        let s = session(source, FakeService::new(Box::new(generated)));

        s.load_example("1").await;
        let report = s.load_example("2").await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ExampleDocument::Summary);

        let state = s.snapshot();
        assert_eq!(state.responses.get("1").unwrap().description, "second");
        assert_eq!(state.summary.similarity.as_deref(), Some("- first"));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_current_example() {
        let s = session(
            FakeSource::new().with_example("1", "from one"),
            FakeService::new(Box::new(generated)),
        );
        s.load_example("1").await;

        let report = s.load_example("missing").await;
        assert!(report.applied.is_empty());
        assert_eq!(report.failed.len(), 3);
        assert!(!report.superseded);

        let state = s.snapshot();
        assert_eq!(state.example_key.as_deref(), Some("1"));
        assert_eq!(state.responses.get("1").unwrap().description, "from one");
    }

    #[tokio::test]
    async fn test_stale_load_never_overwrites_newer() {
        let source = FakeSource::new()
            .with_example("a", "from a")
            .with_example("b", "from b")
            .gated("a");
        let gate = Arc::clone(&source.gate);
        let s = session(source, FakeService::new(Box::new(generated)));

        let (report_a, report_b) = tokio::join!(s.load_example("a"), async {
            let report = s.load_example("b").await;
            gate.add_permits(1);
            report
        });

        assert!(report_a.superseded);
        assert!(!report_b.superseded);
        let state = s.snapshot();
        assert_eq!(state.example_key.as_deref(), Some("b"));
        assert_eq!(state.responses.get("1").unwrap().description, "from b");
    }

    #[tokio::test]
    async fn test_generation_superseded_by_newer_load() {
        let gate = Arc::new(Semaphore::new(0));
        let mut service = FakeService::new(Box::new(generated));
        service.gate = Some(Arc::clone(&gate));
        let s = session(FakeSource::new().with_example("1", "example"), service);

        let pending = form();
        let (outcome, _) = tokio::join!(s.generate(&pending, None), async {
            s.load_example("1").await;
            gate.add_permits(1);
        });

        assert_eq!(outcome.unwrap(), GenerateOutcome::Superseded);
        assert_eq!(s.snapshot().responses.get("1").unwrap().description, "example");
    }

    #[tokio::test]
    async fn test_generate_replaces_stores() {
        let s = session(
            FakeSource::new().with_example("1", "example"),
            FakeService::new(Box::new(generated)),
        );
        s.load_example("1").await;

        let outcome = s.generate(&form(), None).await.unwrap();
        assert_eq!(outcome, GenerateOutcome::Applied { runs: 2 });

        let state = s.snapshot();
        assert_eq!(state.responses.len(), 2);
        assert_eq!(state.image_id.as_deref(), Some("img-42"));
        assert_eq!(state.example_key, None);
        assert_eq!(state.metadata.source, Some(ImageSource::Url));
        assert_eq!(state.summary.percentage.as_deref(), Some("A cat (100%)"));
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_state() {
        let s = session(
            FakeSource::new().with_example("1", "example"),
            FakeService::new(Box::new(failing)),
        );
        s.load_example("1").await;
        let before = s.snapshot();

        let err = s.generate(&form(), None).await.unwrap_err();
        assert_eq!(err.user_message(), "Failed to generate descriptions");
        assert_eq!(s.snapshot(), before);
    }

    #[tokio::test]
    async fn test_validation_before_network() {
        let service = Arc::new(FakeService::new(Box::new(generated)));
        let s = Session::new(Arc::new(FakeSource::new()), service.clone());

        let no_image = GenerationForm {
            image: None,
            ..form()
        };
        assert!(matches!(
            s.generate(&no_image, None).await,
            Err(GenerateError::Validation(ValidationError::NoImage))
        ));

        let no_models = GenerationForm {
            models: Vec::new(),
            ..form()
        };
        assert!(matches!(
            s.generate(&no_models, None).await,
            Err(GenerateError::Validation(ValidationError::NoModels))
        ));

        let blob = GenerationForm {
            image: Some(ImageInput::SessionRef("blob:http://localhost/1".into())),
            ..form()
        };
        assert!(matches!(
            s.generate(&blob, None).await,
            Err(GenerateError::Validation(ValidationError::Image(_)))
        ));

        let zero = GenerationForm {
            num_trials: 0,
            ..form()
        };
        assert!(s.generate(&zero, None).await.is_err());

        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_form_builds_base64_request() {
        let form = GenerationForm {
            image: Some(ImageInput::from_bytes(vec![1, 2, 3], "image/png")),
            prompt: "  ".into(),
            models: vec![ModelId::Gemini, ModelId::Gemini, ModelId::Gpt],
            ..Default::default()
        };
        let request = form.to_request().unwrap();
        assert_eq!(request.source, ImageSource::Base64);
        assert_eq!(request.image, "data:image/png;base64,AQID");
        assert_eq!(request.prompt, "Describe the image in detail.");
        assert_eq!(request.selected_models, vec![ModelId::Gemini, ModelId::Gpt]);
    }

    #[tokio::test]
    async fn test_entering_generate_clears_stores() {
        let s = session(
            FakeSource::new().with_example("1", "example"),
            FakeService::new(Box::new(generated)),
        );
        s.load_example("1").await;
        assert!(!s.snapshot().responses.is_empty());

        s.set_mode(SessionMode::Generate);
        let state = s.snapshot();
        assert_eq!(state.mode, SessionMode::Generate);
        assert!(state.responses.is_empty());
        assert!(state.summary.is_empty());

        s.generate(&form(), None).await.unwrap();
        s.set_mode(SessionMode::Examples);
        // Leaving Generate keeps the generated results
        assert_eq!(s.snapshot().responses.len(), 2);
    }
}
