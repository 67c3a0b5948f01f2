/// Suggestion providers: the AI-backed endpoint and the local keyword scorer,
/// composed so the keyword scorer stands in whenever the endpoint fails or
/// comes back empty.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use welfare_common::backend::BackendClient;
use welfare_common::mcp_api::SuggestionSource;

use crate::catalog::CatalogService;
use crate::error::AppError;
use crate::model::AssessmentData;
use crate::scorer::score_resources;
use crate::tokenize::tokenize_assessment;

const ADVANCED_SUGGEST_PATH: &str = "resources/advanced/suggest";
const MAX_EXCERPT_CHARS: usize = 180;

#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub assessment: AssessmentData,
    /// Resource IDs the client already uses.
    pub excluded: HashSet<String>,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub resource_id: String,
    pub service_name: String,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub excerpt: Option<String>,
    pub reason: Option<String>,
    pub task_suggestion: Option<String>,
    pub already_used: bool,
    pub source: SuggestionSource,
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn source(&self) -> SuggestionSource;

    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, AppError>;
}

// --- Keyword overlap ---

pub struct KeywordOverlapProvider {
    catalog: Arc<CatalogService>,
}

impl KeywordOverlapProvider {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl SuggestionProvider for KeywordOverlapProvider {
    fn source(&self) -> SuggestionSource {
        SuggestionSource::Keyword
    }

    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, AppError> {
        let catalog = self.catalog.resources().await?;
        let tokens = tokenize_assessment(request.assessment.assessment.as_ref());
        let entries = score_resources(&catalog, &request.excluded, &tokens);
        debug!(
            tokens = tokens.len(),
            catalog = catalog.len(),
            matches = entries.len(),
            "keyword overlap scored"
        );

        Ok(entries
            .into_iter()
            .take(request.top_k)
            .filter_map(|entry| {
                let resource_id = entry.resource.resource_id()?.to_string();
                Some(Suggestion {
                    resource_id,
                    service_name: entry.resource.service_name.clone(),
                    score: f64::from(entry.score),
                    matched_keywords: entry.matched,
                    excerpt: entry.resource.description.as_deref().map(excerpt),
                    reason: None,
                    task_suggestion: None,
                    already_used: false,
                    source: SuggestionSource::Keyword,
                })
            })
            .collect())
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_CHARS).collect()
}

// --- Advanced (backend) ---

#[derive(Debug, Serialize)]
struct AdvancedSuggestRequest<'a> {
    assessment_data: &'a AssessmentData,
    top_k: usize,
    use_llm_summary: bool,
}

#[derive(Debug, Deserialize)]
struct AdvancedSuggestResponse {
    #[serde(default)]
    query_tokens: Vec<String>,
    #[serde(default)]
    resources: Vec<AdvancedSuggestedResource>,
    #[serde(default)]
    used_summary: bool,
}

#[derive(Debug, Deserialize)]
struct AdvancedSuggestedResource {
    resource_id: String,
    service_name: String,
    score: f64,
    #[serde(default)]
    matched_keywords: Vec<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    task_suggestion: Option<String>,
}

/// Calls the backend's AI-ranked suggestion endpoint once per request. Retrying
/// is left to the user.
pub struct AdvancedProvider {
    backend: BackendClient,
    use_llm_summary: bool,
    timeout: Option<Duration>,
}

impl AdvancedProvider {
    pub fn new(backend: BackendClient, use_llm_summary: bool) -> Self {
        Self {
            backend,
            use_llm_summary,
            timeout: None,
        }
    }

    /// Override the client's default timeout; LLM-backed ranking is slow.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl SuggestionProvider for AdvancedProvider {
    fn source(&self) -> SuggestionSource {
        SuggestionSource::Advanced
    }

    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, AppError> {
        let body = AdvancedSuggestRequest {
            assessment_data: &request.assessment,
            top_k: request.top_k,
            use_llm_summary: self.use_llm_summary,
        };
        let response: AdvancedSuggestResponse = self
            .backend
            .post_json(ADVANCED_SUGGEST_PATH, &body, self.timeout)
            .await?;
        debug!(
            query_tokens = response.query_tokens.len(),
            resources = response.resources.len(),
            used_summary = response.used_summary,
            "advanced suggestions received"
        );

        Ok(response
            .resources
            .into_iter()
            .take(request.top_k)
            .map(|r| Suggestion {
                already_used: request.excluded.contains(&r.resource_id),
                resource_id: r.resource_id,
                service_name: r.service_name,
                score: r.score,
                matched_keywords: r.matched_keywords,
                excerpt: r.excerpt,
                reason: r.reason,
                task_suggestion: r.task_suggestion,
                source: SuggestionSource::Advanced,
            })
            .collect())
    }
}

// --- Composition ---

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionResult {
    pub suggestions: Vec<Suggestion>,
    pub source: SuggestionSource,
    /// Set when the primary provider failed and the fallback answered instead.
    pub primary_error: Option<String>,
}

/// Prefers `primary`; uses `fallback` when `primary` is absent, fails, or
/// returns nothing.
#[derive(Clone)]
pub struct FallbackSuggester {
    primary: Option<Arc<dyn SuggestionProvider>>,
    fallback: Arc<dyn SuggestionProvider>,
}

impl FallbackSuggester {
    pub fn new(
        primary: Option<Arc<dyn SuggestionProvider>>,
        fallback: Arc<dyn SuggestionProvider>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<SuggestionResult, AppError> {
        let mut primary_error = None;

        if let Some(primary) = &self.primary {
            match primary.suggest(request).await {
                Ok(suggestions) if !suggestions.is_empty() => {
                    return Ok(SuggestionResult {
                        suggestions,
                        source: primary.source(),
                        primary_error: None,
                    });
                }
                Ok(_) => info!(source = ?primary.source(), "primary provider returned no suggestions, falling back"),
                Err(e) => {
                    warn!(source = ?primary.source(), error = %e, "primary provider failed, falling back");
                    primary_error = Some(e.to_string());
                }
            }
        }

        let suggestions = self.fallback.suggest(request).await?;
        Ok(SuggestionResult {
            suggestions,
            source: self.fallback.source(),
            primary_error,
        })
    }
}
