/// Suggestion orchestration for one client: exclusion set from usage records,
/// provider fallback, stale-result discarding and user-facing messages.
use tracing::info;

use welfare_common::mcp_api::{SuggestionSource, SuggestionStatus};

use crate::assessment::extract_texts;
use crate::error::AppError;
use crate::model::AssessmentData;
use crate::provider::{FallbackSuggester, Suggestion, SuggestionRequest, SuggestionResult};
use crate::scorer::MAX_SUGGESTIONS;
use crate::staleness::{Generations, Ticket};
use crate::usage::{excluded_ids, UsageTracker};

#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionOutcome {
    /// No saved assessment; scoring was skipped.
    NoAssessment,
    /// An assessment exists but has no text to match against.
    NoAssessmentText,
    /// A newer request for the same view finished or started after this one.
    Superseded,
    Ranked(SuggestionResult),
}

impl SuggestionOutcome {
    pub fn status(&self) -> SuggestionStatus {
        match self {
            SuggestionOutcome::NoAssessment => SuggestionStatus::NoAssessment,
            SuggestionOutcome::NoAssessmentText => SuggestionStatus::NoAssessmentText,
            SuggestionOutcome::Superseded => SuggestionStatus::Superseded,
            SuggestionOutcome::Ranked(r) if r.suggestions.is_empty() => SuggestionStatus::NoMatches,
            SuggestionOutcome::Ranked(_) => SuggestionStatus::Suggestions,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SuggestionOutcome::NoAssessment => {
                "No assessment has been saved for this client yet. Create an assessment to get resource suggestions."
                    .to_string()
            }
            SuggestionOutcome::NoAssessmentText => {
                "The assessment has almost no text to work with. Add summaries or observations to its categories and try again."
                    .to_string()
            }
            SuggestionOutcome::Superseded => {
                "A newer suggestion request replaced this one; its results were discarded.".to_string()
            }
            SuggestionOutcome::Ranked(r) => {
                let mut message = if r.suggestions.is_empty() {
                    "No resources matched the current assessment. Make the descriptions more specific or add related keywords."
                        .to_string()
                } else {
                    format!("{} resource(s) suggested.", r.suggestions.len())
                };
                if r.primary_error.is_some() {
                    message.push_str(
                        " The AI suggestion service is unavailable; showing keyword matches only. You can retry.",
                    );
                }
                message
            }
        }
    }

    /// The advanced provider failed, so the user should be offered a retry.
    pub fn retry_advanced(&self) -> bool {
        matches!(self, SuggestionOutcome::Ranked(r) if r.primary_error.is_some())
    }

    pub fn source(&self) -> Option<SuggestionSource> {
        match self {
            SuggestionOutcome::Ranked(r) => Some(r.source),
            _ => None,
        }
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match self {
            SuggestionOutcome::Ranked(r) => &r.suggestions,
            _ => &[],
        }
    }
}

pub struct SuggestionService {
    usage: UsageTracker,
    suggester: FallbackSuggester,
    generations: Generations,
}

impl SuggestionService {
    pub fn new(usage: UsageTracker, suggester: FallbackSuggester) -> Self {
        Self {
            usage,
            suggester,
            generations: Generations::new(),
        }
    }

    /// Suggest resources for `client_name` from `assessment`.
    ///
    /// `view` identifies the caller's panel; a later request for the same view
    /// turns this one's result into `Superseded`. Defaults to the client name.
    pub async fn suggest(
        &self,
        client_name: &str,
        view: Option<&str>,
        assessment: AssessmentData,
        top_k: Option<usize>,
    ) -> Result<SuggestionOutcome, AppError> {
        let pending = Pending {
            generations: &self.generations,
            ticket: self.generations.issue(view.unwrap_or(client_name)),
        };

        let outcome = self.rank(client_name, assessment, top_k).await;

        if !self.generations.is_current(&pending.ticket) {
            info!(client_name, "suggestion result superseded, discarding");
            return Ok(SuggestionOutcome::Superseded);
        }

        let outcome = outcome?;
        if let SuggestionOutcome::Ranked(result) = &outcome {
            info!(
                client_name,
                source = ?result.source,
                count = result.suggestions.len(),
                fallback = result.primary_error.is_some(),
                "suggestions computed"
            );
        }
        Ok(outcome)
    }

    async fn rank(
        &self,
        client_name: &str,
        assessment: AssessmentData,
        top_k: Option<usize>,
    ) -> Result<SuggestionOutcome, AppError> {
        if assessment.assessment.is_none() {
            return Ok(SuggestionOutcome::NoAssessment);
        }
        if extract_texts(assessment.assessment.as_ref())
            .iter()
            .all(|t| t.trim().is_empty())
        {
            return Ok(SuggestionOutcome::NoAssessmentText);
        }

        let top_k = top_k.unwrap_or(MAX_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS);
        let usages = self.usage.list(client_name).await?;
        let request = SuggestionRequest {
            assessment,
            excluded: excluded_ids(&usages),
            top_k,
        };
        Ok(SuggestionOutcome::Ranked(self.suggester.suggest(&request).await?))
    }
}

/// Releases the view's generation entry however the request ends, including
/// when the caller drops the future.
struct Pending<'a> {
    generations: &'a Generations,
    ticket: Ticket,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.generations.finish(&self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use welfare_common::redis::RedisStore;

    use super::*;
    use crate::catalog::CatalogService;
    use crate::config::StoreScope;
    use crate::provider::{AdvancedProvider, KeywordOverlapProvider, SuggestionProvider};
    use crate::testing::{resource, spawn_backend, AdvancedBehavior, MockBackend};
    use crate::usage::MemoryUsageStore;

    fn scope() -> StoreScope {
        StoreScope {
            app_id: "app".to_string(),
            user_id: "worker".to_string(),
        }
    }

    fn tracker() -> UsageTracker {
        UsageTracker::new(Arc::new(MemoryUsageStore::new(scope())), scope())
    }

    fn keyword(backend: &MockBackend) -> Arc<dyn SuggestionProvider> {
        Arc::new(KeywordOverlapProvider::new(Arc::new(CatalogService::new(
            backend.client(),
            RedisStore::new(None),
            60,
        ))))
    }

    fn assessment(text: &str) -> AssessmentData {
        AssessmentData::from_value(Some(&json!({"assessment": {"本人": {"状況": text}}})))
    }

    fn catalog() -> Vec<crate::model::ResourceRecord> {
        (0..20)
            .map(|i| resource(&format!("r{i}"), "相談窓口", &["相談"], Some(i as f64)))
            .collect()
    }

    #[tokio::test]
    async fn missing_assessment_skips_scoring() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let service = SuggestionService::new(tracker(), FallbackSuggester::new(None, keyword(&backend)));

        let outcome = service
            .suggest("山田", None, AssessmentData::from_value(None), None)
            .await
            .expect("outcome");
        assert_eq!(outcome, SuggestionOutcome::NoAssessment);
        assert_eq!(outcome.status(), SuggestionStatus::NoAssessment);
        assert_eq!(backend.catalog_hits(), 0);
        assert_eq!(service.generations.in_flight(), 0);
    }

    #[tokio::test]
    async fn completed_requests_release_their_views() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let service = SuggestionService::new(tracker(), FallbackSuggester::new(None, keyword(&backend)));

        for i in 0..50 {
            let view = format!("panel-{i}");
            service
                .suggest("山田", Some(&view), assessment("相談"), None)
                .await
                .expect("outcome");
        }
        assert_eq!(service.generations.in_flight(), 0);
    }

    #[tokio::test]
    async fn blank_assessment_is_distinguished_from_no_matches() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let service = SuggestionService::new(tracker(), FallbackSuggester::new(None, keyword(&backend)));

        let blank = service
            .suggest("山田", None, assessment("   "), None)
            .await
            .expect("blank");
        assert_eq!(blank, SuggestionOutcome::NoAssessmentText);

        let unmatched = service
            .suggest("山田", None, assessment("住居 家賃"), None)
            .await
            .expect("unmatched");
        assert_eq!(unmatched.status(), SuggestionStatus::NoMatches);
        assert!(!unmatched.retry_advanced());
    }

    #[tokio::test]
    async fn in_use_resources_are_excluded_and_output_capped() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let usage = tracker();
        for i in 0..5 {
            usage
                .add("山田", &resource(&format!("r{}", 19 - i), "相談窓口", &[], None))
                .await
                .expect("add usage");
        }
        let service = SuggestionService::new(usage, FallbackSuggester::new(None, keyword(&backend)));

        let outcome = service
            .suggest("山田", None, assessment("生活の相談"), None)
            .await
            .expect("outcome");
        // "生活の相談" is one token; nothing matches until the terms are separated.
        assert_eq!(outcome.status(), SuggestionStatus::NoMatches);

        let outcome = service
            .suggest("山田", None, assessment("生活、相談"), None)
            .await
            .expect("outcome");
        let ids: Vec<&str> = outcome.suggestions().iter().map(|s| s.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["r14", "r13", "r12", "r11", "r10", "r9", "r8", "r7"]);
    }

    #[tokio::test]
    async fn advanced_failure_offers_retry() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let suggester = FallbackSuggester::new(
            Some(Arc::new(AdvancedProvider::new(backend.client(), true))),
            keyword(&backend),
        );
        let service = SuggestionService::new(tracker(), suggester);

        let outcome = service
            .suggest("山田", None, assessment("相談"), Some(3))
            .await
            .expect("outcome");
        assert_eq!(outcome.source(), Some(SuggestionSource::Keyword));
        assert_eq!(outcome.suggestions().len(), 3);
        assert!(outcome.retry_advanced());
        assert!(outcome.message().contains("retry"));
        assert_eq!(service.generations.in_flight(), 0);
    }

    #[tokio::test]
    async fn advanced_results_are_capped_at_clamped_top_k() {
        let resources: Vec<serde_json::Value> = (0..10)
            .map(|i| json!({"resource_id": format!("a{i}"), "service_name": "相談窓口", "score": 1.0 - i as f64 / 10.0}))
            .collect();
        let backend = spawn_backend(catalog(), AdvancedBehavior::Respond(json!({"resources": resources}))).await;
        let suggester = FallbackSuggester::new(
            Some(Arc::new(AdvancedProvider::new(backend.client(), false))),
            keyword(&backend),
        );
        let service = SuggestionService::new(tracker(), suggester);

        let outcome = service
            .suggest("山田", None, assessment("相談"), Some(20))
            .await
            .expect("outcome");
        assert_eq!(outcome.source(), Some(SuggestionSource::Advanced));
        assert_eq!(outcome.suggestions().len(), MAX_SUGGESTIONS);
        assert_eq!(outcome.suggestions()[0].resource_id, "a0");
        let body = backend.last_advanced_body().expect("request body");
        assert_eq!(body["top_k"], MAX_SUGGESTIONS);

        let outcome = service
            .suggest("山田", None, assessment("相談"), Some(3))
            .await
            .expect("outcome");
        assert_eq!(outcome.suggestions().len(), 3);
    }

    struct GatedProvider {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SuggestionProvider for GatedProvider {
        fn source(&self) -> SuggestionSource {
            SuggestionSource::Advanced
        }

        async fn suggest(&self, _request: &SuggestionRequest) -> Result<Vec<Suggestion>, AppError> {
            self.gate.notified().await;
            Ok(vec![Suggestion {
                resource_id: "late".to_string(),
                service_name: "late".to_string(),
                score: 1.0,
                matched_keywords: vec![],
                excerpt: None,
                reason: None,
                task_suggestion: None,
                already_used: false,
                source: SuggestionSource::Advanced,
            }])
        }
    }

    #[tokio::test]
    async fn superseded_request_result_is_discarded() {
        let backend = spawn_backend(catalog(), AdvancedBehavior::Fail).await;
        let gate = Arc::new(Notify::new());
        let service = Arc::new(SuggestionService::new(
            tracker(),
            FallbackSuggester::new(
                Some(Arc::new(GatedProvider { gate: Arc::clone(&gate) })),
                keyword(&backend),
            ),
        ));

        let slow = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .suggest("山田", Some("panel-1"), assessment("相談"), None)
                    .await
            })
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        // The same panel switches to another client before the first call returns.
        let newer = service
            .suggest("佐藤", Some("panel-1"), AssessmentData::from_value(None), None)
            .await
            .expect("newer");
        assert_eq!(newer, SuggestionOutcome::NoAssessment);

        gate.notify_one();
        let stale = slow.await.expect("join").expect("outcome");
        assert_eq!(stale, SuggestionOutcome::Superseded);
        assert_eq!(service.generations.in_flight(), 0);
    }
}
