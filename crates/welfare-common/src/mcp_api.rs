use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Parameters ---

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SuggestResourcesParams {
    /// Client whose current resource usage is excluded from suggestions.
    pub client_name: String,
    /// Assessment envelope: `{"assessment": {form: {category: text | {sub: text}}}}`.
    /// Omit or pass `null` when the client has no saved assessment.
    #[serde(default)]
    pub assessment_data: Option<serde_json::Value>,
    /// Maximum number of suggestions (default: 8).
    pub top_k: Option<u32>,
    /// Caller's panel or view. A newer request for the same view discards
    /// the result of an older one still in flight. Defaults to `client_name`.
    #[serde(default)]
    pub view_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClientParams {
    pub client_name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddClientResourceParams {
    pub client_name: String,
    /// Catalog ID of the resource to mark as in use.
    pub resource_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetClientResourceStatusParams {
    pub client_name: String,
    pub usage_id: String,
    pub status: UsageStatus,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoveClientResourceParams {
    pub client_name: String,
    pub usage_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchResourcesParams {
    /// Whitespace-separated terms; every term must appear in the resource.
    pub query: String,
    /// Maximum number of results (default: 100).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetResourceParams {
    pub resource_id: String,
}

// --- Shared enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Ranked by the AI-backed suggestion endpoint.
    Advanced,
    /// Ranked by local keyword overlap.
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Suggestions,
    NoAssessment,
    NoAssessmentText,
    NoMatches,
    Superseded,
}

// --- Responses ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestedResource {
    pub resource_id: String,
    pub service_name: String,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub excerpt: Option<String>,
    pub reason: Option<String>,
    pub task_suggestion: Option<String>,
    /// The client already has a usage record for this resource.
    pub already_used: bool,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestResourcesResponse {
    pub status: SuggestionStatus,
    /// User-facing explanation of `status`.
    pub message: String,
    pub source: Option<SuggestionSource>,
    pub suggestions: Vec<SuggestedResource>,
    /// The advanced endpoint failed; `suggestions` come from keyword matching.
    pub advanced_failed: bool,
    pub advanced_error: Option<String>,
    /// Offer the user a manual retry of the advanced endpoint.
    pub retry_advanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientResourceUsage {
    pub usage_id: String,
    pub resource_id: String,
    pub service_name: String,
    pub status: UsageStatus,
    /// Seconds since epoch.
    pub added_at: Option<u64>,
    pub added_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientResourcesResponse {
    pub client_name: String,
    pub usages: Vec<ClientResourceUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientResourceResponse {
    pub usage: ClientResourceUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceSummary {
    pub resource_id: String,
    pub service_name: String,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub last_verified_at: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResourcesResponse {
    pub results: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceDetailResponse {
    pub resource_id: String,
    pub service_name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub provider: Option<String>,
    pub eligibility: Option<String>,
    pub application_process: Option<String>,
    pub target_users: Option<String>,
    pub location: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub contact_url: Option<String>,
    pub last_verified_at: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RefreshCatalogResponse {
    pub resource_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OkResponse {
    pub ok: bool,
}
