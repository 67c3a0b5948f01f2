/// MCP server for social-resource suggestions and per-client resource usage.
///
/// Exposes eight tools:
/// - `suggest_resources`: Rank catalog resources against a client's assessment
/// - `list_client_resources` / `add_client_resource` /
///   `set_client_resource_status` / `remove_client_resource`: usage records
/// - `search_resources`: Free-text catalog search
/// - `get_resource`: Full catalog record by ID
/// - `refresh_catalog`: Drop the cached catalog snapshot and refetch
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use welfare_common::mcp_api::{
    AddClientResourceParams, ClientParams, ClientResourceResponse, ClientResourceUsage,
    ClientResourcesResponse, GetResourceParams, OkResponse, RefreshCatalogResponse,
    RemoveClientResourceParams, ResourceDetailResponse, ResourceSummary, SearchResourcesParams,
    SearchResourcesResponse, SetClientResourceStatusParams, SuggestResourcesParams,
    SuggestResourcesResponse, SuggestedResource,
};

use crate::catalog::CatalogService;
use crate::model::{AssessmentData, ResourceRecord, UsageRecord};
use crate::provider::Suggestion;
use crate::search::DEFAULT_SEARCH_LIMIT;
use crate::suggest::{SuggestionOutcome, SuggestionService};
use crate::usage::UsageTracker;

const MAX_SEARCH_LIMIT: usize = 500;

#[derive(Clone)]
pub struct ResourceSuggestServer {
    catalog: Arc<CatalogService>,
    usage: UsageTracker,
    suggestions: Arc<SuggestionService>,
    tool_router: ToolRouter<ResourceSuggestServer>,
}

impl ResourceSuggestServer {
    pub fn new(
        catalog: Arc<CatalogService>,
        usage: UsageTracker,
        suggestions: Arc<SuggestionService>,
    ) -> Self {
        Self {
            catalog,
            usage,
            suggestions,
            tool_router: Self::tool_router(),
        }
    }
}

fn required(value: &str, name: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{name} must not be empty"));
    }
    Ok(value.to_string())
}

#[tool_router]
impl ResourceSuggestServer {
    #[tool(description = "Suggest social-welfare resources for a client from their latest assessment. Uses the AI suggestion service when available and falls back to keyword matching. Resources the client already uses are not suggested by keyword matching and are flagged already_used in AI results.")]
    async fn suggest_resources(
        &self,
        Parameters(params): Parameters<SuggestResourcesParams>,
    ) -> Result<Json<SuggestResourcesResponse>, String> {
        let client_name = required(&params.client_name, "client_name")?;
        let view = params.view_id.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let assessment = AssessmentData::from_value(params.assessment_data.as_ref());
        let top_k = params.top_k.map(|k| k as usize);

        let outcome = self
            .suggestions
            .suggest(&client_name, view, assessment, top_k)
            .await
            .map_err(|e| format!("suggestion failed: {e}"))?;

        Ok(Json(to_api_suggestions(&outcome)))
    }

    #[tool(description = "List the resources a client uses or used, active first, newest first.")]
    async fn list_client_resources(
        &self,
        Parameters(params): Parameters<ClientParams>,
    ) -> Result<Json<ClientResourcesResponse>, String> {
        let client_name = required(&params.client_name, "client_name")?;
        let usages = self
            .usage
            .list(&client_name)
            .await
            .map_err(|e| format!("failed to load resource usage: {e}"))?;
        Ok(Json(ClientResourcesResponse {
            client_name,
            usages: usages.iter().map(to_api_usage).collect(),
        }))
    }

    #[tool(description = "Mark a catalog resource as in use by a client (status 'active').")]
    async fn add_client_resource(
        &self,
        Parameters(params): Parameters<AddClientResourceParams>,
    ) -> Result<Json<ClientResourceResponse>, String> {
        let client_name = required(&params.client_name, "client_name")?;
        let resource_id = required(&params.resource_id, "resource_id")?;

        let resource = self
            .catalog
            .resource(&resource_id)
            .await
            .map_err(|e| format!("failed to load resource: {e}"))?;
        let usage = self
            .usage
            .add(&client_name, &resource)
            .await
            .map_err(|e| format!("failed to add resource usage: {e}"))?;
        Ok(Json(ClientResourceResponse {
            usage: to_api_usage(&usage),
        }))
    }

    #[tool(description = "Set a client's resource usage to 'active' or 'ended'.")]
    async fn set_client_resource_status(
        &self,
        Parameters(params): Parameters<SetClientResourceStatusParams>,
    ) -> Result<Json<ClientResourceResponse>, String> {
        let client_name = required(&params.client_name, "client_name")?;
        let usage_id = required(&params.usage_id, "usage_id")?;
        let usage = self
            .usage
            .set_status(&client_name, &usage_id, params.status)
            .await
            .map_err(|e| format!("failed to update resource usage: {e}"))?;
        Ok(Json(ClientResourceResponse {
            usage: to_api_usage(&usage),
        }))
    }

    #[tool(description = "Delete a client's resource usage record.")]
    async fn remove_client_resource(
        &self,
        Parameters(params): Parameters<RemoveClientResourceParams>,
    ) -> Result<Json<OkResponse>, String> {
        let client_name = required(&params.client_name, "client_name")?;
        let usage_id = required(&params.usage_id, "usage_id")?;
        self.usage
            .remove(&client_name, &usage_id)
            .await
            .map_err(|e| format!("failed to remove resource usage: {e}"))?;
        Ok(Json(OkResponse { ok: true }))
    }

    #[tool(description = "Search the resource catalog. Every whitespace-separated term must appear in the name, category, description, provider, location, target users or keywords.")]
    async fn search_resources(
        &self,
        Parameters(params): Parameters<SearchResourcesParams>,
    ) -> Result<Json<SearchResourcesResponse>, String> {
        let query = required(&params.query, "query")?;
        let limit = params
            .limit
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .min(MAX_SEARCH_LIMIT);

        let results = self
            .catalog
            .search(&query, limit)
            .await
            .map_err(|e| format!("search failed: {e}"))?;
        Ok(Json(SearchResourcesResponse {
            results: results.iter().filter_map(to_api_summary).collect(),
        }))
    }

    #[tool(description = "Get the full catalog record of a resource by ID.")]
    async fn get_resource(
        &self,
        Parameters(params): Parameters<GetResourceParams>,
    ) -> Result<Json<ResourceDetailResponse>, String> {
        let resource_id = required(&params.resource_id, "resource_id")?;
        let resource = self
            .catalog
            .resource(&resource_id)
            .await
            .map_err(|e| format!("failed to load resource: {e}"))?;
        Ok(Json(to_api_detail(resource_id, resource)))
    }

    #[tool(description = "Drop the cached resource catalog and fetch it again from the backend.")]
    async fn refresh_catalog(&self) -> Result<Json<RefreshCatalogResponse>, String> {
        info!("refresh_catalog tool invoked");
        let resource_count = self
            .catalog
            .refresh()
            .await
            .map_err(|e| format!("catalog refresh failed: {e}"))?;
        Ok(Json(RefreshCatalogResponse { resource_count }))
    }
}

fn to_api_suggestions(outcome: &SuggestionOutcome) -> SuggestResourcesResponse {
    let advanced_error = match outcome {
        SuggestionOutcome::Ranked(r) => r.primary_error.clone(),
        _ => None,
    };
    SuggestResourcesResponse {
        status: outcome.status(),
        message: outcome.message(),
        source: outcome.source(),
        suggestions: outcome.suggestions().iter().map(to_api_suggestion).collect(),
        advanced_failed: advanced_error.is_some(),
        advanced_error,
        retry_advanced: outcome.retry_advanced(),
    }
}

fn to_api_suggestion(s: &Suggestion) -> SuggestedResource {
    SuggestedResource {
        resource_id: s.resource_id.clone(),
        service_name: s.service_name.clone(),
        score: s.score,
        matched_keywords: s.matched_keywords.clone(),
        excerpt: s.excerpt.clone(),
        reason: s.reason.clone(),
        task_suggestion: s.task_suggestion.clone(),
        already_used: s.already_used,
        source: s.source,
    }
}

fn to_api_usage(u: &UsageRecord) -> ClientResourceUsage {
    ClientResourceUsage {
        usage_id: u.id.clone(),
        resource_id: u.resource_id.clone(),
        service_name: u.service_name.clone(),
        status: u.status,
        added_at: u.added_at,
        added_by: u.added_by.clone(),
        notes: u.notes.clone(),
    }
}

fn to_api_summary(r: &ResourceRecord) -> Option<ResourceSummary> {
    Some(ResourceSummary {
        resource_id: r.resource_id()?.to_string(),
        service_name: r.service_name.clone(),
        category: r.category.clone(),
        keywords: r.keywords.clone(),
        last_verified_at: r.last_verified_at,
    })
}

fn to_api_detail(requested_id: String, r: ResourceRecord) -> ResourceDetailResponse {
    ResourceDetailResponse {
        resource_id: r.id.filter(|id| !id.is_empty()).unwrap_or(requested_id),
        service_name: r.service_name,
        category: r.category,
        description: r.description,
        keywords: r.keywords,
        provider: r.provider,
        eligibility: r.eligibility,
        application_process: r.application_process,
        target_users: r.target_users,
        location: r.location,
        contact_phone: r.contact_phone,
        contact_email: r.contact_email,
        contact_url: r.contact_url,
        last_verified_at: r.last_verified_at,
    }
}

#[tool_handler]
impl ServerHandler for ResourceSuggestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "resource-suggest".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Social-welfare resource suggestion MCP server for caseworkers. Use \
                 suggest_resources with a client's assessment to get ranked resources, \
                 list_client_resources / add_client_resource / set_client_resource_status / \
                 remove_client_resource to manage what a client uses, search_resources and \
                 get_resource to browse the catalog, and refresh_catalog after catalog edits."
                    .to_string(),
            ),
        }
    }
}
