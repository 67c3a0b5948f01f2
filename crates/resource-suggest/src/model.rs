use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use welfare_common::mcp_api::UsageStatus;

/// A social-welfare program, service or institution from the resource catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Catalog document ID. Records without one cannot be referenced later and
    /// are never suggested.
    #[serde(default)]
    pub id: Option<String>,
    pub service_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Seconds since epoch of the last manual verification.
    #[serde(default)]
    pub last_verified_at: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub eligibility: Option<String>,
    #[serde(default)]
    pub application_process: Option<String>,
    #[serde(default)]
    pub target_users: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_url: Option<String>,
}

impl ResourceRecord {
    /// The ID, if present and non-empty.
    pub fn resource_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Association between a client and a resource they use or used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: String,
    pub client_name: String,
    pub resource_id: String,
    pub service_name: String,
    pub status: UsageStatus,
    #[serde(default)]
    pub added_at: Option<u64>,
    #[serde(default)]
    pub added_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// form name -> category name -> text | { sub-category -> text }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentDocument(pub Map<String, Value>);

/// The envelope the dashboard sends: `{"assessment": AssessmentDocument}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentData {
    #[serde(default)]
    pub assessment: Option<AssessmentDocument>,
}

impl AssessmentData {
    /// Lenient conversion from arbitrary JSON. Anything that is not an object
    /// with an object-valued `assessment` key means "no assessment".
    pub fn from_value(value: Option<&Value>) -> Self {
        let assessment = value
            .and_then(|v| v.get("assessment"))
            .and_then(Value::as_object)
            .map(|m| AssessmentDocument(m.clone()));
        Self { assessment }
    }
}
