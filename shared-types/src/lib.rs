use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "diesel")]
mod json_wrapper;
#[cfg(feature = "diesel")]
pub use json_wrapper::JsonWrapper;

// ============================================================================
// Tag taxonomy
// ============================================================================

/// The five classification axes of the tag taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagCategory {
    UseCase,
    Niche,
    Technique,
    Purpose,
    SenderType,
}

impl TagCategory {
    /// All categories, in resolution-priority order. When a classifier
    /// returns the same tag name under several categories, the first
    /// category in this order wins.
    pub const ALL: [TagCategory; 5] = [
        TagCategory::UseCase,
        TagCategory::Niche,
        TagCategory::Technique,
        TagCategory::Purpose,
        TagCategory::SenderType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::UseCase => "use_case",
            TagCategory::Niche => "niche",
            TagCategory::Technique => "technique",
            TagCategory::Purpose => "purpose",
            TagCategory::SenderType => "sender_type",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "use_case" => Some(TagCategory::UseCase),
            "niche" => Some(TagCategory::Niche),
            "technique" => Some(TagCategory::Technique),
            "purpose" => Some(TagCategory::Purpose),
            "sender_type" => Some(TagCategory::SenderType),
            _ => None,
        }
    }
}

// ============================================================================
// Classification output
// ============================================================================

/// One scored tag from the classifier (confidence 0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    pub name: String,
    pub confidence: f32,
}

/// Structured classification across the five taxonomy categories.
///
/// Field names are camelCase because this is the exact schema of the LLM
/// structured-output contract, persisted verbatim in the swipe row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailClassification {
    pub use_cases: Vec<TagScore>,
    pub niches: Vec<TagScore>,
    pub techniques: Vec<TagScore>,
    pub purposes: Vec<TagScore>,
    pub sender_types: Vec<TagScore>,
}

impl EmailClassification {
    /// The five result arrays paired with their category, in
    /// resolution-priority order (matches `TagCategory::ALL`).
    pub fn by_category(&self) -> [(TagCategory, &[TagScore]); 5] {
        [
            (TagCategory::UseCase, &self.use_cases),
            (TagCategory::Niche, &self.niches),
            (TagCategory::Technique, &self.techniques),
            (TagCategory::Purpose, &self.purposes),
            (TagCategory::SenderType, &self.sender_types),
        ]
    }
}

/// Narrative analysis produced alongside the classification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailInsights {
    pub summary: String,
    pub key_takeaways: Vec<String>,
    pub cta_analysis: String,
    pub headline_quality: String,
}

// ============================================================================
// Parsed email
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    pub name: String,
}

/// Normalized email record produced by the mail parser. Travels through the
/// classification job payload, so it must round-trip through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEmail {
    pub subject: String,
    pub from: EmailAddress,
    pub to: String,
    pub date: DateTime<Utc>,
    pub html_body: String,
    pub plain_body: String,
    pub snippet: String,
    pub has_images: bool,
}

// ============================================================================
// Job log status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// API request/response types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxResponse {
    pub id: Uuid,
    pub email_address: String,
    pub gmail_history_id: Option<String>,
    pub watch_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectMailboxResponse {
    pub auth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub id: Uuid,
    pub mailbox_id: Uuid,
    pub gmail_message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub recipient_email: String,
    pub received_date: DateTime<Utc>,
    pub html_body: String,
    pub plain_body: String,
    pub snippet: String,
    pub is_html: bool,
    pub has_images: bool,
    pub classification: Option<EmailClassification>,
    pub insights: Option<EmailInsights>,
    pub is_favorite: bool,
    pub notes: Option<String>,
    pub manual_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwipeListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSwipeRequest {
    pub notes: Option<String>,
    pub manual_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteToggledResponse {
    pub success: bool,
    pub is_favorite: bool,
}

/// A tag attached to a swipe, with the link's confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeTagEntry {
    pub id: Uuid,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub confidence_score: i32,
    pub is_ai_generated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeDetailResponse {
    #[serde(flatten)]
    pub swipe: SwipeResponse,
    pub tags: Vec<SwipeTagEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimilarQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarSwipeResponse {
    #[serde(flatten)]
    pub swipe: SwipeResponse,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagResponse {
    pub id: Uuid,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSwipeToCollectionRequest {
    pub swipe_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogResponse {
    pub id: Uuid,
    pub job_type: String,
    pub status: String,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_serializes_camel_case() {
        let classification = EmailClassification {
            use_cases: vec![TagScore {
                name: "Promotional/Sales".to_string(),
                confidence: 95.0,
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(&classification).unwrap();
        assert!(json.get("useCases").is_some());
        assert!(json.get("use_cases").is_none());
        assert_eq!(json["useCases"][0]["name"], "Promotional/Sales");
    }

    #[test]
    fn insights_round_trip() {
        let insights = EmailInsights {
            summary: "Flash sale announcement.".to_string(),
            key_takeaways: vec!["Urgency framing".to_string()],
            cta_analysis: "Single clear CTA".to_string(),
            headline_quality: "Strong".to_string(),
        };

        let json = serde_json::to_string(&insights).unwrap();
        assert!(json.contains("keyTakeaways"));
        let parsed: EmailInsights = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, insights);
    }

    #[test]
    fn tag_category_round_trip() {
        for category in TagCategory::ALL {
            assert_eq!(TagCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(TagCategory::from_str("unknown"), None);
    }

    #[test]
    fn by_category_preserves_resolution_order() {
        let classification = EmailClassification::default();
        let categories: Vec<TagCategory> = classification
            .by_category()
            .iter()
            .map(|(c, _)| *c)
            .collect();
        assert_eq!(categories, TagCategory::ALL.to_vec());
    }
}
