//! Classifier and embedding clients.
//!
//! Both talk to an OpenAI-compatible endpoint. Classification is a single
//! structured-output chat call with an explicit JSON schema; a parse failure
//! or empty response is a hard error for the enclosing job.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{EmailClassification, EmailInsights, TagCategory};

use crate::config::AiConfig;
use crate::gmail::parser::truncate_chars;
use crate::models::TagRow;

/// Dimensionality of the embedding model output.
pub const EMBEDDING_DIMENSIONS: usize = 1536;
/// Body budget for the classification prompt.
const CLASSIFY_BODY_LIMIT: usize = 3_000;
/// Input budget for the embedding endpoint.
const EMBEDDING_INPUT_LIMIT: usize = 8_000;

/// Tag names per category, loaded fresh from the database on every
/// classification call.
#[derive(Debug, Clone, Default)]
pub struct TagTaxonomy {
    pub use_cases: Vec<String>,
    pub niches: Vec<String>,
    pub techniques: Vec<String>,
    pub purposes: Vec<String>,
    pub sender_types: Vec<String>,
}

impl TagTaxonomy {
    pub fn from_rows(rows: &[TagRow]) -> Self {
        let mut taxonomy = Self::default();
        for row in rows {
            let names = match TagCategory::from_str(&row.category) {
                Some(TagCategory::UseCase) => &mut taxonomy.use_cases,
                Some(TagCategory::Niche) => &mut taxonomy.niches,
                Some(TagCategory::Technique) => &mut taxonomy.techniques,
                Some(TagCategory::Purpose) => &mut taxonomy.purposes,
                Some(TagCategory::SenderType) => &mut taxonomy.sender_types,
                None => continue,
            };
            names.push(row.name.clone());
        }
        taxonomy
    }
}

#[derive(Debug, Deserialize)]
struct ClassifierOutput {
    classification: EmailClassification,
    insights: EmailInsights,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

/// Client for the LLM classification and embedding endpoints.
pub struct AiClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Classify an email against the tag taxonomy and produce narrative
    /// insights in one structured-output call.
    pub async fn classify_email(
        &self,
        subject: &str,
        body: &str,
        sender_email: &str,
        taxonomy: &TagTaxonomy,
    ) -> Result<(EmailClassification, EmailInsights)> {
        let prompt = build_classification_prompt(subject, body, sender_email, taxonomy);

        let request = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert email marketing analyst. Always respond with valid JSON.",
                },
                { "role": "user", "content": prompt },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "email_classification",
                    "strict": true,
                    "schema": classification_schema(),
                },
            },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach classification endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Classification API error ({}): {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Invalid chat completion response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .context("No response from classifier")?;

        let output: ClassifierOutput =
            serde_json::from_str(&content).context("Classifier returned malformed JSON")?;

        Ok((output.classification, output.insights))
    }

    /// Embed text into the fixed-dimension vector space.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = json!({
            "model": self.config.embedding_model,
            "input": truncate_chars(text, EMBEDDING_INPUT_LIMIT),
        });

        let response = self
            .http
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach embedding endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Embedding API error ({}): {}", status, body);
        }

        let data: EmbeddingResponse = response
            .json()
            .await
            .context("Invalid embedding response")?;

        let embedding = data
            .data
            .into_iter()
            .next()
            .context("Embedding response contained no vectors")?
            .embedding;

        Ok(embedding)
    }
}

fn build_classification_prompt(
    subject: &str,
    body: &str,
    sender_email: &str,
    taxonomy: &TagTaxonomy,
) -> String {
    format!(
        "You are an expert email marketing analyst. Analyze the following email and classify it.\n\
         \n\
         EMAIL CONTENT:\n\
         Subject: {subject}\n\
         From: {sender_email}\n\
         Body: {body}\n\
         \n\
         CLASSIFICATION CATEGORIES:\n\
         \n\
         1. USE CASE (select all that apply with confidence 0-100):\n{use_cases}\n\
         \n\
         2. NICHE/INDUSTRY (select primary with confidence 0-100):\n{niches}\n\
         \n\
         3. COPYWRITING TECHNIQUES (select all that apply with confidence 0-100):\n{techniques}\n\
         \n\
         4. PRIMARY PURPOSE (select one with confidence 0-100):\n{purposes}\n\
         \n\
         5. SENDER TYPE (select one with confidence 0-100):\n{sender_types}\n\
         \n\
         Return your analysis as JSON matching the provided schema. The summary should be a \
         brief 2-3 sentence description of the email's approach, with key takeaways, an \
         analysis of the call-to-action effectiveness, and an assessment of subject line quality.",
        subject = subject,
        sender_email = sender_email,
        body = truncate_chars(body, CLASSIFY_BODY_LIMIT),
        use_cases = taxonomy.use_cases.join(", "),
        niches = taxonomy.niches.join(", "),
        techniques = taxonomy.techniques.join(", "),
        purposes = taxonomy.purposes.join(", "),
        sender_types = taxonomy.sender_types.join(", "),
    )
}

/// JSON schema for the structured classification output. Mirrors
/// `EmailClassification` + `EmailInsights` exactly.
fn classification_schema() -> Value {
    fn tag_array() -> Value {
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "confidence": { "type": "number" },
                },
                "required": ["name", "confidence"],
                "additionalProperties": false,
            },
        })
    }

    json!({
        "type": "object",
        "properties": {
            "classification": {
                "type": "object",
                "properties": {
                    "useCases": tag_array(),
                    "niches": tag_array(),
                    "techniques": tag_array(),
                    "purposes": tag_array(),
                    "senderTypes": tag_array(),
                },
                "required": ["useCases", "niches", "techniques", "purposes", "senderTypes"],
                "additionalProperties": false,
            },
            "insights": {
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "keyTakeaways": { "type": "array", "items": { "type": "string" } },
                    "ctaAnalysis": { "type": "string" },
                    "headlineQuality": { "type": "string" },
                },
                "required": ["summary", "keyTakeaways", "ctaAnalysis", "headlineQuality"],
                "additionalProperties": false,
            },
        },
        "required": ["classification", "insights"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tag_row(category: &str, name: &str) -> TagRow {
        TagRow {
            id: Uuid::new_v4(),
            category: category.to_string(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn taxonomy_groups_rows_by_category() {
        let rows = vec![
            tag_row("use_case", "Welcome/Onboarding"),
            tag_row("niche", "SaaS/Technology"),
            tag_row("technique", "Urgency/Scarcity"),
            tag_row("purpose", "Sales/Conversion"),
            tag_row("sender_type", "Startup"),
            tag_row("unknown_category", "Dropped"),
        ];

        let taxonomy = TagTaxonomy::from_rows(&rows);
        assert_eq!(taxonomy.use_cases, vec!["Welcome/Onboarding"]);
        assert_eq!(taxonomy.niches, vec!["SaaS/Technology"]);
        assert_eq!(taxonomy.techniques, vec!["Urgency/Scarcity"]);
        assert_eq!(taxonomy.purposes, vec!["Sales/Conversion"]);
        assert_eq!(taxonomy.sender_types, vec!["Startup"]);
    }

    #[test]
    fn prompt_truncates_body_to_budget() {
        let taxonomy = TagTaxonomy::default();
        let long_body = "a".repeat(10_000);
        let prompt = build_classification_prompt("Subject", &long_body, "x@y.com", &taxonomy);

        // The 3000-char slice appears; the full body does not.
        assert!(prompt.contains(&"a".repeat(3_000)));
        assert!(!prompt.contains(&"a".repeat(3_001)));
    }

    #[test]
    fn prompt_lists_taxonomy_names() {
        let taxonomy = TagTaxonomy {
            use_cases: vec!["Abandoned Cart".to_string(), "Referral".to_string()],
            ..Default::default()
        };
        let prompt = build_classification_prompt("s", "b", "x@y.com", &taxonomy);
        assert!(prompt.contains("Abandoned Cart, Referral"));
    }

    #[test]
    fn schema_requires_all_category_arrays() {
        let schema = classification_schema();
        let required = schema["properties"]["classification"]["required"]
            .as_array()
            .unwrap();
        let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(
            names,
            vec!["useCases", "niches", "techniques", "purposes", "senderTypes"]
        );
    }

    #[test]
    fn classifier_output_parses_schema_shaped_json() {
        let content = r#"{
            "classification": {
                "useCases": [{"name": "Promotional/Sales", "confidence": 95}],
                "niches": [{"name": "E-commerce/Retail", "confidence": 90}],
                "techniques": [],
                "purposes": [{"name": "Sales/Conversion", "confidence": 95}],
                "senderTypes": [{"name": "E-commerce Brand", "confidence": 90}]
            },
            "insights": {
                "summary": "A flash sale email.",
                "keyTakeaways": ["Discount-led"],
                "ctaAnalysis": "Clear single CTA",
                "headlineQuality": "Strong urgency"
            }
        }"#;

        let output: ClassifierOutput = serde_json::from_str(content).unwrap();
        assert_eq!(output.classification.use_cases[0].name, "Promotional/Sales");
        assert_eq!(output.insights.key_takeaways.len(), 1);
    }
}
