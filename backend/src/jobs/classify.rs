//! AI classification processor: classify, embed, persist, index, tag.
//!
//! Steps are strictly sequential; any failure aborts the remaining steps
//! for the message and the queue retries the whole job.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{EmailClassification, JsonWrapper, ParsedEmail, TagCategory};
use std::collections::HashMap;
use uuid::Uuid;

use super::JobKind;
use crate::ai::TagTaxonomy;
use crate::db;
use crate::gmail::parser;
use crate::models::{NewSwipe, TagRow};
use crate::vector::VectorPayload;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyEmailJob {
    pub mailbox_id: Uuid,
    pub user_id: Uuid,
    pub gmail_message_id: String,
    pub thread_id: String,
    pub parsed: ParsedEmail,
}

pub async fn process(state: &AppState, data: ClassifyEmailJob) -> Result<()> {
    // The audit payload carries only the message id; the parsed body
    // would bloat the log table.
    let log_payload = json!({ "gmail_message_id": data.gmail_message_id });

    super::run_logged(
        &state.pool,
        JobKind::AiClassification.as_str(),
        &log_payload,
        || run(state, &data),
    )
    .await
}

async fn run(state: &AppState, data: &ClassifyEmailJob) -> Result<()> {
    let parsed = &data.parsed;
    let text = parser::extract_text_for_ai(parsed);

    let mut conn = state
        .pool
        .get()
        .await
        .context("Failed to get DB connection")?;

    // Taxonomy is loaded fresh for every classification call.
    let tag_rows = db::tags::list_all(&mut conn).await?;
    let taxonomy = TagTaxonomy::from_rows(&tag_rows);

    let (classification, insights) = state
        .ai
        .classify_email(&parsed.subject, &text, &parsed.from.email, &taxonomy)
        .await?;

    let embedding = state.ai.generate_embedding(&text).await?;

    let embedding_id = Uuid::new_v4();
    let swipe = db::swipes::create(
        &mut conn,
        NewSwipe {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            mailbox_id: data.mailbox_id,
            gmail_message_id: data.gmail_message_id.clone(),
            thread_id: data.thread_id.clone(),
            subject: parsed.subject.clone(),
            sender_email: parsed.from.email.clone(),
            sender_name: parsed.from.name.clone(),
            recipient_email: parsed.to.clone(),
            received_date: parsed.date,
            html_body: parser::clean_html(&parsed.html_body),
            plain_body: parsed.plain_body.clone(),
            snippet: parsed.snippet.clone(),
            is_html: !parsed.html_body.is_empty(),
            has_images: parsed.has_images,
            ai_classification: Some(JsonWrapper::new(classification.clone())),
            ai_insights: Some(JsonWrapper::new(insights)),
            embedding_vector_id: Some(embedding_id),
        },
    )
    .await?;

    state
        .vector
        .upsert(
            embedding_id,
            &embedding,
            &VectorPayload {
                swipe_id: swipe.id,
                user_id: data.user_id,
                subject: parsed.subject.clone(),
                sender_email: parsed.from.email.clone(),
                received_date: parsed.date.to_rfc3339(),
            },
        )
        .await?;

    link_tags(&mut conn, swipe.id, &classification, &tag_rows).await?;

    tracing::info!("Classified email: {}", parsed.subject);
    Ok(())
}

/// Link classifier-returned tags to the swipe. Tags whose (category, name)
/// has no taxonomy row are silently dropped.
async fn link_tags(
    conn: &mut diesel_async::AsyncPgConnection,
    swipe_id: Uuid,
    classification: &EmailClassification,
    tag_rows: &[TagRow],
) -> Result<()> {
    let category_of = category_lookup(classification);
    let tag_ids: HashMap<(&str, &str), Uuid> = tag_rows
        .iter()
        .map(|tag| ((tag.category.as_str(), tag.name.as_str()), tag.id))
        .collect();

    for (_, scores) in classification.by_category() {
        for score in scores {
            let Some(category) = category_of.get(score.name.as_str()) else {
                continue;
            };
            let Some(&tag_id) = tag_ids.get(&(category.as_str(), score.name.as_str())) else {
                continue;
            };

            db::swipe_tags::upsert(conn, swipe_id, tag_id, score.confidence.round() as i32, true)
                .await?;
        }
    }

    Ok(())
}

/// One name→category pass over the five result arrays. The first category
/// containing a name claims it; later categories do not override.
fn category_lookup(classification: &EmailClassification) -> HashMap<&str, TagCategory> {
    let mut lookup = HashMap::new();
    for (category, scores) in classification.by_category() {
        for score in scores {
            lookup.entry(score.name.as_str()).or_insert(category);
        }
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::TagScore;

    fn score(name: &str, confidence: f32) -> TagScore {
        TagScore {
            name: name.to_string(),
            confidence,
        }
    }

    #[test]
    fn lookup_maps_names_to_their_category() {
        let classification = EmailClassification {
            use_cases: vec![score("Welcome/Onboarding", 90.0)],
            niches: vec![score("SaaS/Technology", 80.0)],
            sender_types: vec![score("Startup", 75.0)],
            ..Default::default()
        };

        let lookup = category_lookup(&classification);
        assert_eq!(lookup["Welcome/Onboarding"], TagCategory::UseCase);
        assert_eq!(lookup["SaaS/Technology"], TagCategory::Niche);
        assert_eq!(lookup["Startup"], TagCategory::SenderType);
    }

    #[test]
    fn duplicate_name_resolves_to_first_category_in_order() {
        // "Newsletter" exists both as a use case and a sender type; the
        // category-array iteration order decides.
        let classification = EmailClassification {
            use_cases: vec![score("Newsletter", 70.0)],
            sender_types: vec![score("Newsletter", 85.0)],
            ..Default::default()
        };

        let lookup = category_lookup(&classification);
        assert_eq!(lookup["Newsletter"], TagCategory::UseCase);
    }

    #[test]
    fn classify_payload_round_trips_with_parsed_email() {
        let job = ClassifyEmailJob {
            mailbox_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gmail_message_id: "gm1".to_string(),
            thread_id: "th1".to_string(),
            parsed: ParsedEmail {
                subject: "Hello".to_string(),
                from: shared_types::EmailAddress {
                    email: "a@b.com".to_string(),
                    name: "A".to_string(),
                },
                to: "me@inbox.com".to_string(),
                date: chrono::Utc::now(),
                html_body: "<p>hi</p>".to_string(),
                plain_body: "hi".to_string(),
                snippet: "hi".to_string(),
                has_images: false,
            },
        };

        let json = serde_json::to_string(&job).unwrap();
        let parsed: ClassifyEmailJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.gmail_message_id, "gm1");
        assert_eq!(parsed.parsed.subject, "Hello");
    }
}
