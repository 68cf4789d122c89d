//! Seeds the tag taxonomy: five categories of reference tags the
//! classifier scores against. Safe to re-run; existing entries get their
//! descriptions refreshed.

use anyhow::{Context, Result};

use backend::db;

const TAG_DATA: &[(&str, &str, &str)] = &[
    // Use Cases
    ("use_case", "Welcome/Onboarding", "New user welcome emails"),
    ("use_case", "Promotional/Sales", "Discount and sales promotions"),
    ("use_case", "Abandoned Cart", "Cart abandonment recovery"),
    ("use_case", "Win-back/Re-engagement", "Inactive user re-engagement"),
    ("use_case", "Newsletter/Content", "Regular newsletter content"),
    ("use_case", "Product Launch", "New product announcements"),
    ("use_case", "Referral", "Referral program emails"),
    ("use_case", "Transactional", "Order confirmations, receipts"),
    ("use_case", "Event/Webinar", "Event invitations and reminders"),
    ("use_case", "Survey/Feedback", "Customer feedback requests"),
    // Niches
    ("niche", "SaaS/Technology", "Software and tech products"),
    ("niche", "E-commerce/Retail", "Online retail and shopping"),
    ("niche", "Finance/Fintech", "Financial services and products"),
    ("niche", "Health/Wellness", "Health and fitness products"),
    ("niche", "Education/EdTech", "Educational products and courses"),
    ("niche", "B2B Services", "Business-to-business services"),
    ("niche", "Consumer Apps", "Consumer mobile and web apps"),
    ("niche", "Real Estate", "Property and real estate"),
    ("niche", "Media/Publishing", "Content and media companies"),
    ("niche", "Non-profit", "Charitable organizations"),
    // Copywriting techniques
    ("technique", "Urgency/Scarcity", "Limited time or quantity offers"),
    ("technique", "Social Proof", "Testimonials and user numbers"),
    ("technique", "Storytelling", "Narrative-driven content"),
    ("technique", "Personalization", "Customized to recipient"),
    ("technique", "Problem/Solution", "Addresses pain points"),
    ("technique", "Before/After", "Transformation stories"),
    ("technique", "Question Hook", "Opens with engaging question"),
    ("technique", "Curiosity Gap", "Creates intrigue to click"),
    ("technique", "Benefit-focused", "Emphasizes user benefits"),
    ("technique", "Feature List", "Lists product features"),
    ("technique", "Objection Handling", "Addresses common concerns"),
    ("technique", "Call-to-Action Focus", "Strong, clear CTAs"),
    // Purpose
    ("purpose", "Sales/Conversion", "Drive purchases or signups"),
    ("purpose", "Education", "Inform and teach users"),
    ("purpose", "Engagement", "Increase user interaction"),
    ("purpose", "Retention", "Keep users active"),
    ("purpose", "Brand Building", "Build brand awareness"),
    ("purpose", "Support", "Customer support and help"),
    // Sender types
    ("sender_type", "Startup", "Early-stage companies"),
    ("sender_type", "Enterprise", "Large corporations"),
    ("sender_type", "Solo Creator", "Individual creators"),
    ("sender_type", "Agency", "Marketing or service agencies"),
    ("sender_type", "E-commerce Brand", "Online retail brands"),
    ("sender_type", "Newsletter", "Newsletter publishers"),
    ("sender_type", "Marketplace", "Multi-vendor platforms"),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = db::establish_connection_pool(&database_url)?;
    let mut conn = pool.get().await.context("Failed to get DB connection")?;

    tracing::info!("Seeding {} tags...", TAG_DATA.len());

    for &(category, name, description) in TAG_DATA {
        db::tags::upsert_seed(&mut conn, category, name, Some(description)).await?;
    }

    tracing::info!("Tag taxonomy seeded");
    Ok(())
}
