//! Database seeder for incident reporting development and testing.
//!
//! Seeds a fixed incident and comment so the upload flow can be exercised
//! locally, then prints bearer tokens for a reporter and an admin when
//! `INCIDENT_JWT__SECRET` is set.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use chrono::Utc;
use incident_db::entities::{comments, incidents};
use incident_shared::types::UserId;
use incident_shared::{JwtConfig, JwtService};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

/// Reporter who owns the seeded incident.
const TEST_REPORTER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);
/// Admin allowed to abort anyone's upload.
const TEST_ADMIN_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0003);
/// Seeded incident ID.
const TEST_INCIDENT_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0010);
/// Seeded comment ID.
const TEST_COMMENT_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0020);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("INCIDENT_DATABASE__URL"))
        .context("DATABASE_URL must be set in environment")?;

    println!("Connecting to database...");
    let db = incident_db::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    println!("Seeding test incident...");
    seed_incident(&db).await?;

    println!("Seeding test comment...");
    seed_comment(&db).await?;

    if let Ok(secret) = std::env::var("INCIDENT_JWT__SECRET") {
        print_tokens(secret)?;
    }

    println!("Seeding complete!");
    Ok(())
}

/// Seeds an open incident reported by the test reporter.
async fn seed_incident(db: &DatabaseConnection) -> anyhow::Result<()> {
    if incidents::Entity::find_by_id(TEST_INCIDENT_ID)
        .one(db)
        .await?
        .is_some()
    {
        println!("  Test incident already exists, skipping...");
        return Ok(());
    }

    let now = Utc::now();
    incidents::ActiveModel {
        id: Set(TEST_INCIDENT_ID),
        title: Set("Water leak in server room".to_string()),
        description: Set("Ceiling tile above rack 4 is dripping.".to_string()),
        status: Set("open".to_string()),
        reported_by: Set(TEST_REPORTER_ID),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await
    .context("Failed to create test incident")?;

    println!("  Created incident {TEST_INCIDENT_ID}");
    Ok(())
}

/// Seeds a comment on the test incident.
async fn seed_comment(db: &DatabaseConnection) -> anyhow::Result<()> {
    if comments::Entity::find_by_id(TEST_COMMENT_ID)
        .one(db)
        .await?
        .is_some()
    {
        println!("  Test comment already exists, skipping...");
        return Ok(());
    }

    comments::ActiveModel {
        id: Set(TEST_COMMENT_ID),
        incident_id: Set(TEST_INCIDENT_ID),
        author_id: Set(TEST_REPORTER_ID),
        body: Set("Photo of the damage attached.".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .context("Failed to create test comment")?;

    println!("  Created comment {TEST_COMMENT_ID}");
    Ok(())
}

/// Prints long-lived development tokens for the seeded users.
fn print_tokens(secret: String) -> anyhow::Result<()> {
    let jwt = JwtService::new(JwtConfig {
        secret,
        access_token_expires_minutes: 60 * 24,
    });

    let reporter = jwt.generate_access_token(UserId::from_uuid(TEST_REPORTER_ID), "reporter")?;
    let admin = jwt.generate_access_token(UserId::from_uuid(TEST_ADMIN_ID), "admin")?;

    println!("  Reporter token: {reporter}");
    println!("  Admin token:    {admin}");
    Ok(())
}
