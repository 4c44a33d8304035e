use anyhow::{Context, Result};
use mongodb::{
    Database, IndexModel,
    bson::doc,
    options::IndexOptions,
};
use std::{fs, time::Duration};
use tracing::warn;

use crate::models::{
    ActivityLog, Client, Invoice, Notification, Quotation, Receipt, SeedUser, Session, User,
};
use crate::totp::{DEFAULT_SECRET_BYTES, generate_base32_secret_n};

const COLLECTIONS: [&str; 9] = [
    "users",
    "sessions",
    "clients",
    "templates",
    "quotations",
    "invoices",
    "receipts",
    "notifications",
    "activity_logs",
];

pub(super) async fn is_database_empty(db: &Database) -> Result<bool> {
    let users_coll = db.collection::<User>("users");
    let count = users_coll.estimated_document_count().await?;
    Ok(count == 0)
}

/// A missing seed file just means there is nothing to seed.
pub(super) fn load_default_users(users_file: &str) -> Result<Vec<SeedUser>> {
    match fs::read_to_string(users_file) {
        Ok(users_json) => serde_json::from_str::<Vec<SeedUser>>(&users_json)
            .with_context(|| format!("invalid users file {users_file}")),
        Err(_) => Ok(Vec::new()),
    }
}

pub(super) async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    for name in COLLECTIONS {
        if !existing.iter().any(|e| e == name) {
            db.create_collection(name).await?;
        }
    }
    Ok(())
}

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

pub(super) async fn ensure_indexes(db: &Database) -> Result<()> {
    db.collection::<User>("users")
        .create_index(unique(doc! { "email": 1 }))
        .await?;
    db.collection::<Session>("sessions")
        .create_index(unique(doc! { "token": 1 }))
        .await?;
    // Mongo drops sessions on its own once `expires_at` passes.
    db.collection::<Session>("sessions")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(IndexOptions::builder().expire_after(Duration::ZERO).build())
                .build(),
        )
        .await?;
    db.collection::<Client>("clients")
        .create_index(plain(doc! { "creator": 1, "is_deleted": 1 }))
        .await?;
    db.collection::<Quotation>("quotations")
        .create_index(unique(doc! { "creator": 1, "quote_number": 1 }))
        .await?;
    db.collection::<Invoice>("invoices")
        .create_index(unique(doc! { "creator": 1, "invoice_number": 1 }))
        .await?;
    db.collection::<Invoice>("invoices")
        .create_index(plain(doc! { "status": 1, "due_date": 1 }))
        .await?;
    // One invoice per quotation; invoices created without a quotation are exempt.
    db.collection::<Invoice>("invoices")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "quotation": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "quotation": { "$type": "objectId" } })
                        .build(),
                )
                .build(),
        )
        .await?;
    db.collection::<Quotation>("quotations")
        .create_index(plain(doc! { "conversion.state": 1, "updated_at": 1 }))
        .await?;
    db.collection::<Receipt>("receipts")
        .create_index(unique(doc! { "creator": 1, "receipt_number": 1 }))
        .await?;
    db.collection::<Receipt>("receipts")
        .create_index(plain(doc! { "invoice": 1 }))
        .await?;
    db.collection::<Notification>("notifications")
        .create_index(plain(doc! { "user": 1, "created_at": -1 }))
        .await?;
    db.collection::<ActivityLog>("activity_logs")
        .create_index(plain(doc! { "user": 1, "created_at": -1 }))
        .await?;
    Ok(())
}

pub(super) async fn seed_default_users(db: &Database, users: &[SeedUser]) -> Result<usize> {
    let users_coll = db.collection::<User>("users");
    for seed in users {
        // Users listed without a secret get a fresh one; they enroll through /setup.
        let secret = if seed.secret.trim().is_empty() {
            warn!(email = %seed.email, "seed user has no TOTP secret, generating one");
            generate_base32_secret_n(DEFAULT_SECRET_BYTES)
        } else {
            seed.secret.trim().to_string()
        };
        users_coll
            .insert_one(User {
                id: None,
                email: seed.email.trim().to_lowercase(),
                secret,
                name: seed.name.clone(),
                company_name: seed.company_name.clone(),
                position: String::new(),
                phone: String::new(),
                address: String::new(),
                logo: None,
                quote_terms: String::new(),
                invoice_terms: String::new(),
                last_quote_number: 0,
                last_invoice_number: 0,
                last_receipt_number: 0,
            })
            .await
            .with_context(|| format!("failed to seed user {}", seed.email))?;
    }
    Ok(users.len())
}
