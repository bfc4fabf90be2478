//! Demo data: four companies, four users and five contacts.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::entities::company;
use crate::errors::AppError;
use crate::storage::{self, ContactInput};

const COMPANIES: &[&str] = &["Coca Cola", "Legal Co", "Pepsi Co", "Capri Sun"];

// username, display name, role, department
const USERS: &[(&str, &str, &str, &str)] = &[
    ("alice", "Alice", "admin", "IT"),
    ("john", "John", "user", "Sales"),
    ("sarah", "Sarah", "user", "Sales"),
    ("geri", "Geri", "user", "Marketing"),
];

// first, last, owner, company, marketing_opt_in, is_active
const CONTACTS: &[(&str, &str, &str, &str, bool, bool)] = &[
    ("Nick", "Smyth", "john", "Coca Cola", true, true),
    ("Simon", "Jaff", "john", "Legal Co", true, false),
    ("Mary", "Jane", "sarah", "Pepsi Co", false, true),
    ("Christina", "Baker", "sarah", "Capri Sun", true, false),
    ("Aleks", "Kozlov", "sarah", "Pepsi Co", true, true),
];

/// Ids the store assigned to seeded rows, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub users: BTreeMap<String, i32>,
    pub companies: BTreeMap<String, i32>,
    /// Keyed by "First Last".
    pub contacts: BTreeMap<String, i32>,
}

impl SeedReport {
    pub fn user(&self, username: &str) -> Option<i32> {
        self.users.get(username).copied()
    }

    pub fn contact(&self, full_name: &str) -> Option<i32> {
        self.contacts.get(full_name).copied()
    }
}

/// Insert the demo data unless users already exist.
///
/// Returns `None` when seeding was skipped.
pub async fn populate(db: &DatabaseConnection) -> Result<Option<SeedReport>, AppError> {
    if storage::count_users(db).await? > 0 {
        tracing::info!("Users already present, skipping seed data");
        return Ok(None);
    }

    let mut report = SeedReport::default();

    for name in COMPANIES {
        let model = company::ActiveModel {
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            name: Set(name.to_string()),
            website: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await?;
        report.companies.insert(name.to_string(), model.id);
    }

    for (username, name, role, department) in USERS {
        let model = storage::create_user(db, username, name, role, department).await?;
        report.users.insert(username.to_string(), model.id);
    }

    for (first, last, owner, company, opt_in, active) in CONTACTS {
        let owner_id = report
            .user(owner)
            .ok_or_else(|| AppError::Other(format!("seed owner `{owner}` missing")))?;
        let company_id = *report
            .companies
            .get(*company)
            .ok_or_else(|| AppError::Other(format!("seed company `{company}` missing")))?;
        let input = ContactInput {
            first_name: first.to_string(),
            last_name: last.to_string(),
            owner_id: Some(owner_id),
            company_id,
            is_active: *active,
            marketing_opt_in: *opt_in,
        };
        let model = storage::create_contact(db, owner_id, input).await?;
        report.contacts.insert(format!("{first} {last}"), model.id);
    }

    tracing::info!(
        users = report.users.len(),
        companies = report.companies.len(),
        contacts = report.contacts.len(),
        "Seeded demo data"
    );
    Ok(Some(report))
}
