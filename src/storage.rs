use crate::authz::types::Principal;
use crate::entities::{contact, user};
use crate::errors::AppError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /contacts/new` and `PUT /contacts/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInput {
    pub first_name: String,
    pub last_name: String,
    /// Defaults to the calling user on create, unchanged on update.
    #[serde(default)]
    pub owner_id: Option<i32>,
    pub company_id: i32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub marketing_opt_in: bool,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, AppError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>, AppError> {
    let model = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    Ok(model)
}

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    name: &str,
    role: &str,
    department: &str,
) -> Result<user::Model, AppError> {
    let user = user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{username}@acme.example")),
        name: Set(name.to_string()),
        role: Set(role.to_string()),
        department: Set(department.to_string()),
        ..Default::default()
    };
    Ok(user.insert(db).await?)
}

pub async fn count_users(db: &DatabaseConnection) -> Result<u64, AppError> {
    use sea_orm::PaginatorTrait;
    Ok(user::Entity::find().count(db).await?)
}

/// The principal the PDP sees for a stored user.
pub fn principal_for(user: &user::Model) -> Principal {
    Principal::new(user.id.to_string())
        .with_role(user.role.clone())
        .with_attr("department", user.department.clone())
}

pub async fn get_contact(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<contact::Model>, AppError> {
    Ok(contact::Entity::find_by_id(id).one(db).await?)
}

pub async fn create_contact(
    db: &DatabaseConnection,
    owner_id: i32,
    input: ContactInput,
) -> Result<contact::Model, AppError> {
    let contact = contact::ActiveModel {
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        first_name: Set(input.first_name),
        last_name: Set(input.last_name),
        owner_id: Set(input.owner_id.unwrap_or(owner_id)),
        company_id: Set(input.company_id),
        is_active: Set(input.is_active),
        marketing_opt_in: Set(input.marketing_opt_in),
        ..Default::default()
    };
    Ok(contact.insert(db).await?)
}

pub async fn update_contact(
    db: &DatabaseConnection,
    existing: contact::Model,
    input: ContactInput,
) -> Result<contact::Model, AppError> {
    let mut active: contact::ActiveModel = existing.into();
    active.first_name = Set(input.first_name);
    active.last_name = Set(input.last_name);
    if let Some(owner_id) = input.owner_id {
        active.owner_id = Set(owner_id);
    }
    active.company_id = Set(input.company_id);
    active.is_active = Set(input.is_active);
    active.marketing_opt_in = Set(input.marketing_opt_in);
    active.updated_at = Set(Some(Utc::now()));
    Ok(active.update(db).await?)
}

/// Returns `false` when nothing was deleted.
pub async fn delete_contact(db: &DatabaseConnection, id: i32) -> Result<bool, AppError> {
    let res = contact::Entity::delete_by_id(id).exec(db).await?;
    Ok(res.rows_affected > 0)
}
