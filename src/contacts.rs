//! Authorization schema for the `contact` resource kind.

use crate::authz::attributes::{AttributeMap, ColumnRef, JoinEntry, JoinSpec};
use crate::authz::errors::SchemaError;
use crate::authz::types::{AttrValue, Resource, ValueKind};
use crate::entities::contact;

pub const RESOURCE_KIND: &str = "contact";
pub const CONTACT_TABLE: &str = "contact";
pub const USER_TABLE: &str = "user";
pub const COMPANY_TABLE: &str = "company";

const ATTR_PREFIX: &str = "request.resource.attr.";

fn attr(name: &str) -> String {
    format!("{ATTR_PREFIX}{name}")
}

/// Both related tables hang off mandatory foreign keys, so inner joins never
/// drop a contact and never multiply one.
pub fn join_spec() -> Result<JoinSpec, SchemaError> {
    JoinSpec::new(
        CONTACT_TABLE,
        vec![
            JoinEntry::new("owner_id", USER_TABLE, "id"),
            JoinEntry::new("company_id", COMPANY_TABLE, "id"),
        ],
    )
}

pub fn schema_map() -> Result<AttributeMap, SchemaError> {
    AttributeMap::builder(join_spec()?)
        .related(&attr("owner_id"), USER_TABLE, "id", ValueKind::Integer)
        .related(&attr("department"), USER_TABLE, "department", ValueKind::Text)
        .related(&attr("company_name"), COMPANY_TABLE, "name", ValueKind::Text)
        .local(&attr("is_active"), "is_active", ValueKind::Bool)
        .local(&attr("marketing_opt_in"), "marketing_opt_in", ValueKind::Bool)
        .local(&attr("first_name"), "first_name", ValueKind::Text)
        .local(&attr("last_name"), "last_name", ValueKind::Text)
        .local(&attr("company_id"), "company_id", ValueKind::Integer)
        .local(&attr("created_at"), "created_at", ValueKind::Timestamp)
        .build()
}

/// Columns returned by the list endpoint.
pub fn list_projection() -> Vec<ColumnRef> {
    [
        ("id", ValueKind::Integer),
        ("first_name", ValueKind::Text),
        ("last_name", ValueKind::Text),
        ("is_active", ValueKind::Bool),
        ("marketing_opt_in", ValueKind::Bool),
    ]
    .into_iter()
    .map(|(column, kind)| ColumnRef::new(CONTACT_TABLE, column, kind))
    .collect()
}

/// Materialize every column of a contact for a point decision.
pub fn contact_resource(model: &contact::Model) -> Resource {
    let mut resource = Resource::new(RESOURCE_KIND, model.id.to_string());
    let attrs = &mut resource.attrs;
    attrs.insert("id".into(), AttrValue::Int(i64::from(model.id)));
    attrs.insert("created_at".into(), AttrValue::Timestamp(model.created_at));
    if let Some(updated_at) = model.updated_at {
        attrs.insert("updated_at".into(), AttrValue::Timestamp(updated_at));
    }
    attrs.insert("first_name".into(), AttrValue::Text(model.first_name.clone()));
    attrs.insert("last_name".into(), AttrValue::Text(model.last_name.clone()));
    attrs.insert("owner_id".into(), AttrValue::Int(i64::from(model.owner_id)));
    attrs.insert("company_id".into(), AttrValue::Int(i64::from(model.company_id)));
    attrs.insert("is_active".into(), AttrValue::Bool(model.is_active));
    attrs.insert(
        "marketing_opt_in".into(),
        AttrValue::Bool(model.marketing_opt_in),
    );
    resource
}

/// Placeholder resource for `create`, which has no instance yet.
pub fn new_contact_resource() -> Resource {
    Resource::new(RESOURCE_KIND, "new")
}
