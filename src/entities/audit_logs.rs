use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One audited action. Rows are only ever inserted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// RFC 3339, UTC. Sorts lexicographically in time order.
    pub timestamp: String,

    pub action_type: String,

    pub source: String,

    pub performed_by: String,

    pub target_object: String,

    pub target_type: String,

    /// JSON object.
    pub details: String,

    pub success: bool,

    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
