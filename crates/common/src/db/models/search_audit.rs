//! Search audit entity, one row per query request

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "search_audits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Logical endpoint, e.g. "/api/search"
    #[sea_orm(column_type = "Text")]
    pub endpoint: String,

    #[sea_orm(column_type = "Text")]
    pub query: String,

    #[sea_orm(column_type = "Text")]
    pub clearance: String,

    #[sea_orm(column_type = "Text")]
    pub user_role: String,

    pub redacted_count: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub client_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
