//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub external_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub abstract_text: String,

    pub published_date: Option<Date>,

    /// Stored security level: PUBLIC, INTERNAL or CONFIDENTIAL.
    /// Readers rank anything else as CONFIDENTIAL.
    #[sea_orm(column_type = "Text")]
    pub security_level: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,

    #[sea_orm(has_many = "super::authorship::Entity")]
    Authorships,

    #[sea_orm(has_many = "super::paper_topic::Entity")]
    PaperTopics,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl Related<super::authorship::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Authorships.def()
    }
}

impl Related<super::paper_topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaperTopics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Visibility rank of the stored security level
    pub fn security_rank(&self) -> u8 {
        crate::clearance::level_rank(&self.security_level)
    }
}
