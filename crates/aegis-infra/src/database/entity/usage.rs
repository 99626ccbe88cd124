//! Usage entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "usage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub model_id: Uuid,
    pub predicted_tokens_count: i32,
    pub prompt_tokens_count: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
    pub finish_reason: String,
    pub request_type: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ai_model::Entity",
        from = "Column::ModelId",
        to = "super::ai_model::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    AiModel,
}

impl Related<super::ai_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AiModel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn to_column(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Conversion from the domain usage record to SeaORM ActiveModel.
impl From<aegis_core::domain::UsageRecord> for ActiveModel {
    fn from(record: aegis_core::domain::UsageRecord) -> Self {
        Self {
            id: Set(record.id),
            model_id: Set(record.model_id),
            predicted_tokens_count: Set(to_column(record.predicted_tokens)),
            prompt_tokens_count: Set(to_column(record.prompt_tokens)),
            completion_tokens: Set(to_column(record.completion_tokens)),
            total_tokens: Set(to_column(record.total_tokens)),
            finish_reason: Set(record.finish_reason.as_str().to_string()),
            request_type: Set(record.request_type),
            created_at: Set(record.created_at.into()),
        }
    }
}
