use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AiModels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AiModels::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AiModels::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(AiModels::Provider).string().not_null())
                    .col(
                        ColumnDef::new(AiModels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Usage::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Usage::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Usage::ModelId).uuid().not_null())
                    .col(
                        ColumnDef::new(Usage::PredictedTokensCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Usage::PromptTokensCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Usage::CompletionTokens)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Usage::TotalTokens).integer().not_null().default(0))
                    .col(ColumnDef::new(Usage::FinishReason).string().not_null())
                    .col(ColumnDef::new(Usage::RequestType).string().not_null())
                    .col(
                        ColumnDef::new(Usage::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_model")
                            .from(Usage::Table, Usage::ModelId)
                            .to(AiModels::Table, AiModels::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_usage_model_created_at")
                    .table(Usage::Table)
                    .col(Usage::ModelId)
                    .col(Usage::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Usage::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AiModels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AiModels {
    Table,
    Id,
    Name,
    Provider,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Usage {
    Table,
    Id,
    ModelId,
    PredictedTokensCount,
    PromptTokensCount,
    CompletionTokens,
    TotalTokens,
    FinishReason,
    RequestType,
    CreatedAt,
}
