use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table("tracked_items")
                    .if_not_exists()
                    .col(pk_auto("id"))
                    .col(string("external_id").not_null().unique_key())
                    .col(string("file_name").not_null())
                    .col(string("content_digest").not_null())
                    .col(big_integer("position").not_null())
                    .col(big_integer("inserted_at").not_null())
                    .to_owned(),
            )
            .await?;

        // Pruning and renaming look rows up by digest
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tracked_items_content_digest")
                    .table("tracked_items")
                    .col("content_digest")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tracked_items_content_digest")
                    .table("tracked_items")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table("tracked_items").to_owned())
            .await
    }
}
