use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set};

/// One playlist entry that has been downloaded into the destination directory.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tracked_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// The playlist entry's URL as reported by the flat playlist listing.
    #[sea_orm(unique)]
    pub external_id: String,
    /// File name on disk, without the numeric ordering prefix.
    pub file_name: String,
    /// Hex SHA-1 of the downloaded file.
    pub content_digest: String,
    /// Zero-based index within the playlist.
    pub position: i64,
    /// Unix seconds of the last write.
    pub inserted_at: i64,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            inserted_at: Set(Utc::now().timestamp()),
            ..ActiveModelTrait::default()
        }
    }

    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, sea_orm::DbErr>
    where
        C: ConnectionTrait,
    {
        self.inserted_at = Set(Utc::now().timestamp());
        Ok(self)
    }
}
