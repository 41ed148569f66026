use color_eyre::{Result, eyre::Context};
use migration::MigratorTrait;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, ColumnTrait, ConnectOptions,
    ConnectionTrait, Database as SeaDatabase, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entities::tracked_item;

/// The position store: one row per downloaded playlist entry.
pub struct Database {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub id: i64,
    pub external_id: String,
    pub file_name: String,
    pub content_digest: String,
    pub position: i64,
    pub inserted_at: i64,
}

impl From<tracked_item::Model> for TrackedItem {
    fn from(model: tracked_item::Model) -> Self {
        TrackedItem {
            id: model.id,
            external_id: model.external_id,
            file_name: model.file_name,
            content_digest: model.content_digest,
            position: model.position,
            inserted_at: model.inserted_at,
        }
    }
}

/// A row projected for the rename pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedFile {
    pub file_name: String,
    pub content_digest: String,
}

/// Delete the journal files SQLite keeps next to `path`, so a restored
/// database is never paired with a stale write-ahead log.
fn remove_sidecar_files(path: &Path) -> Result<()> {
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => log::debug!("Removed {}", sidecar.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("Failed to remove {}", sidecar.display()));
            }
        }
    }
    Ok(())
}

impl Database {
    /// Open or create a database at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        log::debug!("Opening database at: {}", path.display());

        let url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(4)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context(format!("Failed to open database: {}", path.display()))?;

        log::debug!("Running database migrations");
        migration::Migrator::up(&conn, None)
            .await
            .context("Failed to run database migrations")?;

        log::info!("Database ready at: {}", path.display());
        Ok(Database { conn })
    }

    /// Open the database, falling back to restoring `backup` over it once
    /// when the first attempt fails.
    pub async fn open_or_restore(path: &Path, backup: &Path) -> Result<Self> {
        match Self::open(path).await {
            Ok(database) => Ok(database),
            Err(e) if backup.is_file() => {
                log::warn!(
                    "Could not open database ({:#}), restoring backup {}",
                    e,
                    backup.display()
                );
                remove_sidecar_files(path)?;
                std::fs::copy(backup, path).context(format!(
                    "Failed to restore backup {} to {}",
                    backup.display(),
                    path.display()
                ))?;
                Self::open(path).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<TrackedItem>> {
        let item = tracked_item::Entity::find()
            .filter(tracked_item::Column::ExternalId.eq(external_id))
            .one(&self.conn)
            .await
            .context(format!("Failed to query tracked item for {}", external_id))?;

        Ok(item.map(TrackedItem::from))
    }

    pub async fn get_by_digest(&self, content_digest: &str) -> Result<Option<TrackedItem>> {
        let item = tracked_item::Entity::find()
            .filter(tracked_item::Column::ContentDigest.eq(content_digest))
            .one(&self.conn)
            .await
            .context(format!(
                "Failed to query tracked item by digest {}",
                content_digest
            ))?;

        Ok(item.map(TrackedItem::from))
    }

    /// File names and digests of every row, ascending by position.
    pub async fn list_ordered_by_position(&self) -> Result<Vec<OrderedFile>> {
        let rows: Vec<(String, String)> = tracked_item::Entity::find()
            .select_only()
            .column(tracked_item::Column::FileName)
            .column(tracked_item::Column::ContentDigest)
            .order_by_asc(tracked_item::Column::Position)
            .order_by_asc(tracked_item::Column::Id)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to list tracked items by position")?;

        Ok(rows
            .into_iter()
            .map(|(file_name, content_digest)| OrderedFile {
                file_name,
                content_digest,
            })
            .collect())
    }

    #[cfg(test)]
    pub async fn list_all(&self) -> Result<Vec<TrackedItem>> {
        let rows = tracked_item::Entity::find()
            .order_by_asc(tracked_item::Column::Position)
            .order_by_asc(tracked_item::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list tracked items")?;

        Ok(rows.into_iter().map(TrackedItem::from).collect())
    }

    /// Insert or update the row for `external_id` at `position`, then move every
    /// other row at or after `position` one slot down. Both steps commit together.
    pub async fn upsert(
        &self,
        external_id: &str,
        file_name: &str,
        content_digest: &str,
        position: i64,
    ) -> Result<TrackedItem> {
        log::debug!(
            "Upserting tracked item '{}' (file: {}, digest: {}, position: {})",
            external_id,
            file_name,
            content_digest,
            position
        );

        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let existing = tracked_item::Entity::find()
            .filter(tracked_item::Column::ExternalId.eq(external_id))
            .one(&txn)
            .await
            .context(format!("Failed to query tracked item for {}", external_id))?;

        let saved = match existing {
            Some(existing) => {
                let id = existing.id;
                let mut model: tracked_item::ActiveModel = existing.into();
                model.file_name = ActiveValue::Set(file_name.to_string());
                model.content_digest = ActiveValue::Set(content_digest.to_string());
                model.position = ActiveValue::Set(position);
                let saved = model
                    .update(&txn)
                    .await
                    .context(format!("Failed to update tracked item {}", id))?;
                log::info!("Tracked item updated: '{}' (ID: {})", external_id, id);
                saved
            }
            None => {
                let model = tracked_item::ActiveModel {
                    external_id: ActiveValue::Set(external_id.to_string()),
                    file_name: ActiveValue::Set(file_name.to_string()),
                    content_digest: ActiveValue::Set(content_digest.to_string()),
                    position: ActiveValue::Set(position),
                    ..tracked_item::ActiveModel::new()
                };
                let saved = model
                    .insert(&txn)
                    .await
                    .context(format!("Failed to insert tracked item {}", external_id))?;
                log::info!("Tracked item created: '{}' (ID: {})", external_id, saved.id);
                saved
            }
        };

        shift_from(&txn, position, saved.id).await?;

        txn.commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(saved.into())
    }

    /// Give row `id` the position `position`, moving every other row at or after
    /// it one slot down. Both steps commit together.
    pub async fn move_to_position(&self, id: i64, position: i64) -> Result<()> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin transaction")?;

        shift_from(&txn, position, id).await?;

        let updated = tracked_item::Entity::update_many()
            .col_expr(tracked_item::Column::Position, Expr::value(position))
            .filter(tracked_item::Column::Id.eq(id))
            .exec(&txn)
            .await
            .context(format!("Failed to move tracked item {}", id))?;

        if updated.rows_affected == 0 {
            return Err(color_eyre::eyre::eyre!("Tracked item {} not found", id));
        }

        txn.commit()
            .await
            .context("Failed to commit transaction")?;

        log::debug!("Tracked item {} moved to position {}", id, position);
        Ok(())
    }

    /// Write a consistent copy of the database to `destination`.
    pub async fn backup_to(&self, destination: &Path) -> Result<()> {
        let mut staging = destination.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        if staging.exists() {
            std::fs::remove_file(&staging)
                .context(format!("Failed to remove {}", staging.display()))?;
        }

        let target = staging.to_string_lossy().replace('\'', "''");
        self.conn
            .execute_unprepared(&format!("VACUUM INTO '{}'", target))
            .await
            .context(format!("Failed to write backup to {}", staging.display()))?;

        std::fs::rename(&staging, destination)
            .context(format!("Failed to move backup to {}", destination.display()))?;

        log::info!("Database backup written to {}", destination.display());
        Ok(())
    }
}

/// Move every row other than `except_id` with `position >= from` one slot down.
async fn shift_from(conn: &impl ConnectionTrait, from: i64, except_id: i64) -> Result<()> {
    let shifted = tracked_item::Entity::update_many()
        .col_expr(tracked_item::Column::Position, Expr::cust("position + 1"))
        .filter(tracked_item::Column::Position.gte(from))
        .filter(tracked_item::Column::Id.ne(except_id))
        .exec(conn)
        .await
        .context(format!("Failed to shift positions from {}", from))?;

    log::debug!(
        "Shifted {} tracked items at or after position {}",
        shifted.rows_affected,
        from
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_db;

    async fn positions(db: &Database) -> Vec<(String, i64)> {
        db.list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|item| (item.external_id, item.position))
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_on_empty_store() {
        let (_dir, db) = test_db().await;

        let saved = db.upsert("url-a", "a.mp3", "digest-a", 4).await.unwrap();

        assert_eq!(saved.position, 4);
        assert_eq!(positions(&db).await, vec![("url-a".to_string(), 4)]);
    }

    #[tokio::test]
    async fn test_upsert_at_occupied_position_shifts_previous_row() {
        let (_dir, db) = test_db().await;

        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();
        db.upsert("url-b", "b.mp3", "digest-b", 0).await.unwrap();

        assert_eq!(
            positions(&db).await,
            vec![("url-b".to_string(), 0), ("url-a".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_shift_only_touches_rows_at_or_after_position() {
        let (_dir, db) = test_db().await;

        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();
        db.upsert("url-b", "b.mp3", "digest-b", 1).await.unwrap();
        db.upsert("url-c", "c.mp3", "digest-c", 2).await.unwrap();
        db.upsert("url-d", "d.mp3", "digest-d", 1).await.unwrap();

        assert_eq!(
            positions(&db).await,
            vec![
                ("url-a".to_string(), 0),
                ("url-d".to_string(), 1),
                ("url-b".to_string(), 2),
                ("url-c".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_reupsert_never_duplicates_external_id() {
        let (_dir, db) = test_db().await;

        for position in 0..5 {
            db.upsert("url-a", &format!("a{}.mp3", position), "digest-a", position)
                .await
                .unwrap();
        }

        let all = db.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file_name, "a4.mp3");
        assert_eq!(all[0].position, 4);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (_dir, db) = test_db().await;
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();

        let by_id = db.get_by_external_id("url-a").await.unwrap().unwrap();
        let by_digest = db.get_by_digest("digest-a").await.unwrap().unwrap();
        assert_eq!(by_id, by_digest);
        assert_eq!(by_id.file_name, "a.mp3");

        assert!(db.get_by_external_id("url-b").await.unwrap().is_none());
        assert!(db.get_by_digest("digest-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_position() {
        let (_dir, db) = test_db().await;
        db.upsert("url-c", "c.mp3", "digest-c", 2).await.unwrap();
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();
        db.upsert("url-b", "b.mp3", "digest-b", 1).await.unwrap();

        let names: Vec<String> = db
            .list_ordered_by_position()
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.file_name)
            .collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3", "c.mp3"]);
    }

    #[tokio::test]
    async fn test_move_to_position() {
        let (_dir, db) = test_db().await;
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();
        db.upsert("url-b", "b.mp3", "digest-b", 1).await.unwrap();
        let c = db.upsert("url-c", "c.mp3", "digest-c", 2).await.unwrap();

        db.move_to_position(c.id, 0).await.unwrap();

        assert_eq!(
            positions(&db).await,
            vec![
                ("url-c".to_string(), 0),
                ("url-a".to_string(), 1),
                ("url-b".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_move_unknown_row_fails() {
        let (_dir, db) = test_db().await;
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();

        assert!(db.move_to_position(999, 0).await.is_err());
        // The failed move is rolled back
        assert_eq!(positions(&db).await, vec![("url-a".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let (dir, db) = test_db().await;
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();

        let backup = dir.path().join("database.backup");
        db.backup_to(&backup).await.unwrap();
        // A second backup replaces the first
        db.backup_to(&backup).await.unwrap();
        assert!(backup.is_file());

        let broken = dir.path().join("broken.db");
        std::fs::write(&broken, b"this is not a sqlite database").unwrap();
        let restored = Database::open_or_restore(&broken, &backup).await.unwrap();

        let item = restored.get_by_external_id("url-a").await.unwrap().unwrap();
        assert_eq!(item.content_digest, "digest-a");
    }

    #[tokio::test]
    async fn test_restore_discards_stale_write_ahead_log() {
        let (dir, db) = test_db().await;
        db.upsert("url-a", "a.mp3", "digest-a", 0).await.unwrap();
        let backup = dir.path().join("database.backup");
        db.backup_to(&backup).await.unwrap();

        let broken = dir.path().join("broken.db");
        let stale_wal = dir.path().join("broken.db-wal");
        let stale_shm = dir.path().join("broken.db-shm");
        std::fs::write(&broken, b"this is not a sqlite database").unwrap();
        std::fs::write(&stale_wal, b"stale log").unwrap();
        std::fs::write(&stale_shm, b"stale index").unwrap();

        let restored = Database::open_or_restore(&broken, &backup).await.unwrap();

        assert!(restored.get_by_external_id("url-a").await.unwrap().is_some());
        for sidecar in [stale_wal, stale_shm] {
            let contents = std::fs::read(&sidecar).unwrap_or_default();
            assert!(!contents.starts_with(b"stale"));
        }
    }
}
