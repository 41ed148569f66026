use tempfile::TempDir;

use crate::database::Database;

/// A migrated store in a fresh temporary directory. Keep the directory alive
/// for as long as the store is used.
pub async fn test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("database.db"))
        .await
        .unwrap_or_else(|e| panic!("Failed to open test database: {:#}", e));
    (dir, db)
}
