use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use bulletin_common::{IssueId, NewsletterId, Recipient, internal};

use crate::{
    RowResult, RowStatus, SpoolError, SpoolFilter, SpoolRow, SpoolRowId, backends::rows::Rows,
    r#trait::BackingStore,
};

/// File-based backing store
///
/// Each row is stored as `{row_id}.bin` in the spool directory, holding the
/// row encoded with bincode. The whole table is loaded when the store is
/// opened, so rows queued, claimed or completed before a restart are seen
/// again afterwards.
///
/// # Atomicity
/// Row files are written to `.tmp_{row_id}.bin` and then renamed into
/// place, so a crash never leaves a partially written row. Files are written
/// while the table's write lock is held: once `claim` or `complete` returns,
/// the new state is on disk, and no other caller can observe a state that
/// is not.
///
/// Deletion renames to `{row_id}.bin.deleted` before removing; leftovers of
/// either kind are cleaned up the next time the store is opened.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
    inner: Arc<RwLock<Rows>>,
    capacity: Option<usize>,
    expiration: Duration,
}

impl FileBackingStore {
    /// Create a new `FileBackingStore` builder
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    /// Validate a spool path
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    fn validate_path(path: &Path) -> crate::Result<()> {
        if path.as_os_str().is_empty() {
            return Err(SpoolError::InvalidPath("Spool path is empty".to_string()));
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(SpoolError::InvalidPath(format!(
                "Spool path cannot contain '..' components: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(SpoolError::InvalidPath(format!(
                "Spool path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the spool directory if needed, clear leftovers from a crash
    /// and load every stored row
    fn open(path: PathBuf, capacity: Option<usize>, expiration: Duration) -> crate::Result<Self> {
        internal!("Opening spool at {}", path.display());

        if !path.try_exists()? {
            internal!("{} does not exist, creating...", path.display());
            std::fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(SpoolError::InvalidPath(format!(
                "Expected {} to be a directory, but it is not",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.starts_with(".tmp_") || filename.ends_with(".deleted") {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
                continue;
            }

            let Some(id) = filename
                .strip_suffix(".bin")
                .and_then(|stem| stem.parse::<SpoolRowId>().ok())
            else {
                continue;
            };

            let bytes = std::fs::read(entry.path())?;
            let (row, _): (SpoolRow, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;

            if row.id != id {
                return Err(SpoolError::Internal(format!(
                    "Row file {filename} holds row {}",
                    row.id
                )));
            }
            rows.push(row);
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from spool"
            );
        }
        internal!(level = INFO, rows = rows.len(), "Spool loaded");

        Ok(Self {
            path,
            inner: Arc::new(RwLock::new(Rows::from_rows(rows))),
            capacity,
            expiration,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows held, terminal rows included
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn expiration(&self) -> Duration {
        self.expiration
    }

    fn row_path(&self, id: &SpoolRowId) -> PathBuf {
        self.path.join(format!("{id}.bin"))
    }

    fn write_row(&self, row: &SpoolRow) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(row, bincode::config::standard())?;
        let temp_path = self.path.join(format!(".tmp_{}.bin", row.id));

        std::fs::write(&temp_path, &bytes)?;
        std::fs::rename(&temp_path, self.row_path(&row.id))?;
        Ok(())
    }

    fn write_rows<'a>(
        &self,
        table: &'a Rows,
        ids: impl IntoIterator<Item = &'a SpoolRowId>,
    ) -> crate::Result<()> {
        ids.into_iter()
            .filter_map(|id| table.rows.get(id))
            .try_for_each(|row| self.write_row(row))
    }

    fn delete_row(&self, id: &SpoolRowId) -> crate::Result<()> {
        let path = self.row_path(id);
        let deleted = self.path.join(format!("{id}.bin.deleted"));

        std::fs::rename(&path, &deleted)?;
        std::fs::remove_file(&deleted)?;
        Ok(())
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    #[tracing::instrument(skip(self, recipients), fields(recipients = recipients.len()))]
    async fn enqueue(
        &self,
        issue_id: IssueId,
        newsletter_id: NewsletterId,
        recipients: &[Recipient],
    ) -> crate::Result<usize> {
        let mut table = self.inner.write()?;
        let created = table.enqueue(issue_id, newsletter_id, recipients, self.capacity)?;

        if let Err(e) = self.write_rows(&table, &created) {
            for id in &created {
                table.rows.remove(id);
                let _ = std::fs::remove_file(self.row_path(id));
            }
            return Err(e);
        }

        tracing::debug!(created = created.len(), "Enqueued spool rows");
        Ok(created.len())
    }

    #[tracing::instrument(skip(self))]
    async fn claim(
        &self,
        limit: Option<usize>,
        filter: &SpoolFilter,
    ) -> crate::Result<Vec<SpoolRow>> {
        let mut table = self.inner.write()?;
        let claimed = table.claim(limit, filter, SystemTime::now(), self.expiration);
        let ids: Vec<SpoolRowId> = claimed.iter().map(|row| row.id).collect();

        if let Err(e) = self.write_rows(&table, &ids) {
            tracing::warn!(error = %e, "Failed to record claim, releasing rows");
            table.release(&ids);
            return Err(e);
        }

        tracing::debug!(claimed = claimed.len(), "Claimed spool rows");
        Ok(claimed)
    }

    async fn complete(
        &self,
        id: &SpoolRowId,
        status: RowStatus,
        result: RowResult,
    ) -> crate::Result<()> {
        let mut table = self.inner.write()?;
        let previous = table.get(id)?;
        let row = table.complete(id, status, result)?;

        if let Err(e) = self.write_row(row) {
            table.restore(vec![previous]);
            return Err(e);
        }

        Ok(())
    }

    async fn release(&self, ids: &[SpoolRowId]) -> crate::Result<usize> {
        let mut table = self.inner.write()?;
        let released = table.release(ids);
        self.write_rows(&table, &released)?;
        Ok(released.len())
    }

    async fn get(&self, id: &SpoolRowId) -> crate::Result<SpoolRow> {
        self.inner.read()?.get(id)
    }

    async fn rows(&self, filter: &SpoolFilter) -> crate::Result<Vec<SpoolRow>> {
        Ok(self.inner.read()?.select(filter))
    }

    async fn count(&self, filter: &SpoolFilter) -> crate::Result<usize> {
        Ok(self.inner.read()?.count(filter))
    }

    async fn purge(&self, retention: Duration) -> crate::Result<usize> {
        let mut table = self.inner.write()?;
        let purged = table.purge(retention, SystemTime::now());
        purged.iter().try_for_each(|id| self.delete_row(id))?;
        Ok(purged.len())
    }
}

/// Builder for `FileBackingStore`
#[derive(Debug)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
    capacity: Option<usize>,
    expiration: Duration,
}

impl Default for FileBackingStoreBuilder {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            capacity: None,
            expiration: crate::MemoryBackingStore::DEFAULT_EXPIRATION,
        }
    }
}

impl FileBackingStoreBuilder {
    /// Set the spool directory path
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Hold at most `capacity` rows
    #[must_use]
    pub const fn capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the in-flight expiration window
    #[must_use]
    pub const fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Validate the path, then open the store and load its rows
    ///
    /// # Errors
    /// Returns an error if the path is invalid, the directory cannot be
    /// created or read, or a row file cannot be decoded
    pub fn build(self) -> crate::Result<FileBackingStore> {
        FileBackingStore::validate_path(&self.path)?;
        FileBackingStore::open(self.path, self.capacity, self.expiration)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn recipients(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient::address(format!("user{i}@example.com")))
            .collect()
    }

    fn open(dir: &Path) -> FileBackingStore {
        FileBackingStore::builder()
            .path(dir.join("spool"))
            .build()
            .expect("open spool")
    }

    #[test]
    fn test_path_validation() {
        for path in ["", "/var/spool/../etc", "/etc/bulletin", "/proc/spool"] {
            let result = FileBackingStore::builder().path(path).build();
            assert!(
                matches!(result, Err(SpoolError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_row_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(dir.path());
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(3))
            .await
            .expect("enqueue");

        let claimed = store.claim(Some(2), &SpoolFilter::new()).await.expect("claim");
        store
            .complete(
                &claimed[0].id,
                RowStatus::Done,
                RowResult::sent(bulletin_common::Language::new("en")),
            )
            .await
            .expect("complete");
        drop(store);

        let reopened = open(dir.path());
        assert_eq!(reopened.len(), 3);

        let done = reopened.get(&claimed[0].id).await.expect("done row");
        assert_eq!(done.status, RowStatus::Done);
        assert_eq!(
            done.result.and_then(|r| r.language),
            Some(bulletin_common::Language::new("en"))
        );

        let in_flight = reopened.get(&claimed[1].id).await.expect("in-flight row");
        assert_eq!(in_flight.status, RowStatus::InFlight);
        assert!(in_flight.claimed_at.is_some());

        // The surviving claim is still held; only the untouched row is claimable
        let next = reopened.claim(None, &SpoolFilter::new()).await.expect("claim");
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].recipient, "user2@example.com");
    }

    #[tokio::test]
    async fn test_reopen_keeps_dedup_and_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        open(dir.path())
            .enqueue(IssueId(1), NewsletterId(1), &recipients(4))
            .await
            .expect("enqueue");

        let reopened = open(dir.path());
        let created = reopened
            .enqueue(IssueId(1), NewsletterId(1), &recipients(5))
            .await
            .expect("enqueue again");
        assert_eq!(created, 1);

        let order: Vec<String> = reopened
            .claim(None, &SpoolFilter::new())
            .await
            .expect("claim")
            .into_iter()
            .map(|row| row.recipient)
            .collect();
        assert_eq!(
            order,
            (0..5)
                .map(|i| format!("user{i}@example.com"))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_purge_removes_files_and_leftovers_are_cleaned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(dir.path());
        store
            .enqueue(IssueId(1), NewsletterId(1), &recipients(2))
            .await
            .expect("enqueue");
        let claimed = store.claim(Some(1), &SpoolFilter::new()).await.expect("claim");
        store
            .complete(&claimed[0].id, RowStatus::Error, RowResult::failed("550"))
            .await
            .expect("complete");

        assert_eq!(store.purge(Duration::ZERO).await.expect("purge"), 1);
        assert!(!store.row_path(&claimed[0].id).exists());

        let spool = dir.path().join("spool");
        std::fs::write(spool.join(".tmp_half-written.bin"), b"partial").expect("write");
        std::fs::write(spool.join("stray.bin.deleted"), b"gone").expect("write");
        std::fs::write(spool.join("notes.txt"), b"ignored").expect("write");

        let reopened = open(dir.path());
        assert_eq!(reopened.len(), 1);
        assert!(!spool.join(".tmp_half-written.bin").exists());
        assert!(!spool.join("stray.bin.deleted").exists());
        assert!(spool.join("notes.txt").exists());
    }
}
