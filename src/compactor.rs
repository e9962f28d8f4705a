use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::repository::{DurableRepository, RepositoryError};

/// Compact the log if at least `threshold` records were appended since the
/// last compaction. Returns whether it ran.
pub async fn compact_if_due(repo: &DurableRepository, threshold: u64) -> Result<bool, RepositoryError> {
    let appended = repo.appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    repo.compact().await?;
    info!("compacted {} after {appended} appends", repo.path().display());
    Ok(true)
}

/// Background task: check the log every `every` and compact when due.
pub async fn run_compactor(repo: Arc<DurableRepository>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&repo, threshold).await {
            warn!("compaction of {} failed: {e}", repo.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Reservation, ReservationStatus};
    use crate::repository::ReservationRepository;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cabinbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn row() -> Reservation {
        Reservation {
            id: Ulid::new(),
            owner_id: "bo".into(),
            range: DateRange::parse("2024-10-01", "2024-10-02").unwrap(),
            purpose: "Mushroom picking".into(),
            notes: None,
            handover_note: None,
            status: ReservationStatus::Soft,
            conflicts_with_id: None,
        }
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let repo = DurableRepository::open(&path).unwrap();
        for _ in 0..3 {
            repo.insert(row()).await.unwrap();
        }

        assert!(!compact_if_due(&repo, 4).await.unwrap());
        assert_eq!(repo.appends_since_compact().await, 3);

        repo.insert(row()).await.unwrap();
        assert!(compact_if_due(&repo, 4).await.unwrap());
        assert_eq!(repo.appends_since_compact().await, 0);
        assert_eq!(repo.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let repo = Arc::new(DurableRepository::open(&path).unwrap());
        for _ in 0..5 {
            repo.insert(row()).await.unwrap();
        }

        let task = tokio::spawn(run_compactor(repo.clone(), 5, Duration::from_millis(10)));
        let mut compacted = false;
        for _ in 0..100 {
            if repo.appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert!(compacted, "compactor never ran");
    }
}
