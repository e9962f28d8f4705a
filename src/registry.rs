use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::compactor;
use crate::config::Config;
use crate::directory::UserDirectory;
use crate::engine::Engine;
use crate::limits::*;
use crate::observability::RESOURCES_OPEN;
use crate::repository::{DurableRepository, RepositoryError};

struct Cabin {
    engine: Arc<Engine>,
    log: Arc<DurableRepository>,
}

/// One engine per bookable resource, opened on first use.
///
/// Each resource gets its own WAL file, its own mutation lock and its own
/// compactor task, so bookings on different cabins never contend.
pub struct CabinRegistry {
    cabins: DashMap<String, Cabin>,
    users: Arc<dyn UserDirectory>,
    data_dir: PathBuf,
    compact_threshold: u64,
    compact_interval: Duration,
}

impl CabinRegistry {
    pub fn new(config: &Config, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            cabins: DashMap::new(),
            users,
            data_dir: config.data_dir.clone(),
            compact_threshold: config.compact_threshold,
            compact_interval: config.compact_interval,
        }
    }

    /// Get or lazily open the engine for `name`.
    ///
    /// Names are reduced to their file-safe form first, so names that map
    /// to the same WAL file share one engine.
    pub fn get_or_open(&self, name: &str) -> io::Result<Arc<Engine>> {
        if name.len() > MAX_RESOURCE_NAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "resource name too long"));
        }
        let safe_name = file_stem(name);
        if safe_name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty resource name"));
        }
        if let Some(cabin) = self.cabins.get(&safe_name) {
            return Ok(cabin.engine.clone());
        }
        if self.cabins.len() >= MAX_RESOURCES {
            return Err(io::Error::other("too many resources"));
        }

        let cabin = self.cabins.entry(safe_name.clone()).or_try_insert_with(|| {
            let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
            let log = Arc::new(DurableRepository::open(&wal_path)?);
            let engine = Arc::new(Engine::new(log.clone(), self.users.clone()));
            tokio::spawn(compactor::run_compactor(
                log.clone(),
                self.compact_threshold,
                self.compact_interval,
            ));
            tracing::info!("opened resource '{safe_name}' at {}", wal_path.display());
            Ok::<_, io::Error>(Cabin { engine, log })
        })?;
        let engine = cabin.engine.clone();
        drop(cabin);

        metrics::gauge!(RESOURCES_OPEN).set(self.cabins.len() as f64);
        Ok(engine)
    }

    pub fn open_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cabins.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Compact every open log that is past the threshold. For use at shutdown.
    pub async fn compact_due(&self) -> Result<usize, RepositoryError> {
        let logs: Vec<Arc<DurableRepository>> = self.cabins.iter().map(|e| e.log.clone()).collect();
        let mut compacted = 0;
        for log in logs {
            if compactor::compact_if_due(&log, self.compact_threshold).await? {
                compacted += 1;
            }
        }
        Ok(compacted)
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::model::{BookingRequest, DateRange, ReservationStatus};
    use std::fs;

    fn test_registry(name: &str) -> (CabinRegistry, PathBuf) {
        let dir = std::env::temp_dir().join("cabinbook_test_registry").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let config = Config {
            data_dir: dir.clone(),
            ..Config::default()
        };
        (CabinRegistry::new(&config, Arc::new(InMemoryDirectory::new())), dir)
    }

    fn week() -> BookingRequest {
        BookingRequest::new(DateRange::parse("2024-07-01", "2024-07-07").unwrap(), "Holiday")
    }

    #[tokio::test]
    async fn resources_are_isolated() {
        let (reg, _) = test_registry("isolation");
        let lake = reg.get_or_open("lake").unwrap();
        let fjell = reg.get_or_open("fjell").unwrap();

        let a = lake.create_reservation("astrid", week()).await.unwrap();
        let b = fjell.create_reservation("bo", week()).await.unwrap();
        assert_eq!(a.status, ReservationStatus::Primary);
        assert_eq!(b.status, ReservationStatus::Primary);
        assert_eq!(lake.list_reservations().await.unwrap().len(), 1);
        assert_eq!(reg.open_names(), vec!["fjell".to_string(), "lake".to_string()]);
    }

    #[tokio::test]
    async fn same_engine_returned() {
        let (reg, dir) = test_registry("same");
        let e1 = reg.get_or_open("lake").unwrap();
        let e2 = reg.get_or_open("lake").unwrap();
        assert!(Arc::ptr_eq(&e1, &e2));
        assert!(dir.join("lake.wal").exists());
    }

    #[tokio::test]
    async fn name_sanitized() {
        let (reg, dir) = test_registry("sanitize");
        reg.get_or_open("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        assert!(reg.get_or_open("../..").is_err());
    }

    #[tokio::test]
    async fn aliased_names_share_one_engine() {
        let (reg, _) = test_registry("aliases");
        let lake = reg.get_or_open("lake").unwrap();
        let bang = reg.get_or_open("lake!").unwrap();
        let dotted = reg.get_or_open("../lake").unwrap();
        assert!(Arc::ptr_eq(&lake, &bang));
        assert!(Arc::ptr_eq(&lake, &dotted));
        assert_eq!(reg.open_names(), vec!["lake".to_string()]);

        let a = lake.create_reservation("astrid", week()).await.unwrap();
        let b = bang.create_reservation("bo", week()).await.unwrap();
        assert_eq!(a.status, ReservationStatus::Primary);
        assert_eq!(b.status, ReservationStatus::Backup);
        assert_eq!(b.conflicts_with_id, Some(a.id));
        lake.audit().await.unwrap();
    }

    #[tokio::test]
    async fn name_too_long() {
        let (reg, _) = test_registry("too_long");
        let err = reg
            .get_or_open(&"x".repeat(MAX_RESOURCE_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("resource name too long"));
    }

    #[tokio::test]
    async fn reopen_after_restart() {
        let (reg, dir) = test_registry("restart");
        let id = {
            let lake = reg.get_or_open("lake").unwrap();
            lake.create_reservation("astrid", week()).await.unwrap().id
        };
        drop(reg);

        let config = Config {
            data_dir: dir,
            ..Config::default()
        };
        let reg = CabinRegistry::new(&config, Arc::new(InMemoryDirectory::new()));
        let lake = reg.get_or_open("lake").unwrap();
        assert_eq!(lake.get_reservation(id).await.unwrap().owner_id, "astrid");
    }

    #[tokio::test]
    async fn compact_due_respects_threshold() {
        let (reg, dir) = test_registry("compact_due");
        let config = Config {
            data_dir: dir,
            compact_threshold: 2,
            ..Config::default()
        };
        let reg2 = CabinRegistry::new(&config, Arc::new(InMemoryDirectory::new()));
        drop(reg);
        let lake = reg2.get_or_open("lake").unwrap();
        lake.create_reservation("astrid", week()).await.unwrap();
        assert_eq!(reg2.compact_due().await.unwrap(), 0);
        lake.create_reservation("bo", week()).await.unwrap();
        assert_eq!(reg2.compact_due().await.unwrap(), 1);
    }
}
