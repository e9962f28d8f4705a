use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::model::{Event, Reservation, ReservationId};
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use super::{RepositoryError, ReservationRepository};

type Rows = Arc<DashMap<ReservationId, Reservation>>;
type Ack = oneshot::Sender<io::Result<()>>;

enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the WAL and is the only writer of `rows`.
///
/// Appends that are already queued when the first one arrives ride along in
/// the same fsync. An event reaches `rows` only after its batch is durable,
/// so a compaction snapshot taken here never misses an acknowledged write.
async fn wal_writer_loop(mut wal: Wal, rows: Rows, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &rows, batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, &rows, other);
                }
            }
            other => handle_non_append(&mut wal, &rows, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, rows: &Rows, batch: Vec<(Event, Ack)>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    for (event, tx) in batch {
        let outcome = match &result {
            Ok(()) => {
                apply_event(rows, event);
                Ok(())
            }
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(outcome);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, Ack)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        // The whole batch is refused, so none of it may survive on disk.
        if let Err(e) = wal.rollback() {
            tracing::error!("WAL rollback after failed batch: {e}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, rows: &Rows, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let mut live: Vec<Reservation> = rows.iter().map(|e| e.value().clone()).collect();
            live.sort_by_key(|r| r.id);
            let events: Vec<Event> = live.into_iter().map(Event::ReservationCreated).collect();
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

fn apply_event(rows: &DashMap<ReservationId, Reservation>, event: Event) {
    match event {
        Event::ReservationCreated(r) | Event::ReservationUpdated(r) => {
            rows.insert(r.id, r);
        }
        Event::ReservationDeleted { id } => {
            rows.remove(&id);
        }
    }
}

/// Reservations held in memory and made durable through a write-ahead log.
///
/// Must be opened inside a tokio runtime; the log writer runs as a task.
pub struct DurableRepository {
    rows: Rows,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
}

impl DurableRepository {
    pub fn open(path: &Path) -> io::Result<Self> {
        let rows: Rows = Arc::new(DashMap::new());
        let (wal, events) = Wal::recover(path)?;
        let replayed = events.len();
        for event in events {
            apply_event(&rows, event);
        }
        tracing::debug!(
            "replayed {replayed} events from {} ({} live reservations)",
            path.display(),
            rows.len()
        );

        let (wal_tx, wal_rx) = mpsc::channel(1024);
        tokio::spawn(wal_writer_loop(wal, rows.clone(), wal_rx));

        Ok(Self {
            rows,
            wal_tx,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, event: Event) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    /// Rewrite the log as one `ReservationCreated` record per live reservation.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationRepository for DurableRepository {
    async fn list(&self) -> Result<Vec<Reservation>, RepositoryError> {
        Ok(self.rows.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        Ok(self.rows.get(&id).map(|e| e.value().clone()))
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        if self.rows.contains_key(&reservation.id) {
            return Err(RepositoryError::AlreadyExists(reservation.id));
        }
        self.append(Event::ReservationCreated(reservation)).await
    }

    async fn update(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        if !self.rows.contains_key(&reservation.id) {
            return Err(RepositoryError::NotFound(reservation.id));
        }
        self.append(Event::ReservationUpdated(reservation)).await
    }

    async fn delete(&self, id: ReservationId) -> Result<Reservation, RepositoryError> {
        let existing = self
            .rows
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NotFound(id))?;
        self.append(Event::ReservationDeleted { id }).await?;
        Ok(existing)
    }
}
