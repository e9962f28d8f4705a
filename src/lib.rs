pub mod auth;
pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod repository;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use model::{
    BookingRequest, DateRange, Handover, Requester, Reservation, ReservationId, ReservationPatch,
    ReservationStatus, Role, User, UserId,
};
