use crate::model::{Reservation, Requester};

/// Role checks for reservation changes, in one place.
pub trait Authorizer: Send + Sync {
    /// Edit or delete.
    fn can_modify(&self, reservation: &Reservation, requester: &Requester) -> bool;

    /// Hand a reservation to another member.
    fn can_assign(&self, requester: &Requester) -> bool;
}

/// Owners manage their own reservations; admins manage everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn can_modify(&self, reservation: &Reservation, requester: &Requester) -> bool {
        requester.is_admin() || reservation.owner_id == requester.id
    }

    fn can_assign(&self, requester: &Requester) -> bool {
        requester.is_admin()
    }
}
