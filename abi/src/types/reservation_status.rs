use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Lifecycle of a hotel reservation.
///
/// `Confirmed -> Active -> Completed` is driven by the clock; the cancelled
/// states are reached from `Confirmed` or `Active` by an owner, guest or admin.
/// Every state other than `Confirmed` and `Active` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Active,
    Completed,
    CancelledByOwner,
    CancelledByGuest,
    DeletedByAdmin,
}

/// Who is cancelling a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Canceller {
    Owner,
    Guest,
    Admin,
}

impl ReservationStatus {
    /// Statuses that hold rooms against inventory.
    pub const BLOCKING: [ReservationStatus; 2] =
        [ReservationStatus::Confirmed, ReservationStatus::Active];

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_blocking()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ReservationStatus::CancelledByOwner
                | ReservationStatus::CancelledByGuest
                | ReservationStatus::DeletedByAdmin
        )
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        match (self, next) {
            (Confirmed, Active) | (Active, Completed) => true,
            (Confirmed | Active, CancelledByOwner | CancelledByGuest | DeletedByAdmin) => true,
            _ => false,
        }
    }
}

impl From<Canceller> for ReservationStatus {
    fn from(canceller: Canceller) -> Self {
        match canceller {
            Canceller::Owner => ReservationStatus::CancelledByOwner,
            Canceller::Guest => ReservationStatus::CancelledByGuest,
            Canceller::Admin => ReservationStatus::DeletedByAdmin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn status_should_round_trip_through_text() {
        assert_eq!(ReservationStatus::CancelledByOwner.to_string(), "cancelled_by_owner");
        assert_eq!(
            "deleted_by_admin".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::DeletedByAdmin
        );
        assert!("accepted".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn only_confirmed_and_active_should_block() {
        let blocking: Vec<_> = ReservationStatus::iter().filter(|s| s.is_blocking()).collect();
        assert_eq!(
            blocking,
            vec![ReservationStatus::Confirmed, ReservationStatus::Active]
        );
    }

    #[test]
    fn terminal_statuses_should_never_transition() {
        for from in ReservationStatus::iter().filter(|s| s.is_terminal()) {
            for to in ReservationStatus::iter() {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn clock_transitions_should_follow_the_lifecycle() {
        use ReservationStatus::*;
        assert!(Confirmed.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Confirmed));
        assert!(Active.can_transition_to(CancelledByGuest));
    }
}
