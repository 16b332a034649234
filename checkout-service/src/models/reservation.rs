use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::{CartItem, SelectedOption};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Completed)
    }
}

/// A booked program slot created once payment for its order is approved.
///
/// Unique per `(order_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub order_id: String,
    pub product_id: String,
    pub participants: u32,
    pub reservation_date: NaiveDate,
    pub reservation_time: Option<NaiveTime>,
    pub options: Vec<SelectedOption>,
    pub amount: u64,
    pub tid: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn confirmed(order_id: &str, tid: &str, line: &CartItem, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            product_id: line.product_id.clone(),
            participants: line.participants,
            reservation_date: line.reservation_date,
            reservation_time: line.reservation_time,
            options: line.options.clone(),
            amount: line.line_total(),
            tid: tid.to_string(),
            status: ReservationStatus::Confirmed,
            created_at: now,
        }
    }
}

/// Inclusive participant range a product accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantBounds {
    pub min: u32,
    pub max: u32,
}

impl ParticipantBounds {
    pub fn contains(&self, participants: u32) -> bool {
        (self.min..=self.max).contains(&participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(Completed.is_terminal() && Cancelled.is_terminal());
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = ParticipantBounds { min: 5, max: 30 };
        assert!(bounds.contains(5));
        assert!(bounds.contains(30));
        assert!(!bounds.contains(4));
        assert!(!bounds.contains(31));
    }
}
