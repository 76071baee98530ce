use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery progress for a single order (1:1 with `orders`).
///
/// The row is never deleted while the order exists: completing or cancelling
/// only deactivates it, and starting again reactivates the same row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_tracking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub state: TrackingState,
    #[sea_orm(nullable)]
    pub current_latitude: Option<f64>,
    #[sea_orm(nullable)]
    pub current_longitude: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub current_address: Option<String>,
    #[sea_orm(nullable)]
    pub destination_latitude: Option<f64>,
    #[sea_orm(nullable)]
    pub destination_longitude: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub destination_address: Option<String>,
    #[sea_orm(nullable)]
    pub driver_name: Option<String>,
    #[sea_orm(nullable)]
    pub driver_phone: Option<String>,
    #[sea_orm(nullable)]
    pub vehicle_info: Option<String>,
    #[sea_orm(nullable)]
    pub distance_km: Option<f64>,
    #[sea_orm(nullable)]
    pub time_minutes: Option<i32>,
    #[sea_orm(nullable)]
    pub eta: Option<DateTime<Utc>>,
    pub near_delivery_notified: bool,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub last_location_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn current_position(&self) -> Option<(f64, f64)> {
        self.current_latitude.zip(self.current_longitude)
    }

    pub fn destination_position(&self) -> Option<(f64, f64)> {
        self.destination_latitude.zip(self.destination_longitude)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TrackingState {
    #[sea_orm(string_value = "not_started")]
    NotStarted,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl TrackingState {
    /// Allowed edges of the delivery state machine. `InTransit -> InTransit`
    /// is a restart that refreshes destination and driver in place. A
    /// cancelled delivery may be started again or closed out as delivered.
    pub fn can_transition_to(self, next: TrackingState) -> bool {
        use TrackingState::*;
        matches!(
            (self, next),
            (NotStarted, InTransit)
                | (InTransit, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Cancelled)
                | (Cancelled, InTransit)
                | (Cancelled, Delivered)
        )
    }

    /// Tracking accepts location updates only while in transit.
    pub fn is_active(self) -> bool {
        self == TrackingState::InTransit
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::TrackingState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NotStarted, InTransit, true)]
    #[case(InTransit, InTransit, true)]
    #[case(InTransit, Delivered, true)]
    #[case(InTransit, Cancelled, true)]
    #[case(Cancelled, InTransit, true)]
    #[case(Cancelled, Delivered, true)]
    #[case(NotStarted, Delivered, false)]
    #[case(NotStarted, Cancelled, false)]
    #[case(Delivered, InTransit, false)]
    #[case(Delivered, Cancelled, false)]
    #[case(Cancelled, Cancelled, false)]
    fn transition_table(
        #[case] from: TrackingState,
        #[case] to: TrackingState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_in_transit_is_active() {
        assert!(InTransit.is_active());
        assert!(!NotStarted.is_active());
        assert!(!Delivered.is_active());
        assert!(!Cancelled.is_active());
    }
}
