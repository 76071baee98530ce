//! Delivery tracking on top of placed orders.
//!
//! Mutations are staff only; reads are open to the order's owner as well.
//! Calls to the mapping service are made before a transaction is opened so
//! that no database connection is held across a slow HTTP request.

use crate::{
    auth::AuthUser,
    config::AppConfig,
    entities::{
        delivery_tracking, order, order_status_history, DeliveryTracking, DeliveryTrackingModel,
        NotificationKind, OrderModel, OrderStatus, OrderStatusHistory, OrderStatusHistoryModel,
        TrackingState,
    },
    errors::ServiceError,
    services::{
        geocoding::{eta_minutes, Coordinates, MapsClient, RouteSummary, TravelEstimate},
        notifications::NotificationService,
        orders::{append_history, find_order, HistoryEntry},
    },
};
use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSettings {
    pub near_delivery_distance_km: f64,
    pub average_speed_kmh: f64,
    pub update_interval_secs: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            near_delivery_distance_km: 1.0,
            average_speed_kmh: 30.0,
            update_interval_secs: 30,
        }
    }
}

impl From<&AppConfig> for TrackingSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            near_delivery_distance_km: cfg.near_delivery_distance_km,
            average_speed_kmh: cfg.average_speed_kmh,
            update_interval_secs: cfg.tracking_update_interval_secs,
        }
    }
}

#[derive(Clone)]
pub struct TrackingService {
    db: Arc<DatabaseConnection>,
    maps: Arc<dyn MapsClient>,
    notifications: NotificationService,
    settings: TrackingSettings,
}

impl TrackingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        maps: Arc<dyn MapsClient>,
        notifications: NotificationService,
        settings: TrackingSettings,
    ) -> Self {
        Self {
            db,
            maps,
            notifications,
            settings,
        }
    }

    /// Starts, restarts or reactivates delivery of an order.
    ///
    /// The destination is geocoded first; if that fails nothing is written.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id))]
    pub async fn start_tracking(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        input: StartTrackingInput,
    ) -> Result<DeliveryTrackingModel, ServiceError> {
        actor.require_staff()?;

        let order = find_order(&*self.db, order_id).await?;
        ensure_deliverable(&order)?;
        let existing = find_tracking(&*self.db, order_id).await?;
        if let Some(tracking) = &existing {
            ensure_transition(tracking.state, TrackingState::InTransit)?;
        }

        let destination = input
            .destination_address
            .clone()
            .or_else(|| order.shipping_address.clone())
            .filter(|address| !address.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("destination_address is required".to_string())
            })?;

        let geocoded = self.maps.geocode(&destination).await.map_err(|e| match e {
            ServiceError::UnresolvableLocation(msg) => ServiceError::UnresolvableLocation(
                format!("could not geocode destination address: {}", msg),
            ),
            other => other,
        })?;

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        ensure_deliverable(&order)?;
        let now = Utc::now();

        let current = find_tracking(&txn, order_id).await?;
        let is_new = current.is_none();
        let mut tracking = match current {
            Some(current) => {
                ensure_transition(current.state, TrackingState::InTransit)?;
                let restarting = current.state == TrackingState::InTransit;
                let mut active: delivery_tracking::ActiveModel = current.into();
                if !restarting {
                    active.started_at = Set(now);
                    active.current_latitude = Set(None);
                    active.current_longitude = Set(None);
                    active.current_address = Set(None);
                    active.last_location_at = Set(None);
                }
                active
            }
            None => delivery_tracking::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                current_latitude: Set(None),
                current_longitude: Set(None),
                current_address: Set(None),
                started_at: Set(now),
                last_location_at: Set(None),
                ..Default::default()
            },
        };

        tracking.state = Set(TrackingState::InTransit);
        tracking.is_active = Set(true);
        tracking.destination_latitude = Set(Some(geocoded.coordinates.latitude));
        tracking.destination_longitude = Set(Some(geocoded.coordinates.longitude));
        tracking.destination_address = Set(Some(geocoded.formatted_address.clone()));
        tracking.driver_name = Set(input.driver_name);
        tracking.driver_phone = Set(input.driver_phone);
        tracking.vehicle_info = Set(input.vehicle_info);
        tracking.distance_km = Set(None);
        tracking.time_minutes = Set(None);
        tracking.eta = Set(None);
        tracking.near_delivery_notified = Set(false);
        tracking.completed_at = Set(None);
        tracking.updated_at = Set(now);

        let tracking = if is_new {
            tracking.insert(&txn).await?
        } else {
            tracking.update(&txn).await?
        };

        set_order_status(&txn, order.clone(), OrderStatus::InTransit).await?;
        append_history(
            &txn,
            order_id,
            HistoryEntry {
                address: Some(geocoded.formatted_address),
                ..HistoryEntry::new(OrderStatus::InTransit, "Order out for delivery")
            }
            .by(actor.user_id),
        )
        .await?;
        txn.commit().await?;

        info!(%order_id, tracking_id = %tracking.id, "Delivery tracking started");
        self.notifications
            .notify(
                order.user_id,
                order_id,
                NotificationKind::OutForDelivery,
                &order.order_number,
                None,
            )
            .await;

        Ok(tracking)
    }

    /// Records a courier position and refreshes the distance estimate.
    ///
    /// Reverse geocoding and distance lookups are best effort: on failure the
    /// address or estimates keep their previous values.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn update_location(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        input: LocationUpdateInput,
    ) -> Result<DeliveryTrackingModel, ServiceError> {
        actor.require_staff()?;
        let position = Coordinates::new(input.latitude, input.longitude);
        position.validate()?;

        ensure_deliverable(&find_order(&*self.db, order_id).await?)?;
        let tracking = find_tracking(&*self.db, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No tracking for order {}", order_id)))?;
        ensure_active(&tracking)?;

        let address = match self.maps.reverse_geocode(position).await {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(error = %e, %order_id, "Reverse geocoding failed, keeping previous address");
                None
            }
        };
        let estimate = match tracking.destination_position() {
            Some(destination) => match self
                .maps
                .distance_and_duration(position, destination.into())
                .await
            {
                Ok(estimate) => Some(estimate),
                Err(e) => {
                    warn!(error = %e, %order_id, "Distance lookup failed, keeping previous estimate");
                    None
                }
            },
            None => None,
        };

        let txn = self.db.begin().await?;
        let tracking = find_tracking(&txn, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No tracking for order {}", order_id)))?;
        ensure_active(&tracking)?;
        let order = find_order(&txn, order_id).await?;
        ensure_deliverable(&order)?;
        let now = Utc::now();

        let proximity = estimate.map(|e| self.proximity(&e, tracking.near_delivery_notified));
        let mut active: delivery_tracking::ActiveModel = tracking.into();
        active.current_latitude = Set(Some(position.latitude));
        active.current_longitude = Set(Some(position.longitude));
        active.last_location_at = Set(Some(now));
        active.updated_at = Set(now);
        if let Some(address) = &address {
            active.current_address = Set(Some(address.clone()));
        }
        if let (Some(estimate), Some(proximity)) = (estimate, proximity) {
            active.distance_km = Set(Some(estimate.distance_km));
            active.time_minutes = Set(Some(estimate.duration_minutes.round() as i32));
            match TimeDelta::try_minutes(proximity.eta_minutes)
                .and_then(|delta| now.checked_add_signed(delta))
            {
                Some(eta) => active.eta = Set(Some(eta)),
                None => warn!(
                    %order_id,
                    eta_minutes = proximity.eta_minutes,
                    "ETA out of range, keeping previous value"
                ),
            }
            active.near_delivery_notified = Set(proximity.armed_flag);
        }
        let tracking = active.update(&txn).await?;

        append_history(
            &txn,
            order_id,
            HistoryEntry {
                latitude: Some(position.latitude),
                longitude: Some(position.longitude),
                address,
                ..HistoryEntry::new(OrderStatus::InTransit, "Location updated")
            }
            .by(actor.user_id),
        )
        .await?;
        txn.commit().await?;

        info!(
            %order_id,
            latitude = position.latitude,
            longitude = position.longitude,
            distance_km = ?tracking.distance_km,
            "Courier location updated"
        );

        if let Some(proximity) = proximity.filter(|p| p.notify) {
            self.notifications
                .notify(
                    order.user_id,
                    order_id,
                    NotificationKind::NearDelivery,
                    &order.order_number,
                    Some(proximity.eta_minutes.clamp(1, i64::from(i32::MAX)) as i32),
                )
                .await;
        }

        Ok(tracking)
    }

    /// Near-delivery fires once per crossing of the threshold and re-arms
    /// when the courier moves back out of range.
    fn proximity(&self, estimate: &TravelEstimate, already_notified: bool) -> Proximity {
        let near = estimate.distance_km <= self.settings.near_delivery_distance_km;
        Proximity {
            eta_minutes: eta_minutes(estimate.distance_km, self.settings.average_speed_kmh),
            notify: near && !already_notified,
            armed_flag: near,
        }
    }

    /// Marks the order delivered, closing any tracking row including a
    /// cancelled one. Repeating it on a delivered order sends nothing and only
    /// deactivates tracking that was left open.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn complete_delivery(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        actor.require_staff()?;

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        match order.status {
            OrderStatus::Delivered => {
                if close_tracking(&txn, order_id, TrackingState::Delivered)
                    .await?
                    .is_some()
                {
                    txn.commit().await?;
                    info!(%order_id, "Closed tracking left open on a delivered order");
                } else {
                    info!(%order_id, "Order already delivered");
                }
                return Ok(order);
            }
            OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "cannot deliver a cancelled order".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(tracking) = find_tracking(&txn, order_id).await? {
            ensure_transition(tracking.state, TrackingState::Delivered)?;
        }
        close_tracking(&txn, order_id, TrackingState::Delivered).await?;

        let order = set_order_status(&txn, order, OrderStatus::Delivered).await?;
        append_history(
            &txn,
            order_id,
            HistoryEntry::new(OrderStatus::Delivered, "Order delivered").by(actor.user_id),
        )
        .await?;
        txn.commit().await?;

        info!(%order_id, "Order delivered");
        self.notifications
            .notify(
                order.user_id,
                order_id,
                NotificationKind::Delivered,
                &order.order_number,
                None,
            )
            .await;

        Ok(order)
    }

    /// Deactivates tracking only; the order status is left alone.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn cancel_tracking(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<DeliveryTrackingModel, ServiceError> {
        actor.require_staff()?;

        let txn = self.db.begin().await?;
        let tracking = find_tracking(&txn, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No tracking for order {}", order_id)))?;

        if tracking.state == TrackingState::Cancelled {
            return Ok(tracking);
        }
        ensure_transition(tracking.state, TrackingState::Cancelled)?;

        let mut active: delivery_tracking::ActiveModel = tracking.into();
        active.state = Set(TrackingState::Cancelled);
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let tracking = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, "Delivery tracking cancelled");
        Ok(tracking)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn get_tracking(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<TrackingStatus, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        actor.ensure_owner_or_staff(order.user_id)?;
        let tracking = find_tracking(&*self.db, order_id).await?;

        Ok(TrackingStatus {
            has_tracking: tracking.as_ref().map(|t| t.is_active).unwrap_or(false),
            tracking,
            order: OrderSummary::from(&order),
            update_interval_secs: self.settings.update_interval_secs,
        })
    }

    /// Driving route from the courier's last position to the destination.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn get_route(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<RouteSummary, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        actor.ensure_owner_or_staff(order.user_id)?;
        let tracking = find_tracking(&*self.db, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No tracking for order {}", order_id)))?;

        let (origin, destination) = tracking
            .current_position()
            .zip(tracking.destination_position())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "route needs both a courier position and a destination".to_string(),
                )
            })?;

        self.maps.route(origin.into(), destination.into()).await
    }

    /// Newest first.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn get_history(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusHistoryModel>, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        actor.ensure_owner_or_staff(order.user_id)?;

        Ok(OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Proximity {
    eta_minutes: i64,
    notify: bool,
    armed_flag: bool,
}

async fn find_tracking<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<DeliveryTrackingModel>, ServiceError> {
    Ok(DeliveryTracking::find()
        .filter(delivery_tracking::Column::OrderId.eq(order_id))
        .one(conn)
        .await?)
}

/// Moves open or cancelled tracking into `state` and deactivates it. Returns
/// the updated row, or `None` when there was nothing to close.
pub(crate) async fn close_tracking<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    state: TrackingState,
) -> Result<Option<DeliveryTrackingModel>, ServiceError> {
    let Some(tracking) = find_tracking(conn, order_id).await? else {
        return Ok(None);
    };
    let moves = tracking.state != state && tracking.state.can_transition_to(state);
    if !moves && !tracking.is_active {
        return Ok(None);
    }

    let now = Utc::now();
    let mut active: delivery_tracking::ActiveModel = tracking.into();
    if moves {
        active.state = Set(state);
    }
    if state == TrackingState::Delivered {
        active.completed_at = Set(Some(now));
    }
    active.is_active = Set(false);
    active.updated_at = Set(now);
    Ok(Some(active.update(conn).await?))
}

async fn set_order_status<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    status: OrderStatus,
) -> Result<OrderModel, ServiceError> {
    let mut active: order::ActiveModel = order.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

fn ensure_deliverable(order: &OrderModel) -> Result<(), ServiceError> {
    if order.status.is_terminal() {
        return Err(ServiceError::InvalidOperation(format!(
            "order {} is already {}",
            order.order_number, order.status
        )));
    }
    Ok(())
}

fn ensure_active(tracking: &DeliveryTrackingModel) -> Result<(), ServiceError> {
    if !tracking.is_active || !tracking.state.is_active() {
        return Err(ServiceError::InvalidOperation(
            "tracking is not active".to_string(),
        ));
    }
    Ok(())
}

fn ensure_transition(from: TrackingState, to: TrackingState) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidOperation(format!(
            "tracking cannot move from {} to {}",
            from, to
        )))
    }
}

/// Body for starting delivery
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTrackingInput {
    pub destination_address: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub vehicle_info: Option<String>,
}

/// Courier position report
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationUpdateInput {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Decimal,
}

impl From<&OrderModel> for OrderSummary {
    fn from(order: &OrderModel) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            total_amount: order.total_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStatus {
    pub has_tracking: bool,
    pub tracking: Option<DeliveryTrackingModel>,
    pub order: OrderSummary,
    pub update_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn estimate(distance_km: f64) -> TravelEstimate {
        TravelEstimate {
            distance_km,
            duration_minutes: distance_km * 2.0,
        }
    }

    struct NoMaps;

    #[async_trait::async_trait]
    impl MapsClient for NoMaps {
        async fn geocode(
            &self,
            _address: &str,
        ) -> Result<crate::services::geocoding::GeocodedAddress, ServiceError> {
            Err(ServiceError::ExternalServiceError("offline".into()))
        }

        async fn reverse_geocode(&self, _position: Coordinates) -> Result<String, ServiceError> {
            Err(ServiceError::ExternalServiceError("offline".into()))
        }

        async fn distance_and_duration(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
        ) -> Result<TravelEstimate, ServiceError> {
            Err(ServiceError::ExternalServiceError("offline".into()))
        }

        async fn route(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
        ) -> Result<RouteSummary, ServiceError> {
            Err(ServiceError::ExternalServiceError("offline".into()))
        }
    }

    fn service() -> TrackingService {
        let db = Arc::new(DatabaseConnection::Disconnected);
        TrackingService::new(
            db.clone(),
            Arc::new(NoMaps),
            NotificationService::new(db),
            TrackingSettings::default(),
        )
    }

    #[test]
    fn near_delivery_fires_once_per_crossing() {
        let svc = service();

        let far = svc.proximity(&estimate(3.0), false);
        assert!(!far.notify);
        assert!(!far.armed_flag);

        let near = svc.proximity(&estimate(1.0), false);
        assert!(near.notify);
        assert!(near.armed_flag);

        let still_near = svc.proximity(&estimate(0.4), true);
        assert!(!still_near.notify);
        assert!(still_near.armed_flag);

        let left_again = svc.proximity(&estimate(1.5), true);
        assert!(!left_again.notify);
        assert!(!left_again.armed_flag);
    }

    #[test]
    fn proximity_eta_uses_average_speed() {
        let svc = service();
        assert_eq!(svc.proximity(&estimate(15.0), false).eta_minutes, 30);
        assert_eq!(svc.proximity(&estimate(0.1), false).eta_minutes, 1);
    }

    #[test]
    fn illegal_transitions_are_invalid_operations() {
        assert!(ensure_transition(TrackingState::NotStarted, TrackingState::InTransit).is_ok());
        assert_matches!(
            ensure_transition(TrackingState::Delivered, TrackingState::InTransit),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            ensure_transition(TrackingState::Cancelled, TrackingState::Delivered),
            Err(ServiceError::InvalidOperation(_))
        );
    }
}
