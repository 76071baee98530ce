use crate::{
    entities::{address, Address, AddressModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_COUNTRY: &str = "Colombia";

/// Customer shipping addresses. At most one address per user is the default.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_asc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// The first address a user creates always becomes the default.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;

        let existing = Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .count(&txn)
            .await?;
        let is_default = existing == 0 || input.is_default;
        if is_default {
            clear_default(&txn, user_id).await?;
        }

        let now = Utc::now();
        let address = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set(input.name),
            street: Set(input.street),
            city: Set(input.city),
            state: Set(input.state),
            zip_code: Set(input.zip_code),
            country: Set(input
                .country
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())),
            phone: Set(input.phone),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(address_id = %address.id, is_default, "Address created");
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;
        let address = find_owned(&txn, user_id, address_id).await?;

        clear_default(&txn, user_id).await?;
        let mut active: address::ActiveModel = address.into();
        active.is_default = Set(true);
        active.updated_at = Set(Utc::now());
        let address = active.update(&txn).await?;

        txn.commit().await?;
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        find_owned(&txn, user_id, address_id).await?;
        Address::delete_by_id(address_id).exec(&txn).await?;
        txn.commit().await?;

        info!(%address_id, "Address deleted");
        Ok(())
    }
}

async fn find_owned<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    address_id: Uuid,
) -> Result<AddressModel, ServiceError> {
    let address = Address::find_by_id(address_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Address", address_id))?;
    if address.user_id != user_id {
        return Err(ServiceError::Forbidden(
            "address belongs to another user".to_string(),
        ));
    }
    Ok(address)
}

async fn clear_default<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<(), ServiceError> {
    Address::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// Formatted shipping address for an order: the default address, else the
/// oldest one, else none.
pub async fn default_shipping_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<String>, ServiceError> {
    let address = Address::find()
        .filter(address::Column::UserId.eq(user_id))
        .order_by_desc(address::Column::IsDefault)
        .order_by_asc(address::Column::CreatedAt)
        .one(conn)
        .await?;
    Ok(address.map(|a| a.formatted()))
}

/// Input for creating an address
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAddressInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: String,
    pub country: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}
