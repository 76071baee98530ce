use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000005_create_tracking_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryTracking::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryTracking::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::OrderId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::State)
                            .string_len(20)
                            .not_null()
                            .default("not_started"),
                    )
                    .col(ColumnDef::new(DeliveryTracking::CurrentLatitude).double().null())
                    .col(ColumnDef::new(DeliveryTracking::CurrentLongitude).double().null())
                    .col(ColumnDef::new(DeliveryTracking::CurrentAddress).text().null())
                    .col(
                        ColumnDef::new(DeliveryTracking::DestinationLatitude)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::DestinationLongitude)
                            .double()
                            .null(),
                    )
                    .col(ColumnDef::new(DeliveryTracking::DestinationAddress).text().null())
                    .col(
                        ColumnDef::new(DeliveryTracking::DriverName)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::DriverPhone)
                            .string_len(20)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::VehicleInfo)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(DeliveryTracking::DistanceKm).double().null())
                    .col(ColumnDef::new(DeliveryTracking::TimeMinutes).integer().null())
                    .col(
                        ColumnDef::new(DeliveryTracking::Eta)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::NearDeliveryNotified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::LastLocationAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTracking::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_tracking_order")
                            .from(DeliveryTracking::Table, DeliveryTracking::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Audit tables carry no foreign key to orders; their rows outlive a
        // deleted order.
        manager
            .create_table(
                Table::create()
                    .table(OrderStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderStatusHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderStatusHistory::OrderId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderStatusHistory::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderStatusHistory::Latitude).double().null())
                    .col(ColumnDef::new(OrderStatusHistory::Longitude).double().null())
                    .col(ColumnDef::new(OrderStatusHistory::Address).text().null())
                    .col(ColumnDef::new(OrderStatusHistory::Note).text().null())
                    .col(ColumnDef::new(OrderStatusHistory::ActorId).uuid().null())
                    .col(
                        ColumnDef::new(OrderStatusHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_status_history_order_id")
                    .table(OrderStatusHistory::Table)
                    .col(OrderStatusHistory::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderNotifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderNotifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderNotifications::UserId).uuid().not_null())
                    .col(ColumnDef::new(OrderNotifications::OrderId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderNotifications::Kind)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderNotifications::Title)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderNotifications::Message).text().not_null())
                    .col(
                        ColumnDef::new(OrderNotifications::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OrderNotifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_notifications_user_read")
                    .table(OrderNotifications::Table)
                    .col(OrderNotifications::UserId)
                    .col(OrderNotifications::IsRead)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderNotifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderStatusHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeliveryTracking::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DeliveryTracking {
    Table,
    Id,
    OrderId,
    State,
    CurrentLatitude,
    CurrentLongitude,
    CurrentAddress,
    DestinationLatitude,
    DestinationLongitude,
    DestinationAddress,
    DriverName,
    DriverPhone,
    VehicleInfo,
    DistanceKm,
    TimeMinutes,
    Eta,
    NearDeliveryNotified,
    IsActive,
    StartedAt,
    LastLocationAt,
    CompletedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum OrderStatusHistory {
    Table,
    Id,
    OrderId,
    Status,
    Latitude,
    Longitude,
    Address,
    Note,
    ActorId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum OrderNotifications {
    Table,
    Id,
    UserId,
    OrderId,
    Kind,
    Title,
    Message,
    IsRead,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
}
