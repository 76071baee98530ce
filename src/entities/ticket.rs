use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer support request. `message` keeps the opening description; the
/// conversation lives in `ticket_messages`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[sea_orm(nullable)]
    pub category: Option<String>,
    #[sea_orm(nullable)]
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub resolved_at: Option<DateTime<Utc>>,
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
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TicketStatus {
    #[sea_orm(string_value = "open")]
    #[strum(to_string = "open", serialize = "abierto")]
    Open,
    #[sea_orm(string_value = "in_progress")]
    #[strum(to_string = "in_progress", serialize = "en_proceso")]
    InProgress,
    #[sea_orm(string_value = "resolved")]
    #[strum(to_string = "resolved", serialize = "resuelto")]
    Resolved,
    #[sea_orm(string_value = "closed")]
    #[strum(to_string = "closed", serialize = "cerrado")]
    Closed,
}

impl TicketStatus {
    /// Resolved and closed tickets carry a `resolved_at` timestamp.
    pub fn is_resolved(self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TicketPriority {
    #[sea_orm(string_value = "low")]
    #[strum(to_string = "low", serialize = "baja")]
    Low,
    #[default]
    #[sea_orm(string_value = "medium")]
    #[strum(to_string = "medium", serialize = "media")]
    Medium,
    #[sea_orm(string_value = "high")]
    #[strum(to_string = "high", serialize = "alta")]
    High,
    #[sea_orm(string_value = "urgent")]
    #[strum(to_string = "urgent", serialize = "urgente")]
    Urgent,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ticket_message::Entity")]
    Messages,
}

impl Related<super::ticket_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
