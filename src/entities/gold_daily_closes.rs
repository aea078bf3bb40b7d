//! SeaORM Entity for the long-term per-day gold aggregate

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "gold_daily_closes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Market-local calendar day
    #[sea_orm(unique)]
    pub date: Date,
    /// CNY per gram
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub domestic_open: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub domestic_high: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub domestic_low: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub domestic_close: Option<Decimal>,
    /// USD per troy ounce
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub international_open: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub international_high: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub international_low: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 4)))", nullable)]
    pub international_close: Option<Decimal>,
    pub update_count: i32,
    pub last_update: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
