use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GoldDailyCloses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GoldDailyCloses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GoldDailyCloses::Date)
                            .date()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(GoldDailyCloses::DomesticOpen).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::DomesticHigh).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::DomesticLow).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::DomesticClose).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::InternationalOpen).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::InternationalHigh).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::InternationalLow).decimal_len(18, 4).null())
                    .col(ColumnDef::new(GoldDailyCloses::InternationalClose).decimal_len(18, 4).null())
                    .col(
                        ColumnDef::new(GoldDailyCloses::UpdateCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GoldDailyCloses::LastUpdate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Range scans for the history endpoint
        manager
            .create_index(
                Index::create()
                    .name("idx_gold_daily_closes_date")
                    .table(GoldDailyCloses::Table)
                    .col(GoldDailyCloses::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GoldDailyCloses::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum GoldDailyCloses {
    Table,
    Id,
    Date,
    DomesticOpen,
    DomesticHigh,
    DomesticLow,
    DomesticClose,
    InternationalOpen,
    InternationalHigh,
    InternationalLow,
    InternationalClose,
    UpdateCount,
    LastUpdate,
}
