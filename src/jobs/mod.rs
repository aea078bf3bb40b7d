pub mod gold_price_sync;
pub mod history_retention;
