pub mod alert;
pub mod analysis;
pub mod history;
pub mod quote;
pub mod response;
