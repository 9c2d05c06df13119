pub mod bist_market;

pub use bist_market::MarketCalendar;
