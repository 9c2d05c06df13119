pub mod ledger;
pub mod quote;

pub use ledger::{WatchEntry, WatchLedger};
pub use quote::Quote;
