pub mod yahoo;

use crate::domain::quote::Quote;
use std::collections::HashMap;

/// Best-effort batch quote lookup.
///
/// Ids that could not be priced are simply absent from the returned map; an `Err` means the
/// source as a whole was unusable for this call.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn get_quotes(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Quote>>;
}
