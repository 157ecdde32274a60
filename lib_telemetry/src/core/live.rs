//! Live feed: turns announced keys back into readings for presentation.

use futures_util::Stream;
use tracing::{debug, warn};

use crate::connections::StoreError;
use crate::models::Reading;

use super::{ReadingStore, Subscription};

/// Resolves each key from `subscription` through `store`.
///
/// Keys whose entry is already gone are skipped; notification is advisory and
/// storage is authoritative. The stream ends with the subscription.
pub fn live_readings(store: ReadingStore, subscription: Subscription) -> impl Stream<Item = Reading> + Send + 'static {
    futures_util::stream::unfold((store, subscription), |(store, mut subscription)| async move {
        loop {
            let key = subscription.next().await?;
            match store.get(&key).await {
                Ok(reading) => return Some((reading, (store, subscription))),
                Err(StoreError::NotFound(_)) => debug!(%key, "announced key already expired"),
                Err(e) => warn!(%key, error = %e, "failed to resolve announced key"),
            }
        }
    })
}
