//! Relevance of an event to a webhook

use relay_core::{TxServiceEvent, WebhookSubscription};

/// Whether `event` should be delivered to `subscription`.
///
/// The chain must be listed (or the list empty) and the event's category
/// must belong to an enabled group. Unknown categories never match.
pub fn is_relevant(subscription: &WebhookSubscription, event: &TxServiceEvent) -> bool {
    let chain_matches =
        subscription.chains.is_empty() || subscription.chains.contains(&event.chain_id);

    let category_matches = event
        .category()
        .map(|category| subscription.sends(category.group()))
        .unwrap_or(false);

    chain_matches && category_matches
}
