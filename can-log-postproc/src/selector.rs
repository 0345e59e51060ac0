//! Message filter resolution
//!
//! Turns a configured message filter into concrete message lists and finds
//! every decoded log file that carries all messages of such a list.

use crate::config::{MatchType, MessageFilterConfig, MessageList};
use crate::path_index::PathIndex;
use crate::types::{MessageGroup, ALL_MESSAGES};

/// Resolve a filter into the message lists to try, one at a time
///
/// The result is never a union: each inner list is matched against the index
/// separately by [`related_groups`].
pub fn resolve_filter(filter: &MessageFilterConfig, index: &PathIndex) -> Vec<Vec<String>> {
    match filter.match_type {
        MatchType::Equals => match &filter.messages_filtered_list {
            MessageList::Single(name) => vec![vec![name.clone()]],
            MessageList::Flat(names) => vec![names.clone()],
            MessageList::Nested(lists) => lists.clone(),
        },
        MatchType::Contains => {
            let patterns = filter.messages_filtered_list.names();
            index
                .message_names()
                .into_iter()
                .filter(|name| patterns.iter().any(|pattern| name.contains(pattern)))
                .map(|name| vec![name.to_string()])
                .collect()
        }
        MatchType::AllMessages => vec![vec![ALL_MESSAGES.to_string()]],
    }
}

/// Find every group containing all of `messages`
///
/// Each returned group lists only the requested messages, in index order.
/// `["ALL"]` returns the full mapping unchanged.
pub fn related_groups(index: &PathIndex, messages: &[String]) -> MessageGroup {
    if messages.is_empty() {
        return MessageGroup::new();
    }
    if messages.len() == 1 && messages[0] == ALL_MESSAGES {
        return index.groups().clone();
    }

    index
        .groups()
        .iter()
        .filter(|(_, present)| messages.iter().all(|m| present.contains(m)))
        .map(|(key, present)| {
            let selected: Vec<String> = present
                .iter()
                .filter(|m| messages.contains(m))
                .cloned()
                .collect();
            (key.clone(), selected)
        })
        .collect()
}
