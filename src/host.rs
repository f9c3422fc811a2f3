//! Host tool-call notifications
//!
//! The realtime host reports its game tool calls as transcript breadcrumbs,
//! e.g. `function call result: start_child_advice_game` with the scenario as
//! data. [`HostToolCallDecoder`] turns those into typed notifications and
//! makes sure each breadcrumb is acted on once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::capability::Scenario;
use crate::game::Verdict;

const TOOL_RESULT_MARKER: &str = "function call result:";

/// Breadcrumb item from the host's transcript stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostBreadcrumb {
    /// Transcript item id
    pub item_id: String,
    /// Breadcrumb title
    pub title: String,
    /// Tool call result payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl HostBreadcrumb {
    /// Create a breadcrumb
    #[must_use]
    pub fn new(
        item_id: impl Into<String>,
        title: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            data,
        }
    }

    /// Breadcrumb for the result of `tool`
    #[must_use]
    pub fn tool_result(item_id: impl Into<String>, tool: &str, data: serde_json::Value) -> Self {
        Self::new(item_id, format!("{TOOL_RESULT_MARKER} {tool}"), Some(data))
    }
}

/// Game event reported by the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostNotification {
    /// The host started the game with this scenario
    ScenarioStarted(Scenario),
    /// The host judged the round
    RoundFinished(Verdict),
}

/// Decodes host breadcrumbs, each item at most once
#[derive(Debug, Default)]
pub struct HostToolCallDecoder {
    processed: HashSet<String>,
}

impl HostToolCallDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `item_id` has already produced a notification
    #[must_use]
    pub fn is_processed(&self, item_id: &str) -> bool {
        self.processed.contains(item_id)
    }

    /// Decode one breadcrumb
    ///
    /// Returns `None` for unrelated breadcrumbs, repeated items and payloads
    /// that do not parse.
    pub fn decode(&mut self, crumb: &HostBreadcrumb) -> Option<HostNotification> {
        if self.processed.contains(&crumb.item_id) {
            return None;
        }

        let tool = tool_name(&crumb.title)?;
        let data = crumb.data.clone()?;

        let parsed = if tool.starts_with("start_") {
            serde_json::from_value(data).map(HostNotification::ScenarioStarted)
        } else if tool.starts_with("finish_") {
            serde_json::from_value(data).map(HostNotification::RoundFinished)
        } else {
            return None;
        };

        let notification = match parsed {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(tool, item_id = %crumb.item_id, error = %e, "malformed tool call result");
                return None;
            }
        };

        tracing::debug!(tool, item_id = %crumb.item_id, "host tool call decoded");
        self.processed.insert(crumb.item_id.clone());
        Some(notification)
    }

    /// Decode a batch in order
    pub fn decode_all<'a, I>(&mut self, crumbs: I) -> Vec<HostNotification>
    where
        I: IntoIterator<Item = &'a HostBreadcrumb>,
    {
        crumbs.into_iter().filter_map(|c| self.decode(c)).collect()
    }
}

/// Tool name following the result marker, if any
fn tool_name(title: &str) -> Option<&str> {
    let (_, rest) = title.split_once(TOOL_RESULT_MARKER)?;
    rest.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_start_and_finish() {
        let mut decoder = HostToolCallDecoder::new();

        let start = HostBreadcrumb::tool_result(
            "item-1",
            "start_child_advice_game",
            json!({"id": "s1", "problem": "I lost my teddy", "childQuote": "Waaah"}),
        );
        let Some(HostNotification::ScenarioStarted(scenario)) = decoder.decode(&start) else {
            panic!("expected scenario");
        };
        assert_eq!(scenario.prompt, "I lost my teddy");

        let finish = HostBreadcrumb::tool_result(
            "item-2",
            "finish_child_advice_game",
            json!({"success": true, "score": 80, "message": "Kind words"}),
        );
        assert_eq!(
            decoder.decode(&finish),
            Some(HostNotification::RoundFinished(Verdict::win(80, "Kind words")))
        );
    }

    #[test]
    fn each_item_is_processed_once() {
        let mut decoder = HostToolCallDecoder::new();
        let crumb = HostBreadcrumb::tool_result("item-1", "finish_game", json!({"success": false}));

        let notifications = decoder.decode_all([&crumb, &crumb]);
        assert_eq!(notifications.len(), 1);
        assert!(decoder.is_processed("item-1"));
    }

    #[test]
    fn ignores_unrelated_and_malformed() {
        let mut decoder = HostToolCallDecoder::new();

        let chatter = HostBreadcrumb::new("a", "session.update", Some(json!({})));
        let other_tool = HostBreadcrumb::tool_result("b", "get_weather", json!({}));
        let no_data = HostBreadcrumb::new("c", "function call result: finish_game", None);
        let bad = HostBreadcrumb::tool_result("d", "finish_game", json!({"success": "maybe"}));

        assert!(decoder.decode_all([&chatter, &other_tool, &no_data, &bad]).is_empty());
        assert!(!decoder.is_processed("d"));
    }
}
