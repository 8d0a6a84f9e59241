//! Action Configuration
//!
//! Typed read access to the open `actionConfig` bag of an area. Every flag
//! defaults to off, so an action only fires when the config enables it.

use serde_json::Value;

/// Typed accessor over an area's `actionConfig` JSON value.
#[derive(Clone, Copy, Debug)]
pub struct ActionConfig<'a> {
    value: &'a Value,
}

impl<'a> ActionConfig<'a> {
    /// Wrap an `actionConfig` value.
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn flag(&self, key: &str) -> bool {
        self.value.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn text(&self, key: &str) -> Option<&'a str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Jitsi: join the room on entry.
    #[must_use]
    pub fn auto_join_on_entry(&self) -> bool {
        self.flag("autoJoinOnEntry")
    }

    /// Jitsi: leave the room on exit.
    #[must_use]
    pub fn auto_leave_on_exit(&self) -> bool {
        self.flag("autoLeaveOnExit")
    }

    /// Jitsi: explicit room name overriding the derived one.
    #[must_use]
    pub fn room_name(&self) -> Option<&'a str> {
        self.text("roomName")
    }

    /// Alert and modal: show on entry.
    #[must_use]
    pub fn show_on_entry(&self) -> bool {
        self.flag("showOnEntry")
    }

    /// Alert text. Empty when absent.
    #[must_use]
    pub fn message(&self) -> &'a str {
        self.text("message").unwrap_or("")
    }

    /// Alert severity. Defaults to `"info"`.
    #[must_use]
    pub fn alert_type(&self) -> &'a str {
        self.text("alertType").unwrap_or("info")
    }

    /// URL target.
    #[must_use]
    pub fn url(&self) -> Option<&'a str> {
        self.text("url")
    }

    /// URL: open on entry.
    #[must_use]
    pub fn open_on_entry(&self) -> bool {
        self.flag("openOnEntry")
    }

    /// URL: open in a new tab. Defaults to `true`.
    #[must_use]
    pub fn open_in_new_tab(&self) -> bool {
        self.value
            .get("openInNewTab")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Modal title.
    #[must_use]
    pub fn title(&self) -> Option<&'a str> {
        self.text("title")
    }

    /// Modal body. Empty when absent.
    #[must_use]
    pub fn content(&self) -> &'a str {
        self.text("content").unwrap_or("")
    }

    /// Modal: close on exit.
    #[must_use]
    pub fn close_on_exit(&self) -> bool {
        self.flag("closeOnExit")
    }

    /// Collectible: collect on entry.
    #[must_use]
    pub fn collect_on_entry(&self) -> bool {
        self.flag("collectOnEntry")
    }

    /// Collectible item id.
    #[must_use]
    pub fn item_id(&self) -> Option<&'a str> {
        self.text("itemId")
    }

    /// Switch: toggle on entry.
    #[must_use]
    pub fn toggle_on_entry(&self) -> bool {
        self.flag("toggleOnEntry")
    }

    /// Switch target.
    #[must_use]
    pub fn target_id(&self) -> Option<&'a str> {
        self.text("targetId")
    }
}

/// Derive a video room name: `<prefix>-<slug>`, where the slug is the
/// lower-cased name with every run of non-alphanumeric characters collapsed
/// to a single hyphen and leading/trailing hyphens removed.
///
/// Trimming the edge hyphens is intentional: `"-Lobby-"` and `"Lobby"` map
/// to the same room.
pub fn jitsi_room_name(prefix: &str, name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    // A hyphen is only written between two alphanumeric runs, never at an edge.
    let mut pending_hyphen = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}-{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags_default_off() {
        let value = json!({});
        let config = ActionConfig::new(&value);
        assert!(!config.auto_join_on_entry());
        assert!(!config.show_on_entry());
        assert!(!config.collect_on_entry());
        assert!(config.open_in_new_tab());
        assert_eq!(config.alert_type(), "info");
        assert_eq!(config.message(), "");
    }

    #[test]
    fn test_null_config() {
        let config = ActionConfig::new(&Value::Null);
        assert!(!config.auto_leave_on_exit());
        assert_eq!(config.url(), None);
    }

    #[test]
    fn test_wrong_types_ignored() {
        let value = json!({"autoJoinOnEntry": "yes", "url": 42, "title": "  "});
        let config = ActionConfig::new(&value);
        assert!(!config.auto_join_on_entry());
        assert_eq!(config.url(), None);
        assert_eq!(config.title(), None);
    }

    #[test]
    fn test_room_name_slug() {
        assert_eq!(jitsi_room_name("stargety", "Meeting Room"), "stargety-meeting-room");
        assert_eq!(jitsi_room_name("stargety", "  Q&A -- Stage #2! "), "stargety-q-a-stage-2");
        assert_eq!(jitsi_room_name("stargety", "CAFÉ"), "stargety-caf");
        assert_eq!(jitsi_room_name("stargety", "!!!"), "stargety");
        assert_eq!(jitsi_room_name("stargety", "-Lobby-"), jitsi_room_name("stargety", "Lobby"));
    }

    #[test]
    fn test_room_name_deterministic() {
        assert_eq!(
            jitsi_room_name("ns", "Design Review"),
            jitsi_room_name("ns", "design   review")
        );
    }
}
