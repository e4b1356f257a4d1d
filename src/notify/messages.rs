//! Telegram message bodies (HTML parse mode).
//!
//! Builders take the timestamp as a string so output is deterministic; callers pass
//! `timestamp_now()`.

use crate::catalog::ClassCatalog;
use crate::stats::ClassCounts;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Icons repeated in an alert header at most this many times.
const MAX_ALERT_ICONS: u64 = 5;

/// Local wall-clock time formatted for messages.
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Escape text interpolated into an HTML-mode message.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn test_message(timestamp: &str) -> String {
    format!(
        "✅ <b>Test notification delivered!</b>\n\
         \n\
         🤖 Telegram bot connected\n\
         🕐 Test time: <b>{}</b>\n\
         📡 Status: <b>Ready to detect</b>\n\
         \n\
         The detection alert system is ready.",
        escape_html(timestamp)
    )
}

/// Alert body. One object is a warning; more than one is urgent.
pub fn alert_message(trigger_class: &str, icon: &str, count: u64, timestamp: &str) -> String {
    let urgency = if count <= 1 { "⚠️ WARNING" } else { "🚨 URGENT" };
    let icons = icon.repeat(count.min(MAX_ALERT_ICONS) as usize);
    let class = escape_html(trigger_class);
    format!(
        "{urgency} - {upper} DETECTED!\n\
         \n\
         {icons} <b>{class} spotted in the monitored area</b>\n\
         📊 {class} count: <b>{count}</b>\n\
         🕐 Time: <b>{time}</b>\n\
         📍 Status: <b>Actively detected</b>\n\
         \n\
         🔍 Please check the surrounding area.\n\
         \n\
         #{tag}Alert #Security",
        urgency = urgency,
        upper = class.to_uppercase(),
        icons = icons,
        class = class,
        count = count,
        time = escape_html(timestamp),
        tag = hashtag(trigger_class),
    )
}

pub fn session_start_message(timestamp: &str) -> String {
    format!(
        "🟢 <b>Detection session started</b>\n\
         \n\
         📹 Source: <b>Active</b>\n\
         🕐 Started: <b>{}</b>\n\
         🎯 Mode: <b>Real-time detection</b>\n\
         \n\
         Monitoring is now active...",
        escape_html(timestamp)
    )
}

/// Session summary: total plus one line per class seen.
pub fn session_end_message(counts: &ClassCounts, catalog: &ClassCatalog, timestamp: &str) -> String {
    let lines: Vec<String> = counts
        .nonzero()
        .map(|(name, count)| format!("{} {}: {}", catalog.icon_for(name), escape_html(name), count))
        .collect();
    let summary = if lines.is_empty() {
        "No detections".to_string()
    } else {
        lines.join("\n")
    };
    format!(
        "🔴 <b>Detection session ended</b>\n\
         \n\
         🕐 Ended: <b>{}</b>\n\
         📊 Total detections: <b>{}</b>\n\
         \n\
         <b>Detection summary:</b>\n\
         {}\n\
         \n\
         Detection has been stopped.",
        escape_html(timestamp),
        counts.total(),
        summary
    )
}

fn hashtag(class_name: &str) -> String {
    class_name.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::stats::StatsTracker;
    use std::sync::Arc;

    const NOW: &str = "2024-05-01 12:00:00";

    #[test]
    fn single_object_alert_is_a_warning() {
        let text = alert_message("Drone", "🛸", 1, NOW);
        assert!(text.starts_with("⚠️ WARNING - DRONE DETECTED!"));
        assert!(text.contains("🛸 <b>Drone spotted"));
        assert!(text.contains("count: <b>1</b>"));
        assert!(text.contains(NOW));
        assert!(text.ends_with("#DroneAlert #Security"));
    }

    #[test]
    fn crowded_alert_is_urgent_with_capped_icons() {
        let text = alert_message("Drone", "🛸", 9, NOW);
        assert!(text.starts_with("🚨 URGENT"));
        assert!(text.contains(&format!("{} <b>", "🛸".repeat(5))));
        assert!(!text.contains(&"🛸".repeat(6)));
    }

    #[test]
    fn class_names_are_escaped() {
        let text = alert_message("<Kite & Co>", "*", 1, NOW);
        assert!(text.contains("&lt;Kite &amp; Co&gt;"));
        assert!(!text.contains("<Kite"));
    }

    #[test]
    fn session_end_lists_seen_classes() {
        let catalog = Arc::new(ClassCatalog::aerial());
        let mut stats = StatsTracker::new(catalog.clone(), 15);
        let empty = session_end_message(stats.session_counts(), &catalog, NOW);
        assert!(empty.contains("Total detections: <b>0</b>"));
        assert!(empty.contains("No detections"));

        let det = |name: &str| Detection {
            class_id: 0,
            class_name: name.to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        };
        stats.update_session(&[det("Bird"), det("Drone"), det("Drone")]);
        let text = session_end_message(stats.session_counts(), &catalog, NOW);
        assert!(text.contains("Total detections: <b>3</b>"));
        assert!(text.contains("🐦 Bird: 1\n🛸 Drone: 2"));
        assert!(!text.contains("Aircraft"));
    }

    #[test]
    fn start_and_test_messages_carry_timestamp() {
        assert!(session_start_message(NOW).contains(&format!("Started: <b>{}</b>", NOW)));
        assert!(test_message(NOW).contains(&format!("Test time: <b>{}</b>", NOW)));
    }
}
