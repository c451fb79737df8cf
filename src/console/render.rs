//! Plain-text rendering of messages, day groups and notices

use chrono::{DateTime, Local, TimeZone};
use tokio::time::Instant;

use crate::chat::DayGroup;
use crate::models::Message;
use crate::notify::{Notification, NotificationKind};
use crate::participant::ChatParticipantAdapter;

/// `[14:03] You: hi` with a trailing read mark on own messages.
pub fn message_line<Tz: TimeZone>(
    message: &Message,
    participant: &dyn ChatParticipantAdapter,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let time = message.created_at.with_timezone(tz).format("%H:%M");
    let own = participant.is_own(message);
    let who = if own {
        "You".to_string()
    } else {
        match message.sender_role {
            Some(role) => capitalize(role.as_str()),
            None => message
                .sender_id
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    };
    let mark = match (own, message.is_read) {
        (true, true) => " ✓✓",
        (true, false) => " ✓",
        _ => "",
    };
    format!("[{}] {}: {}{}", time, who, message.body, mark)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render day groups with a header per day.
pub fn groups_text<Tz: TimeZone>(
    groups: &[DayGroup<'_>],
    participant: &dyn ChatParticipantAdapter,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("── {} ──\n", group.label));
        for message in &group.messages {
            out.push_str(&message_line(message, participant, tz));
            out.push('\n');
        }
    }
    out
}

pub fn print_groups(groups: &[DayGroup<'_>], participant: &dyn ChatParticipantAdapter) {
    if groups.is_empty() {
        println!("(no messages yet)");
        return;
    }
    print!("{}", groups_text(groups, participant, &Local));
}

pub fn print_message(message: &Message, participant: &dyn ChatParticipantAdapter) {
    println!("{}", message_line(message, participant, &Local));
}

pub fn notice_line(notification: &Notification) -> String {
    format!("[{}] {}", notification.kind.as_str(), notification.message)
}

/// Suppresses a notice identical to the one still within its display time.
#[derive(Debug, Default)]
pub struct NoticeFilter {
    shown: Option<(NotificationKind, String, Instant)>,
}

impl NoticeFilter {
    pub fn admit(&mut self, notice: &Notification, now: Instant) -> bool {
        if let Some((kind, message, until)) = &self.shown {
            if *kind == notice.kind && *message == notice.message && now < *until {
                return false;
            }
        }
        self.shown = Some((notice.kind, notice.message.clone(), now + notice.duration));
        true
    }
}

/// Current local time, for grouping relative to the viewer's day.
pub fn local_now() -> DateTime<Local> {
    Local::now()
}
