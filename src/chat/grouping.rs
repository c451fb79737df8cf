//! Day grouping of a conversation for display

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone};

use crate::models::Message;

/// Messages sharing one calendar day in the viewer's timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup<'a> {
    pub date: NaiveDate,
    pub label: String,
    pub messages: Vec<&'a Message>,
}

/// `Today`, `Yesterday`, `Mar 4` within the current year, else `Mar 4, 2023`.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.checked_sub_signed(Duration::days(1)) {
        "Yesterday".to_string()
    } else if date.year() == today.year() {
        date.format("%b %-d").to_string()
    } else {
        date.format("%b %-d, %Y").to_string()
    }
}

/// Group messages by calendar day of `created_at` in `now`'s timezone.
///
/// Groups appear in message order; a day that shows up again later (clock
/// skew between senders) is appended to its existing group.
pub fn group_by_day<'a, Tz: TimeZone>(
    messages: impl IntoIterator<Item = &'a Message>,
    now: &DateTime<Tz>,
) -> Vec<DayGroup<'a>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut groups: Vec<DayGroup<'a>> = Vec::new();

    for message in messages {
        let date = message.created_at.with_timezone(&tz).date_naive();
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => group.messages.push(message),
            None => groups.push(DayGroup {
                date,
                label: day_label(date, today),
                messages: vec![message],
            }),
        }
    }
    groups
}
