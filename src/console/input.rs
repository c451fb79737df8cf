//! Line input parsing for the interactive console

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send.
    Say(String),
    /// `/call [peer]`; without a peer the other chat participant is used.
    Call(Option<String>),
    /// `/open <appointment>` switches the chat to another appointment.
    Open(Option<String>),
    Accept,
    Decline,
    Hangup,
    Mute,
    Video,
    Dismiss,
    Status,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  <text>          send a message
  /open <appt>    switch to another appointment
  /call [peer]    start a video call
  /accept         answer the ringing call
  /decline        reject the ringing call
  /hangup         end the current call
  /mute           toggle microphone
  /video          toggle camera
  /dismiss        clear a call error
  /status         show call and connection state
  /quit           leave";

/// Parse an input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };
    // "//text" escapes a leading slash.
    if rest.starts_with('/') {
        return Some(Command::Say(rest.to_string()));
    }

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let arg = parts.next().map(String::from);

    let cmd = match name.as_str() {
        "call" => Command::Call(arg),
        "open" | "switch" => Command::Open(arg),
        "accept" | "answer" => Command::Accept,
        "decline" | "reject" => Command::Decline,
        "hangup" | "end" => Command::Hangup,
        "mute" => Command::Mute,
        "video" | "camera" => Command::Video,
        "dismiss" => Command::Dismiss,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(name),
    };
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_and_blank_lines() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line(" hello there "), Some(Command::Say("hello there".into())));
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(parse_line("/call"), Some(Command::Call(None)));
        assert_eq!(parse_line("/CALL doc_1"), Some(Command::Call(Some("doc_1".into()))));
        assert_eq!(parse_line("/open apt_2"), Some(Command::Open(Some("apt_2".into()))));
        assert_eq!(parse_line("/switch"), Some(Command::Open(None)));
        assert_eq!(parse_line("/accept"), Some(Command::Accept));
        assert_eq!(parse_line("/hangup"), Some(Command::Hangup));
        assert_eq!(parse_line("/q"), Some(Command::Quit));
        assert_eq!(parse_line("/frobnicate"), Some(Command::Unknown("frobnicate".into())));
    }

    #[test]
    fn test_double_slash_sends_text() {
        assert_eq!(parse_line("//etc/hosts"), Some(Command::Say("/etc/hosts".into())));
    }
}
