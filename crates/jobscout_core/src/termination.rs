/// Lower-case fragments that identify a browser error as "the page, context or
/// browser is gone". Every check goes through [`is_session_terminated`].
const SESSION_TERMINATED_MARKERS: &[&str] = &[
    "target page, context or browser has been closed",
    "browser has been closed",
    "page has been closed",
    "target closed",
    "session closed",
    "connection closed",
    "channel closed",
    "websocket closed",
    "no such target",
];

/// Classifies an error message as a terminated browser session.
pub fn is_session_terminated(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    SESSION_TERMINATED_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
