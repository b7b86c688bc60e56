/// Internal action markers emitted by the reply generator and the text the
/// end user sees in their place.
const ACTION_PLACEHOLDERS: &[(&str, &str)] = &[("[ACTION:SEND_LESSON_LINK]", "[ССЫЛКА_НА_УРОК]")];

/// Replaces internal action markers before a reply is persisted.
pub fn sanitize_reply(text: &str) -> String {
    ACTION_PLACEHOLDERS
        .iter()
        .fold(text.to_string(), |acc, (marker, placeholder)| {
            acc.replace(marker, placeholder)
        })
}
