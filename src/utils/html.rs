use ammonia;

/// Clean HTML content using the ammonia library.
///
/// This employs a whitelist-based sanitization strategy: it preserves safe tags
/// (like <b>, <p>) while stripping dangerous tags (like <script>, <iframe>)
/// and malicious attributes (like onclick).
///
/// Applied to user-supplied catalog text (statements, alternative texts)
/// before it is persisted, as a fail-safe against stored XSS in clients
/// that render it as HTML.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
