//! UTF-8 safe truncation used when credentials must be shortened for logs.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
///
/// Returns the longest prefix of `s` whose byte length is ≤ `max_bytes`
/// and that does not split a multi-byte character.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Number of leading bytes of a token kept by [`redact_token`].
pub const TOKEN_PREFIX_BYTES: usize = 8;

/// Shorten an opaque token to a recognisable prefix, e.g. `"abcdefgh…(64)"`.
///
/// The original length is kept so different tokens sharing a prefix can
/// still be told apart in logs.
pub fn redact_token(token: &str) -> String {
    if token.len() <= TOKEN_PREFIX_BYTES {
        return format!("{token}({})", token.len());
    }
    format!("{}…({})", truncate_str(token, TOKEN_PREFIX_BYTES), token.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
