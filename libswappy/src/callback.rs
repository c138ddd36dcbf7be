//! OAuth redirect/callback URL parsing
//!
//! The hosted service returns to `swappy://oauth-callback` in one of two
//! shapes:
//!
//! - implicit flow: `#access_token=...&refresh_token=...` in the fragment
//! - PKCE flow: `?code=...` in the query
//!
//! An `error` parameter in either place means the provider refused the
//! login; it wins over anything else in the URL.

use secrecy::SecretString;
use std::collections::HashMap;

/// What a callback URL carries
#[derive(Debug)]
pub enum CallbackPayload {
    Tokens {
        access_token: SecretString,
        refresh_token: SecretString,
    },
    Code(String),
    Error {
        code: String,
        description: Option<String>,
    },
    /// Nothing usable (e.g. the app was opened with a plain link)
    Empty,
}

impl CallbackPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackPayload::Tokens { .. } => "tokens",
            CallbackPayload::Code(_) => "code",
            CallbackPayload::Error { .. } => "error",
            CallbackPayload::Empty => "empty",
        }
    }
}

pub fn parse_callback(url: &str) -> CallbackPayload {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, fragment),
        None => (url, ""),
    };
    let query = before_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or("");

    let query = parse_params(query);
    let fragment = parse_params(fragment);

    let lookup = |key: &str| query.get(key).or_else(|| fragment.get(key)).cloned();

    if let Some(code) = lookup("error") {
        return CallbackPayload::Error {
            code,
            description: lookup("error_description"),
        };
    }

    if let (Some(access), Some(refresh)) = (fragment.get("access_token"), fragment.get("refresh_token")) {
        return CallbackPayload::Tokens {
            access_token: SecretString::from(access.clone()),
            refresh_token: SecretString::from(refresh.clone()),
        };
    }

    if let Some(code) = query.get("code") {
        return CallbackPayload::Code(code.clone());
    }

    CallbackPayload::Empty
}

/// `a=1&b=two+words` → map; empty values are dropped, first occurrence wins
fn parse_params(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        params.entry(key).or_insert(value);
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_token_fragment() {
        let payload = parse_callback("swappy://oauth-callback#access_token=T1&refresh_token=T2&expires_in=3600");
        match payload {
            CallbackPayload::Tokens {
                access_token,
                refresh_token,
            } => {
                assert_eq!(access_token.expose_secret(), "T1");
                assert_eq!(refresh_token.expose_secret(), "T2");
            }
            other => panic!("Expected tokens, got {}", other.kind()),
        }
    }

    #[test]
    fn test_code_query() {
        match parse_callback("swappy://oauth-callback?code=ABC") {
            CallbackPayload::Code(code) => assert_eq!(code, "ABC"),
            other => panic!("Expected code, got {}", other.kind()),
        }
    }

    #[test]
    fn test_error_query() {
        match parse_callback("swappy://oauth-callback?error=access_denied") {
            CallbackPayload::Error { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description, None);
            }
            other => panic!("Expected error, got {}", other.kind()),
        }
    }

    #[test]
    fn test_error_in_fragment_with_description() {
        let payload = parse_callback(
            "swappy://oauth-callback#error=server_error&error_description=Unable+to+exchange%20code",
        );
        match payload {
            CallbackPayload::Error { code, description } => {
                assert_eq!(code, "server_error");
                assert_eq!(description.as_deref(), Some("Unable to exchange code"));
            }
            other => panic!("Expected error, got {}", other.kind()),
        }
    }

    #[test]
    fn test_error_wins_over_code_and_tokens() {
        let payload =
            parse_callback("swappy://cb?code=ABC&error=access_denied#access_token=T1&refresh_token=T2");
        assert_eq!(payload.kind(), "error");
    }

    #[test]
    fn test_tokens_win_over_code() {
        let payload = parse_callback("swappy://cb?code=ABC#access_token=T1&refresh_token=T2");
        assert_eq!(payload.kind(), "tokens");
    }

    #[test]
    fn test_incomplete_token_pair_falls_back_to_code() {
        let payload = parse_callback("swappy://cb?code=ABC#access_token=T1");
        assert_eq!(payload.kind(), "code");
    }

    #[test]
    fn test_tokens_only_read_from_fragment() {
        let payload = parse_callback("swappy://cb?access_token=T1&refresh_token=T2");
        assert_eq!(payload.kind(), "empty");
    }

    #[test]
    fn test_percent_decoding_of_code() {
        match parse_callback("https://app.example/cb?code=a%2Fb%3Dc") {
            CallbackPayload::Code(code) => assert_eq!(code, "a/b=c"),
            other => panic!("Expected code, got {}", other.kind()),
        }
    }

    #[test]
    fn test_empty_values_are_ignored() {
        assert_eq!(parse_callback("swappy://cb?code=&error=").kind(), "empty");
        assert_eq!(parse_callback("swappy://cb").kind(), "empty");
        assert_eq!(parse_callback("").kind(), "empty");
    }
}
