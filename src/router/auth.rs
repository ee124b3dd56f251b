//! Bearer-token auth middleware. An empty `proxy.bearer_token` disables
//! auth entirely — the teacher's own `SessionAuth` treats an empty
//! configured token the same way.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;

use super::AppState;

pub async fn require_bearer_token<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    if state.settings.proxy.bearer_token.is_empty() {
        return Ok(next.run(request).await);
    }

    let expected = format!("Bearer {}", state.settings.proxy.bearer_token);
    let supplied = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match supplied {
        Some(header) if constant_time_eq(header.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => Err(AppError::Unauthorized),
    }
}

/// Compare two byte strings in time independent of where they first differ.
/// Still short-circuits on length, which is public information here (an
/// operator-configured token's length isn't a secret worth protecting).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_bytes() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_different_bytes() {
        assert!(!constant_time_eq(b"abc123", b"abc124"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
