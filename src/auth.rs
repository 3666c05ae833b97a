//! JWT bearer authentication for the DIALS REST API.
//!
//! This module provides token issuance and verification using HMAC-SHA256
//! signed JSON Web Tokens.
//!
//! # Token Scheme
//!
//! Tokens are compact JWTs carrying an `exp` claim (unix seconds) plus any
//! additional application claims. Integrity is guaranteed by a keyed
//! signature over the payload, not by encryption:
//!
//! ```text
//! token = base64url(header) . base64url(claims) . HMAC-SHA256(secret, header.claims)
//! ```
//!
//! A token is valid if and only if its signature verifies under the shared
//! secret and its `exp` claim is strictly in the future. There are no
//! issuer, audience or not-before checks.
//!
//! Protected routes require an `Authorization: Bearer <token>` header. Each
//! failure mode produces a distinct rejection reason, all surfaced as
//! HTTP 401 so clients know to re-authenticate with a fresh token.
//!
//! # Example
//!
//! ```rust
//! use dials_rest::auth::TokenAuth;
//! use std::time::Duration;
//!
//! // Create issuer/verifier with the shared secret
//! let auth = TokenAuth::new("my-secret-key");
//!
//! // Issue a token valid for 1 hour
//! let token = auth
//!     .issue(Default::default(), None, Some(Duration::from_secs(3600)))
//!     .unwrap();
//!
//! // Verify it
//! assert!(auth.verify(&token).is_ok());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::server::handlers::ErrorResponse;

// =============================================================================
// Constants
// =============================================================================

/// Signing algorithm for all tokens.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Default token lifetime when neither an explicit expiry nor a TTL is given.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// Types
// =============================================================================

/// The signed payload of an access token.
///
/// `exp` is mandatory; any additional application claims are carried in
/// `extra` and round-trip unchanged, though nothing in the current system
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Absolute expiry instant, unix seconds.
    pub exp: u64,

    /// Additional application claims (unused by this service).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// The expiry instant as a `SystemTime`.
    pub fn expiry(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.exp)
    }
}

/// Evidence of a successfully authenticated request.
///
/// Created fresh per request by the bearer middleware and stored in the
/// request extensions; it has no lifecycle beyond the request it
/// authenticates.
#[derive(Debug, Clone)]
pub struct BearerToken {
    /// The authentication scheme (always `"Bearer"`).
    pub scheme: &'static str,

    /// The raw credential string as presented by the caller.
    pub credential: String,

    /// The decoded expiry instant.
    pub expiry: SystemTime,
}

impl BearerToken {
    /// The only accepted authentication scheme.
    pub const SCHEME: &'static str = "Bearer";
}

impl<S> axum::extract::FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerToken>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Authentication error types.
///
/// Every rejection is terminal for the request; there is no retry or refresh
/// flow. The display strings are the reasons surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header, or the header cannot be split into
    /// scheme + credential
    #[error("invalid authorization credentials")]
    MissingCredentials,

    /// Scheme present but not "Bearer"
    #[error("invalid authentication scheme")]
    InvalidScheme,

    /// Signature does not verify, or the payload is structurally invalid
    #[error("invalid authentication token")]
    InvalidToken,

    /// Signature valid but `exp` is at or before the current time
    #[error("expired token")]
    ExpiredToken,
}

impl AuthError {
    /// Stable identifier used in the JSON error body.
    fn error_type(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "invalid_credentials",
            AuthError::InvalidScheme => "invalid_scheme",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let error_type = self.error_type();
        let message = self.to_string();

        // Invalid signature could indicate an attack, so log at warn level
        // Expired and missing credentials are common and expected, log at debug
        match &self {
            AuthError::InvalidToken => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Token Issuance and Verification
// =============================================================================

/// Token issuer and verifier sharing a single symmetric secret.
///
/// Constructed once at start-up from configuration and injected wherever
/// tokens are minted or checked. Immutable for the process lifetime, safe to
/// clone and to use concurrently.
#[derive(Clone)]
pub struct TokenAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenAuth {
    /// Create an issuer/verifier from the shared secret.
    ///
    /// The secret should be at least 32 bytes for security. It is never
    /// logged.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a signed token.
    ///
    /// The expiry is resolved in order: `expires_at` verbatim if given,
    /// otherwise now + `ttl` if given, otherwise now + [`DEFAULT_TOKEN_TTL`].
    ///
    /// # Arguments
    ///
    /// * `extra` - Additional application claims (may be empty)
    /// * `expires_at` - Optional absolute expiry instant
    /// * `ttl` - Optional relative time-to-live
    pub fn issue(
        &self,
        extra: serde_json::Map<String, serde_json::Value>,
        expires_at: Option<SystemTime>,
        ttl: Option<Duration>,
    ) -> Result<String, AuthError> {
        let expires_at = match (expires_at, ttl) {
            (Some(instant), _) => instant,
            (None, Some(ttl)) => SystemTime::now() + ttl,
            (None, None) => SystemTime::now() + DEFAULT_TOKEN_TTL,
        };

        let claims = Claims {
            exp: unix_seconds(expires_at),
            extra,
        };

        jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Verify a token and return its decoded claims.
    ///
    /// Succeeds if and only if the signature verifies under the shared
    /// secret and `exp` is strictly in the future. A token whose `exp`
    /// equals the current second is already expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        // Expiry is checked manually below so that the boundary is exclusive
        // and expired tokens are reported distinctly from invalid ones.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.exp <= unix_seconds(SystemTime::now()) {
            return Err(AuthError::ExpiredToken);
        }

        Ok(data.claims)
    }
}

fn unix_seconds(instant: SystemTime) -> u64 {
    instant
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

// =============================================================================
// Bearer Extraction
// =============================================================================

/// Parse the credential out of an `Authorization` header value.
///
/// The header must split into exactly a scheme and a non-empty credential,
/// and the scheme must be the literal `Bearer`.
pub fn parse_bearer_header(value: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = value.ok_or(AuthError::MissingCredentials)?;
    let value = value
        .to_str()
        .map_err(|_| AuthError::MissingCredentials)?
        .trim();

    let (scheme, credential) = value
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;

    let credential = credential.trim();
    if credential.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    if scheme != BearerToken::SCHEME {
        return Err(AuthError::InvalidScheme);
    }

    Ok(credential)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware enforcing bearer authentication on protected routes.
///
/// Extracts the `Authorization` header, verifies the token, and either
/// forwards the request with a [`BearerToken`] in its extensions or rejects
/// it with a 401 before the handler runs.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware, routing::post};
/// use dials_rest::auth::{TokenAuth, bearer_auth_middleware};
///
/// let auth = TokenAuth::new("secret-key");
/// let app = Router::new()
///     .route("/find_spots", post(find_spots_handler))
///     .layer(middleware::from_fn_with_state(auth, bearer_auth_middleware));
/// ```
pub async fn bearer_auth_middleware(
    State(auth): State<TokenAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request.headers().get(AUTHORIZATION).cloned();
    let credential = parse_bearer_header(header.as_ref())?;

    let claims = auth.verify(credential)?;

    request.extensions_mut().insert(BearerToken {
        scheme: BearerToken::SCHEME,
        credential: credential.to_string(),
        expiry: claims.expiry(),
    });

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
