//! Ordered lookup of a bearer credential across request locations.

use axum::http::{HeaderMap, header};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};

/// One place a token may be presented.
#[derive(Debug, Clone, Copy)]
pub enum CredentialSource<'a> {
    /// A named cookie
    Cookie(&'a str),
    /// `Authorization: Bearer <token>`
    BearerHeader,
    /// A value already pulled from elsewhere, e.g. a JSON body field
    Provided(Option<&'a str>),
}

/// Where the auth gate looks for an access token, in order.
pub const ACCESS_TOKEN_SOURCES: [CredentialSource<'static>; 2] = [
    CredentialSource::Cookie(ACCESS_COOKIE_NAME),
    CredentialSource::BearerHeader,
];

impl<'a> CredentialSource<'a> {
    fn extract(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = match *self {
            CredentialSource::Cookie(name) => get_cookie(headers, name),
            CredentialSource::BearerHeader => bearer_token(headers),
            CredentialSource::Provided(value) => value,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Return the first non-empty credential found, trying `sources` in order.
pub fn find_credential<'a>(
    headers: &'a HeaderMap,
    sources: &[CredentialSource<'a>],
) -> Option<&'a str> {
    sources.iter().find_map(|source| source.extract(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
