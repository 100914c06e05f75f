//! Custom Axum extractors.
//!
//! - [`TenantHeaders`]: the tenant every realm request must carry
//! - [`Filters`]: JSON:API `filter[field]=value` query parameters
//!
//! # Examples
//!
//! ```ignore
//! async fn list_reactors(
//!     TenantHeaders(tenant): TenantHeaders,
//!     filters: Filters,
//!     Path(field): Path<FieldPath>,
//!     State(state): State<AppState>,
//! ) -> Result<JsonApi<Collection<ReactorResource>>, AppError> {
//!     let name = filters.get("name");
//!     ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{HeaderMap, request::Parts},
};
use realm_core::Tenant;
use realm_core::tenant::{MAJOR_VERSION_HEADER, MINOR_VERSION_HEADER, REGION_HEADER, TENANT_ID_HEADER};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use uuid::Uuid;

/// Tenant read from the `TENANT_ID`, `REGION`, `MAJOR_VERSION` and
/// `MINOR_VERSION` headers.
///
/// A missing or malformed header rejects the request with 400.
#[derive(Debug, Clone)]
pub struct TenantHeaders(pub Tenant);

#[async_trait]
impl<S> FromRequestParts<S> for TenantHeaders
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        tenant_from_headers(&parts.headers).map(Self)
    }
}

/// Parse the tenant headers.
///
/// # Errors
///
/// Returns a 400 [`AppError`] naming the first missing or malformed header.
pub fn tenant_from_headers(headers: &HeaderMap) -> Result<Tenant, AppError> {
    let id: Uuid = parse_header(headers, TENANT_ID_HEADER)?;
    let region = header_str(headers, REGION_HEADER)?.to_string();
    let major: u16 = parse_header(headers, MAJOR_VERSION_HEADER)?;
    let minor: u16 = parse_header(headers, MINOR_VERSION_HEADER)?;
    Ok(Tenant::new(id, region, major, minor))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("missing {name} header")))
}

fn parse_header<T: FromStr>(headers: &HeaderMap, name: &str) -> Result<T, AppError> {
    header_str(headers, name)?
        .parse()
        .map_err(|_| AppError::bad_request(format!("malformed {name} header")))
}

/// `filter[field]=value` pairs from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(pub BTreeMap<String, String>);

impl Filters {
    /// Raw value of one filter.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Parsed value of one filter.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`AppError`] if the value does not parse.
    pub fn parse<T: FromStr>(&self, field: &str) -> Result<Option<T>, AppError> {
        self.get(field)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| AppError::bad_request(format!("malformed filter[{field}]")))
            })
            .transpose()
    }

    /// Whether no filter was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Filters
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::bad_request(e.to_string()))?;
        Ok(Self(
            params
                .into_iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix("filter[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .map(|field| (field.to_string(), value))
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn reads_all_four_headers() {
        let map = headers(&[
            (TENANT_ID_HEADER, "00000000-0000-4000-8000-000000000001"),
            (REGION_HEADER, "GMS"),
            (MAJOR_VERSION_HEADER, "83"),
            (MINOR_VERSION_HEADER, "1"),
        ]);
        let tenant = tenant_from_headers(&map).map_err(|e| e.to_string());
        assert_eq!(tenant, Ok(realm_testing::test_tenant()));
    }

    #[test]
    fn missing_region_is_rejected() {
        let map = headers(&[
            (TENANT_ID_HEADER, "00000000-0000-4000-8000-000000000001"),
            (MAJOR_VERSION_HEADER, "83"),
            (MINOR_VERSION_HEADER, "1"),
        ]);
        let err = tenant_from_headers(&map).err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("[BAD_REQUEST] missing REGION header"));
    }

    #[test]
    fn malformed_version_is_rejected() {
        let map = headers(&[
            (TENANT_ID_HEADER, "00000000-0000-4000-8000-000000000001"),
            (REGION_HEADER, "GMS"),
            (MAJOR_VERSION_HEADER, "eighty-three"),
            (MINOR_VERSION_HEADER, "1"),
        ]);
        assert!(tenant_from_headers(&map).is_err());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)]
    async fn filters_keep_only_bracketed_keys() {
        let request = Request::builder()
            .uri("/transports/routes?filter%5BstartMapId%5D=101000300&page=2&filter%5Bname%5D=Orbis")
            .body(())
            .expect("request");
        let (mut parts, ()) = request.into_parts();
        let filters = Filters::from_request_parts(&mut parts, &())
            .await
            .expect("filters");

        assert_eq!(filters.get("name"), Some("Orbis"));
        assert_eq!(filters.parse::<u32>("startMapId").ok().flatten(), Some(101_000_300));
        assert_eq!(filters.get("page"), None);
        assert!(filters.parse::<u32>("name").is_err());
    }
}
