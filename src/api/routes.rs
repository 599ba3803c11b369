//! Transaction Routes
//!
//! Maps HTTP requests onto store operations and store results onto status
//! codes and JSON bodies.
//!
//! | Route | Store operation |
//! |---|---|
//! | `POST /transactions` | `create` |
//! | `GET /transactions?page&size` | `list` |
//! | `GET /transactions/{id}` | `get` |
//! | `PUT /transactions/{id}` | `modify` |
//! | `DELETE /transactions/{id}` | `delete` |

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::{Transaction, TransactionInput};
use crate::store::{check_page_size, TransactionStore, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};

/// Collection path
pub const TRANSACTIONS_PATH: &str = "/transactions";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Resolved route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/transactions`
    Collection,
    /// `/transactions/{id}`, id percent-decoded
    Item(String),
    /// Anything else
    NotFound,
}

impl Route {
    /// Resolve a request path
    pub fn resolve(path: &str) -> Result<Self> {
        let rest = match path.strip_prefix(TRANSACTIONS_PATH) {
            Some(rest) => rest,
            None => return Ok(Route::NotFound),
        };

        match rest {
            "" | "/" => Ok(Route::Collection),
            _ => {
                let raw = match rest.strip_prefix('/') {
                    Some(raw) if !raw.contains('/') => raw,
                    _ => return Ok(Route::NotFound),
                };
                let id = urlencoding::decode(raw)
                    .map_err(|e| Error::InvalidRequest(format!("invalid path id: {}", e)))?;
                Ok(Route::Item(id.into_owned()))
            }
        }
    }
}

/// Page query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// Zero-based page index
    pub page: usize,
    /// Records per page
    pub size: usize,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageQuery {
    /// Parse `page` and `size` out of a query string. Other keys are ignored.
    pub fn parse(query: Option<&str>) -> Result<Self> {
        let mut parsed = Self::default();
        let query = match query {
            Some(q) => q,
            None => return Ok(parsed),
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map_err(|e| Error::InvalidRequest(format!("invalid query value: {}", e)))?;
            match key {
                "page" => parsed.page = parse_number("page", &value)?,
                "size" => parsed.size = parse_number("size", &value)?,
                _ => {}
            }
        }

        check_page_size(parsed.size)?;
        Ok(parsed)
    }
}

fn parse_number(name: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        Error::InvalidRequest(format!(
            "query parameter '{}' must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Handle one request against the store
pub async fn handle<B>(store: Arc<TransactionStore>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match dispatch(&store, req).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    debug!(%method, %path, status = response.status().as_u16(), "handled request");
    response
}

async fn dispatch<B>(store: &TransactionStore, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let route = Route::resolve(req.uri().path())?;

    match (route, req.method().clone()) {
        (Route::Collection, Method::POST) => {
            let input: TransactionInput = read_json(req).await?;
            let created = store.create(input).await?;
            Ok(json_response(StatusCode::OK, &created))
        }
        (Route::Collection, Method::GET) => {
            let query = PageQuery::parse(req.uri().query())?;
            let page = store.list(query.page, query.size).await?;
            Ok(json_response(StatusCode::OK, &page))
        }
        (Route::Item(id), Method::GET) => found_or_404(store.get(&id).await?, &id),
        (Route::Item(id), Method::PUT) => {
            let patch: TransactionInput = read_json(req).await?;
            found_or_404(store.modify(&id, patch).await?, &id)
        }
        (Route::Item(id), Method::DELETE) => found_or_404(store.delete(&id).await?, &id),
        (Route::Collection, _) => Ok(method_not_allowed("GET, POST")),
        (Route::Item(_), _) => Ok(method_not_allowed("GET, PUT, DELETE")),
        (Route::NotFound, _) => Ok(not_found("no such route".to_string())),
    }
}

fn found_or_404(record: Option<Transaction>, id: &str) -> Result<Response<Full<Bytes>>> {
    Ok(match record {
        Some(record) => json_response(StatusCode::OK, &record),
        None => not_found(format!("Transaction not found: {}", id)),
    })
}

async fn read_json<B, T>(req: Request<B>) -> Result<T>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: serde::de::DeserializeOwned,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| Error::InvalidRequest(format!("failed to read body: {}", e)))?
        .to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => with_json_type(status, Bytes::from(body)),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            with_json_type(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"internal","message":"serialization failed"}"#),
            )
        }
    }
}

fn with_json_type(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Map a store error to its JSON error response
pub fn error_response(e: &Error) -> Response<Full<Bytes>> {
    let mut response = json_response(
        e.status_code(),
        &ErrorBody {
            error: e.kind(),
            message: e.to_string(),
        },
    );
    if e.is_retryable() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("1"));
    }
    response
}

fn not_found(message: String) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            error: "not_found",
            message,
        },
    )
}

fn method_not_allowed(allow: &'static str) -> Response<Full<Bytes>> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorBody {
            error: "method_not_allowed",
            message: format!("allowed methods: {}", allow),
        },
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_route_resolution() {
        assert_eq!(Route::resolve("/transactions").unwrap(), Route::Collection);
        assert_eq!(Route::resolve("/transactions/").unwrap(), Route::Collection);
        assert_eq!(
            Route::resolve("/transactions/abc-1").unwrap(),
            Route::Item("abc-1".to_string())
        );
        assert_eq!(
            Route::resolve("/transactions/a%20b").unwrap(),
            Route::Item("a b".to_string())
        );
        assert_eq!(Route::resolve("/transactions/a/b").unwrap(), Route::NotFound);
        assert_eq!(Route::resolve("/transactionsx").unwrap(), Route::NotFound);
        assert_eq!(Route::resolve("/").unwrap(), Route::NotFound);
    }

    #[test]
    fn test_page_query_defaults() {
        assert_eq!(PageQuery::parse(None).unwrap(), PageQuery::default());
        assert_eq!(
            PageQuery::parse(Some("")).unwrap(),
            PageQuery { page: 0, size: 10 }
        );
    }

    #[test]
    fn test_page_query_parse() {
        assert_eq!(
            PageQuery::parse(Some("page=2&size=25&sort=id")).unwrap(),
            PageQuery { page: 2, size: 25 }
        );
        assert_eq!(
            PageQuery::parse(Some("size=5")).unwrap(),
            PageQuery { page: 0, size: 5 }
        );
    }

    #[test]
    fn test_page_query_rejects_bad_values() {
        assert_matches!(
            PageQuery::parse(Some("page=-1")),
            Err(Error::InvalidRequest(_))
        );
        assert_matches!(
            PageQuery::parse(Some("size=abc")),
            Err(Error::InvalidRequest(_))
        );
        assert_matches!(PageQuery::parse(Some("size=0")), Err(Error::Validation(_)));
    }

    #[test]
    fn test_error_response_overloaded_sets_retry_after() {
        let err = Error::Overloaded {
            reason: crate::error::OverloadReason::Timeout,
            waited: std::time::Duration::from_millis(1000),
        };
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[RETRY_AFTER], "1");
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let response = method_not_allowed("GET, POST");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST");
    }
}
