use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use hyper::body::Body;
use suggest_core::{Suggestion, SuggestionStore, DEFAULT_LIMIT};
use tracing::{debug, error};

use crate::protocol::{BodyError, SuggestRequest, SuggestResponse};
use crate::transport::{self, read_body, BodyReadError, BoxError, ResponseBody};

/// Read side of the suggestion data as seen by request handling.
pub trait SuggestionLookup: Send + Sync {
    fn lookup(&self, input: &str, limit: usize) -> Vec<Suggestion>;
}

impl SuggestionLookup for SuggestionStore {
    fn lookup(&self, input: &str, limit: usize) -> Vec<Suggestion> {
        self.query(input, limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(SuggestResponse),
    BadRequest(String),
    ServerError(String),
}

impl Outcome {
    pub fn into_response(self) -> Response<ResponseBody> {
        let (status, content_type, body) = match self {
            Outcome::Success(payload) => match serde_json::to_vec(&payload) {
                Ok(body) => (StatusCode::ACCEPTED, "application/json", Bytes::from(body)),
                Err(err) => {
                    error!("failed to encode suggestions: {err}");
                    return Outcome::ServerError(err.to_string()).into_response();
                }
            },
            Outcome::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "text/plain; charset=utf-8",
                error_body(&message),
            ),
            Outcome::ServerError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                error_body(&message),
            ),
        };
        transport::response(status, content_type, body)
    }
}

fn error_body(message: &str) -> Bytes {
    Bytes::from(format!("An error occurred: '{message}'"))
}

/// Maps `(method, target, body)` on the single lookup route to an [`Outcome`].
pub struct Dispatcher {
    lookup: Arc<dyn SuggestionLookup>,
    route: String,
    limit: usize,
}

impl Dispatcher {
    pub fn new(lookup: Arc<dyn SuggestionLookup>, route: impl Into<String>) -> Self {
        Self {
            lookup,
            route: route.into(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Request handler for one exchange. Fails only when the body cannot be
    /// read off the connection, which ends the connection.
    pub async fn serve<B>(
        &self,
        request: Request<B>,
        max_body_bytes: usize,
    ) -> Result<Response<ResponseBody>, BodyReadError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|path| path.as_str())
            .unwrap_or("/");
        let outcome = match read_body(body, max_body_bytes).await {
            Ok(body) => self.dispatch(&parts.method, target, &body),
            Err(BodyReadError::TooLarge { limit }) => {
                debug!(path = %target, limit, "request body too large");
                Outcome::BadRequest("Request body too large".to_string())
            }
            Err(err) => return Err(err),
        };
        Ok(outcome.into_response())
    }

    /// Always yields an outcome; a panic while routing becomes `ServerError`.
    pub fn dispatch(&self, method: &Method, target: &str, body: &[u8]) -> Outcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.route(method, target, body))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%method, path = %target, "internal fault while dispatching: {message}");
                Outcome::ServerError(message)
            }
        }
    }

    fn route(&self, method: &Method, target: &str, body: &[u8]) -> Outcome {
        if target != self.route {
            debug!(path = %target, "illegal request");
            return Outcome::BadRequest("Illegal request".to_string());
        }
        if method != Method::POST {
            debug!(%method, "unknown method");
            return Outcome::BadRequest("Unknown HTTP-method".to_string());
        }

        let request = match SuggestRequest::parse(body) {
            Ok(request) => request,
            Err(BodyError::InvalidJson(reason)) => {
                debug!("body reading error: {reason}");
                return Outcome::BadRequest("Wrong body type".to_string());
            }
            Err(BodyError::InputNotString) => {
                debug!("body reading error: input is not a string");
                return Outcome::BadRequest("Wrong body type".to_string());
            }
        };

        let Some(input) = request.input else {
            return Outcome::Success(SuggestResponse::default());
        };
        debug!(input = %input, "lookup");
        Outcome::Success(SuggestResponse {
            suggestions: self.lookup.lookup(&input, self.limit),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown internal error".to_string()
    }
}
