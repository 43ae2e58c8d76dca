//! Body and response plumbing between hyper's connection driver and the
//! dispatcher. Framing, keep-alive and half-close belong to hyper.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, SERVER};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use thiserror::Error;

pub const SERVER_NAME: &str = concat!("suggestd/", env!("CARGO_PKG_VERSION"));

pub type ResponseBody = Full<Bytes>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BodyReadError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Transport(BoxError),
}

/// Buffers a request body, refusing anything past `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyReadError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(BodyReadError::TooLarge { limit }),
        Err(err) => Err(BodyReadError::Transport(err)),
    }
}

pub fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_body_within_limit() {
        let body = read_body(Full::new(Bytes::from_static(b"{\"input\":\"cat\"}")), 64)
            .await
            .unwrap();
        assert_eq!(&body[..], b"{\"input\":\"cat\"}");
    }

    #[tokio::test]
    async fn refuses_oversized_body() {
        let err = read_body(Full::new(Bytes::from(vec![b'a'; 65])), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyReadError::TooLarge { limit: 64 }));
    }

    #[test]
    fn response_carries_type_and_server_headers() {
        let response = response(
            StatusCode::ACCEPTED,
            "application/json",
            Bytes::from_static(b"{}"),
        );
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[SERVER], SERVER_NAME);
    }
}
