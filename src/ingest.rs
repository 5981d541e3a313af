use crate::analyzer::Visit;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store;
use axum::{body::Body, extract::State, http::StatusCode, routing::post, Router};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Deserialize;

/// Largest NDJSON batch accepted in one request.
pub const MAX_INGEST_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/visits", post(ingest_handler))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitEvent {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    user_agent: String,
}

async fn ingest_handler(State(state): State<AppState>, body: Body) -> ApiResult<StatusCode> {
    let count = ingest_stream(state, body).await.inspect_err(|err| {
        if !matches!(err, ApiError::Store(_)) {
            tracing::warn!(error = %err, "visit batch rejected");
        }
    })?;
    tracing::debug!(count, "visits ingested");
    Ok(StatusCode::ACCEPTED)
}

async fn ingest_stream(state: AppState, body: Body) -> ApiResult<usize> {
    let mut stream = Limited::new(body, MAX_INGEST_BYTES).into_data_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut visits = Vec::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(MAX_INGEST_BYTES)
            } else {
                ApiError::InvalidArgument(format!("unreadable body: {}", err))
            }
        })?;
        buffer.extend_from_slice(&bytes);
        let mut start = 0;
        while let Some(pos) = buffer[start..].iter().position(|b| *b == b'\n') {
            if let Some(visit) = parse_line(&buffer[start..start + pos])? {
                visits.push(visit);
            }
            start += pos + 1;
        }
        buffer.drain(..start);
    }
    if let Some(visit) = parse_line(&buffer)? {
        visits.push(visit);
    }

    if visits.is_empty() {
        return Ok(0);
    }
    Ok(state.store.insert_visits(visits).await?)
}

fn parse_line(line: &[u8]) -> ApiResult<Option<Visit>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let evt: VisitEvent = serde_json::from_slice(trimmed)
        .map_err(|err| ApiError::InvalidArgument(format!("malformed visit event: {}", err)))?;
    Ok(Some(event_to_visit(evt)))
}

fn event_to_visit(evt: VisitEvent) -> Visit {
    let ts = evt.timestamp.unwrap_or_else(Utc::now);
    Visit {
        created_at: store::timestamp(ts),
        path: evt.path,
        country: evt.country,
        ip: evt.ip,
        user_agent: evt.user_agent,
        device_type: String::new(),
        visitor: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AdminAuth;
    use crate::store::Store;
    use axum::http::{Method, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line(b"  \r\n").unwrap().is_none());
    }

    #[test]
    fn parses_camel_case_events() {
        let visit = parse_line(
            br#"{"timestamp":"2026-10-18T14:30:00+02:00","path":"/posts/a","country":"ng","userAgent":"curl/8"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(visit.created_at, "2026-10-18T12:30:00.000Z");
        assert_eq!(visit.path, "/posts/a");
        assert_eq!(visit.user_agent, "curl/8");
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(matches!(parse_line(b"{not json"), Err(ApiError::InvalidArgument(_))));
    }

    fn state() -> AppState {
        AppState {
            store: Arc::new(Store::open_in_memory().unwrap()),
            auth: Arc::new(AdminAuth::new(None)),
            max_page_size: 50,
        }
    }

    async fn post_visits(state: AppState, body: impl Into<Body>) -> StatusCode {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/visits")
            .body(body.into())
            .unwrap();
        router(state).oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn malformed_batch_is_a_bad_request() {
        let status = post_visits(state(), "{\"path\": \"/\"}\nnot json\n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = vec![b'\n'; MAX_INGEST_BYTES + 1];
        assert_eq!(post_visits(state(), body).await, StatusCode::PAYLOAD_TOO_LARGE);

        let body = vec![b'\n'; MAX_INGEST_BYTES];
        assert_eq!(post_visits(state(), body).await, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn store_failure_is_a_server_error() {
        let state = state();
        state
            .store
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE visits")?;
                Ok(())
            })
            .await
            .unwrap();
        let status = post_visits(state, r#"{"path":"/","country":"US"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
