//! Backend HTTP service.
//!
//! | Route | |
//! |-------|---|
//! | `GET /api/health` | liveness |
//! | `GET /api/vitals/latest?subject=ID` | live snapshot |
//! | `GET /api/history?limit=N&order=asc\|desc` | history window |
//! | `POST /api/ai/summary` | `{transcript, vitals}` to `{summary}` |
//! | `POST /api/prescriptions` | prescription JSON to a filled PDF |
//! | `POST /api/devices/webhook` | not implemented (501) |
//!
//! Errors are JSON `{"error": "..."}`. Every response carries CORS headers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_DISPOSITION, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::data::HistoryQuery;
use crate::document::{DocumentError, DocumentFiller, Prescription};
use crate::source::LiveReader;
use crate::summary::{SummaryRequest, Summarizer};

/// Largest request body accepted.
const MAX_BODY: usize = 1024 * 1024;

/// Upper bound on `limit` for history requests.
const MAX_HISTORY_LIMIT: usize = 1000;

/// Everything the routes need.
#[derive(Debug)]
pub struct AppState {
    pub reader: LiveReader,
    pub history: HistoryQuery,
    /// Window size when the request gives none.
    pub history_limit: usize,
    /// `None` when no API key is configured.
    pub summarizer: Option<Arc<dyn Summarizer>>,
    /// `None` when no template is available.
    pub documents: Option<Arc<dyn DocumentFiller>>,
    pub allow_origin: String,
}

/// Bind `listen` and serve until the accept loop fails.
pub async fn serve(listen: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = listen.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    serve_listener(listener, Arc::new(state)).await
}

/// Serve connections from an already bound listener.
pub async fn serve_listener(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle_request(req, &state).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %e, "HTTP connection error");
            }
        });
    }
}

/// Route a request.
pub async fn handle_request<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    debug!(method = %req.method(), path = %req.uri().path(), "Request");
    let query = req.uri().query().unwrap_or_default().to_string();

    let response = match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => empty(StatusCode::NO_CONTENT),
        (&Method::GET, "/api/health") => {
            json_response(StatusCode::OK, &json!({ "ok": true, "service": "backend" }))
        }
        (&Method::GET, "/api/vitals/latest") => {
            let subject = query_param(&query, "subject").unwrap_or_else(|| "default".to_string());
            json_response(StatusCode::OK, &state.reader.fetch_latest(&subject).await)
        }
        (&Method::GET, "/api/history") => history(&query, state).await,
        (&Method::POST, "/api/ai/summary") => summary(req, state).await,
        (&Method::POST, "/api/prescriptions") => prescription(req, state).await,
        (&Method::POST, "/api/devices/webhook") => {
            error(StatusCode::NOT_IMPLEMENTED, "Not implemented: device ingest")
        }
        _ => error(StatusCode::NOT_FOUND, "Not Found"),
    };

    with_cors(response, &state.allow_origin)
}

async fn history(query: &str, state: &AppState) -> Response<Full<Bytes>> {
    let limit = match query_param(query, "limit").map(|v| v.parse::<usize>()) {
        None => state.history_limit,
        Some(Ok(limit)) => limit.min(MAX_HISTORY_LIMIT),
        Some(Err(_)) => return error(StatusCode::BAD_REQUEST, "limit must be a whole number"),
    };
    let descending = match query_param(query, "order").as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(_) => return error(StatusCode::BAD_REQUEST, "order must be asc or desc"),
    };

    let window = state.history.recent(limit).await;
    if descending {
        json_response(StatusCode::OK, &window.descending().collect::<Vec<_>>())
    } else {
        json_response(StatusCode::OK, &window.ascending())
    }
}

async fn summary<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let Some(summarizer) = state.summarizer.as_ref() else {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "OPENAI_API_KEY not set");
    };

    let request: SummaryRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Unreadable summary request");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "AI summary failed");
        }
    };

    match summarizer.summarize(&request).await {
        Ok(summary) => json_response(StatusCode::OK, &json!({ "summary": summary })),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn prescription<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let Some(documents) = state.documents.as_ref() else {
        return error(
            StatusCode::NOT_IMPLEMENTED,
            "Not implemented: prescription PDF generation",
        );
    };

    let prescription: Prescription = match read_json(req).await {
        Ok(prescription) => prescription,
        Err(e) => return error(StatusCode::BAD_REQUEST, &format!("Invalid request body: {}", e)),
    };

    let fields = match prescription.form_fields() {
        Ok(fields) => fields,
        Err(e) => return error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match documents.fill(&fields) {
        Ok(pdf) => {
            let mut response = Response::new(Full::new(Bytes::from(pdf)));
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
            headers.insert(
                CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"prescription.pdf\""),
            );
            response
        }
        Err(e @ DocumentError::MissingField(_)) => error(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            warn!(error = %e, "Prescription fill failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn read_json<T, B>(req: Request<B>) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body = Limited::new(req.into_body(), MAX_BODY)
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("failed to read body: {}", e))?
        .to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

/// First value of `key` in a query string, percent-decoded.
fn query_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn with_cors(mut response: Response<Full<Bytes>>, origin: &str) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    let origin = HeaderValue::from_str(origin).unwrap_or(HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}
