use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::data_source::{DataSource, SourceError, SourceFuture};
use crate::http_client::{
    HttpAuth, HttpClient, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};
use crate::{HistoryPoint, Ratings, Snapshot, Symbol, UtcDateTime};

/// Adapter for a JSON snapshot endpoint at `GET {base_url}/snapshot/{symbol}`.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    base_url: String,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    timeout: Duration,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, Arc::new(ReqwestHttpClient::default()))
    }

    pub fn with_http_client(base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http_client,
            auth: HttpAuth::None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Transport timeout; the sync layer applies its own request timeout on top.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, symbol: &Symbol) -> String {
        format!(
            "{}/snapshot/{}",
            self.base_url,
            urlencoding::encode(symbol.as_str())
        )
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<Snapshot, SourceError> {
        let request = HttpRequest::get(self.endpoint(symbol))
            .with_header("accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout(self.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| match e.kind() {
                HttpErrorKind::Timeout => SourceError::timeout(e.message()),
                HttpErrorKind::Connect => SourceError::network(e.message()),
                HttpErrorKind::Other => SourceError::other(e.message()),
            })?;

        check_status(&response)?;
        debug!(symbol = %symbol, bytes = response.body.len(), "snapshot payload received");
        parse_snapshot(symbol, &response.body)
    }
}

impl DataSource for HttpSnapshotSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a> {
        Box::pin(self.fetch_snapshot(symbol))
    }
}

fn check_status(response: &HttpResponse) -> Result<(), SourceError> {
    if response.is_success() {
        return Ok(());
    }

    match response.status {
        429 => {
            let retry_after = response
                .header("retry-after")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(SourceError::rate_limited(
                retry_after,
                "snapshot endpoint returned status 429",
            ))
        }
        400 | 404 | 422 => Err(SourceError::invalid_request(format!(
            "snapshot endpoint rejected the symbol with status {}",
            response.status
        ))),
        status => Err(SourceError::upstream(
            status,
            format!("snapshot endpoint returned status {status}"),
        )),
    }
}

/// Vendors disagree on whether numbers are quoted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(&self, field: &str) -> Result<f64, SourceError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text.trim().replace(',', "").parse().map_err(|_| {
                SourceError::malformed(format!("field `{field}` is not numeric: {text:?}"))
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPayload {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    price: Numeric,
    #[serde(default)]
    previous_close: Option<Numeric>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: Option<Numeric>,
    #[serde(default)]
    history: Vec<HistoryPayload>,
    #[serde(default)]
    ratings: Option<Ratings>,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryPayload {
    /// Unix seconds.
    ts: i64,
    close: Numeric,
}

fn parse_snapshot(symbol: &Symbol, body: &str) -> Result<Snapshot, SourceError> {
    let payload: SnapshotPayload = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("invalid response payload: {e}")))?;

    if let Some(reported) = payload.symbol.as_deref() {
        if !reported.trim().eq_ignore_ascii_case(symbol.as_str()) {
            return Err(SourceError::malformed(format!(
                "payload is for `{reported}`, requested `{symbol}`"
            )));
        }
    }

    let history = payload
        .history
        .iter()
        .map(|point| {
            let ts = UtcDateTime::from_unix_timestamp(point.ts)
                .map_err(|e| SourceError::malformed(e.to_string()))?;
            HistoryPoint::new(ts, point.close.value("history.close")?)
                .map_err(|e| SourceError::malformed(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder =
        Snapshot::builder(symbol.clone(), payload.price.value("price")?).history(history);
    if let Some(name) = payload.name {
        builder = builder.name(name);
    }
    if let Some(previous_close) = payload.previous_close {
        builder = builder.previous_close(previous_close.value("previousClose")?);
    }
    if let Some(currency) = payload.currency {
        builder = builder.currency(currency);
    }
    if let Some(market_cap) = payload.market_cap {
        builder = builder.market_cap(market_cap.value("marketCap")?);
    }
    if let Some(ratings) = payload.ratings {
        builder = builder.ratings(ratings);
    }

    builder
        .build()
        .map_err(|e| SourceError::malformed(e.to_string()))
}
