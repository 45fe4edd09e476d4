//! Request fan-out and fan-in.
//!
//! The [`Dispatcher`] validates a caller's target list before any
//! network call is made, builds one envelope per target, and spawns one
//! executor task per envelope. Every task reports over a shared channel
//! and the dispatcher waits for exactly as many reports as it spawned
//! tasks. There is no deadline on that wait: a target that never
//! answers holds the whole call unless the executor carries a timeout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::envelope::{
    apply_host_override, build_proxy_request, ProxyRequest, ProxyRequestInfo, ProxyResponse,
};
use super::executor::Executor;
use super::headers;
use crate::directory::EndpointDirectory;
use crate::error::RelayError;

/// Completed envelopes keyed by result key.
pub type ResultMap = HashMap<String, ProxyResponse>;

/// The inbound request as handed over by the HTTP layer. `uri` is the
/// path and query to replay, already stripped of the gateway's prefix.
pub struct InboundRequest<'a> {
    pub user_id: Option<&'a str>,
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub body: &'a Bytes,
}

/// Outcome of one fan-out: the keys the caller asked for, in request
/// order, and whatever the executors reported.
#[derive(Debug)]
pub struct Dispatch {
    pub passthrough: bool,
    pub keys: Vec<String>,
    pub results: ResultMap,
}

#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<dyn EndpointDirectory>,
    executor: Executor,
}

impl Dispatcher {
    #[must_use]
    pub fn new(directory: Arc<dyn EndpointDirectory>, executor: Executor) -> Self {
        Self {
            directory,
            executor,
        }
    }

    fn validate_targets(&self, targets: &[String]) -> Result<(), RelayError> {
        for id in targets {
            self.directory.endpoint(id)?;
        }
        Ok(())
    }

    /// Replay one inbound request against every endpoint in its target list.
    pub async fn proxy_request(&self, inbound: InboundRequest<'_>) -> Result<Dispatch, RelayError> {
        let targets = headers::parse_target_list(inbound.headers)?;
        self.validate_targets(&targets)?;

        let passthrough = headers::is_passthrough(inbound.headers);
        if passthrough && targets.len() > 1 {
            return Err(RelayError::MultiTargetPassthrough {
                count: targets.len(),
            });
        }

        let user_id = inbound.user_id.ok_or(RelayError::CorruptedSession)?;

        let envelope_headers = headers::envelope_headers(inbound.headers);
        let host_override = headers::api_host_override(inbound.headers);

        let mut requests = Vec::with_capacity(targets.len());
        for target in &targets {
            let mut request = build_proxy_request(
                &*self.directory,
                target,
                user_id,
                inbound.method,
                inbound.uri,
                inbound.body,
                &envelope_headers,
            )?;
            if let Some(label) = host_override {
                apply_host_override(&mut request.url, label);
            }
            requests.push(request);
        }

        tracing::info!(
            user = %user_id,
            targets = targets.len(),
            passthrough,
            "dispatching request"
        );

        let results = self.fan_out(requests).await;
        Ok(Dispatch {
            passthrough,
            keys: targets,
            results,
        })
    }

    /// Run a list of pre-built request descriptors. Results are keyed by
    /// each descriptor's result key, so one endpoint may appear several
    /// times under different keys.
    pub async fn proxy_batch(&self, infos: Vec<ProxyRequestInfo>) -> Result<Dispatch, RelayError> {
        if infos.is_empty() {
            return Err(RelayError::InvalidBatch("no requests given".into()));
        }

        let mut seen = HashSet::with_capacity(infos.len());
        let mut keys = Vec::with_capacity(infos.len());
        let mut requests = Vec::with_capacity(infos.len());

        for info in infos {
            if !seen.insert(info.result_key.clone()) {
                return Err(RelayError::DuplicateResultKey(info.result_key));
            }
            let mut request = build_proxy_request(
                &*self.directory,
                &info.endpoint_id,
                &info.user_id,
                &info.method,
                &info.uri,
                &info.body,
                &headers::envelope_headers(&info.headers),
            )?;
            request.result_key = Some(info.result_key.clone());
            keys.push(info.result_key);
            requests.push(request);
        }

        tracing::info!(requests = requests.len(), "dispatching batch");

        let results = self.fan_out(requests).await;
        Ok(Dispatch {
            passthrough: false,
            keys,
            results,
        })
    }

    /// Spawn one executor per request and wait for all of them.
    pub async fn fan_out(&self, requests: Vec<ProxyRequest>) -> ResultMap {
        let expected = requests.len();
        let (done_tx, mut done_rx) = mpsc::channel::<ProxyResponse>(expected.max(1));

        for request in requests {
            let done = done_tx.clone();
            let executor = self.executor.clone();
            tokio::spawn(
                async move {
                    let response = executor.execute(request).await;
                    let _ = done.send(response).await;
                }
                .instrument(tracing::Span::current()),
            );
        }
        drop(done_tx);

        let mut results = HashMap::with_capacity(expected);
        for _ in 0..expected {
            let Some(response) = done_rx.recv().await else {
                // Every sender is gone: a task died before reporting.
                tracing::error!(
                    expected,
                    received = results.len(),
                    "executor exited without reporting"
                );
                break;
            };
            log_completion(&response);
            results.insert(response.request.result_key().to_string(), response);
        }
        results
    }
}

#[allow(clippy::cast_possible_truncation)]
fn log_completion(response: &ProxyResponse) {
    let latency_ms = response.latency.as_millis() as u64;
    let request = &response.request;
    if let Some(ref err) = response.error {
        tracing::warn!(
            endpoint = %request.endpoint_id,
            key = request.result_key(),
            url = %request.url,
            error = %err,
            latency_ms,
            "target failed"
        );
    } else {
        tracing::info!(
            endpoint = %request.endpoint_id,
            key = request.result_key(),
            status = response.status.map_or(0, |s| s.as_u16()),
            latency_ms,
            "target responded"
        );
    }
}
