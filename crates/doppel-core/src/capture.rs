//! Capture engine: resolves `(store, key, value)` triples from a resolved
//! resource's `CaptureConfig` entries and writes them via the
//! [`StoreFactory`]. Phase-gated (`request_received` vs `response_sent`);
//! source-evaluation failures are absorbed and logged, never fail the
//! request.

use serde_json::Value;

use crate::config::{CaptureConfig, CapturePhase, CaptureSource};
use crate::exchange::RequestView;
use crate::store::{save_to_store, StoreFactory};

const DEFAULT_STORE_NAME: &str = "default";

/// Run every enabled capture on `resource_captures` whose phase matches
/// `phase`, in declaration order, so that duplicate `(store, key)` targets
/// resolve last-write-wins.
pub async fn run_captures(
    captures: &[CaptureConfig],
    phase: CapturePhase,
    request: &RequestView,
    factory: &dyn StoreFactory,
) {
    for capture in captures {
        if !capture.enabled || capture.phase != phase {
            continue;
        }

        let key = match resolve_source(capture.key.as_ref().unwrap_or(&CaptureSource::Constant {
            value: Value::String(capture.name.clone()),
        }), request) {
            Ok(Some(value)) => value_to_key(&value),
            Ok(None) => capture.name.clone(),
            Err(message) => {
                tracing::warn!(capture = %capture.name, message, "capture key resolution failed, skipping");
                continue;
            }
        };

        let store_name = match capture.store.as_ref() {
            None => DEFAULT_STORE_NAME.to_string(),
            Some(source) => match resolve_source(source, request) {
                Ok(Some(value)) => value_to_key(&value),
                Ok(None) => DEFAULT_STORE_NAME.to_string(),
                Err(message) => {
                    tracing::warn!(capture = %capture.name, message, "capture store-name resolution failed, skipping");
                    continue;
                }
            },
        };

        let value = match resolve_source(&capture.source, request) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(message) => {
                tracing::warn!(capture = %capture.name, key, message, "capture value resolution failed, skipping");
                continue;
            }
        };

        if let Err(error) = save_to_store(factory, &store_name, &key, value).await {
            tracing::warn!(capture = %capture.name, key, store = %store_name, %error, "capture save failed");
        }
    }
}

fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_source(source: &CaptureSource, request: &RequestView) -> Result<Option<Value>, String> {
    match source {
        CaptureSource::PathParam { name } => {
            Ok(request.path_params.get(name).map(|v| Value::String(v.clone())))
        }
        CaptureSource::QueryParam { name } => {
            Ok(request.query.get(name).map(|v| Value::String(v.to_string())))
        }
        CaptureSource::Header { name } => {
            Ok(request.headers.get(name).map(|v| Value::String(v.to_string())))
        }
        CaptureSource::JsonPath { expr } => {
            let body = request.body_as_string();
            let parsed: Value = serde_json::from_str(&body)
                .map_err(|err| format!("body is not valid JSON: {err}"))?;
            let selector = jsonpath::Selector::new(expr)
                .map_err(|err| format!("invalid JSONPath '{expr}': {err}"))?;
            Ok(selector.find(&parsed).next().cloned())
        }
        CaptureSource::Expression { expr } => Ok(Some(Value::String(expand_expression(expr, request)))),
        CaptureSource::Constant { value } => Ok(Some(value.clone())),
    }
}

/// A small placeholder-expansion grammar: `${request.path}`,
/// `${request.method}` are substituted; anything else is left verbatim.
/// This is intentionally minimal — the spec describes "an expression
/// string" without a grammar, so only the placeholders the script DSL's
/// `context` object exposes are supported.
fn expand_expression(expr: &str, request: &RequestView) -> String {
    expr.replace("${request.path}", &request.path).replace("${request.method}", &request.method)
}
