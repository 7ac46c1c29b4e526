//! Configuration data model: the types the loader is expected to hand the
//! core, already parsed and validated. `doppel-core` never reads files
//! directly for these — see `doppel-http::config_loader` for the concrete
//! directory-scanning implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// HTTP method a resource matches. `None` on [`ResourceConfig::method`] means
/// "any method".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// Parse a method name case-insensitively, as received off the wire.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

/// A single segment of a compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal segment that must match exactly.
    Literal(String),
    /// A `{name}` placeholder matching exactly one non-empty, non-slash
    /// segment.
    Param(String),
}

/// A path template compiled once at config-load time from a raw string like
/// `/users/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PathTemplate {
    /// Compile a raw path template. Segments delimited by `{` and `}` become
    /// [`PathSegment::Param`]; anything else is literal. A trailing slash
    /// produces a trailing empty literal segment, so `/foo/` and `/foo` are
    /// distinct templates per spec.
    pub fn compile(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                    PathSegment::Param(segment[1..segment.len() - 1].to_string())
                } else {
                    PathSegment::Literal(segment.to_string())
                }
            })
            .collect();
        Self { raw: raw.to_string(), segments }
    }

    /// The original template string, for diagnostics.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Attempt to match `path` against this template, returning the bound
    /// path parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = path.split('/').collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (template_segment, path_segment) in self.segments.iter().zip(path_segments.iter()) {
            match template_segment {
                PathSegment::Literal(literal) => {
                    if literal != path_segment {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    if path_segment.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), (*path_segment).to_string());
                }
            }
        }
        Some(params)
    }

    /// Specificity contribution from this template's segments: +10 per
    /// literal segment, +5 per path-parameter segment, per spec.md §4.1.
    pub fn specificity_score(&self) -> i32 {
        self.segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Literal(_) => 10,
                PathSegment::Param(_) => 5,
            })
            .sum()
    }
}

/// A request-body matcher attached to a [`ResourceConfig`]. At most one may
/// be configured per resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    /// Exact string equality against the decoded body.
    Literal {
        /// Expected body string.
        value: String,
    },
    /// JSONPath expression; qualifies if it returns a non-empty result.
    JsonPath {
        /// JSONPath expression.
        expr: String,
    },
    /// XPath expression; qualifies if it returns a non-empty node set.
    XPath {
        /// XPath expression.
        expr: String,
    },
    /// Regex match against the decoded body.
    Regex {
        /// Regex pattern.
        pattern: String,
    },
}

/// The source a capture reads its value from. Also used, unnested, for a
/// capture's `key`/`store` sub-configuration — [`CaptureConfig`] does not
/// allow a `CaptureSource` to itself carry a nested capture, so cycles are
/// unrepresentable by construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum CaptureSource {
    /// A matched path parameter, by name.
    PathParam {
        /// Path parameter name.
        name: String,
    },
    /// A query parameter, by name.
    QueryParam {
        /// Query parameter name.
        name: String,
    },
    /// A request header, by name (case-insensitive).
    Header {
        /// Header name.
        name: String,
    },
    /// A JSONPath expression over the decoded request body. The first
    /// matched value is used.
    JsonPath {
        /// JSONPath expression.
        expr: String,
    },
    /// An expression string evaluated against a small set of well-known
    /// placeholders (`${request.path}`, `${request.method}`, literal text).
    Expression {
        /// Expression template.
        expr: String,
    },
    /// A fixed value, independent of the request.
    Constant {
        /// The constant value.
        value: serde_json::Value,
    },
}

/// When a capture runs relative to the response lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    /// Runs after resource resolution, before the response body is
    /// rendered.
    RequestReceived,
    /// Runs after the response body has been successfully flushed. Skipped
    /// entirely if transmission fails.
    ResponseSent,
}

impl Default for CapturePhase {
    fn default() -> Self {
        Self::RequestReceived
    }
}

/// One named value extraction from a request into a store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// The capture's name, used as a default key when `key` is unset.
    pub name: String,
    /// Where the value comes from.
    pub source: CaptureSource,
    /// Store key to write to. When unset, falls back to `name`. Declared as
    /// a nested [`CaptureSource`] so the key itself can be derived from the
    /// request.
    #[serde(default)]
    pub key: Option<CaptureSource>,
    /// Store name to write to. When unset, falls back to `"default"`.
    #[serde(default)]
    pub store: Option<CaptureSource>,
    /// Whether this capture is active. Disabled captures are skipped
    /// entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When this capture runs.
    #[serde(default)]
    pub phase: CapturePhase,
}

fn default_true() -> bool {
    true
}

/// Latency-simulation configuration for a response, per spec.md §4.5.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PerformanceConfig {
    /// Exact delay to apply, in milliseconds. Takes precedence over the
    /// min/max range when greater than zero.
    #[serde(default)]
    pub exact_delay_ms: Option<u64>,
    /// Minimum of a uniform random delay range, in milliseconds.
    #[serde(default)]
    pub min_delay_ms: Option<u64>,
    /// Maximum of a uniform random delay range, in milliseconds. The
    /// spec's random pick treats this bound as **exclusive** — see
    /// DESIGN.md for the rationale this implementation preserves that,
    /// flagged, rather than silently changing it.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

/// The configured response for a resource, or a plugin's root fallback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseConfig {
    /// HTTP status code. Defaults to 200.
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response file path, relative to the owning plugin's directory.
    #[serde(default)]
    pub file: Option<String>,
    /// Inline response body.
    #[serde(default)]
    pub data: Option<String>,
    /// OpenAPI example name (only meaningful to an OpenAPI-aware plugin;
    /// the REST plugin ignores it).
    #[serde(default)]
    pub example_name: Option<String>,
    /// Response headers to copy onto the exchange.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Script file path, relative to the plugin directory. When set, the
    /// scripted response service computes the behaviour instead of copying
    /// this config directly.
    #[serde(default)]
    pub script_file: Option<String>,
    /// Whether the body should be passed through the template transformer
    /// chain before transmission.
    #[serde(default)]
    pub is_template: bool,
    /// Latency simulation for this response.
    #[serde(default)]
    pub performance: Option<PerformanceConfig>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            file: None,
            data: None,
            example_name: None,
            headers: HashMap::new(),
            script_file: None,
            is_template: false,
            performance: None,
        }
    }
}

/// One matchable endpoint within a plugin's configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    /// Stable identifier used in diagnostics (dedup'd matcher-error
    /// logging, debug output). Supplements spec.md: without *some*
    /// identifier there is nothing to key "logged once per resource id" on.
    /// Defaults to the declaration index, formatted, if left unset.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether this resource participates in matching at all. Lets
    /// operators stage a resource without deleting it.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP method to match. `None` matches any method.
    #[serde(default)]
    pub method: Option<HttpMethod>,
    /// Path template, compiled once at load time by the loader.
    pub path: PathTemplateConfig,
    /// Required query parameters: name -> exact value.
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    /// Required headers: name -> value, matched case-insensitively.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Optional request-body matcher.
    #[serde(default)]
    pub body_matcher: Option<BodyMatcher>,
    /// The response to emit when this resource is selected.
    #[serde(default)]
    pub response: ResponseConfig,
    /// Value captures to run when this resource is selected.
    #[serde(default)]
    pub captures: Vec<CaptureConfig>,
}

/// Wrapper so `path` can be deserialised from a plain string while the
/// loader still gets to compile it once.
#[derive(Debug, Clone)]
pub struct PathTemplateConfig(pub PathTemplate);

impl<'de> Deserialize<'de> for PathTemplateConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self(PathTemplate::compile(&raw)))
    }
}

impl Serialize for PathTemplateConfig {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.raw())
    }
}

/// A tree parsed from one plugin configuration document.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Name of the plugin this configuration targets (e.g. `"rest"`).
    pub plugin_name: String,
    /// Directory the configuration document lives in, used to resolve
    /// relative response-file and script-file paths.
    pub parent_dir: PathBuf,
    /// Default content type applied when a response doesn't set one and
    /// none can be inferred from a file extension.
    pub default_content_type: Option<String>,
    /// Root response, used as a 404-avoiding fallback and, when
    /// `defaults_from_root_response` is set, as a source of defaults for
    /// every resource's response.
    pub root_response: Option<ResponseConfig>,
    /// When set, unset fields on every resource's computed behaviour are
    /// overlaid from `root_response`.
    pub defaults_from_root_response: bool,
    /// The plugin's resources, in declaration order (order matters for
    /// matcher tie-breaks).
    pub resources: Vec<ResourceConfig>,
}

/// Feature toggles parsed once at startup from `DOPPEL_FEATURES`
/// (csv `name=bool`), per Design Notes §9: replace the process-wide
/// env-initialised flag with an explicit struct, with a parser that reads
/// the env var for backward compatibility.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    /// Enables the `stores` global in the script DSL.
    pub stores: bool,
    /// Enables the metrics module's gauges/timers.
    pub metrics: bool,
}

impl FeatureFlags {
    /// Parse `DOPPEL_FEATURES=stores=true,metrics=false` into a
    /// [`FeatureFlags`]. Unknown keys are ignored; malformed entries are
    /// skipped rather than failing startup.
    pub fn from_env() -> Self {
        let raw = std::env::var("DOPPEL_FEATURES").unwrap_or_default();
        Self::parse(&raw)
    }

    /// Parse a `DOPPEL_FEATURES`-shaped string directly, for testing.
    pub fn parse(raw: &str) -> Self {
        let mut flags = Self::default();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((key, value)) = entry.split_once('=') else {
                continue;
            };
            let enabled = value.trim().eq_ignore_ascii_case("true");
            match key.trim() {
                "stores" => flags.stores = enabled,
                "metrics" => flags.metrics = enabled,
                _ => {}
            }
        }
        flags
    }
}

/// Response-file cache capacity, from `DOPPEL_RESPONSE_FILE_CACHE_ENTRIES`
/// (default 20), per spec.md §6.
pub fn response_file_cache_capacity() -> usize {
    std::env::var("DOPPEL_RESPONSE_FILE_CACHE_ENTRIES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_template_literal_vs_param() {
        let template = PathTemplate::compile("/users/{id}");
        let params = template.matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
        assert!(template.matches("/users").is_none());
        assert!(template.matches("/users/").is_none());
    }

    #[test]
    fn trailing_slash_is_distinct() {
        let with_slash = PathTemplate::compile("/foo/");
        let without_slash = PathTemplate::compile("/foo");
        assert!(with_slash.matches("/foo").is_none());
        assert!(without_slash.matches("/foo/").is_none());
        assert!(with_slash.matches("/foo/").is_some());
        assert!(without_slash.matches("/foo").is_some());
    }

    #[test]
    fn param_segment_must_be_non_empty() {
        let template = PathTemplate::compile("/users/{id}/posts");
        assert!(template.matches("/users//posts").is_none());
    }

    #[test]
    fn specificity_score_counts_literals_and_params() {
        // Leading "/" produces an empty literal segment, then "users"
        // (literal) and "{id}" (param): 10 + 10 + 5.
        let template = PathTemplate::compile("/users/{id}");
        assert_eq!(template.specificity_score(), 25);

        let more_specific = PathTemplate::compile("/users/{id}/posts");
        assert!(more_specific.specificity_score() > template.specificity_score());
    }

    #[test]
    fn feature_flags_parse_csv() {
        let flags = FeatureFlags::parse("stores=true,metrics=false");
        assert!(flags.stores);
        assert!(!flags.metrics);
    }

    #[test]
    fn feature_flags_ignore_malformed_entries() {
        let flags = FeatureFlags::parse("stores=true,garbage,metrics");
        assert!(flags.stores);
        assert!(!flags.metrics);
    }
}
