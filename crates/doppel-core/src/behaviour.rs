//! The response-behaviour model: a mutable builder that, once `.build()`d,
//! freezes into a read-only [`ResponseBehaviour`]. Keeping the "commit"
//! explicit (per Design Notes §9) prevents a late-firing lifecycle listener
//! from mutating a behaviour the response service has already started
//! acting on.

use crate::config::{PerformanceConfig, ResourceConfig, ResponseConfig};
use crate::exchange::BodySource;

/// Whether the pipeline should fill in the blanks from the resource's
/// static configuration, or emit exactly what the behaviour specifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Overlay unset fields from the resource's `ResponseConfig` (and, if
    /// configured, the plugin's root response) before rendering.
    Default,
    /// Emit status and headers with an empty body; skip rendering
    /// entirely.
    ShortCircuit,
}

/// The effective, frozen result of deciding how to answer one request.
#[derive(Debug, Clone)]
pub struct ResponseBehaviour {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Where the body comes from.
    pub body: BodySource,
    /// Whether the body should pass through the template transformer
    /// chain.
    pub is_template: bool,
    /// Latency-simulation config for this response.
    pub performance: Option<PerformanceConfig>,
    /// `Default` or `ShortCircuit`.
    pub mode: ResponseMode,
    /// OpenAPI example name, carried through for plugins that use it.
    pub example_name: Option<String>,
}

/// Mutable builder mirroring the script DSL surface (`withStatusCode`,
/// `withFile`, ...). `doppel_core::script` drives this same builder from
/// host-injected JS globals; non-scripted resources build it directly from
/// a `ResponseConfig`.
#[derive(Debug, Clone, Default)]
pub struct ResponseBehaviourBuilder {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Option<BodySource>,
    is_template: bool,
    performance: Option<PerformanceConfig>,
    example_name: Option<String>,
    short_circuit: bool,
    use_defaults: bool,
}

impl ResponseBehaviourBuilder {
    /// A builder with nothing set yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from a resource's static `ResponseConfig`, as done
    /// when no script is configured.
    pub fn from_response_config(config: &ResponseConfig) -> Self {
        let mut builder = Self::new();
        builder.status = Some(config.status);
        for (name, value) in &config.headers {
            builder.headers.push((name.clone(), value.clone()));
        }
        builder.body = Some(body_source_from_config(config));
        builder.is_template = config.is_template;
        builder.performance = config.performance.clone();
        builder.example_name = config.example_name.clone();
        builder
    }

    /// `withStatusCode(int)`.
    pub fn with_status_code(&mut self, status: u16) -> &mut Self {
        self.status = Some(status);
        self
    }

    /// `withFile(string)`.
    pub fn with_file(&mut self, path: impl Into<String>) -> &mut Self {
        self.body = Some(BodySource::File(path.into()));
        self
    }

    /// `withData(string)`.
    pub fn with_data(&mut self, data: impl Into<String>) -> &mut Self {
        self.body = Some(BodySource::Inline(data.into()));
        self
    }

    /// `withHeader(string, string)`.
    pub fn with_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `withExampleName(string)`.
    pub fn with_example_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.example_name = Some(name.into());
        self
    }

    /// `withEmpty()`.
    pub fn with_empty(&mut self) -> &mut Self {
        self.body = Some(BodySource::Empty);
        self
    }

    /// `withDelay(ms)`.
    pub fn with_delay(&mut self, ms: u64) -> &mut Self {
        self.performance = Some(PerformanceConfig { exact_delay_ms: Some(ms), min_delay_ms: None, max_delay_ms: None });
        self
    }

    /// `withDelayRange(min, max)`.
    pub fn with_delay_range(&mut self, min_ms: u64, max_ms: u64) -> &mut Self {
        self.performance =
            Some(PerformanceConfig { exact_delay_ms: None, min_delay_ms: Some(min_ms), max_delay_ms: Some(max_ms) });
        self
    }

    /// `usingDefaultBehaviour()`: overlay unset fields from the resource's
    /// static config once the script finishes.
    pub fn using_default_behaviour(&mut self) -> &mut Self {
        self.use_defaults = true;
        self
    }

    /// `skipDefaultBehaviour()` (alias `immediately()`): the response
    /// service emits status+headers with no body and stops.
    pub fn skip_default_behaviour(&mut self) -> &mut Self {
        self.short_circuit = true;
        self
    }

    /// Freeze the builder into a [`ResponseBehaviour`], overlaying
    /// `defaults` (the resource's static `ResponseConfig`) onto any field
    /// still unset when `usingDefaultBehaviour()` was called, then
    /// overlaying `root_defaults` (the plugin's root response, when the
    /// plugin's `defaults_from_root_response` flag is set) onto anything
    /// still unset after that.
    pub fn build(
        self,
        defaults: Option<&ResponseConfig>,
        root_defaults: Option<&ResponseConfig>,
    ) -> ResponseBehaviour {
        let mode = if self.short_circuit { ResponseMode::ShortCircuit } else { ResponseMode::Default };

        let mut status = self.status;
        let mut headers = self.headers;
        let mut body = self.body;
        let mut is_template = self.is_template;
        let mut performance = self.performance;
        let mut example_name = self.example_name;

        if self.use_defaults {
            if let Some(defaults) = defaults {
                overlay(&mut status, &mut headers, &mut body, &mut is_template, &mut performance, &mut example_name, defaults);
            }
        }
        if let Some(root_defaults) = root_defaults {
            overlay(&mut status, &mut headers, &mut body, &mut is_template, &mut performance, &mut example_name, root_defaults);
        }

        ResponseBehaviour {
            status: status.unwrap_or(200),
            headers,
            body: body.unwrap_or(BodySource::Empty),
            is_template,
            performance,
            mode,
            example_name,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn overlay(
    status: &mut Option<u16>,
    headers: &mut Vec<(String, String)>,
    body: &mut Option<BodySource>,
    is_template: &mut bool,
    performance: &mut Option<PerformanceConfig>,
    example_name: &mut Option<String>,
    fallback: &ResponseConfig,
) {
    if status.is_none() {
        *status = Some(fallback.status);
    }
    if body.is_none() {
        *body = Some(body_source_from_config(fallback));
    }
    if performance.is_none() {
        performance.clone_from(&fallback.performance);
    }
    if example_name.is_none() {
        example_name.clone_from(&fallback.example_name);
    }
    if !*is_template {
        *is_template = fallback.is_template;
    }
    let existing: std::collections::HashSet<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
    for (name, value) in &fallback.headers {
        if !existing.contains(name.as_str()) {
            headers.push((name.clone(), value.clone()));
        }
    }
}

fn body_source_from_config(config: &ResponseConfig) -> BodySource {
    if let Some(file) = &config.file {
        BodySource::File(file.clone())
    } else if let Some(data) = &config.data {
        BodySource::Inline(data.clone())
    } else {
        BodySource::Empty
    }
}

/// Build the non-scripted behaviour for `resource`, overlaying the
/// plugin's root response when `defaults_from_root_response` is set. This
/// is the §4.3 "no script configured" path.
pub fn behaviour_from_resource(
    resource: &ResourceConfig,
    root_response: Option<&ResponseConfig>,
    defaults_from_root_response: bool,
) -> ResponseBehaviour {
    let builder = ResponseBehaviourBuilder::from_response_config(&resource.response);
    let root_defaults = if defaults_from_root_response { root_response } else { None };
    builder.build(None, root_defaults)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_config() -> ResponseConfig {
        ResponseConfig { status: 201, data: Some("fallback".into()), ..Default::default() }
    }

    #[test]
    fn builder_defaults_to_200_and_empty_body() {
        let behaviour = ResponseBehaviourBuilder::new().build(None, None);
        assert_eq!(behaviour.status, 200);
        assert!(matches!(behaviour.body, BodySource::Empty));
        assert_eq!(behaviour.mode, ResponseMode::Default);
    }

    #[test]
    fn skip_default_behaviour_sets_short_circuit_mode() {
        let mut builder = ResponseBehaviourBuilder::new();
        builder.with_status_code(418).skip_default_behaviour();
        let behaviour = builder.build(None, None);
        assert_eq!(behaviour.status, 418);
        assert_eq!(behaviour.mode, ResponseMode::ShortCircuit);
    }

    #[test]
    fn using_default_behaviour_overlays_unset_fields_only() {
        let mut builder = ResponseBehaviourBuilder::new();
        builder.with_status_code(201).using_default_behaviour();
        let behaviour = builder.build(Some(&response_config()), None);
        // status was set by the script, so the default's 201 doesn't matter here either way
        assert_eq!(behaviour.status, 201);
        match behaviour.body {
            BodySource::Inline(data) => assert_eq!(data, "fallback"),
            other => panic!("expected inline fallback body, got {other:?}"),
        }
    }

    #[test]
    fn root_response_defaults_apply_regardless_of_script() {
        let root = ResponseConfig { headers: [("X-Root".to_string(), "1".to_string())].into(), ..Default::default() };
        let behaviour = ResponseBehaviourBuilder::new().build(None, Some(&root));
        assert!(behaviour.headers.contains(&("X-Root".to_string(), "1".to_string())));
    }
}
