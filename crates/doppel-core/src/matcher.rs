//! Resource matcher: selects the most specific [`ResourceConfig`] for a
//! request, per the four-step algorithm (filter, qualify, score,
//! tie-break). Body-matcher evaluation (JSONPath/XPath/regex) is grounded
//! on the JSONPath/XPath evaluator in `mockforge-core/src/conditions.rs`,
//! trimmed down to the single-matcher (no AND/OR/NOT) shape this spec
//! calls for.

use std::collections::HashSet;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use roxmltree::{Document, Node};

use crate::config::{BodyMatcher, HttpMethod, ResourceConfig};
use crate::exchange::RequestView;

/// Outcome of matching one request against a plugin's resource list.
pub struct MatchResult<'a> {
    /// The selected resource.
    pub resource: &'a ResourceConfig,
    /// Path parameters bound by the winning resource's template.
    pub path_params: std::collections::HashMap<String, String>,
}

fn warned_resource_ids() -> &'static Mutex<HashSet<String>> {
    static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    WARNED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn warn_once(resource_id: &str, message: &str) {
    let mut warned = warned_resource_ids().lock();
    if warned.insert(resource_id.to_string()) {
        tracing::warn!(resource_id, message, "body matcher evaluation failed, skipping resource");
    }
}

/// Select the best-matching resource for `request` from `resources`, in
/// declaration order. Returns `None` ("no match") if no resource qualifies.
pub fn match_resource<'a>(
    request: &RequestView,
    resources: &'a [ResourceConfig],
) -> Option<MatchResult<'a>> {
    let mut best: Option<(i32, usize, &'a ResourceConfig, std::collections::HashMap<String, String>)> = None;

    for (index, resource) in resources.iter().enumerate() {
        if !resource.enabled {
            continue;
        }
        if let Some(method) = resource.method {
            let Some(request_method) = HttpMethod::parse(&request.method) else {
                continue;
            };
            if request_method != method {
                continue;
            }
        }
        let Some(path_params) = resource.path.0.matches(&request.path) else {
            continue;
        };

        if !qualifies(resource, request) {
            continue;
        }

        let score = specificity_score(resource);
        let replace = match &best {
            None => true,
            Some((best_score, _, _, _)) => score > *best_score,
        };
        if replace {
            best = Some((score, index, resource, path_params));
        }
    }

    best.map(|(_, _, resource, path_params)| MatchResult { resource, path_params })
}

fn qualifies(resource: &ResourceConfig, request: &RequestView) -> bool {
    for (name, expected) in &resource.query_params {
        if request.query.get(name) != Some(expected.as_str()) {
            return false;
        }
    }
    for (name, expected) in &resource.headers {
        if request.headers.get(name) != Some(expected.as_str()) {
            return false;
        }
    }
    if let Some(matcher) = &resource.body_matcher {
        match evaluate_body_matcher(matcher, &request.body_as_string()) {
            Ok(matched) => {
                if !matched {
                    return false;
                }
            }
            Err(message) => {
                let resource_id = resource.id.clone().unwrap_or_default();
                warn_once(&resource_id, &message);
                return false;
            }
        }
    }
    true
}

fn specificity_score(resource: &ResourceConfig) -> i32 {
    let mut score = resource.path.0.specificity_score();
    score += 3 * resource.query_params.len() as i32;
    score += 3 * resource.headers.len() as i32;
    if resource.body_matcher.is_some() {
        score += 4;
    }
    score
}

fn evaluate_body_matcher(matcher: &BodyMatcher, body: &str) -> Result<bool, String> {
    match matcher {
        BodyMatcher::Literal { value } => Ok(body == value),
        BodyMatcher::Regex { pattern } => {
            let regex = Regex::new(pattern).map_err(|err| format!("invalid regex: {err}"))?;
            Ok(regex.is_match(body))
        }
        BodyMatcher::JsonPath { expr } => evaluate_jsonpath(expr, body),
        BodyMatcher::XPath { expr } => evaluate_xpath(expr, body),
    }
}

fn evaluate_jsonpath(expr: &str, body: &str) -> Result<bool, String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| format!("body is not valid JSON: {err}"))?;
    let selector =
        jsonpath::Selector::new(expr).map_err(|err| format!("invalid JSONPath '{expr}': {err}"))?;
    let found = selector.find(&value);
    Ok(found.next().is_some())
}

fn evaluate_xpath(expr: &str, body: &str) -> Result<bool, String> {
    let doc = Document::parse(body).map_err(|err| format!("body is not valid XML: {err}"))?;
    Ok(evaluate_xpath_simple(doc.root_element(), expr))
}

/// A deliberately small XPath subset, mirroring what production mock-server
/// configs actually use: element-name match, `elem[@attr='v']` attribute
/// predicates, `elem/child` descent, `elem/text()` non-empty check, and the
/// `//elem` descendant-or-self axis.
fn evaluate_xpath_simple(node: Node, xpath: &str) -> bool {
    let xpath = xpath.trim_start_matches('/');

    if let Some(rest) = xpath.strip_prefix('/') {
        return node.descendants().any(|candidate| {
            candidate.is_element() && evaluate_xpath_simple(candidate, rest)
        });
    }

    let (segment, rest) = match xpath.split_once('/') {
        Some((head, tail)) => (head, Some(tail)),
        None => (xpath, None),
    };

    if segment == "text()" {
        return node.text().map(|text| !text.trim().is_empty()).unwrap_or(false);
    }

    let (name, predicate) = match segment.split_once('[') {
        Some((name, predicate)) => (name, Some(predicate.trim_end_matches(']'))),
        None => (segment, None),
    };

    if !name.is_empty() && node.tag_name().name() != name {
        return false;
    }

    if let Some(predicate) = predicate {
        if let Some(attr_predicate) = predicate.strip_prefix('@') {
            let Some((attr_name, attr_value)) = attr_predicate.split_once('=') else {
                return false;
            };
            let attr_value = attr_value.trim_matches('\'').trim_matches('"');
            if node.attribute(attr_name) != Some(attr_value) {
                return false;
            }
        }
    }

    match rest {
        None => true,
        Some(rest) => node.children().any(|child| child.is_element() && evaluate_xpath_simple(child, rest)),
    }
}

/// Build a request body's decoded string for matching, tolerating
/// non-UTF-8 bodies (they simply never match literal/JSONPath/XPath
/// matchers, which is correct: such bodies aren't valid for those formats).
pub fn decoded_body(request: &RequestView) -> std::borrow::Cow<'_, str> {
    request.body_as_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathTemplateConfig, ResponseConfig};
    use crate::exchange::MultiMap;
    use std::collections::HashMap;

    fn request(method: &str, path: &str) -> RequestView {
        RequestView {
            method: method.to_string(),
            path: path.to_string(),
            query: MultiMap::new(),
            headers: MultiMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
        }
    }

    fn resource(path: &str) -> ResourceConfig {
        ResourceConfig {
            id: Some(path.to_string()),
            enabled: true,
            method: Some(HttpMethod::Get),
            path: PathTemplateConfig(crate::config::PathTemplate::compile(path)),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            body_matcher: None,
            response: ResponseConfig::default(),
            captures: Vec::new(),
        }
    }

    #[test]
    fn more_literal_segments_win() {
        let generic = resource("/users/{id}");
        let specific = resource("/users/42");
        let resources = vec![generic, specific];

        let result = match_resource(&request("GET", "/users/42"), &resources).unwrap();
        assert_eq!(result.resource.path.0.raw(), "/users/42");
    }

    #[test]
    fn no_match_returns_none() {
        let resources = vec![resource("/ping")];
        assert!(match_resource(&request("GET", "/pong"), &resources).is_none());
    }

    #[test]
    fn disabled_resource_is_skipped() {
        let mut disabled = resource("/ping");
        disabled.enabled = false;
        let resources = vec![disabled];
        assert!(match_resource(&request("GET", "/ping"), &resources).is_none());
    }

    #[test]
    fn method_mismatch_is_filtered() {
        let resources = vec![resource("/ping")];
        assert!(match_resource(&request("POST", "/ping"), &resources).is_none());
    }

    #[test]
    fn tie_break_is_declaration_order() {
        let first = resource("/ping");
        let second = resource("/ping");
        let resources = vec![first, second];
        let result = match_resource(&request("GET", "/ping"), &resources).unwrap();
        assert_eq!(result.resource.id.as_deref(), Some("/ping"));
    }

    #[test]
    fn query_constraint_must_match_exactly() {
        let mut constrained = resource("/search");
        constrained.query_params.insert("q".to_string(), "rust".to_string());
        let resources = vec![constrained];

        let mut req = request("GET", "/search");
        req.query.insert("q", "rust");
        assert!(match_resource(&req, &resources).is_some());

        let mut req_wrong = request("GET", "/search");
        req_wrong.query.insert("q", "go");
        assert!(match_resource(&req_wrong, &resources).is_none());
    }

    #[test]
    fn jsonpath_body_matcher_qualifies_on_nonempty_result() {
        let mut matched = resource("/items");
        matched.body_matcher = Some(BodyMatcher::JsonPath { expr: "$.name".to_string() });
        let resources = vec![matched];

        let mut req = request("GET", "/items");
        req.body = br#"{"name":"widget"}"#.to_vec();
        assert!(match_resource(&req, &resources).is_some());

        let mut req_missing = request("GET", "/items");
        req_missing.body = br#"{"other":"x"}"#.to_vec();
        assert!(match_resource(&req_missing, &resources).is_none());
    }

    #[test]
    fn xpath_body_matcher_checks_attribute_predicate() {
        let xml = "<root><item id='42'>hi</item></root>";
        assert!(evaluate_xpath("item[@id='42']", xml).unwrap());
        assert!(!evaluate_xpath("item[@id='7']", xml).unwrap());
    }

    #[test]
    fn invalid_body_matcher_skips_resource_not_request() {
        let mut matched = resource("/items");
        matched.body_matcher = Some(BodyMatcher::JsonPath { expr: "$.name".to_string() });
        let resources = vec![matched];

        let mut req = request("GET", "/items");
        req.body = b"not json".to_vec();
        assert!(match_resource(&req, &resources).is_none());
    }
}
