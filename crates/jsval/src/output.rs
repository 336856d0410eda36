use crate::ptr::Token;
use crate::results::EvaluationResults;
use fxhash::FxHashMap;
use serde_json::{json, Map, Value};
use url::Url;

/// Output selects one of the JSON Schema output formats.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Output {
    /// `{ "valid": bool }` only. Evaluation may short-circuit.
    Flag,
    /// A flat, depth-first list of output units.
    Basic,
    /// A hierarchy mirroring the evaluation tree, with inconsequential
    /// nodes collapsed.
    Detailed,
    /// The full hierarchy, skipped scopes included.
    Verbose,
}

/// Builds the selected output format from a results tree.
pub fn build(
    results: &EvaluationResults,
    output: Output,
    templates: &FxHashMap<String, String>,
) -> Value {
    match output {
        Output::Flag => json!({ "valid": results.valid }),
        Output::Basic => basic(results, templates),
        Output::Detailed => {
            hierarchy(results, templates, false).unwrap_or_else(|| json!({ "valid": results.valid }))
        }
        Output::Verbose => hierarchy(results, templates, true).expect("verbose keeps every node"),
    }
}

/// Extends the fragment of an absolute keyword location with one more
/// pointer segment.
fn extend_absolute(uri: &Url, segment: &str) -> Url {
    let mut extended = uri.clone();
    let fragment = format!(
        "{}/{}",
        extended.fragment().unwrap_or(""),
        Token::Property(segment.to_string())
    );
    extended.set_fragment(Some(&fragment));
    extended
}

fn basic(results: &EvaluationResults, templates: &FxHashMap<String, String>) -> Value {
    let mut units = Vec::new();

    if results.valid {
        collect_annotations(results, &mut units);
        json!({ "valid": true, "annotations": units })
    } else {
        collect_errors(results, templates, &mut units);
        json!({ "valid": false, "errors": units })
    }
}

/// Collects error units depth-first, descending only into nested scopes
/// whose outcome contributed to a failed keyword of their parent.
fn collect_errors(
    node: &EvaluationResults,
    templates: &FxHashMap<String, String>,
    units: &mut Vec<Value>,
) {
    for error in &node.errors {
        let (keyword_location, absolute) = if error.keyword.is_empty() {
            (
                node.keyword_location.to_string(),
                node.absolute_location.clone(),
            )
        } else {
            (
                format!("{}/{}", node.keyword_location, error.keyword),
                extend_absolute(&node.absolute_location, &error.keyword),
            )
        };
        units.push(json!({
            "valid": false,
            "keywordLocation": keyword_location,
            "absoluteKeywordLocation": absolute.to_string(),
            "instanceLocation": node.instance_location.to_string(),
            "error": error.message(templates),
        }));
    }

    for nested in &node.nested {
        if nested.valid || nested.skipped {
            continue;
        }
        if contributed(node, nested) {
            collect_errors(nested, templates, units);
        }
    }
}

/// Did the nested scope's failure contribute to its parent's? True when
/// the parent registered an error for the keyword which applied it.
fn contributed(parent: &EvaluationResults, nested: &EvaluationResults) -> bool {
    let depth = parent.keyword_location.tokens().len();
    match nested.keyword_location.tokens().get(depth) {
        Some(Token::Property(keyword)) => parent
            .errors
            .iter()
            .any(|error| &*error.keyword == keyword.as_str()),
        _ => false,
    }
}

fn collect_annotations(node: &EvaluationResults, units: &mut Vec<Value>) {
    if !node.annotations.is_empty() {
        units.push(json!({
            "valid": true,
            "keywordLocation": node.keyword_location.to_string(),
            "absoluteKeywordLocation": node.absolute_location.to_string(),
            "instanceLocation": node.instance_location.to_string(),
            "annotations": annotation_map(node),
        }));
    }
    for nested in &node.nested {
        if nested.valid && !nested.skipped {
            collect_annotations(nested, units);
        }
    }
}

fn annotation_map(node: &EvaluationResults) -> Value {
    let mut map = Map::new();
    for (keyword, value) in &node.annotations {
        map.insert(keyword.to_string(), value.clone());
    }
    Value::Object(map)
}

/// Builds a hierarchical (Detailed or Verbose) unit for the node, or
/// None when Detailed pruning collapses it: a valid node with no
/// annotations, all of whose children are likewise collapsed.
fn hierarchy(
    node: &EvaluationResults,
    templates: &FxHashMap<String, String>,
    verbose: bool,
) -> Option<Value> {
    let mut unit = Map::new();
    unit.insert("valid".to_string(), Value::Bool(node.valid));
    unit.insert(
        "keywordLocation".to_string(),
        Value::String(node.keyword_location.to_string()),
    );
    unit.insert(
        "absoluteKeywordLocation".to_string(),
        Value::String(node.absolute_location.to_string()),
    );
    unit.insert(
        "instanceLocation".to_string(),
        Value::String(node.instance_location.to_string()),
    );

    if node.skipped {
        if !verbose {
            return None;
        }
        unit.insert("skipped".to_string(), Value::Bool(true));
        return Some(Value::Object(unit));
    }

    if node.valid && !node.annotations.is_empty() {
        unit.insert("annotations".to_string(), annotation_map(node));
    }
    if !node.valid && !node.errors.is_empty() {
        let mut errors = Map::new();
        for error in &node.errors {
            let message = error.message(templates);
            let keyword = error.keyword.to_string();
            match errors.get_mut(&keyword) {
                Some(Value::String(existing)) => {
                    existing.push_str("; ");
                    existing.push_str(&message);
                }
                _ => {
                    errors.insert(keyword, Value::String(message));
                }
            }
        }
        unit.insert("errors".to_string(), Value::Object(errors));
    }

    let nested: Vec<Value> = node
        .nested
        .iter()
        .filter_map(|child| hierarchy(child, templates, verbose))
        .collect();
    if !nested.is_empty() {
        unit.insert("nested".to_string(), Value::Array(nested));
    }

    // Detailed pruning: a valid node carrying no information collapses.
    if !verbose
        && node.valid
        && !unit.contains_key("annotations")
        && !unit.contains_key("nested")
    {
        return None;
    }
    Some(Value::Object(unit))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ptr::Pointer;
    use crate::results::{template, ErrorEntry};

    fn node(kw_loc: &str, instance_loc: &str) -> EvaluationResults {
        EvaluationResults::new(
            Pointer::from_str(kw_loc),
            Url::parse("http://example/schema").unwrap(),
            Pointer::from_str(instance_loc),
        )
    }

    #[test]
    fn test_flag() {
        let mut root = node("", "");
        assert_eq!(
            build(&root, Output::Flag, &FxHashMap::default()),
            serde_json::json!({"valid": true})
        );
        root.fail(ErrorEntry::new("type", template::TYPE));
        assert_eq!(
            build(&root, Output::Flag, &FxHashMap::default()),
            serde_json::json!({"valid": false})
        );
    }

    #[test]
    fn test_basic_error_units_extend_locations() {
        let mut root = node("", "");
        root.fail(
            ErrorEntry::new("minimum", template::MINIMUM)
                .with("value", 3)
                .with("limit", 5),
        );

        let out = build(&root, Output::Basic, &FxHashMap::default());
        assert_eq!(
            out,
            serde_json::json!({
                "valid": false,
                "errors": [{
                    "valid": false,
                    "keywordLocation": "/minimum",
                    "absoluteKeywordLocation": "http://example/schema#/minimum",
                    "instanceLocation": "",
                    "error": "3 should be at least 5",
                }],
            })
        );
    }

    #[test]
    fn test_basic_skips_non_contributing_failures() {
        // An invalid anyOf branch below a node which failed for an
        // unrelated keyword is not part of the error story.
        let mut root = node("", "");
        root.fail(ErrorEntry::new("type", template::TYPE));

        let mut branch = node("/anyOf/0", "");
        branch.fail(ErrorEntry::new("minimum", template::MINIMUM));
        root.nested.push(branch);

        let out = build(&root, Output::Basic, &FxHashMap::default());
        let errors = out.get("errors").unwrap().as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].get("keywordLocation").unwrap(), "/type");
    }

    #[test]
    fn test_detailed_prunes_quiet_nodes() {
        let mut root = node("", "");
        root.annotate("title", serde_json::json!("t"));

        let quiet = node("/allOf/0", "");
        root.nested.push(quiet);

        let out = build(&root, Output::Detailed, &FxHashMap::default());
        assert!(out.get("nested").is_none());
        assert!(out.get("annotations").is_some());

        // Verbose keeps the quiet child.
        let out = build(&root, Output::Verbose, &FxHashMap::default());
        assert_eq!(out.get("nested").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_verbose_marks_skipped_nodes() {
        let mut root = node("", "");
        let mut skipped = node("/then", "");
        skipped.skipped = true;
        root.nested.push(skipped);

        let out = build(&root, Output::Detailed, &FxHashMap::default());
        assert!(out.get("nested").is_none());

        let out = build(&root, Output::Verbose, &FxHashMap::default());
        let nested = out.get("nested").unwrap().as_array().unwrap();
        assert_eq!(nested[0].get("skipped"), Some(&serde_json::json!(true)));
    }
}
