use crate::draft::Draft;
use crate::ptr::Pointer;
use crate::results::EvaluationResults;
use crate::schema::keywords as kw;
use fxhash::FxHashSet;

/// Property-name coverage gathered from annotations of every evaluation
/// sharing one instance location within one schema scope.
pub struct PropertyCoverage {
    /// Some annotation was boolean `true`: every property is covered and
    /// the gathering keyword is skipped.
    pub all: bool,
    pub names: FxHashSet<String>,
}

/// Index coverage gathered for `unevaluatedItems`.
pub struct ItemCoverage {
    pub all: bool,
    /// Items below this index were covered positionally.
    pub start: usize,
    /// Indices covered by `contains` matches (2020-12 and later).
    pub contains: FxHashSet<usize>,
}

/// Gathers `properties` / `patternProperties` / `additionalProperties` /
/// `unevaluatedProperties` annotations visible to an `unevaluatedProperties`
/// keyword of the scope `node`: annotations of the scope itself, plus
/// those of valid nested scopes evaluated at the same instance location
/// (in-place applicators, recursively).
pub fn property_coverage(node: &EvaluationResults, loc: &Pointer) -> PropertyCoverage {
    let mut coverage = PropertyCoverage {
        all: false,
        names: FxHashSet::default(),
    };
    gather_properties(node, loc, &mut coverage);
    coverage
}

fn gather_properties(node: &EvaluationResults, loc: &Pointer, coverage: &mut PropertyCoverage) {
    for (name, value) in &node.annotations {
        match &**name {
            kw::PROPERTIES
            | kw::PATTERN_PROPERTIES
            | kw::ADDITIONAL_PROPERTIES
            | kw::UNEVALUATED_PROPERTIES => match value {
                serde_json::Value::Bool(true) => coverage.all = true,
                serde_json::Value::Array(names) => {
                    coverage
                        .names
                        .extend(names.iter().filter_map(|n| n.as_str()).map(str::to_string));
                }
                _ => (),
            },
            _ => (),
        }
    }

    for nested in &node.nested {
        // Annotations survive only within valid scopes, and only scopes
        // at the same instance location are adjacent to this keyword.
        if nested.valid && !nested.skipped && &nested.instance_location == loc {
            gather_properties(nested, loc, coverage);
        }
    }
}

/// Gathers `prefixItems` / `items` / `additionalItems` / `contains` /
/// `unevaluatedItems` annotations visible to an `unevaluatedItems`
/// keyword of the scope `node`.
pub fn item_coverage(node: &EvaluationResults, loc: &Pointer, draft: Draft) -> ItemCoverage {
    let mut coverage = ItemCoverage {
        all: false,
        start: 0,
        contains: FxHashSet::default(),
    };
    gather_items(node, loc, draft, &mut coverage);
    coverage
}

fn gather_items(
    node: &EvaluationResults,
    loc: &Pointer,
    draft: Draft,
    coverage: &mut ItemCoverage,
) {
    for (name, value) in &node.annotations {
        match &**name {
            kw::PREFIX_ITEMS | kw::ITEMS | kw::ADDITIONAL_ITEMS | kw::UNEVALUATED_ITEMS => {
                match value {
                    serde_json::Value::Bool(true) => coverage.all = true,
                    serde_json::Value::Number(last) => {
                        if let Some(last) = last.as_u64() {
                            coverage.start = coverage.start.max(last as usize + 1);
                        }
                    }
                    _ => (),
                }
            }
            // `contains` matches count as evaluated from 2020-12 onward.
            kw::CONTAINS if draft >= Draft::Draft202012 => match value {
                serde_json::Value::Bool(true) => coverage.all = true,
                serde_json::Value::Array(indices) => {
                    coverage
                        .contains
                        .extend(indices.iter().filter_map(|i| i.as_u64()).map(|i| i as usize));
                }
                _ => (),
            },
            _ => (),
        }
    }

    for nested in &node.nested {
        if nested.valid && !nested.skipped && &nested.instance_location == loc {
            gather_items(nested, loc, draft, coverage);
        }
    }
}
