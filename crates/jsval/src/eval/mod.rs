use crate::compare::json_equal;
use crate::compile::{self, Compiler, Dependency, Kind, SchemaConstraint};
use crate::draft::Draft;
use crate::number::Number;
use crate::ptr::Pointer;
use crate::registry::Registry;
use crate::resolver::{Resolver, ResourceLoader};
use crate::results::{template, ErrorEntry, EvaluationResults};
use crate::schema::{keywords as kw, types};
use crate::{Options, Output};
use fxhash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub mod unevaluated;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("evaluation was cancelled")]
    Cancelled,
    #[error("recursion limit of {limit} exceeded at instance location '{instance}'")]
    RecursionLimitExceeded { limit: usize, instance: String },
    #[error(transparent)]
    Compile(#[from] compile::Error),
}

/// Context drives a compiled constraint graph against one instance.
/// It owns the dynamic-scope stack, the re-entrancy guard for cyclic
/// references, and lazily compiles reference targets through the shared
/// compilation cache.
pub(crate) struct Context<'e> {
    pub registry: &'e Registry,
    pub options: &'e Options,
    pub draft: Draft,
    pub resolver: &'e mut Resolver,
    pub loader: &'e dyn ResourceLoader,
    pub cache: &'e mut FxHashMap<Url, Arc<SchemaConstraint>>,
    /// Dynamic scope: base URIs of the resources entered, outermost first.
    pub scopes: Vec<Url>,
    /// (constraint identity, instance location) pairs currently being
    /// evaluated; re-entering one is vacuously valid.
    pub visited: FxHashSet<(usize, String)>,
    pub ref_depth: usize,
}

impl<'e> Context<'e> {
    pub fn eval_schema(
        &mut self,
        constraint: &Arc<SchemaConstraint>,
        instance: &Value,
        instance_loc: &Pointer,
        eval_path: &Pointer,
    ) -> Result<EvaluationResults, Error> {
        self.check_cancelled()?;

        let mut results = EvaluationResults::new(
            eval_path.clone(),
            constraint.curi.clone(),
            instance_loc.clone(),
        );

        let pushed = if self.scopes.last() != Some(&constraint.base) {
            self.scopes.push(constraint.base.clone());
            true
        } else {
            false
        };

        let outcome = self.eval_keywords(constraint, instance, instance_loc, eval_path, &mut results);

        if pushed {
            self.scopes.pop();
        }
        outcome?;
        Ok(results)
    }

    fn eval_keywords(
        &mut self,
        constraint: &Arc<SchemaConstraint>,
        instance: &Value,
        loc: &Pointer,
        eval_path: &Pointer,
        results: &mut EvaluationResults,
    ) -> Result<(), Error> {
        let short_circuit = self.options.output == Output::Flag;
        // Validity of an `if` sibling, observed by `then` and `else`.
        let mut valid_if: Option<bool> = None;

        for kc in &constraint.constraints {
            self.check_cancelled()?;
            let keyword = &*kc.keyword;

            match &kc.kind {
                Kind::AlwaysFail => {
                    results.fail(ErrorEntry::new(keyword, template::ALWAYS_FAIL));
                }
                Kind::Type(expected) => {
                    let actual = types::Set::of_value(instance);
                    if !expected.overlaps(actual) {
                        results.fail(
                            ErrorEntry::new(keyword, template::TYPE)
                                .with("received", actual.to_string())
                                .with("expected", expected.to_string()),
                        );
                    }
                }
                Kind::Const(expected) => {
                    if !json_equal(instance, expected) {
                        results.fail(
                            ErrorEntry::new(keyword, template::CONST)
                                .with("expected", expected.clone()),
                        );
                    }
                }
                Kind::Enum(variants) => {
                    if !variants.iter().any(|variant| json_equal(instance, variant)) {
                        results.fail(ErrorEntry::new(keyword, template::ENUM));
                    }
                }
                Kind::MultipleOf(divisor) => {
                    if let Value::Number(n) = instance {
                        if !Number::from(n).is_multiple_of(divisor) {
                            results.fail(
                                ErrorEntry::new(keyword, template::MULTIPLE_OF)
                                    .with("value", instance.clone())
                                    .with("divisor", Value::from(*divisor)),
                            );
                        }
                    }
                }
                Kind::Maximum(bound) => {
                    self.check_bound(keyword, instance, bound, results, |n, b| n <= b, template::MAXIMUM)
                }
                Kind::ExclusiveMaximum(bound) => self.check_bound(
                    keyword,
                    instance,
                    bound,
                    results,
                    |n, b| n < b,
                    template::EXCLUSIVE_MAXIMUM,
                ),
                Kind::Minimum(bound) => {
                    self.check_bound(keyword, instance, bound, results, |n, b| n >= b, template::MINIMUM)
                }
                Kind::ExclusiveMinimum(bound) => self.check_bound(
                    keyword,
                    instance,
                    bound,
                    results,
                    |n, b| n > b,
                    template::EXCLUSIVE_MINIMUM,
                ),
                Kind::MaxLength(limit) => {
                    if let Value::String(s) = instance {
                        // Unicode scalar values, not bytes or UTF-16 units.
                        let chars = s.chars().count();
                        if chars > *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MAX_LENGTH)
                                    .with("actual", chars)
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::MinLength(limit) => {
                    if let Value::String(s) = instance {
                        let chars = s.chars().count();
                        if chars < *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MIN_LENGTH)
                                    .with("actual", chars)
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::Pattern(re) => {
                    if let Value::String(s) = instance {
                        if !re.is_match(s).unwrap_or(false) {
                            results.fail(
                                ErrorEntry::new(keyword, template::PATTERN)
                                    .with("pattern", re.as_str()),
                            );
                        }
                    }
                }
                Kind::Format {
                    format,
                    raw,
                    assert,
                } => {
                    let ok = match (instance, format) {
                        (Value::String(s), Some(format)) => format.check(s),
                        // Non-strings and unknown formats never assert.
                        _ => true,
                    };
                    if ok || !assert {
                        results.annotate(keyword, Value::String(raw.clone()));
                    }
                    if !ok && *assert {
                        results.fail(
                            ErrorEntry::new(keyword, template::FORMAT).with("format", raw.clone()),
                        );
                    }
                }
                Kind::MaxItems(limit) => {
                    if let Value::Array(items) = instance {
                        if items.len() > *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MAX_ITEMS)
                                    .with("actual", items.len())
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::MinItems(limit) => {
                    if let Value::Array(items) = instance {
                        if items.len() < *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MIN_ITEMS)
                                    .with("actual", items.len())
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::UniqueItems => {
                    if let Value::Array(items) = instance {
                        'outer: for i in 0..items.len() {
                            for j in i + 1..items.len() {
                                if json_equal(&items[i], &items[j]) {
                                    results.fail(
                                        ErrorEntry::new(keyword, template::UNIQUE_ITEMS)
                                            .with("first", i)
                                            .with("second", j),
                                    );
                                    break 'outer;
                                }
                            }
                        }
                    }
                }
                Kind::MaxProperties(limit) => {
                    if let Value::Object(map) = instance {
                        if map.len() > *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MAX_PROPERTIES)
                                    .with("actual", map.len())
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::MinProperties(limit) => {
                    if let Value::Object(map) = instance {
                        if map.len() < *limit {
                            results.fail(
                                ErrorEntry::new(keyword, template::MIN_PROPERTIES)
                                    .with("actual", map.len())
                                    .with("limit", *limit),
                            );
                        }
                    }
                }
                Kind::Required(names) => {
                    if let Value::Object(map) = instance {
                        let missing: Vec<Value> = names
                            .iter()
                            .filter(|name| !map.contains_key(*name))
                            .map(|name| Value::String(name.clone()))
                            .collect();
                        if !missing.is_empty() {
                            results.fail(
                                ErrorEntry::new(keyword, template::REQUIRED)
                                    .with("missing", Value::Array(missing)),
                            );
                        }
                    }
                }
                Kind::DependentRequired(deps) => {
                    if let Value::Object(map) = instance {
                        for (reason, wanted) in deps {
                            if !map.contains_key(reason) {
                                continue;
                            }
                            let missing: Vec<Value> = wanted
                                .iter()
                                .filter(|name| !map.contains_key(*name))
                                .map(|name| Value::String(name.clone()))
                                .collect();
                            if !missing.is_empty() {
                                results.fail(
                                    ErrorEntry::new(keyword, template::DEPENDENT_REQUIRED)
                                        .with("missing", Value::Array(missing))
                                        .with("reason", reason.clone()),
                                );
                            }
                        }
                    }
                }
                Kind::Annotation(value) => {
                    results.annotate(keyword, value.clone());
                }
                Kind::Custom { plugin, value } => match plugin.evaluate(value, instance) {
                    Ok(Some(annotation)) => results.annotate(keyword, annotation),
                    Ok(None) => (),
                    Err(detail) => results.fail(
                        ErrorEntry::new(keyword, template::CUSTOM).with("detail", detail),
                    ),
                },

                Kind::Properties(props) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut applied = Vec::new();
                        let mut invalid = 0;

                        for (name, child) in props {
                            let Some(value) = map.get(name) else {
                                continue;
                            };
                            let nested = self.eval_schema(
                                child,
                                value,
                                &loc.push_prop(name),
                                &kw_path.push_prop(name),
                            )?;
                            invalid += usize::from(!nested.valid);
                            applied.push(Value::String(name.clone()));
                            results.nested.push(nested);
                        }

                        results.annotate(keyword, Value::Array(applied));
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::PatternProperties(props) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut applied = Vec::new();
                        let mut invalid = 0;

                        for (name, value) in map {
                            for (re, pattern, child) in props {
                                if !re.is_match(name).unwrap_or(false) {
                                    continue;
                                }
                                let nested = self.eval_schema(
                                    child,
                                    value,
                                    &loc.push_prop(name),
                                    &kw_path.push_prop(pattern),
                                )?;
                                invalid += usize::from(!nested.valid);
                                results.nested.push(nested);

                                if !applied.iter().any(|a| a == &Value::String(name.clone())) {
                                    applied.push(Value::String(name.clone()));
                                }
                            }
                        }

                        results.annotate(keyword, Value::Array(applied));
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::AdditionalProperties(child) => {
                    if let Value::Object(map) = instance {
                        // The instance locator: keys not covered by the
                        // sibling properties / patternProperties
                        // annotations of this same schema object.
                        let mut covered: FxHashSet<String> = FxHashSet::default();
                        for sibling in [kw::PROPERTIES, kw::PATTERN_PROPERTIES] {
                            if let Some(Value::Array(names)) = results.annotation(sibling) {
                                covered.extend(
                                    names.iter().filter_map(|n| n.as_str()).map(str::to_string),
                                );
                            }
                        }

                        let kw_path = eval_path.push_prop(keyword);
                        let mut applied = Vec::new();
                        let mut invalid = 0;

                        for (name, value) in map {
                            if covered.contains(name.as_str()) {
                                continue;
                            }
                            let nested = self.eval_schema(
                                child,
                                value,
                                &loc.push_prop(name),
                                &kw_path,
                            )?;
                            invalid += usize::from(!nested.valid);
                            applied.push(Value::String(name.clone()));
                            results.nested.push(nested);
                        }

                        results.annotate(keyword, Value::Array(applied));
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::PropertyNames(child) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut invalid = 0;

                        for name in map.keys() {
                            let as_value = Value::String(name.clone());
                            let nested = self.eval_schema(
                                child,
                                &as_value,
                                &loc.push_prop(name),
                                &kw_path,
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }

                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }

                Kind::Tuple(children) => {
                    if let Value::Array(items) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let applied = children.len().min(items.len());
                        let mut invalid = 0;

                        for (ind, (child, item)) in children.iter().zip(items.iter()).enumerate() {
                            let nested = self.eval_schema(
                                child,
                                item,
                                &loc.push_item(ind),
                                &kw_path.push_item(ind),
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }

                        if applied > 0 && applied == items.len() {
                            results.annotate(keyword, Value::Bool(true));
                        } else if applied > 0 {
                            results.annotate(keyword, Value::from(applied - 1));
                        }
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::Items { schema, after } => {
                    if let Value::Array(items) = instance {
                        let kw_path = eval_path.push_prop(keyword);

                        // Position after the sibling's covered prefix.
                        // None means the sibling covered every item.
                        let start = {
                            let covered = match after {
                                Some(sibling) => results.annotation(sibling),
                                None => None,
                            };
                            match covered {
                                Some(Value::Bool(true)) => None,
                                Some(Value::Number(last)) => {
                                    Some(last.as_u64().map(|l| l as usize + 1).unwrap_or(0))
                                }
                                _ => Some(0),
                            }
                        };
                        let Some(start) = start else {
                            // Everything is covered; skip entirely.
                            let mut marker = EvaluationResults::new(
                                kw_path,
                                schema.curi.clone(),
                                loc.clone(),
                            );
                            marker.skipped = true;
                            results.nested.push(marker);
                            continue;
                        };

                        let mut invalid = 0;
                        for (ind, item) in items.iter().enumerate().skip(start) {
                            let nested = self.eval_schema(
                                schema,
                                item,
                                &loc.push_item(ind),
                                &kw_path,
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }

                        if start < items.len() {
                            results.annotate(keyword, Value::Bool(true));
                        }
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::Contains {
                    schema,
                    min,
                    max,
                } => {
                    if let Value::Array(items) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut matched = Vec::new();

                        for (ind, item) in items.iter().enumerate() {
                            let nested = self.eval_schema(
                                schema,
                                item,
                                &loc.push_item(ind),
                                &kw_path,
                            )?;
                            if nested.valid {
                                matched.push(ind);
                            }
                            results.nested.push(nested);
                        }

                        let count = matched.len();
                        if count == items.len() && count > 0 {
                            results.annotate(keyword, Value::Bool(true));
                        } else {
                            results.annotate(
                                keyword,
                                Value::Array(matched.into_iter().map(Value::from).collect()),
                            );
                        }

                        if count < *min {
                            results.fail(
                                ErrorEntry::new(keyword, template::CONTAINS)
                                    .with("actual", count)
                                    .with("limit", *min),
                            );
                        } else if let Some(max) = max {
                            if count > *max {
                                results.fail(
                                    ErrorEntry::new(keyword, template::MAX_CONTAINS)
                                        .with("actual", count)
                                        .with("limit", *max),
                                );
                            }
                        }
                    }
                }

                Kind::UnevaluatedProperties(child) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let coverage = unevaluated::property_coverage(results, loc);

                        if coverage.all {
                            let mut marker =
                                EvaluationResults::new(kw_path, child.curi.clone(), loc.clone());
                            marker.skipped = true;
                            results.nested.push(marker);
                            continue;
                        }

                        let mut invalid = 0;
                        for (name, value) in map {
                            if coverage.names.contains(name.as_str()) {
                                continue;
                            }
                            let nested = self.eval_schema(
                                child,
                                value,
                                &loc.push_prop(name),
                                &kw_path,
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }

                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        } else {
                            results.annotate(keyword, Value::Bool(true));
                        }
                    }
                }
                Kind::UnevaluatedItems(child) => {
                    if let Value::Array(items) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let coverage = unevaluated::item_coverage(results, loc, self.draft);

                        if coverage.all {
                            let mut marker =
                                EvaluationResults::new(kw_path, child.curi.clone(), loc.clone());
                            marker.skipped = true;
                            results.nested.push(marker);
                            continue;
                        }

                        let mut invalid = 0;
                        for (ind, item) in items.iter().enumerate().skip(coverage.start) {
                            if coverage.contains.contains(&ind) {
                                continue;
                            }
                            let nested = self.eval_schema(
                                child,
                                item,
                                &loc.push_item(ind),
                                &kw_path,
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }

                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        } else {
                            results.annotate(keyword, Value::Bool(true));
                        }
                    }
                }

                Kind::AllOf(children) => {
                    let kw_path = eval_path.push_prop(keyword);
                    let mut invalid = 0;

                    for (ind, child) in children.iter().enumerate() {
                        let nested =
                            self.eval_schema(child, instance, loc, &kw_path.push_item(ind))?;
                        invalid += usize::from(!nested.valid);
                        results.nested.push(nested);
                    }
                    if invalid > 0 {
                        results.fail(
                            ErrorEntry::new(keyword, template::ALL_OF).with("count", invalid),
                        );
                    }
                }
                Kind::AnyOf(children) => {
                    let kw_path = eval_path.push_prop(keyword);
                    let mut any_valid = false;

                    // Every branch evaluates: annotations of all valid
                    // branches remain visible to unevaluated-* keywords.
                    for (ind, child) in children.iter().enumerate() {
                        let nested =
                            self.eval_schema(child, instance, loc, &kw_path.push_item(ind))?;
                        any_valid |= nested.valid;
                        results.nested.push(nested);
                    }
                    if !any_valid {
                        results.fail(ErrorEntry::new(keyword, template::ANY_OF));
                    }
                }
                Kind::OneOf(children) => {
                    let kw_path = eval_path.push_prop(keyword);
                    let mut valid = 0;

                    for (ind, child) in children.iter().enumerate() {
                        let nested =
                            self.eval_schema(child, instance, loc, &kw_path.push_item(ind))?;
                        valid += usize::from(nested.valid);
                        results.nested.push(nested);
                    }
                    if valid != 1 {
                        results.fail(
                            ErrorEntry::new(keyword, template::ONE_OF).with("count", valid),
                        );
                    }
                }
                Kind::Not(child) => {
                    let kw_path = eval_path.push_prop(keyword);
                    let nested = self.eval_schema(child, instance, loc, &kw_path)?;
                    let child_valid = nested.valid;
                    results.nested.push(nested);

                    if child_valid {
                        results.fail(ErrorEntry::new(keyword, template::NOT));
                    }
                }
                Kind::If(child) => {
                    let kw_path = eval_path.push_prop(keyword);
                    let nested = self.eval_schema(child, instance, loc, &kw_path)?;
                    // The branch choice is recorded; `if`'s own validity
                    // never affects this scope.
                    valid_if = Some(nested.valid);
                    results.nested.push(nested);
                }
                Kind::Then(child) => {
                    let kw_path = eval_path.push_prop(keyword);
                    if valid_if == Some(true) {
                        let nested = self.eval_schema(child, instance, loc, &kw_path)?;
                        if !nested.valid {
                            results.fail(ErrorEntry::new(keyword, template::BRANCH_INVALID));
                        }
                        results.nested.push(nested);
                    } else {
                        let mut marker =
                            EvaluationResults::new(kw_path, child.curi.clone(), loc.clone());
                        marker.skipped = true;
                        results.nested.push(marker);
                    }
                }
                Kind::Else(child) => {
                    let kw_path = eval_path.push_prop(keyword);
                    if valid_if == Some(false) {
                        let nested = self.eval_schema(child, instance, loc, &kw_path)?;
                        if !nested.valid {
                            results.fail(ErrorEntry::new(keyword, template::BRANCH_INVALID));
                        }
                        results.nested.push(nested);
                    } else {
                        let mut marker =
                            EvaluationResults::new(kw_path, child.curi.clone(), loc.clone());
                        marker.skipped = true;
                        results.nested.push(marker);
                    }
                }
                Kind::DependentSchemas(deps) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut invalid = 0;

                        for (name, child) in deps {
                            if !map.contains_key(name) {
                                continue;
                            }
                            let nested = self.eval_schema(
                                child,
                                instance,
                                loc,
                                &kw_path.push_prop(name),
                            )?;
                            invalid += usize::from(!nested.valid);
                            results.nested.push(nested);
                        }
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }
                Kind::Dependencies(deps) => {
                    if let Value::Object(map) = instance {
                        let kw_path = eval_path.push_prop(keyword);
                        let mut invalid = 0;

                        for (name, dep) in deps {
                            if !map.contains_key(name) {
                                continue;
                            }
                            match dep {
                                Dependency::Required(wanted) => {
                                    let missing: Vec<Value> = wanted
                                        .iter()
                                        .filter(|w| !map.contains_key(*w))
                                        .map(|w| Value::String(w.clone()))
                                        .collect();
                                    if !missing.is_empty() {
                                        results.fail(
                                            ErrorEntry::new(
                                                keyword,
                                                template::DEPENDENT_REQUIRED,
                                            )
                                            .with("missing", Value::Array(missing))
                                            .with("reason", name.clone()),
                                        );
                                    }
                                }
                                Dependency::Schema(child) => {
                                    let nested = self.eval_schema(
                                        child,
                                        instance,
                                        loc,
                                        &kw_path.push_prop(name),
                                    )?;
                                    invalid += usize::from(!nested.valid);
                                    results.nested.push(nested);
                                }
                            }
                        }
                        if invalid > 0 {
                            results.fail(
                                ErrorEntry::new(keyword, template::CHILD_INVALID)
                                    .with("count", invalid),
                            );
                        }
                    }
                }

                Kind::Ref(uri) => {
                    let target = self.constraint_for(uri)?;
                    self.apply_ref(keyword, target, instance, loc, eval_path, results)?;
                }
                Kind::DynamicRef { uri, anchor } => {
                    let target = self.resolve_dynamic_target(uri, anchor.as_deref())?;
                    self.apply_ref(keyword, target, instance, loc, eval_path, results)?;
                }
                Kind::RecursiveRef(lexical) => {
                    let target = self.resolve_recursive_target(lexical)?;
                    self.apply_ref(keyword, target, instance, loc, eval_path, results)?;
                }
            }

            if short_circuit && !results.valid {
                break;
            }
        }
        Ok(())
    }

    fn check_bound(
        &self,
        keyword: &str,
        instance: &Value,
        bound: &Number,
        results: &mut EvaluationResults,
        ok: impl Fn(&Number, &Number) -> bool,
        template: &'static str,
    ) {
        let Value::Number(n) = instance else {
            return; // Non-numeric instances pass numeric bounds.
        };
        if !ok(&Number::from(n), bound) {
            results.fail(
                ErrorEntry::new(keyword, template)
                    .with("value", instance.clone())
                    .with("limit", Value::from(*bound)),
            );
        }
    }

    /// Evaluates an already-resolved reference target in place,
    /// guarding against re-entrant cycles and unbounded chains.
    fn apply_ref(
        &mut self,
        keyword: &str,
        target: Arc<SchemaConstraint>,
        instance: &Value,
        loc: &Pointer,
        eval_path: &Pointer,
        results: &mut EvaluationResults,
    ) -> Result<(), Error> {
        let key = (Arc::as_ptr(&target) as usize, loc.to_string());
        if !self.visited.insert(key.clone()) {
            // Re-entering the same schema at the same instance location:
            // valid by convention, as a cyclic reference proves nothing new.
            return Ok(());
        }

        self.ref_depth += 1;
        let outcome = if self.ref_depth > self.options.max_ref_depth {
            Err(Error::RecursionLimitExceeded {
                limit: self.options.max_ref_depth,
                instance: loc.to_string(),
            })
        } else {
            self.eval_schema(&target, instance, loc, &eval_path.push_prop(keyword))
        };
        self.ref_depth -= 1;
        self.visited.remove(&key);

        let nested = outcome?;
        if !nested.valid {
            results.fail(ErrorEntry::new(keyword, template::REF_INVALID));
        }
        results.nested.push(nested);
        Ok(())
    }

    /// Looks up or lazily compiles the constraint for an absolute URI,
    /// loading its document through the resource loader if needed.
    pub fn constraint_for(&mut self, uri: &Url) -> Result<Arc<SchemaConstraint>, Error> {
        if let Some(cached) = self.cache.get(uri) {
            return Ok(cached.clone());
        }

        let mut sans = uri.clone();
        sans.set_fragment(None);
        if !self.resolver.contains(&sans) {
            if let Some(doc) = self.loader.load(&sans) {
                self.resolver
                    .add_document(sans, Arc::new(doc), self.draft)
                    .map_err(compile::Error::Resolver)?;
            }
        }

        let schema = self.resolver.resolve(uri).map_err(compile::Error::Resolver)?;
        let mut compiler = Compiler {
            registry: self.registry,
            options: self.options,
            draft: self.draft,
            cache: &mut *self.cache,
        };
        let compiled = compiler.compile(&schema)?;

        // Also cache under the queried URI (it may be an anchor form).
        self.cache.insert(uri.clone(), compiled.clone());
        Ok(compiled)
    }

    /// Resolves a `$dynamicRef`: if the static target is a
    /// `$dynamicAnchor`, the outermost dynamic-scope resource declaring
    /// the anchor wins; otherwise plain `$ref` behavior (bookending).
    fn resolve_dynamic_target(
        &mut self,
        uri: &Url,
        anchor: Option<&str>,
    ) -> Result<Arc<SchemaConstraint>, Error> {
        let Some(anchor) = anchor else {
            return self.constraint_for(uri);
        };

        // Ensure the static target's document is loaded and indexed, and
        // check whether the target anchor is dynamic at all.
        let static_target = self.constraint_for(uri)?;
        if self
            .resolver
            .dynamic_anchor(&static_target.base, anchor)
            .is_none()
        {
            return Ok(static_target);
        }

        for base in self.scopes.clone() {
            if let Some(found) = self.resolver.dynamic_anchor(&base, anchor) {
                return self.constraint_for(&found);
            }
        }
        Ok(static_target)
    }

    /// Resolves a `$recursiveRef "#"` (2019-09): when the lexical target
    /// resource declares `$recursiveAnchor: true`, the outermost scope
    /// resource which also declares it wins.
    fn resolve_recursive_target(&mut self, lexical: &Url) -> Result<Arc<SchemaConstraint>, Error> {
        if !self.resolver.recursive_base(lexical) {
            return self.constraint_for(lexical);
        }
        for base in self.scopes.clone() {
            if self.resolver.recursive_base(&base) {
                return self.constraint_for(&base);
            }
        }
        self.constraint_for(lexical)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match &self.options.cancel {
            Some(token) if token.load(std::sync::atomic::Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
