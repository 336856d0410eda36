use jsval::{draft, Draft, Evaluator, Options, Registry, UnknownKeywords};
use serde_json::{json, Value};
use std::sync::Arc;

mod utils;
use utils::{check_cases, evaluator};

#[test]
fn test_type_integer_accepts_integral_numbers() {
    check_cases(
        None,
        json!({"type": "integer"}),
        &[
            ("integer", json!(1), true),
            ("integral float", json!(1.0), true),
            ("fractional float", json!(1.5), false),
            ("negative", json!(-3), true),
            ("string", json!("1"), false),
        ],
    );

    // The failure names the received and expected types.
    let mut evaluator = evaluator(None);
    let root = evaluator.compile(&json!({"type": "integer"}), None).unwrap();
    let results = evaluator.evaluate(&root, &json!(1.5)).unwrap();

    assert!(!results.valid);
    assert_eq!(&*results.errors[0].keyword, "type");
    assert_eq!(
        results.errors[0].params,
        vec![
            ("received", json!("number")),
            ("expected", json!("integer")),
        ],
    );
}

#[test]
fn test_type_sets() {
    check_cases(
        None,
        json!({"type": ["string", "null"]}),
        &[
            ("string", json!("s"), true),
            ("null", json!(null), true),
            ("number", json!(1), false),
        ],
    );
    check_cases(
        None,
        json!({"type": "number"}),
        &[
            ("integer satisfies number", json!(3), true),
            ("fraction", json!(3.5), true),
            ("bool", json!(true), false),
        ],
    );
}

#[test]
fn test_const_and_enum_normalize_numbers() {
    check_cases(
        None,
        json!({"const": {"a": 1}}),
        &[
            ("equal with float form", json!({"a": 1.0}), true),
            ("unequal", json!({"a": 2}), false),
            ("different shape", json!([1]), false),
        ],
    );
    check_cases(
        None,
        json!({"enum": [1, "two", [3]]}),
        &[
            ("number matches as float", json!(1.0), true),
            ("string", json!("two"), true),
            ("array", json!([3]), true),
            ("not a member", json!(2), false),
        ],
    );
}

#[test]
fn test_numeric_keywords() {
    check_cases(
        None,
        json!({"minimum": 2, "maximum": 4, "multipleOf": 0.5}),
        &[
            ("inside", json!(2.5), true),
            ("at bounds", json!(2), true),
            ("below", json!(1.5), false),
            ("above", json!(4.5), false),
            ("non-multiple", json!(2.25), false),
            ("non-numbers pass", json!("x"), true),
        ],
    );
    check_cases(
        None,
        json!({"exclusiveMinimum": 2, "exclusiveMaximum": 4}),
        &[
            ("inside", json!(3), true),
            ("at lower bound", json!(2), false),
            ("at upper bound", json!(4), false),
        ],
    );
}

#[test]
fn test_string_keywords() {
    check_cases(
        None,
        json!({"minLength": 2, "maxLength": 4, "pattern": "^a"}),
        &[
            ("fits", json!("abc"), true),
            ("too short", json!("a"), false),
            ("too long", json!("abcde"), false),
            ("pattern miss", json!("xbc"), false),
            ("non-strings pass", json!(5), true),
        ],
    );

    // Lengths count Unicode scalar values, not bytes.
    check_cases(
        None,
        json!({"maxLength": 3}),
        &[("three snowmen", json!("☃☃☃"), true)],
    );
}

#[test]
fn test_array_keywords() {
    check_cases(
        None,
        json!({"minItems": 1, "maxItems": 3, "uniqueItems": true}),
        &[
            ("fits", json!([1, 2]), true),
            ("empty", json!([]), false),
            ("too long", json!([1, 2, 3, 4]), false),
            ("duplicates", json!([1, 1.0]), false),
            ("non-arrays pass", json!("x"), true),
        ],
    );
}

#[test]
fn test_object_keywords() {
    check_cases(
        None,
        json!({"minProperties": 1, "maxProperties": 2, "required": ["a"]}),
        &[
            ("fits", json!({"a": 1}), true),
            ("empty", json!({}), false),
            ("missing required", json!({"b": 1, "c": 2}), false),
            ("too many", json!({"a": 1, "b": 2, "c": 3}), false),
        ],
    );
}

#[test]
fn test_properties_and_additional_properties() {
    let schema = json!({
        "properties": {"a": {"type": "string"}},
        "additionalProperties": false,
    });
    check_cases(
        None,
        schema.clone(),
        &[
            ("only known keys", json!({"a": "x"}), true),
            ("extra key rejected", json!({"a": "x", "b": 1}), false),
            ("known key of wrong type", json!({"a": 1}), false),
        ],
    );

    // The additionalProperties failure points at the extra key.
    let mut evaluator = evaluator(None);
    let root = evaluator.compile(&schema, None).unwrap();
    let results = evaluator.evaluate(&root, &json!({"a": "x", "b": 1})).unwrap();

    let child = results
        .nested
        .iter()
        .find(|nested| !nested.valid)
        .expect("the additionalProperties application failed");
    assert_eq!(child.instance_location.to_string(), "/b");
    assert_eq!(child.keyword_location.to_string(), "/additionalProperties");
}

#[test]
fn test_pattern_properties_cover_keys() {
    check_cases(
        None,
        json!({
            "properties": {"a": true},
            "patternProperties": {"^x-": {"type": "integer"}},
            "additionalProperties": false,
        }),
        &[
            ("all covered", json!({"a": 1, "x-b": 2}), true),
            ("pattern value invalid", json!({"x-b": "s"}), false),
            ("uncovered key", json!({"other": 1}), false),
        ],
    );
}

#[test]
fn test_property_names() {
    check_cases(
        None,
        json!({"propertyNames": {"maxLength": 3}}),
        &[
            ("short names", json!({"ab": 1, "abc": 2}), true),
            ("long name", json!({"abcd": 1}), false),
            ("non-objects pass", json!([1]), true),
        ],
    );
}

#[test]
fn test_prefix_items_and_items() {
    // prefixItems covers index 0; items covers the remainder.
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "prefixItems": [{"type": "integer"}],
            "items": {"type": "string"},
        }),
        &[
            ("prefix and rest", json!([1, "x", "y"]), true),
            ("bad prefix", json!(["x", "y"]), false),
            ("bad rest", json!([1, 2]), false),
            ("prefix alone", json!([1]), true),
            ("empty", json!([]), true),
        ],
    );
}

#[test]
fn test_legacy_items_array_and_additional_items() {
    check_cases(
        Some(Draft::Draft7),
        json!({
            "items": [{"const": "hi"}],
            "additionalItems": {"const": "a"},
        }),
        &[
            ("tuple then additional", json!(["hi", "a", "a"]), true),
            ("bad additional", json!(["hi", "a", "B"]), false),
            ("bad tuple item", json!(["bye"]), false),
        ],
    );

    // additionalItems is inert when items is a lone schema.
    check_cases(
        Some(Draft::Draft7),
        json!({
            "items": {"type": "integer"},
            "additionalItems": false,
        }),
        &[("items covers everything", json!([1, 2, 3]), true)],
    );
}

#[test]
fn test_contains_with_bounds() {
    check_cases(
        Some(Draft::Draft202012),
        json!({"contains": {"type": "integer"}}),
        &[
            ("one match", json!(["a", 1]), true),
            ("no match", json!(["a", "b"]), false),
            ("empty array", json!([]), false),
        ],
    );
    check_cases(
        Some(Draft::Draft202012),
        json!({"contains": {"type": "integer"}, "minContains": 2, "maxContains": 3}),
        &[
            ("two matches", json!([1, "a", 2]), true),
            ("one match", json!([1, "a"]), false),
            ("four matches", json!([1, 2, 3, 4]), false),
        ],
    );
    // minContains of zero makes an empty match set acceptable.
    check_cases(
        Some(Draft::Draft202012),
        json!({"contains": {"type": "integer"}, "minContains": 0}),
        &[("no match needed", json!(["a"]), true)],
    );
}

#[test]
fn test_boolean_combinators() {
    check_cases(
        None,
        json!({"allOf": [{"type": "integer"}, {"minimum": 3}]}),
        &[
            ("both hold", json!(4), true),
            ("one fails", json!(1), false),
        ],
    );
    check_cases(
        None,
        json!({"anyOf": [{"type": "string"}, {"minimum": 3}]}),
        &[
            ("second holds", json!(5), true),
            ("neither holds", json!(1), false),
        ],
    );
    check_cases(
        None,
        json!({"oneOf": [{"type": "integer"}, {"minimum": 3}]}),
        &[
            ("exactly one", json!(1), true),
            ("both hold", json!(5), false),
            ("neither holds", json!(1.5), false),
        ],
    );
    check_cases(
        None,
        json!({"not": {"type": "integer"}}),
        &[
            ("not an integer", json!("x"), true),
            ("an integer", json!(3), false),
        ],
    );
}

#[test]
fn test_if_then_else() {
    let schema = json!({
        "if": {"type": "integer"},
        "then": {"minimum": 10},
        "else": {"maxLength": 2},
    });
    check_cases(
        None,
        schema,
        &[
            ("if holds, then holds", json!(15), true),
            ("if holds, then fails", json!(5), false),
            ("if fails, else holds", json!("ab"), true),
            ("if fails, else fails", json!("abc"), false),
        ],
    );

    // then without if is never applied.
    check_cases(
        None,
        json!({"then": {"minimum": 10}}),
        &[("ignored", json!(1), true)],
    );
}

#[test]
fn test_dependent_keywords() {
    check_cases(
        Some(Draft::Draft201909),
        json!({"dependentRequired": {"credit": ["billing"]}}),
        &[
            ("dependency satisfied", json!({"credit": 1, "billing": 2}), true),
            ("dependency missing", json!({"credit": 1}), false),
            ("trigger absent", json!({"other": 1}), true),
        ],
    );
    check_cases(
        Some(Draft::Draft202012),
        json!({"dependentSchemas": {"credit": {"required": ["billing"]}}}),
        &[
            ("schema applied", json!({"credit": 1, "billing": 2}), true),
            ("schema fails", json!({"credit": 1}), false),
        ],
    );
}

#[test]
fn test_legacy_dependencies() {
    check_cases(
        Some(Draft::Draft7),
        json!({
            "dependencies": {
                "a": ["b"],
                "c": {"required": ["d"]},
            }
        }),
        &[
            ("required form", json!({"a": 1, "b": 2}), true),
            ("required form fails", json!({"a": 1}), false),
            ("schema form", json!({"c": 1, "d": 2}), true),
            ("schema form fails", json!({"c": 1}), false),
            ("no triggers", json!({"x": 1}), true),
        ],
    );
}

#[test]
fn test_unevaluated_properties_sees_nested_applicators() {
    // `properties` inside allOf still annotates `a`, which is visible to
    // the outer unevaluatedProperties.
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "allOf": [{"properties": {"a": true}}],
            "unevaluatedProperties": false,
        }),
        &[
            ("covered key", json!({"a": 1}), true),
            ("uncovered key", json!({"a": 1, "b": 2}), false),
        ],
    );

    // Annotations of failed branches are dropped.
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "anyOf": [
                {"properties": {"a": true}, "required": ["a"]},
                {"properties": {"b": true}, "required": ["b"]},
            ],
            "unevaluatedProperties": false,
        }),
        &[
            ("first branch covers", json!({"a": 1}), true),
            ("second branch covers", json!({"b": 1}), true),
            // `a` is matched only by the failed first branch.
            ("mixed keys", json!({"a": 1, "c": 2}), false),
        ],
    );
}

#[test]
fn test_unevaluated_properties_with_branches() {
    let schema = json!({
        "if": {"required": ["kind"]},
        "then": {"properties": {"kind": true, "payload": true}},
        "unevaluatedProperties": false,
    });
    check_cases(
        Some(Draft::Draft202012),
        schema,
        &[
            ("then branch covers", json!({"kind": "a", "payload": 1}), true),
            ("branch not taken", json!({"payload": 1}), false),
        ],
    );
}

#[test]
fn test_unevaluated_properties_subschema_applies() {
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "properties": {"a": true},
            "unevaluatedProperties": {"type": "integer"},
        }),
        &[
            ("remainder conforms", json!({"a": "s", "b": 3}), true),
            ("remainder violates", json!({"a": "s", "b": "x"}), false),
        ],
    );
}

#[test]
fn test_unevaluated_items() {
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "allOf": [{"prefixItems": [true]}],
            "unevaluatedItems": false,
        }),
        &[
            ("prefix only", json!([1]), true),
            ("trailing item", json!([1, 2]), false),
        ],
    );

    // From 2020-12, indices matched by `contains` are evaluated.
    check_cases(
        Some(Draft::Draft202012),
        json!({
            "contains": {"type": "integer"},
            "unevaluatedItems": false,
        }),
        &[
            ("all match contains", json!([1, 2]), true),
            ("string escapes contains", json!([1, "x"]), false),
        ],
    );
    // In 2019-09 they are not.
    check_cases(
        Some(Draft::Draft201909),
        json!({
            "contains": {"type": "integer"},
            "unevaluatedItems": false,
        }),
        &[("contains matches are still unevaluated", json!([1, 2]), false)],
    );
}

#[test]
fn test_boolean_schemas() {
    check_cases(None, json!(true), &[("anything", json!({"a": 1}), true)]);
    check_cases(None, json!(false), &[("nothing", json!(null), false)]);

    assert!(jsval::is_valid(&json!(true), &json!(null)).unwrap());
    assert!(!jsval::is_valid(&json!(false), &json!(null)).unwrap());
}

#[test]
fn test_format_is_annotation_only_by_default() {
    check_cases(
        None,
        json!({"format": "date-time"}),
        &[("not asserted", json!("not a date"), true)],
    );

    let mut evaluator = Evaluator::new(
        Options::default()
            .with_draft(Draft::Draft202012)
            .with_format_assertion(),
    );
    let root = evaluator.compile(&json!({"format": "date-time"}), None).unwrap();

    let results = evaluator
        .evaluate(&root, &json!("2022-09-11T10:31:25Z"))
        .unwrap();
    assert!(results.valid);
    assert_eq!(results.annotation("format"), Some(&json!("date-time")));

    let results = evaluator.evaluate(&root, &json!("not a date")).unwrap();
    assert!(!results.valid);

    // Unknown format names never assert.
    let root = evaluator
        .compile(&json!({"format": "a-nonstandard-format"}), None)
        .unwrap();
    let results = evaluator.evaluate(&root, &json!("anything")).unwrap();
    assert!(results.valid);
    assert_eq!(
        results.annotation("format"),
        Some(&json!("a-nonstandard-format"))
    );
}

#[test]
fn test_unknown_keywords_annotate_or_error() {
    let schema = json!({"x-internal": {"team": "core"}});

    let mut evaluator = evaluator(None);
    let root = evaluator.compile(&schema, None).unwrap();
    let results = evaluator.evaluate(&root, &json!(1)).unwrap();
    assert!(results.valid);
    assert_eq!(
        results.annotation("x-internal"),
        Some(&json!({"team": "core"}))
    );

    let mut strict = Evaluator::new(
        Options::default().with_unknown_keywords(UnknownKeywords::Error),
    );
    let err = strict.compile(&schema, None).unwrap_err();
    assert!(err.to_string().contains("unknown keyword 'x-internal'"));
}

struct MultipleOfLength;

impl jsval::CustomKeyword for MultipleOfLength {
    fn compile(&self, value: &Value) -> Result<(), String> {
        match value {
            Value::Number(n) if n.as_u64().map_or(false, |n| n > 0) => Ok(()),
            _ => Err("expected a positive integer".to_string()),
        }
    }

    fn evaluate(&self, value: &Value, instance: &Value) -> Result<Option<Value>, String> {
        let Value::String(s) = instance else {
            return Ok(None);
        };
        let factor = value.as_u64().unwrap() as usize;
        if s.chars().count() % factor == 0 {
            Ok(Some(value.clone()))
        } else {
            Err(format!("length is not a multiple of {factor}"))
        }
    }
}

#[test]
fn test_custom_keyword_plugin() {
    let mut registry = Registry::new();
    registry
        .register(
            jsval::Descriptor::new("x-multipleOfLength", 0, draft::ALL),
            Arc::new(MultipleOfLength),
        )
        .unwrap();

    let mut evaluator = Evaluator::with_registry(
        Options::default().with_unknown_keywords(UnknownKeywords::Evaluate),
        registry,
    );
    let root = evaluator
        .compile(&json!({"x-multipleOfLength": 3}), None)
        .unwrap();

    assert!(evaluator.evaluate(&root, &json!("abcdef")).unwrap().valid);
    assert!(!evaluator.evaluate(&root, &json!("abcd")).unwrap().valid);

    // The plugin validates its own form at compile time.
    let err = evaluator
        .compile(&json!({"x-multipleOfLength": "three"}), None)
        .unwrap_err();
    assert!(err.to_string().contains("invalid form"));
}

#[test]
fn test_invalid_keyword_forms() {
    let cases = [
        (Some(Draft::Draft202012), json!({"items": [{"type": "integer"}]})),
        (
            Some(Draft::Draft201909),
            json!({"items": [true], "prefixItems": [true]}),
        ),
        (None, json!({"multipleOf": 0})),
        (None, json!({"multipleOf": -2})),
        (None, json!({"minLength": -1})),
        (None, json!({"type": "float"})),
        (None, json!({"enum": "not-an-array"})),
        (None, json!({"required": [1]})),
    ];
    for (draft, schema) in cases {
        let mut evaluator = evaluator(draft);
        let err = evaluator.compile(&schema, None).unwrap_err();
        assert!(
            err.to_string().contains("invalid form"),
            "schema {schema}: {err}"
        );
    }
}

#[test]
fn test_invalid_pattern() {
    let mut evaluator = evaluator(None);
    let err = evaluator.compile(&json!({"pattern": "[unclosed"}), None).unwrap_err();
    assert!(err.to_string().contains("invalid pattern"));

    let err = evaluator
        .compile(&json!({"patternProperties": {"[unclosed": true}}), None)
        .unwrap_err();
    assert!(err.to_string().contains("invalid pattern"));
}

#[test]
fn test_metadata_annotations_survive_valid_evaluations() {
    let mut evaluator = evaluator(None);
    let root = evaluator
        .compile(
            &json!({
                "title": "A thing",
                "default": 42,
                "deprecated": true,
                "type": "integer",
            }),
            None,
        )
        .unwrap();

    let results = evaluator.evaluate(&root, &json!(1)).unwrap();
    assert!(results.valid);
    assert_eq!(results.annotation("title"), Some(&json!("A thing")));
    assert_eq!(results.annotation("default"), Some(&json!(42)));
    assert_eq!(results.annotation("deprecated"), Some(&json!(true)));

    // Annotations of invalid evaluations are not surfaced.
    let results = evaluator.evaluate(&root, &json!("nope")).unwrap();
    assert!(!results.valid);
}

#[test]
fn test_cancellation() {
    let token = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut evaluator = Evaluator::new(
        Options::default().with_cancellation(token.clone()),
    );
    let root = evaluator.compile(&json!({"type": "integer"}), None).unwrap();

    assert!(evaluator.evaluate(&root, &json!(1)).is_ok());

    token.store(true, std::sync::atomic::Ordering::Relaxed);
    let err = evaluator.evaluate(&root, &json!(1)).unwrap_err();
    assert!(matches!(err, jsval::eval::Error::Cancelled));
}

#[test]
fn test_meta_schema_validation_gate() {
    // The draft meta-schema is served through the resource loader; a
    // stand-in requiring `type` keeps the fixture small.
    let mut loader = jsval::MapLoader::new();
    loader.insert(
        url::Url::parse("https://json-schema.org/draft/2020-12/schema").unwrap(),
        json!({"required": ["type"]}),
    );

    let options = Options::default()
        .with_draft(Draft::Draft202012)
        .with_schema_validation();

    let mut evaluator = Evaluator::new(options.clone()).with_loader(Box::new(loader));
    assert!(evaluator.compile(&json!({"type": "integer"}), None).is_ok());

    let err = evaluator.compile(&json!({"minimum": 3}), None).unwrap_err();
    assert!(err.to_string().contains("meta-schema"));

    // Without a loader the meta-schema is unreachable.
    let mut unreachable = Evaluator::new(options);
    let err = unreachable.compile(&json!({"type": "integer"}), None).unwrap_err();
    assert!(err.to_string().contains("was not found"));
}

#[test]
fn test_compilation_is_pure() {
    let schema = json!({
        "type": "object",
        "properties": {"a": {"$ref": "#/$defs/n"}},
        "$defs": {"n": {"type": "integer"}},
        "allOf": [{"minProperties": 1}],
        "unevaluatedProperties": false,
    });

    // Two independent compilations agree on keyword order and locations.
    let fingerprint = || {
        let mut evaluator = evaluator(None);
        let root = evaluator.compile(&schema, None).unwrap();
        (
            root.curi.to_string(),
            root.constraints
                .iter()
                .map(|c| c.keyword.to_string())
                .collect::<Vec<_>>(),
        )
    };
    assert_eq!(fingerprint(), fingerprint());
}

#[test]
fn test_draft_inference_from_schema_keyword() {
    // Under draft 7, `if`/`then` apply.
    let schema = json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "if": {"type": "integer"},
        "then": {"minimum": 10},
    });
    check_cases(None, schema, &[("then applies", json!(5), false)]);

    // Under draft 6 they are unknown keywords, and only annotate.
    let schema = json!({
        "$schema": "http://json-schema.org/draft-06/schema#",
        "if": {"type": "integer"},
        "then": {"minimum": 10},
    });
    check_cases(None, schema, &[("if is inert", json!(5), true)]);
}
