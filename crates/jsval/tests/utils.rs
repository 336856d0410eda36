use jsval::{Draft, Evaluator, Options};
use serde_json::Value;

/// Builds an Evaluator for the given draft (None infers from `$schema`).
// This is not actually dead code (each integration test file links utils).
#[allow(dead_code)]
pub fn evaluator(draft: Option<Draft>) -> Evaluator {
    let options = match draft {
        Some(draft) => Options::default().with_draft(draft),
        None => Options::default(),
    };
    Evaluator::new(options)
}

/// Compiles `schema` once and checks each named (instance, expected
/// validity) case against it.
#[allow(dead_code)]
pub fn check_cases(draft: Option<Draft>, schema: Value, cases: &[(&str, Value, bool)]) {
    let mut evaluator = evaluator(draft);
    let root = evaluator
        .compile(&schema, None)
        .unwrap_or_else(|err| panic!("schema {schema} failed to compile: {err}"));

    for (name, instance, expect) in cases {
        let results = evaluator
            .evaluate(&root, instance)
            .unwrap_or_else(|err| panic!("case '{name}' failed to evaluate: {err}"));

        assert_eq!(
            results.valid, *expect,
            "case '{name}': instance {instance} against schema {schema}"
        );
    }
}
