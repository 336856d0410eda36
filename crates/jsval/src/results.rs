use crate::ptr::Pointer;
use fxhash::FxHashMap;
use serde_json::Value;
use url::Url;

/// Message templates for keyword assertion failures. `[[name]]`
/// placeholders substitute from the error's parameter map, and callers
/// may override any template by keyword name.
pub mod template {
    pub const ALWAYS_FAIL: &str = "the schema does not permit this location to exist";
    pub const TYPE: &str = "value is [[received]] but should be [[expected]]";
    pub const CONST: &str = "value should equal [[expected]]";
    pub const ENUM: &str = "value should be one of the enumerated constants";
    pub const MULTIPLE_OF: &str = "[[value]] is not a multiple of [[divisor]]";
    pub const MAXIMUM: &str = "[[value]] should be at most [[limit]]";
    pub const EXCLUSIVE_MAXIMUM: &str = "[[value]] should be less than [[limit]]";
    pub const MINIMUM: &str = "[[value]] should be at least [[limit]]";
    pub const EXCLUSIVE_MINIMUM: &str = "[[value]] should be greater than [[limit]]";
    pub const MAX_LENGTH: &str =
        "string has [[actual]] characters but should have at most [[limit]]";
    pub const MIN_LENGTH: &str =
        "string has [[actual]] characters but should have at least [[limit]]";
    pub const PATTERN: &str = "string does not match the pattern [[pattern]]";
    pub const FORMAT: &str = "string is not a valid [[format]]";
    pub const MAX_ITEMS: &str = "array has [[actual]] items but should have at most [[limit]]";
    pub const MIN_ITEMS: &str = "array has [[actual]] items but should have at least [[limit]]";
    pub const UNIQUE_ITEMS: &str = "array items at [[first]] and [[second]] are equal";
    pub const MAX_CONTAINS: &str =
        "array has [[actual]] matching items but should have at most [[limit]]";
    pub const MIN_CONTAINS: &str =
        "array has [[actual]] matching items but should have at least [[limit]]";
    pub const MAX_PROPERTIES: &str =
        "object has [[actual]] properties but should have at most [[limit]]";
    pub const MIN_PROPERTIES: &str =
        "object has [[actual]] properties but should have at least [[limit]]";
    pub const REQUIRED: &str = "required properties [[missing]] are missing";
    pub const DEPENDENT_REQUIRED: &str =
        "properties [[missing]] are required when [[reason]] is present";
    pub const ALL_OF: &str = "[[count]] subschemas failed to validate";
    pub const ANY_OF: &str = "no subschema validated";
    pub const ONE_OF: &str = "[[count]] subschemas validated but exactly one must";
    pub const NOT: &str = "value validated against the schema it must not match";
    pub const CHILD_INVALID: &str = "[[count]] child locations failed to validate";
    pub const REF_INVALID: &str = "the referenced schema failed to validate";
    pub const BRANCH_INVALID: &str = "the applied subschema failed to validate";
    pub const CONTAINS: &str =
        "array has [[actual]] matching items but should have at least [[limit]]";
    pub const CUSTOM: &str = "[[detail]]";
}

/// ErrorEntry is one keyword assertion failure within a schema scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub keyword: Box<str>,
    pub template: &'static str,
    pub params: Vec<(&'static str, Value)>,
}

impl ErrorEntry {
    pub fn new(keyword: &str, template: &'static str) -> ErrorEntry {
        ErrorEntry {
            keyword: keyword.into(),
            template,
            params: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> ErrorEntry {
        self.params.push((name, value.into()));
        self
    }

    /// Renders the message, substituting `[[name]]` placeholders and
    /// honoring per-keyword template overrides.
    pub fn message(&self, overrides: &FxHashMap<String, String>) -> String {
        let template: &str = overrides
            .get(&*self.keyword)
            .map(String::as_str)
            .unwrap_or(self.template);

        let mut out = template.to_string();
        for (name, value) in &self.params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("[[{name}]]"), &rendered);
        }
        out
    }
}

/// EvaluationResults is the outcome of evaluating one schema scope
/// against one instance location: validity, collected annotations and
/// errors, and nested results of applied sub-schemas. Annotations
/// survive only in valid scopes and errors only in invalid ones; readers
/// enforce this by never descending across the validity boundary.
#[derive(Debug, Clone)]
pub struct EvaluationResults {
    pub valid: bool,
    /// Evaluation path from the root schema, through applicators and refs.
    pub keyword_location: Pointer,
    /// Canonical URI of the evaluated schema.
    pub absolute_location: Url,
    /// Location within the instance document.
    pub instance_location: Pointer,
    /// Annotations of this scope's keywords, in evaluation order.
    pub annotations: Vec<(Box<str>, Value)>,
    /// Assertion failures of this scope's keywords, in evaluation order.
    pub errors: Vec<ErrorEntry>,
    /// Results of sub-schema evaluations driven by this scope's keywords.
    pub nested: Vec<EvaluationResults>,
    /// The scope belongs to a branch which was not taken (a `then` with a
    /// failed `if`, or a skipped unevaluated-* keyword). Skipped scopes
    /// carry no annotations or errors and surface only in Verbose output.
    pub skipped: bool,
}

impl EvaluationResults {
    pub fn new(
        keyword_location: Pointer,
        absolute_location: Url,
        instance_location: Pointer,
    ) -> EvaluationResults {
        EvaluationResults {
            valid: true,
            keyword_location,
            absolute_location,
            instance_location,
            annotations: Vec::new(),
            errors: Vec::new(),
            nested: Vec::new(),
            skipped: false,
        }
    }

    /// Attaches an annotation of the given keyword to this scope.
    pub fn annotate(&mut self, keyword: &str, value: Value) {
        self.annotations.push((keyword.into(), value));
    }

    /// Records an assertion failure, invalidating this scope.
    pub fn fail(&mut self, error: ErrorEntry) {
        self.valid = false;
        self.errors.push(error);
    }

    /// Total error entries of this scope and every nested scope.
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.nested.iter().map(Self::error_count).sum::<usize>()
    }

    /// The annotation most recently attached for `keyword`, if any.
    pub fn annotation(&self, keyword: &str) -> Option<&Value> {
        self.annotations
            .iter()
            .rev()
            .find(|(name, _)| &**name == keyword)
            .map(|(_, value)| value)
    }
}
