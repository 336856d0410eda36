pub mod compare;
pub mod compile;
pub mod draft;
pub mod eval;
pub mod formats;
pub mod number;
pub mod output;
pub mod ptr;
pub mod registry;
pub mod resolver;
pub mod results;
pub mod schema;

pub use compile::SchemaConstraint;
pub use draft::Draft;
pub use number::Number;
pub use output::Output;
pub use ptr::Pointer;
pub use registry::{CustomKeyword, Descriptor, Registry};
pub use resolver::{MapLoader, NoLoader, ResourceLoader};
pub use results::EvaluationResults;
pub use schema::Schema;

use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use url::Url;

/// How the engine treats keywords it doesn't recognize in the active draft.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnknownKeywords {
    /// Collect the raw value as an annotation. The default.
    Annotate,
    /// Evaluate keywords registered through the plugin surface;
    /// unregistered ones are annotated.
    Evaluate,
    /// Fail compilation with `UnknownKeyword`.
    Error,
}

/// Options of an evaluation run.
#[derive(Clone)]
pub struct Options {
    /// Evaluate under this draft; None infers from `$schema`, falling
    /// back to 2020-12.
    pub draft: Option<Draft>,
    pub output: Output,
    /// Assert `format` rather than only annotating it.
    pub assert_formats: bool,
    pub unknown_keywords: UnknownKeywords,
    /// Validate schema documents against their draft meta-schema (which
    /// must be reachable through the resource loader) before compiling.
    pub validate_schema: bool,
    /// Bounds chained `$ref` traversals within one evaluation.
    pub max_ref_depth: usize,
    /// Checked between keyword evaluations; when set, evaluation stops
    /// with `Cancelled`.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Per-keyword overrides of error-message templates.
    pub templates: FxHashMap<String, String>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            draft: None,
            output: Output::Basic,
            assert_formats: false,
            unknown_keywords: UnknownKeywords::Annotate,
            validate_schema: false,
            max_ref_depth: 100,
            cancel: None,
            templates: FxHashMap::default(),
        }
    }
}

impl Options {
    pub fn with_draft(mut self, draft: Draft) -> Options {
        self.draft = Some(draft);
        self
    }

    pub fn with_output(mut self, output: Output) -> Options {
        self.output = output;
        self
    }

    pub fn with_format_assertion(mut self) -> Options {
        self.assert_formats = true;
        self
    }

    pub fn with_unknown_keywords(mut self, mode: UnknownKeywords) -> Options {
        self.unknown_keywords = mode;
        self
    }

    pub fn with_schema_validation(mut self) -> Options {
        self.validate_schema = true;
        self
    }

    pub fn with_max_ref_depth(mut self, depth: usize) -> Options {
        self.max_ref_depth = depth;
        self
    }

    pub fn with_cancellation(mut self, token: Arc<AtomicBool>) -> Options {
        self.cancel = Some(token);
        self
    }

    pub fn with_template(mut self, keyword: &str, template: &str) -> Options {
        self.templates
            .insert(keyword.to_string(), template.to_string());
        self
    }
}

/// Evaluator is the engine entry point: it compiles schema documents
/// into constraint graphs and drives them against instances. Compiled
/// constraints are cached across evaluations; an Evaluator is
/// single-threaded, and concurrent validations use separate Evaluators.
pub struct Evaluator {
    registry: Registry,
    options: Options,
    resolver: resolver::Resolver,
    loader: Box<dyn ResourceLoader>,
    cache: FxHashMap<Url, Arc<SchemaConstraint>>,
    draft: Draft,
    roots: usize,
}

impl Evaluator {
    pub fn new(options: Options) -> Evaluator {
        Self::with_registry(options, Registry::new())
    }

    pub fn with_registry(options: Options, registry: Registry) -> Evaluator {
        Evaluator {
            registry,
            options,
            resolver: resolver::Resolver::new(),
            loader: Box::new(NoLoader),
            cache: FxHashMap::default(),
            draft: Draft::Draft202012,
            roots: 0,
        }
    }

    /// Installs the resource loader consulted for unseen `$ref` targets.
    pub fn with_loader(mut self, loader: Box<dyn ResourceLoader>) -> Evaluator {
        self.loader = loader;
        self
    }

    /// The registry, for registering custom keywords before compiling.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The draft resolved by the most recent compilation.
    pub fn draft(&self) -> Draft {
        self.draft
    }

    /// Compiles a schema document into its root constraint. The document
    /// is indexed under `base` (or a generated URI) and its `$ref`
    /// targets compile lazily on first evaluation.
    pub fn compile(
        &mut self,
        schema: &Value,
        base: Option<Url>,
    ) -> Result<Arc<SchemaConstraint>, eval::Error> {
        self.draft = self
            .options
            .draft
            .or_else(|| draft::draft_from_schema(schema))
            .unwrap_or(Draft::Draft202012);

        let uri = match base {
            Some(uri) => uri,
            None => {
                self.roots += 1;
                Url::parse(&format!("json-schema:///{}", self.roots))
                    .expect("generated root URI parses")
            }
        };

        let root_base = if self.resolver.contains(&uri) {
            self.resolver
                .resolve(&uri)
                .map_err(compile::Error::Resolver)?
                .base
        } else {
            self.resolver
                .add_document(uri, Arc::new(schema.clone()), self.draft)
                .map_err(compile::Error::Resolver)?
        };

        if self.options.validate_schema {
            self.validate_against_meta(schema)?;
        }

        let mut ctx = self.context();
        ctx.constraint_for(&root_base)
    }

    /// Evaluates an instance against a compiled root, returning the full
    /// results tree.
    pub fn evaluate(
        &mut self,
        root: &Arc<SchemaConstraint>,
        instance: &Value,
    ) -> Result<EvaluationResults, eval::Error> {
        let mut ctx = self.context();
        ctx.eval_schema(root, instance, &Pointer::root(), &Pointer::root())
    }

    /// Evaluates and renders the configured output format.
    pub fn apply(
        &mut self,
        root: &Arc<SchemaConstraint>,
        instance: &Value,
    ) -> Result<Value, eval::Error> {
        let results = self.evaluate(root, instance)?;
        Ok(output::build(
            &results,
            self.options.output,
            &self.options.templates,
        ))
    }

    fn validate_against_meta(&mut self, schema: &Value) -> Result<(), eval::Error> {
        let meta_uri =
            Url::parse(self.draft.meta_schema_uri()).expect("meta-schema URIs parse");

        let mut ctx = self.context();
        let meta = ctx.constraint_for(&meta_uri)?;
        let results = ctx.eval_schema(&meta, schema, &Pointer::root(), &Pointer::root())?;

        if !results.valid {
            return Err(compile::Error::FailedMetaSchema {
                count: results.error_count(),
            }
            .into());
        }
        Ok(())
    }

    fn context(&mut self) -> eval::Context<'_> {
        eval::Context {
            registry: &self.registry,
            options: &self.options,
            draft: self.draft,
            resolver: &mut self.resolver,
            loader: &*self.loader,
            cache: &mut self.cache,
            scopes: Vec::new(),
            visited: fxhash::FxHashSet::default(),
            ref_depth: 0,
        }
    }
}

/// Compiles and evaluates in one step, reporting only validity.
pub fn is_valid(schema: &Value, instance: &Value) -> Result<bool, eval::Error> {
    let mut evaluator = Evaluator::new(Options::default().with_output(Output::Flag));
    let root = evaluator.compile(schema, None)?;
    Ok(evaluator.evaluate(&root, instance)?.valid)
}
