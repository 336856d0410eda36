use crate::draft::Draft;
use crate::formats::Format;
use crate::number::Number;
use crate::registry::{CustomKeyword, Registry};
use crate::schema::{keywords as kw, types, Schema};
use crate::{Options, UnknownKeywords};
use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown keyword '{keyword}' at schema '{curi}'")]
    UnknownKeyword { keyword: String, curi: Url },
    #[error("keyword '{keyword}' at schema '{curi}' has an invalid form: {detail}")]
    InvalidKeywordForm {
        keyword: String,
        curi: Url,
        detail: String,
    },
    #[error("invalid pattern '{pattern}' at schema '{curi}': {detail}")]
    InvalidPattern {
        pattern: String,
        curi: Url,
        detail: String,
    },
    #[error("invalid reference '{reference}' at schema '{curi}': {detail}")]
    InvalidReference {
        reference: String,
        curi: Url,
        detail: url::ParseError,
    },
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
    #[error(transparent)]
    Schema(#[from] crate::schema::Error),
    #[error(transparent)]
    Resolver(#[from] crate::resolver::Error),
    #[error("schema does not conform to its meta-schema ({count} errors)")]
    FailedMetaSchema { count: usize },
}

/// SchemaConstraint is the compiled form of one schema node: its
/// keywords, parsed and ordered for evaluation. Immutable once built and
/// shared via Arc between the compilation cache and evaluation trees.
#[derive(Debug)]
pub struct SchemaConstraint {
    /// Canonical URI of the compiled schema node.
    pub curi: Url,
    /// Base URI of the enclosing resource.
    pub base: Url,
    /// `$dynamicAnchor` declared directly on this node, if any.
    pub dynamic_anchor: Option<String>,
    /// Node declares `$recursiveAnchor: true` (2019-09).
    pub recursive_anchor: bool,
    /// Keyword constraints in evaluation order: topological by
    /// sibling-annotation dependencies, then priority, then source order.
    pub constraints: Vec<KeywordConstraint>,
}

#[derive(Debug)]
pub struct KeywordConstraint {
    pub keyword: Box<str>,
    pub kind: Kind,
}

/// Kind is the tagged union of keyword behaviors: each variant carries
/// the keyword's parsed parameters and compiled child constraints.
/// Dispatch over Kind replaces per-keyword polymorphism.
pub enum Kind {
    /// The boolean `false` schema.
    AlwaysFail,
    Type(types::Set),
    Const(Value),
    Enum(Vec<Value>),
    MultipleOf(Number),
    Maximum(Number),
    ExclusiveMaximum(Number),
    Minimum(Number),
    ExclusiveMinimum(Number),
    MaxLength(usize),
    MinLength(usize),
    Pattern(fancy_regex::Regex),
    Format {
        /// None for format names the specification doesn't define, which
        /// never assert.
        format: Option<Format>,
        raw: String,
        assert: bool,
    },
    MaxItems(usize),
    MinItems(usize),
    UniqueItems,
    MaxProperties(usize),
    MinProperties(usize),
    Required(Vec<String>),
    DependentRequired(Vec<(String, Vec<String>)>),
    /// Metadata and unknown keywords annotate their raw value.
    Annotation(Value),

    Properties(Vec<(String, Arc<SchemaConstraint>)>),
    PatternProperties(Vec<(fancy_regex::Regex, String, Arc<SchemaConstraint>)>),
    AdditionalProperties(Arc<SchemaConstraint>),
    PropertyNames(Arc<SchemaConstraint>),
    /// `prefixItems`, or the array form of `items` in earlier drafts.
    Tuple(Vec<Arc<SchemaConstraint>>),
    /// Schema-form `items` / `additionalItems`. `after` names the sibling
    /// whose last-index annotation positions the first applied index.
    Items {
        schema: Arc<SchemaConstraint>,
        after: Option<&'static str>,
    },
    Contains {
        schema: Arc<SchemaConstraint>,
        min: usize,
        max: Option<usize>,
    },
    UnevaluatedProperties(Arc<SchemaConstraint>),
    UnevaluatedItems(Arc<SchemaConstraint>),

    AllOf(Vec<Arc<SchemaConstraint>>),
    AnyOf(Vec<Arc<SchemaConstraint>>),
    OneOf(Vec<Arc<SchemaConstraint>>),
    Not(Arc<SchemaConstraint>),
    If(Arc<SchemaConstraint>),
    Then(Arc<SchemaConstraint>),
    Else(Arc<SchemaConstraint>),
    DependentSchemas(Vec<(String, Arc<SchemaConstraint>)>),
    /// Legacy `dependencies` of drafts 6/7.
    Dependencies(Vec<(String, Dependency)>),

    /// Reference target, resolved and compiled lazily on first
    /// evaluation so that cyclic references terminate.
    Ref(Url),
    DynamicRef {
        uri: Url,
        anchor: Option<String>,
    },
    /// `$recursiveRef: "#"`; the URI is the lexical fallback target.
    RecursiveRef(Url),

    Custom {
        plugin: Arc<dyn CustomKeyword>,
        value: Value,
    },
}

pub enum Dependency {
    Required(Vec<String>),
    Schema(Arc<SchemaConstraint>),
}

impl std::fmt::Debug for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Kind holds closures-adjacent plugin objects; summarize.
        f.write_str(match self {
            Kind::AlwaysFail => "AlwaysFail",
            Kind::Type(_) => "Type",
            Kind::Const(_) => "Const",
            Kind::Enum(_) => "Enum",
            Kind::MultipleOf(_) => "MultipleOf",
            Kind::Maximum(_) => "Maximum",
            Kind::ExclusiveMaximum(_) => "ExclusiveMaximum",
            Kind::Minimum(_) => "Minimum",
            Kind::ExclusiveMinimum(_) => "ExclusiveMinimum",
            Kind::MaxLength(_) => "MaxLength",
            Kind::MinLength(_) => "MinLength",
            Kind::Pattern(_) => "Pattern",
            Kind::Format { .. } => "Format",
            Kind::MaxItems(_) => "MaxItems",
            Kind::MinItems(_) => "MinItems",
            Kind::UniqueItems => "UniqueItems",
            Kind::MaxProperties(_) => "MaxProperties",
            Kind::MinProperties(_) => "MinProperties",
            Kind::Required(_) => "Required",
            Kind::DependentRequired(_) => "DependentRequired",
            Kind::Annotation(_) => "Annotation",
            Kind::Properties(_) => "Properties",
            Kind::PatternProperties(_) => "PatternProperties",
            Kind::AdditionalProperties(_) => "AdditionalProperties",
            Kind::PropertyNames(_) => "PropertyNames",
            Kind::Tuple(_) => "Tuple",
            Kind::Items { .. } => "Items",
            Kind::Contains { .. } => "Contains",
            Kind::UnevaluatedProperties(_) => "UnevaluatedProperties",
            Kind::UnevaluatedItems(_) => "UnevaluatedItems",
            Kind::AllOf(_) => "AllOf",
            Kind::AnyOf(_) => "AnyOf",
            Kind::OneOf(_) => "OneOf",
            Kind::Not(_) => "Not",
            Kind::If(_) => "If",
            Kind::Then(_) => "Then",
            Kind::Else(_) => "Else",
            Kind::DependentSchemas(_) => "DependentSchemas",
            Kind::Dependencies(_) => "Dependencies",
            Kind::Ref(_) => "Ref",
            Kind::DynamicRef { .. } => "DynamicRef",
            Kind::RecursiveRef(_) => "RecursiveRef",
            Kind::Custom { .. } => "Custom",
        })
    }
}

/// Structural keywords are consumed by the reference index and the
/// compiler itself, and produce no constraint.
fn is_structural(name: &str) -> bool {
    matches!(
        name,
        kw::SCHEMA
            | kw::ID
            | kw::VOCABULARY
            | kw::COMMENT
            | kw::DEFS
            | kw::DEFINITIONS
            | kw::ANCHOR
            | kw::DYNAMIC_ANCHOR
            | kw::RECURSIVE_ANCHOR
    )
}

/// Compiler transforms schema nodes into SchemaConstraints. Compilation
/// never touches the instance; the cache is keyed by canonical URI and
/// shared with the driver, which extends it when references compile
/// lazily.
pub(crate) struct Compiler<'c> {
    pub registry: &'c Registry,
    pub options: &'c Options,
    pub draft: Draft,
    pub cache: &'c mut FxHashMap<Url, Arc<SchemaConstraint>>,
}

impl<'c> Compiler<'c> {
    pub fn compile(&mut self, schema: &Schema) -> Result<Arc<SchemaConstraint>, Error> {
        if let Some(cached) = self.cache.get(&schema.curi) {
            return Ok(cached.clone());
        }
        tracing::debug!(curi = %schema.curi, "compiling schema");

        let compiled = Arc::new(self.compile_uncached(schema)?);
        self.cache.insert(schema.curi.clone(), compiled.clone());
        Ok(compiled)
    }

    fn compile_uncached(&mut self, schema: &Schema) -> Result<SchemaConstraint, Error> {
        let mut compiled = SchemaConstraint {
            curi: schema.curi.clone(),
            base: schema.base.clone(),
            dynamic_anchor: None,
            recursive_anchor: false,
            constraints: Vec::new(),
        };

        match schema.as_bool() {
            Some(true) => return Ok(compiled),
            Some(false) => {
                compiled.constraints.push(KeywordConstraint {
                    keyword: "".into(),
                    kind: Kind::AlwaysFail,
                });
                return Ok(compiled);
            }
            None => (),
        }

        if self.draft >= Draft::Draft202012 {
            if let Some(Value::String(anchor)) = schema.keyword(kw::DYNAMIC_ANCHOR) {
                compiled.dynamic_anchor = Some(anchor.clone());
            }
        }
        if self.draft == Draft::Draft201909 {
            if let Some(Value::Bool(true)) = schema.keyword(kw::RECURSIVE_ANCHOR) {
                compiled.recursive_anchor = true;
            }
        }

        // In drafts 6/7, `$ref` overrides its siblings entirely.
        if self.draft <= Draft::Draft7 {
            if let Some(value) = schema.keyword(kw::REF) {
                compiled.constraints.push(KeywordConstraint {
                    keyword: kw::REF.into(),
                    kind: self.parse_ref(schema, value)?,
                });
                return Ok(compiled);
            }
        }

        let names: Vec<&str> = schema.iter_keywords().map(|(name, _)| name).collect();
        let order = self.registry.ordered(&names, self.draft)?;
        let values: Vec<&Value> = schema.iter_keywords().map(|(_, value)| value).collect();

        for ind in order {
            let (name, value) = (names[ind], values[ind]);

            if is_structural(name) {
                continue;
            }
            if let Some(kind) = self.parse_keyword(schema, name, value)? {
                compiled.constraints.push(KeywordConstraint {
                    keyword: name.into(),
                    kind,
                });
            }
        }
        Ok(compiled)
    }

    /// Parses one keyword into its Kind, or None for keywords which fold
    /// into a sibling (`minContains`) or are inert in the active draft.
    fn parse_keyword(
        &mut self,
        schema: &Schema,
        name: &str,
        value: &Value,
    ) -> Result<Option<Kind>, Error> {
        // Registered custom keywords take precedence when enabled.
        if self.options.unknown_keywords == UnknownKeywords::Evaluate {
            if let Some(plugin) = self.registry.custom(name) {
                let applies = self
                    .registry
                    .lookup(name)
                    .map(|d| d.drafts.contains(self.draft))
                    .unwrap_or_default();
                if applies {
                    plugin.compile(value).map_err(|detail| {
                        self.form_err(schema, name, &detail)
                    })?;
                    return Ok(Some(Kind::Custom {
                        plugin: plugin.clone(),
                        value: value.clone(),
                    }));
                }
            }
        }

        let known = self
            .registry
            .lookup(name)
            .map(|d| d.drafts.contains(self.draft) && self.registry.custom(name).is_none())
            .unwrap_or_default();
        if !known {
            return match self.options.unknown_keywords {
                UnknownKeywords::Error => Err(Error::UnknownKeyword {
                    keyword: name.to_string(),
                    curi: schema.curi.clone(),
                }),
                _ => Ok(Some(Kind::Annotation(value.clone()))),
            };
        }

        let kind = match name {
            kw::TYPE => Kind::Type(types::Set::from_value(value).ok_or_else(|| {
                self.form_err(schema, name, "expected a type or array of types")
            })?),
            kw::CONST => Kind::Const(value.clone()),
            kw::ENUM => match value {
                Value::Array(variants) => Kind::Enum(variants.clone()),
                _ => return Err(self.form_err(schema, name, "expected an array")),
            },
            kw::MULTIPLE_OF => {
                let divisor = self.extract_number(schema, name, value)?;
                let positive = match divisor {
                    Number::Unsigned(n) => n > 0,
                    Number::Signed(_) => false,
                    Number::Float(f) => f > 0.0,
                };
                if !positive {
                    return Err(self.form_err(schema, name, "expected a number greater than zero"));
                }
                Kind::MultipleOf(divisor)
            }
            kw::MAXIMUM => Kind::Maximum(self.extract_number(schema, name, value)?),
            kw::EXCLUSIVE_MAXIMUM => {
                Kind::ExclusiveMaximum(self.extract_number(schema, name, value)?)
            }
            kw::MINIMUM => Kind::Minimum(self.extract_number(schema, name, value)?),
            kw::EXCLUSIVE_MINIMUM => {
                Kind::ExclusiveMinimum(self.extract_number(schema, name, value)?)
            }
            kw::MAX_LENGTH => Kind::MaxLength(self.extract_usize(schema, name, value)?),
            kw::MIN_LENGTH => Kind::MinLength(self.extract_usize(schema, name, value)?),
            kw::PATTERN => Kind::Pattern(self.compile_regex(schema, value)?),
            kw::FORMAT => match value {
                Value::String(raw) => Kind::Format {
                    format: Format::lookup(raw),
                    raw: raw.clone(),
                    assert: self.options.assert_formats,
                },
                _ => return Err(self.form_err(schema, name, "expected a string")),
            },
            kw::MAX_ITEMS => Kind::MaxItems(self.extract_usize(schema, name, value)?),
            kw::MIN_ITEMS => Kind::MinItems(self.extract_usize(schema, name, value)?),
            kw::UNIQUE_ITEMS => match value {
                Value::Bool(true) => Kind::UniqueItems,
                Value::Bool(false) => return Ok(None),
                _ => return Err(self.form_err(schema, name, "expected a boolean")),
            },
            kw::MAX_PROPERTIES => Kind::MaxProperties(self.extract_usize(schema, name, value)?),
            kw::MIN_PROPERTIES => Kind::MinProperties(self.extract_usize(schema, name, value)?),
            kw::REQUIRED => Kind::Required(self.extract_string_array(schema, name, value)?),
            kw::DEPENDENT_REQUIRED => match value {
                Value::Object(map) => {
                    let mut deps = Vec::with_capacity(map.len());
                    for (prop, wanted) in map {
                        deps.push((
                            prop.clone(),
                            self.extract_string_array(schema, name, wanted)?,
                        ));
                    }
                    Kind::DependentRequired(deps)
                }
                _ => return Err(self.form_err(schema, name, "expected an object")),
            },

            // Metadata keywords annotate their raw value.
            kw::TITLE
            | kw::DESCRIPTION
            | kw::DEFAULT
            | kw::EXAMPLES
            | kw::DEPRECATED
            | kw::READ_ONLY
            | kw::WRITE_ONLY
            | kw::CONTENT_ENCODING
            | kw::CONTENT_MEDIA_TYPE
            | kw::CONTENT_SCHEMA => Kind::Annotation(value.clone()),

            kw::PROPERTIES => match value {
                Value::Object(map) => {
                    let mut props = Vec::with_capacity(map.len());
                    for prop in map.keys() {
                        props.push((
                            prop.clone(),
                            self.compile_child(schema, &[name, prop])?,
                        ));
                    }
                    Kind::Properties(props)
                }
                _ => return Err(self.form_err(schema, name, "expected an object")),
            },
            kw::PATTERN_PROPERTIES => match value {
                Value::Object(map) => {
                    let mut props = Vec::with_capacity(map.len());
                    for pattern in map.keys() {
                        props.push((
                            self.compile_regex(schema, &Value::String(pattern.clone()))?,
                            pattern.clone(),
                            self.compile_child(schema, &[name, pattern])?,
                        ));
                    }
                    Kind::PatternProperties(props)
                }
                _ => return Err(self.form_err(schema, name, "expected an object")),
            },
            kw::ADDITIONAL_PROPERTIES => {
                Kind::AdditionalProperties(self.compile_child(schema, &[name])?)
            }
            kw::PROPERTY_NAMES => Kind::PropertyNames(self.compile_child(schema, &[name])?),

            kw::PREFIX_ITEMS => match value {
                Value::Array(children) => {
                    Kind::Tuple(self.compile_children(schema, name, children.len())?)
                }
                _ => return Err(self.form_err(schema, name, "expected an array of schemas")),
            },
            kw::ITEMS => match value {
                Value::Object(_) | Value::Bool(_) => Kind::Items {
                    schema: self.compile_child(schema, &[name])?,
                    after: (self.draft >= Draft::Draft202012).then_some(kw::PREFIX_ITEMS),
                },
                Value::Array(children) if self.draft <= Draft::Draft201909 => {
                    if self.draft == Draft::Draft201909
                        && schema.keyword(kw::PREFIX_ITEMS).is_some()
                    {
                        return Err(self.form_err(
                            schema,
                            name,
                            "the array form may not be combined with prefixItems",
                        ));
                    }
                    Kind::Tuple(self.compile_children(schema, name, children.len())?)
                }
                _ => {
                    return Err(self.form_err(schema, name, "expected a schema or array of schemas"))
                }
            },
            kw::ADDITIONAL_ITEMS => {
                // Inert without an array-form `items` sibling.
                match schema.keyword(kw::ITEMS) {
                    Some(Value::Array(_)) => Kind::Items {
                        schema: self.compile_child(schema, &[name])?,
                        after: Some(kw::ITEMS),
                    },
                    _ => return Ok(None),
                }
            }
            kw::CONTAINS => {
                let min = match schema.keyword(kw::MIN_CONTAINS) {
                    Some(v) if self.draft >= Draft::Draft201909 => {
                        self.extract_usize(schema, kw::MIN_CONTAINS, v)?
                    }
                    _ => 1,
                };
                let max = match schema.keyword(kw::MAX_CONTAINS) {
                    Some(v) if self.draft >= Draft::Draft201909 => {
                        Some(self.extract_usize(schema, kw::MAX_CONTAINS, v)?)
                    }
                    _ => None,
                };
                Kind::Contains {
                    schema: self.compile_child(schema, &[name])?,
                    min,
                    max,
                }
            }
            // Folded into Contains above; inert without it.
            kw::MIN_CONTAINS | kw::MAX_CONTAINS => {
                self.extract_usize(schema, name, value)?;
                return Ok(None);
            }

            kw::ALL_OF => match value {
                Value::Array(children) => {
                    Kind::AllOf(self.compile_children(schema, name, children.len())?)
                }
                _ => return Err(self.form_err(schema, name, "expected an array of schemas")),
            },
            kw::ANY_OF => match value {
                Value::Array(children) => {
                    Kind::AnyOf(self.compile_children(schema, name, children.len())?)
                }
                _ => return Err(self.form_err(schema, name, "expected an array of schemas")),
            },
            kw::ONE_OF => match value {
                Value::Array(children) => {
                    Kind::OneOf(self.compile_children(schema, name, children.len())?)
                }
                _ => return Err(self.form_err(schema, name, "expected an array of schemas")),
            },
            kw::NOT => Kind::Not(self.compile_child(schema, &[name])?),
            kw::IF => Kind::If(self.compile_child(schema, &[name])?),
            kw::THEN => Kind::Then(self.compile_child(schema, &[name])?),
            kw::ELSE => Kind::Else(self.compile_child(schema, &[name])?),
            kw::DEPENDENT_SCHEMAS => match value {
                Value::Object(map) => {
                    let mut deps = Vec::with_capacity(map.len());
                    for prop in map.keys() {
                        deps.push((prop.clone(), self.compile_child(schema, &[name, prop])?));
                    }
                    Kind::DependentSchemas(deps)
                }
                _ => return Err(self.form_err(schema, name, "expected an object")),
            },
            kw::DEPENDENCIES => match value {
                Value::Object(map) => {
                    let mut deps = Vec::with_capacity(map.len());
                    for (prop, dep) in map {
                        let dep = match dep {
                            Value::Array(_) => Dependency::Required(
                                self.extract_string_array(schema, name, dep)?,
                            ),
                            Value::Object(_) | Value::Bool(_) => {
                                Dependency::Schema(self.compile_child(schema, &[name, prop])?)
                            }
                            _ => {
                                return Err(self.form_err(
                                    schema,
                                    name,
                                    "expected a schema or array of property names",
                                ))
                            }
                        };
                        deps.push((prop.clone(), dep));
                    }
                    Kind::Dependencies(deps)
                }
                _ => return Err(self.form_err(schema, name, "expected an object")),
            },

            kw::REF => self.parse_ref(schema, value)?,
            kw::RECURSIVE_REF => match value {
                Value::String(rel) if rel == "#" => {
                    let mut target = schema.base.clone();
                    target.set_fragment(None);
                    Kind::RecursiveRef(target)
                }
                _ => return Err(self.form_err(schema, name, "expected the string '#'")),
            },
            kw::DYNAMIC_REF => match value {
                Value::String(reference) => {
                    let uri = schema.base.join(reference).map_err(|detail| {
                        Error::InvalidReference {
                            reference: reference.clone(),
                            curi: schema.curi.clone(),
                            detail,
                        }
                    })?;
                    let anchor = uri
                        .fragment()
                        .filter(|f| !f.is_empty() && !f.starts_with('/'))
                        .map(str::to_string);
                    Kind::DynamicRef { uri, anchor }
                }
                _ => return Err(self.form_err(schema, name, "expected a string")),
            },

            kw::UNEVALUATED_PROPERTIES => {
                Kind::UnevaluatedProperties(self.compile_child(schema, &[name])?)
            }
            kw::UNEVALUATED_ITEMS => Kind::UnevaluatedItems(self.compile_child(schema, &[name])?),

            _ => Kind::Annotation(value.clone()),
        };
        Ok(Some(kind))
    }

    fn parse_ref(&mut self, schema: &Schema, value: &Value) -> Result<Kind, Error> {
        let Value::String(reference) = value else {
            return Err(self.form_err(schema, kw::REF, "expected a string"));
        };
        let mut uri = schema
            .base
            .join(reference)
            .map_err(|detail| Error::InvalidReference {
                reference: reference.clone(),
                curi: schema.curi.clone(),
                detail,
            })?;
        if let Some("") = uri.fragment() {
            uri.set_fragment(None);
        }
        Ok(Kind::Ref(uri))
    }

    fn compile_child(
        &mut self,
        schema: &Schema,
        rel: &[&str],
    ) -> Result<Arc<SchemaConstraint>, Error> {
        let tokens: Vec<crate::ptr::Token> = rel
            .iter()
            .map(|s| crate::ptr::Token::Property(s.to_string()))
            .collect();
        let child = schema.subschema(&tokens)?;
        self.compile(&child)
    }

    fn compile_children(
        &mut self,
        schema: &Schema,
        name: &str,
        count: usize,
    ) -> Result<Vec<Arc<SchemaConstraint>>, Error> {
        (0..count)
            .map(|ind| {
                let tokens = [
                    crate::ptr::Token::Property(name.to_string()),
                    crate::ptr::Token::Index(ind),
                ];
                let child = schema.subschema(&tokens)?;
                self.compile(&child)
            })
            .collect()
    }

    fn compile_regex(&self, schema: &Schema, value: &Value) -> Result<fancy_regex::Regex, Error> {
        let Value::String(pattern) = value else {
            return Err(Error::InvalidPattern {
                pattern: value.to_string(),
                curi: schema.curi.clone(),
                detail: "expected a string".to_string(),
            });
        };
        fancy_regex::Regex::new(pattern).map_err(|err| Error::InvalidPattern {
            pattern: pattern.clone(),
            curi: schema.curi.clone(),
            detail: err.to_string(),
        })
    }

    fn extract_number(&self, schema: &Schema, name: &str, value: &Value) -> Result<Number, Error> {
        match value {
            Value::Number(n) => Ok(Number::from(n)),
            _ => Err(self.form_err(schema, name, "expected a number")),
        }
    }

    fn extract_usize(&self, schema: &Schema, name: &str, value: &Value) -> Result<usize, Error> {
        match value {
            Value::Number(n) if n.is_u64() => Ok(n.as_u64().unwrap() as usize),
            _ => Err(self.form_err(schema, name, "expected an unsigned integer")),
        }
    }

    fn extract_string_array(
        &self,
        schema: &Schema,
        name: &str,
        value: &Value,
    ) -> Result<Vec<String>, Error> {
        let Value::Array(items) = value else {
            return Err(self.form_err(schema, name, "expected an array of strings"));
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(self.form_err(schema, name, "expected an array of strings")),
            })
            .collect()
    }

    fn form_err(&self, schema: &Schema, keyword: &str, detail: &str) -> Error {
        Error::InvalidKeywordForm {
            keyword: keyword.to_string(),
            curi: schema.curi.clone(),
            detail: detail.to_string(),
        }
    }
}
