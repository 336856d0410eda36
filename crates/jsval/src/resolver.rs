use crate::draft::Draft;
use crate::ptr::{Pointer, Token};
use crate::schema::{self, keywords as kw, Schema};
use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("duplicate canonical URI: '{0}'")]
    DuplicateURI(Url),
    #[error("schema '{uri}' was not found")]
    NotFound { uri: Url },
    #[error(transparent)]
    Schema(#[from] schema::Error),
}

/// ResourceLoader supplies schema documents for absolute URIs which the
/// engine hasn't seen yet, such as remote `$ref` targets. Loading is the
/// caller's concern; the engine never fetches.
pub trait ResourceLoader {
    fn load(&self, uri: &Url) -> Option<Value>;
}

/// NoLoader refuses every load. The default.
pub struct NoLoader;

impl ResourceLoader for NoLoader {
    fn load(&self, _uri: &Url) -> Option<Value> {
        None
    }
}

/// MapLoader serves documents from an in-memory map.
#[derive(Default)]
pub struct MapLoader(FxHashMap<Url, Value>);

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: Url, doc: Value) -> &mut Self {
        self.0.insert(uri, doc);
        self
    }
}

impl ResourceLoader for MapLoader {
    fn load(&self, uri: &Url) -> Option<Value> {
        self.0.get(uri).cloned()
    }
}

struct Entry {
    doc: Arc<Value>,
    ptr: Pointer,
    /// Base URI of the enclosing resource, without a fragment.
    base: Url,
    /// Canonical URI of the indexed node.
    curi: Url,
    /// Entry is a `$dynamicAnchor` (eligible for dynamic-scope resolution).
    dynamic: bool,
}

/// Resolver indexes loaded schema documents by canonical URI and anchor
/// URIs, and resolves `$ref` targets against them. It knows nothing of
/// the dynamic scope: `$dynamicRef`/`$recursiveRef` decisions are made by
/// the driver, which queries `dynamic_anchor` / `recursive_base` per
/// scope frame.
pub struct Resolver {
    entries: FxHashMap<Url, Entry>,
    /// Resource roots declaring `$recursiveAnchor: true` (2019-09).
    recursive: FxHashMap<Url, bool>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            entries: FxHashMap::default(),
            recursive: FxHashMap::default(),
        }
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.entries.contains_key(uri)
    }

    /// Adds a schema document under the given retrieval URI, indexing the
    /// resources and anchors it declares. Returns the root's canonical
    /// (post-`$id`) base URI.
    pub fn add_document(
        &mut self,
        uri: Url,
        doc: Arc<Value>,
        draft: Draft,
    ) -> Result<Url, Error> {
        let root = Schema::root(uri.clone(), doc)?;
        tracing::debug!(uri = %uri, base = %root.base, "indexing schema document");

        self.insert(
            root.base.clone(),
            Entry {
                doc: root.doc.clone(),
                ptr: root.ptr.clone(),
                base: root.base.clone(),
                curi: root.curi.clone(),
                dynamic: false,
            },
        )?;
        // Make the document reachable under its retrieval URI as well.
        if uri != root.base {
            self.insert(
                uri,
                Entry {
                    doc: root.doc.clone(),
                    ptr: root.ptr.clone(),
                    base: root.base.clone(),
                    curi: root.curi.clone(),
                    dynamic: false,
                },
            )?;
        }

        let base = root.base.clone();
        self.scan(&root, draft)?;
        Ok(base)
    }

    /// Resolves an absolute URI (with an optional JSON-pointer or anchor
    /// fragment) to the schema node it addresses.
    pub fn resolve(&self, uri: &Url) -> Result<Schema, Error> {
        let fragment = uri.fragment().unwrap_or("");

        if fragment.is_empty() || fragment.starts_with('/') {
            let mut sans = uri.clone();
            sans.set_fragment(None);

            let entry = self
                .entries
                .get(&sans)
                .ok_or_else(|| Error::NotFound { uri: uri.clone() })?;
            let decoded = percent_encoding::percent_decode_str(fragment)
                .decode_utf8()
                .map_err(|_| Error::NotFound { uri: uri.clone() })?;

            return self.resolve_pointer(entry, &decoded, uri);
        }

        // An anchor fragment.
        let entry = self
            .entries
            .get(uri)
            .ok_or_else(|| Error::NotFound { uri: uri.clone() })?;
        Ok(Schema {
            curi: entry.curi.clone(),
            base: entry.base.clone(),
            doc: entry.doc.clone(),
            ptr: entry.ptr.clone(),
        })
    }

    /// Returns the URI of the `$dynamicAnchor` named `anchor` within the
    /// resource `base`, if that resource declares one.
    pub fn dynamic_anchor(&self, base: &Url, anchor: &str) -> Option<Url> {
        let mut uri = base.clone();
        uri.set_fragment(Some(anchor));
        match self.entries.get(&uri) {
            Some(entry) if entry.dynamic => Some(uri),
            _ => None,
        }
    }

    /// Does the resource rooted at `base` declare `$recursiveAnchor: true`?
    pub fn recursive_base(&self, base: &Url) -> bool {
        self.recursive.get(base).copied().unwrap_or_default()
    }

    fn resolve_pointer(&self, entry: &Entry, fragment: &str, uri: &Url) -> Result<Schema, Error> {
        // Walk the pointer one token at a time from the resource root,
        // re-basing at any embedded resource crossed along the way so
        // that relative `$id`s below it resolve correctly.
        let mut schema = Schema {
            curi: entry.curi.clone(),
            base: entry.base.clone(),
            doc: entry.doc.clone(),
            ptr: entry.ptr.clone(),
        };

        for token in Pointer::from_str(fragment).tokens() {
            if schema.ptr.push(token.clone()).query(&schema.doc).is_none() {
                return Err(Error::NotFound { uri: uri.clone() });
            }
            schema = schema.subschema(std::slice::from_ref(token))?;
        }
        Ok(schema)
    }

    fn insert(&mut self, uri: Url, entry: Entry) -> Result<(), Error> {
        if self.entries.insert(uri.clone(), entry).is_some() {
            return Err(Error::DuplicateURI(uri));
        }
        Ok(())
    }

    fn scan(&mut self, schema: &Schema, draft: Draft) -> Result<(), Error> {
        let Value::Object(map) = schema.node() else {
            return Ok(());
        };

        // Anchor declarations of this node.
        if draft >= Draft::Draft201909 {
            if let Some(Value::String(anchor)) = map.get(kw::ANCHOR) {
                self.insert_anchor(schema, anchor, false)?;
            }
        }
        if draft >= Draft::Draft202012 {
            if let Some(Value::String(anchor)) = map.get(kw::DYNAMIC_ANCHOR) {
                self.insert_anchor(schema, anchor, true)?;
            }
        }
        if draft == Draft::Draft201909 {
            if let Some(Value::Bool(true)) = map.get(kw::RECURSIVE_ANCHOR) {
                self.recursive.insert(schema.base.clone(), true);
            }
        }
        if draft <= Draft::Draft7 {
            // Drafts 6/7 spell anchors as fragment-only $id values.
            if let Some(Value::String(id)) = map.get(kw::ID) {
                if let Some(anchor) = id.strip_prefix('#') {
                    if !anchor.is_empty() {
                        self.insert_anchor(schema, anchor, false)?;
                    }
                }
            }
        }

        for (name, value) in map {
            for rel in child_locations(draft, name, value) {
                let child = schema.subschema(&rel)?;

                // Index an embedded resource under its $id.
                if child.base != schema.base {
                    self.insert(
                        child.base.clone(),
                        Entry {
                            doc: child.doc.clone(),
                            ptr: child.ptr.clone(),
                            base: child.base.clone(),
                            curi: child.curi.clone(),
                            dynamic: false,
                        },
                    )?;
                }
                self.scan(&child, draft)?;
            }
        }
        Ok(())
    }

    fn insert_anchor(&mut self, schema: &Schema, anchor: &str, dynamic: bool) -> Result<(), Error> {
        let mut uri = schema.base.clone();
        uri.set_fragment(Some(anchor));
        self.insert(
            uri,
            Entry {
                doc: schema.doc.clone(),
                ptr: schema.ptr.clone(),
                base: schema.base.clone(),
                curi: schema.curi.clone(),
                dynamic,
            },
        )
    }
}

/// Locations of child schemas under the given keyword, relative to the
/// owning schema node. Non-applicator keywords have none; values of
/// unexpected shapes are skipped here and rejected by the compiler.
fn child_locations(draft: Draft, name: &str, value: &Value) -> Vec<Vec<Token>> {
    let prop = |name: &str| Token::Property(name.to_string());

    let single = || vec![vec![prop(name)]];
    let array_of = |arr: &Vec<Value>| -> Vec<Vec<Token>> {
        (0..arr.len())
            .map(|i| vec![prop(name), Token::Index(i)])
            .collect()
    };
    let map_of = |map: &serde_json::Map<String, Value>| -> Vec<Vec<Token>> {
        map.keys().map(|k| vec![prop(name), prop(k)]).collect()
    };

    match (name, value) {
        (kw::PROPERTIES | kw::PATTERN_PROPERTIES, Value::Object(map)) => map_of(map),
        (kw::DEFS, Value::Object(map)) if draft >= Draft::Draft201909 => map_of(map),
        (kw::DEFINITIONS, Value::Object(map)) => map_of(map),
        (kw::DEPENDENT_SCHEMAS, Value::Object(map)) if draft >= Draft::Draft201909 => map_of(map),
        (kw::DEPENDENCIES, Value::Object(map)) if draft <= Draft::Draft7 => map
            .iter()
            .filter(|(_, v)| matches!(v, Value::Object(_) | Value::Bool(_)))
            .map(|(k, _)| vec![prop(name), prop(k)])
            .collect(),

        (kw::ALL_OF | kw::ANY_OF | kw::ONE_OF, Value::Array(arr)) => array_of(arr),
        (kw::PREFIX_ITEMS, Value::Array(arr)) if draft >= Draft::Draft202012 => array_of(arr),
        (kw::ITEMS, Value::Array(arr)) if draft <= Draft::Draft201909 => array_of(arr),

        (kw::ITEMS, Value::Object(_) | Value::Bool(_)) => single(),
        (kw::ADDITIONAL_ITEMS, _) if draft <= Draft::Draft201909 => single(),
        (kw::UNEVALUATED_ITEMS | kw::UNEVALUATED_PROPERTIES, _)
            if draft >= Draft::Draft201909 =>
        {
            single()
        }
        (kw::ADDITIONAL_PROPERTIES | kw::PROPERTY_NAMES | kw::NOT | kw::CONTAINS, _) => single(),
        (kw::IF | kw::THEN | kw::ELSE, _) if draft >= Draft::Draft7 => single(),
        (kw::CONTENT_SCHEMA, _) if draft >= Draft::Draft201909 => single(),

        _ => Vec::new(),
    }
}
