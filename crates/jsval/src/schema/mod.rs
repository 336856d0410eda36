pub mod keywords;
pub mod types;

use crate::ptr::{Pointer, Token};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("expected a schema (an object or boolean)")]
    ExpectedSchema,
    #[error("expected '$id' to be a string")]
    ExpectedString,
    #[error("unexpected fragment component '{0}' of $id keyword")]
    UnexpectedFragment(String),
    #[error("expected '{0}' to be a base URI")]
    ExpectedBaseURI(Url),
    #[error("failed to parse URL: {0}")]
    URLErr(#[from] url::ParseError),

    #[error("at schema '{curi}': {detail}")]
    AtSchema { curi: Url, detail: Box<Error> },
}

/// Schema is an immutable view of one node of a parsed schema document:
/// either a boolean shortcut, or an object of keywords. A node knows its
/// canonical URI (base URI of the enclosing resource, extended with a
/// JSON-pointer fragment for inner nodes) and the base URI against which
/// its references resolve.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Canonical URI of this schema node.
    pub curi: Url,
    /// Base URI for resolving references of this node: the nearest
    /// enclosing `$id`, without a fragment.
    pub base: Url,
    /// Document which contains this node.
    pub doc: Arc<Value>,
    /// Location of this node within `doc`.
    pub ptr: Pointer,
}

impl Schema {
    /// Builds the root Schema of a document. If the root declares `$id`,
    /// the canonical URI re-bases onto it.
    pub fn root(uri: Url, doc: Arc<Value>) -> Result<Schema, Error> {
        if !matches!(&*doc, Value::Object(_) | Value::Bool(_)) {
            return Err(Error::AtSchema {
                detail: Box::new(Error::ExpectedSchema),
                curi: uri,
            });
        }

        let base = match doc.get(keywords::ID) {
            // Fragment-only $ids are legacy anchors, not new bases.
            Some(Value::String(id)) if !id.starts_with('#') => rebase(&uri, id)?,
            Some(Value::String(_)) | None => uri,
            Some(_) => {
                return Err(Error::AtSchema {
                    detail: Box::new(Error::ExpectedString),
                    curi: uri,
                })
            }
        };

        Ok(Schema {
            curi: base.clone(),
            base,
            doc,
            ptr: Pointer::root(),
        })
    }

    /// The JSON value of this node.
    pub fn node(&self) -> &Value {
        self.ptr
            .query(&self.doc)
            .expect("schema pointer addresses its document")
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.node().as_bool()
    }

    /// Keywords of this node in source order. Empty for boolean schemas.
    pub fn iter_keywords(&self) -> impl Iterator<Item = (&str, &Value)> {
        match self.node() {
            Value::Object(map) => Some(map.iter().map(|(k, v)| (k.as_str(), v))),
            _ => None,
        }
        .into_iter()
        .flatten()
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.node().as_object().and_then(|map| map.get(name))
    }

    /// Builds the sub-schema of this node at the given relative location,
    /// which must exist. If the sub-schema declares its own `$id`, its
    /// canonical URI re-bases onto it.
    pub fn subschema(&self, rel: &[Token]) -> Result<Schema, Error> {
        let mut ptr = self.ptr.clone();
        for token in rel {
            ptr = ptr.push(token.clone());
        }
        let node = ptr
            .query(&self.doc)
            .expect("subschema location exists in its document");

        match node.get(keywords::ID) {
            // An embedded resource: its canonical URI is its $id and
            // pointer fragments restart at the resource root.
            // (Fragment-only $ids are legacy anchors, not new bases.)
            Some(Value::String(id)) if !id.starts_with('#') => {
                let base = rebase(&self.base, id).map_err(|detail| Error::AtSchema {
                    detail: Box::new(detail),
                    curi: self.curi.clone(),
                })?;
                return Ok(Schema {
                    curi: base.clone(),
                    base,
                    doc: self.doc.clone(),
                    ptr,
                });
            }
            _ => (),
        }

        let mut curi = self.curi.clone();
        let mut fragment = curi.fragment().unwrap_or("").to_string();
        for token in rel {
            fragment.push('/');
            fragment.push_str(&token.to_string());
        }
        curi.set_fragment(Some(&fragment));

        Ok(Schema {
            curi,
            base: self.base.clone(),
            doc: self.doc.clone(),
            ptr,
        })
    }
}

/// Joins an `$id` against the current base, rejecting fragments and
/// non-base URIs. (Fragment-only `$id`s of drafts 6/7 are anchors, and
/// are handled by the reference index, not here.)
fn rebase(base: &Url, id: &str) -> Result<Url, Error> {
    let mut joined = base.join(id)?;
    if let Some(f) = joined.fragment() {
        if !f.is_empty() {
            return Err(Error::UnexpectedFragment(f.to_owned()));
        }
    }
    // An empty fragment is tolerated and stripped.
    joined.set_fragment(None);
    if joined.cannot_be_a_base() {
        return Err(Error::ExpectedBaseURI(joined));
    }
    Ok(joined)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn curi(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_root_rebases_on_id() {
        let doc = Arc::new(json!({"$id": "other/schema.json", "type": "object"}));
        let schema = Schema::root(curi("http://example/root"), doc).unwrap();
        assert_eq!(schema.curi.as_str(), "http://example/other/schema.json");
        assert_eq!(schema.base, schema.curi);
    }

    #[test]
    fn test_root_rejects_non_schemas() {
        for doc in [json!(42), json!("nope"), json!([true])] {
            assert!(Schema::root(curi("http://example/root"), Arc::new(doc)).is_err());
        }
        for doc in [json!(true), json!(false), json!({})] {
            assert!(Schema::root(curi("http://example/root"), Arc::new(doc)).is_ok());
        }
    }

    #[test]
    fn test_subschema_locations() {
        let doc = Arc::new(json!({
            "properties": {
                "a": {"type": "string"},
                "b": {"$id": "http://example/b", "type": "integer"},
            }
        }));
        let root = Schema::root(curi("http://example/root"), doc).unwrap();

        let a = root
            .subschema(&[
                Token::Property("properties".to_string()),
                Token::Property("a".to_string()),
            ])
            .unwrap();
        assert_eq!(a.curi.as_str(), "http://example/root#/properties/a");
        assert_eq!(a.base.as_str(), "http://example/root");
        assert_eq!(a.keyword("type"), Some(&json!("string")));

        let b = a.ptr.is_root(); // a retains its own pointer.
        assert!(!b);

        let b = root
            .subschema(&[
                Token::Property("properties".to_string()),
                Token::Property("b".to_string()),
            ])
            .unwrap();
        assert_eq!(b.curi.as_str(), "http://example/b");
        assert_eq!(b.base, b.curi);
    }
}
