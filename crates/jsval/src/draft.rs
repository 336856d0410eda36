use serde_json::Value;

/// Draft is a revision of the JSON Schema specification, which governs
/// the keywords that exist and their semantics.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum Draft {
    Draft6,
    Draft7,
    Draft201909,
    Draft202012,
    /// The in-progress next draft. Evaluates as 2020-12 plus accepted changes.
    DraftNext,
}

impl Draft {
    /// The canonical meta-schema URI of this draft.
    pub fn meta_schema_uri(&self) -> &'static str {
        match self {
            Draft::Draft6 => "http://json-schema.org/draft-06/schema",
            Draft::Draft7 => "http://json-schema.org/draft-07/schema",
            Draft::Draft201909 => "https://json-schema.org/draft/2019-09/schema",
            Draft::Draft202012 => "https://json-schema.org/draft/2020-12/schema",
            Draft::DraftNext => "https://json-schema.org/draft/next/schema",
        }
    }
}

/// Returns the Draft which the given `$schema` URI identifies, if any.
pub fn draft_from_url(url: &str) -> Option<Draft> {
    let url = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('#');

    match url {
        "json-schema.org/draft-06/schema" => Some(Draft::Draft6),
        "json-schema.org/draft-07/schema" => Some(Draft::Draft7),
        "json-schema.org/draft/2019-09/schema" => Some(Draft::Draft201909),
        "json-schema.org/draft/2020-12/schema" => Some(Draft::Draft202012),
        "json-schema.org/draft/next/schema" => Some(Draft::DraftNext),
        _ => None,
    }
}

/// Returns the Draft declared by the schema's `$schema` keyword, if any.
pub fn draft_from_schema(schema: &Value) -> Option<Draft> {
    schema
        .get("$schema")
        .and_then(Value::as_str)
        .and_then(draft_from_url)
}

/// Drafts is a set of Draft revisions, used by keyword descriptors to
/// declare the revisions in which the keyword exists.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Drafts(u8);

pub const NONE: Drafts = Drafts(0);
pub const D6: Drafts = Drafts(0b00001);
pub const D7: Drafts = Drafts(0b00010);
pub const D2019: Drafts = Drafts(0b00100);
pub const D2020: Drafts = Drafts(0b01000);
pub const NEXT: Drafts = Drafts(0b10000);

pub const ALL: Drafts = Drafts(D6.0 | D7.0 | D2019.0 | D2020.0 | NEXT.0);
pub const SINCE_D7: Drafts = Drafts(D7.0 | D2019.0 | D2020.0 | NEXT.0);
pub const SINCE_2019: Drafts = Drafts(D2019.0 | D2020.0 | NEXT.0);
pub const SINCE_2020: Drafts = Drafts(D2020.0 | NEXT.0);
pub const UNTIL_D7: Drafts = Drafts(D6.0 | D7.0);
pub const UNTIL_2019: Drafts = Drafts(D6.0 | D7.0 | D2019.0);

impl std::ops::BitOr for Drafts {
    type Output = Self;

    fn bitor(self, other: Self) -> Self::Output {
        Drafts(self.0 | other.0)
    }
}

impl Drafts {
    pub fn contains(&self, draft: Draft) -> bool {
        let bit = match draft {
            Draft::Draft6 => D6,
            Draft::Draft7 => D7,
            Draft::Draft201909 => D2019,
            Draft::Draft202012 => D2020,
            Draft::DraftNext => NEXT,
        };
        self.0 & bit.0 != 0
    }
}
