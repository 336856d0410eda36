use crate::draft::{self, Draft, Drafts};
use crate::schema::keywords as kw;
use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("keyword '{0}' is already registered")]
    Duplicate(String),
    #[error("registered keyword dependencies contain a cycle involving '{0}'")]
    Cycle(String),
}

/// Descriptor declares a keyword to the engine: the drafts it exists in,
/// its evaluation priority (lower runs first), and the sibling keywords
/// whose annotations it depends on. Dependencies order evaluation within
/// a schema ahead of priority.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub name: String,
    pub priority: i32,
    pub drafts: Drafts,
    pub depends_on: Vec<String>,
}

impl Descriptor {
    pub fn new(name: &str, priority: i32, drafts: Drafts) -> Descriptor {
        Descriptor {
            name: name.to_string(),
            priority,
            drafts,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Descriptor {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// CustomKeyword is the plugin surface for vocabulary extensions. A
/// registered keyword participates in ordering through its Descriptor
/// and is invoked by the driver like any built-in assertion.
pub trait CustomKeyword: Send + Sync {
    /// Validates the keyword's value at compile time.
    fn compile(&self, value: &Value) -> Result<(), String> {
        let _ = value;
        Ok(())
    }

    /// Evaluates the keyword against an instance. Returns the annotation
    /// to attach on success, or an error message on assertion failure.
    fn evaluate(&self, value: &Value, instance: &Value) -> Result<Option<Value>, String>;
}

/// Registry maps keyword names to their descriptors and provides the
/// deterministic keyword ordering used by the constraint compiler.
/// Immutable once the engine starts evaluating.
pub struct Registry {
    descriptors: Vec<Descriptor>,
    by_name: FxHashMap<String, usize>,
    custom: FxHashMap<String, Arc<dyn CustomKeyword>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        let mut registry = Registry {
            descriptors: Vec::new(),
            by_name: FxHashMap::default(),
            custom: FxHashMap::default(),
        };
        for descriptor in built_in() {
            registry
                .add(descriptor)
                .expect("built-in descriptors are unique");
        }
        registry
            .check_cycles()
            .expect("built-in dependencies are acyclic");
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<&Descriptor> {
        self.by_name.get(name).map(|ind| &self.descriptors[*ind])
    }

    pub fn custom(&self, name: &str) -> Option<&Arc<dyn CustomKeyword>> {
        self.custom.get(name)
    }

    /// All keywords which exist in the given draft.
    pub fn enumerate(&self, draft: Draft) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter().filter(move |d| d.drafts.contains(draft))
    }

    /// Registers a custom keyword. Fails if the name collides or the
    /// added dependencies introduce a cycle.
    pub fn register(
        &mut self,
        descriptor: Descriptor,
        keyword: Arc<dyn CustomKeyword>,
    ) -> Result<(), Error> {
        let name = descriptor.name.clone();
        self.add(descriptor)?;

        if let Err(err) = self.check_cycles() {
            // Roll back the registration which introduced the cycle.
            // `add` appended it, so it's the last descriptor.
            self.by_name.remove(&name);
            self.descriptors.pop();
            return Err(err);
        }
        self.custom.insert(name, keyword);
        Ok(())
    }

    /// Orders the given keyword names (in schema source order) for
    /// evaluation: topologically by sibling-annotation dependencies,
    /// breaking ties by ascending priority and then source order.
    /// Returns a permutation of indices into `names`.
    pub fn ordered(&self, names: &[&str], draft: Draft) -> Result<Vec<usize>, Error> {
        let position: FxHashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // edges[i] lists nodes which must run after node i.
        let mut edges = vec![Vec::new(); names.len()];
        let mut indegree = vec![0usize; names.len()];

        for (i, name) in names.iter().enumerate() {
            let Some(descriptor) = self.lookup(name) else {
                continue;
            };
            if !descriptor.drafts.contains(draft) {
                continue;
            }
            for dep in &descriptor.depends_on {
                if let Some(&j) = position.get(dep.as_str()) {
                    edges[j].push(i);
                    indegree[i] += 1;
                }
            }
        }

        let priority =
            |i: usize| self.lookup(names[i]).map(|d| d.priority).unwrap_or_default();

        let mut order = Vec::with_capacity(names.len());
        let mut ready: Vec<usize> = (0..names.len()).filter(|i| indegree[*i] == 0).collect();

        while !ready.is_empty() {
            // `ready` is kept small; a scan beats a heap for schema-sized inputs.
            let pick = ready
                .iter()
                .enumerate()
                .min_by_key(|(_, &i)| (priority(i), i))
                .map(|(pos, _)| pos)
                .unwrap();
            let next = ready.swap_remove(pick);
            order.push(next);

            for &succ in &edges[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }

        if order.len() != names.len() {
            let stuck = (0..names.len())
                .find(|i| indegree[*i] != 0)
                .map(|i| names[i].to_string())
                .unwrap_or_default();
            return Err(Error::Cycle(stuck));
        }
        Ok(order)
    }

    fn add(&mut self, descriptor: Descriptor) -> Result<(), Error> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(Error::Duplicate(descriptor.name));
        }
        self.by_name
            .insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Detects dependency cycles across all registered descriptors.
    fn check_cycles(&self) -> Result<(), Error> {
        let mut indegree: FxHashMap<&str, usize> = FxHashMap::default();
        let mut edges: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

        for descriptor in &self.descriptors {
            indegree.entry(&descriptor.name).or_default();
            for dep in &descriptor.depends_on {
                if self.by_name.contains_key(dep.as_str()) {
                    edges.entry(dep.as_str()).or_default().push(&descriptor.name);
                    *indegree.entry(&descriptor.name).or_default() += 1;
                }
            }
        }

        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut seen = 0;

        while let Some(next) = ready.pop() {
            seen += 1;
            for &succ in edges.get(next).into_iter().flatten() {
                let deg = indegree.get_mut(succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(succ);
                }
            }
        }

        if seen != indegree.len() {
            let stuck = indegree
                .iter()
                .find(|(_, deg)| **deg != 0)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default();
            return Err(Error::Cycle(stuck));
        }
        Ok(())
    }
}

/// The built-in keyword table. Assertions run at priority 0, in-place
/// applicators at 10, location applicators at 20, and the unevaluated
/// keywords at 30, after every applicator they observe.
fn built_in() -> Vec<Descriptor> {
    use draft::{ALL, D2019, SINCE_2019, SINCE_2020, SINCE_D7, UNTIL_2019, UNTIL_D7};

    const IN_PLACE: &[&str] = &[
        kw::ALL_OF,
        kw::ANY_OF,
        kw::ONE_OF,
        kw::NOT,
        kw::IF,
        kw::THEN,
        kw::ELSE,
        kw::DEPENDENT_SCHEMAS,
        kw::DEPENDENCIES,
        kw::REF,
        kw::DYNAMIC_REF,
        kw::RECURSIVE_REF,
    ];

    let object_applicators = || -> Vec<String> {
        [kw::PROPERTIES, kw::PATTERN_PROPERTIES, kw::ADDITIONAL_PROPERTIES]
            .iter()
            .chain(IN_PLACE)
            .map(|s| s.to_string())
            .collect()
    };
    let array_applicators = || -> Vec<String> {
        [kw::PREFIX_ITEMS, kw::ITEMS, kw::ADDITIONAL_ITEMS, kw::CONTAINS]
            .iter()
            .chain(IN_PLACE)
            .map(|s| s.to_string())
            .collect()
    };

    let mut table = vec![
        // Structural keywords, consumed by the schema index and compiler.
        Descriptor::new(kw::SCHEMA, 0, ALL),
        Descriptor::new(kw::ID, 0, ALL),
        Descriptor::new(kw::VOCABULARY, 0, SINCE_2019),
        Descriptor::new(kw::DEFS, 0, SINCE_2019),
        Descriptor::new(kw::DEFINITIONS, 0, ALL),
        Descriptor::new(kw::ANCHOR, 0, SINCE_2019),
        Descriptor::new(kw::DYNAMIC_ANCHOR, 0, SINCE_2020),
        Descriptor::new(kw::RECURSIVE_ANCHOR, 0, D2019),
        // Assertions.
        Descriptor::new(kw::TYPE, 0, ALL),
        Descriptor::new(kw::CONST, 0, ALL),
        Descriptor::new(kw::ENUM, 0, ALL),
        Descriptor::new(kw::MULTIPLE_OF, 0, ALL),
        Descriptor::new(kw::MAXIMUM, 0, ALL),
        Descriptor::new(kw::EXCLUSIVE_MAXIMUM, 0, ALL),
        Descriptor::new(kw::MINIMUM, 0, ALL),
        Descriptor::new(kw::EXCLUSIVE_MINIMUM, 0, ALL),
        Descriptor::new(kw::MAX_LENGTH, 0, ALL),
        Descriptor::new(kw::MIN_LENGTH, 0, ALL),
        Descriptor::new(kw::PATTERN, 0, ALL),
        Descriptor::new(kw::MAX_ITEMS, 0, ALL),
        Descriptor::new(kw::MIN_ITEMS, 0, ALL),
        Descriptor::new(kw::UNIQUE_ITEMS, 0, ALL),
        Descriptor::new(kw::MAX_CONTAINS, 0, SINCE_2019).depends_on(&[kw::CONTAINS]),
        Descriptor::new(kw::MIN_CONTAINS, 0, SINCE_2019).depends_on(&[kw::CONTAINS]),
        Descriptor::new(kw::MAX_PROPERTIES, 0, ALL),
        Descriptor::new(kw::MIN_PROPERTIES, 0, ALL),
        Descriptor::new(kw::REQUIRED, 0, ALL),
        Descriptor::new(kw::DEPENDENT_REQUIRED, 0, SINCE_2019),
        Descriptor::new(kw::FORMAT, 0, ALL),
        // Annotation-only keywords.
        Descriptor::new(kw::TITLE, 0, ALL),
        Descriptor::new(kw::DESCRIPTION, 0, ALL),
        Descriptor::new(kw::DEFAULT, 0, ALL),
        Descriptor::new(kw::EXAMPLES, 0, ALL),
        Descriptor::new(kw::COMMENT, 0, SINCE_D7),
        Descriptor::new(kw::READ_ONLY, 0, SINCE_D7),
        Descriptor::new(kw::WRITE_ONLY, 0, SINCE_D7),
        Descriptor::new(kw::DEPRECATED, 0, SINCE_2019),
        Descriptor::new(kw::CONTENT_ENCODING, 0, SINCE_D7),
        Descriptor::new(kw::CONTENT_MEDIA_TYPE, 0, SINCE_D7),
        Descriptor::new(kw::CONTENT_SCHEMA, 0, SINCE_2019),
        // In-place applicators.
        Descriptor::new(kw::ALL_OF, 10, ALL),
        Descriptor::new(kw::ANY_OF, 10, ALL),
        Descriptor::new(kw::ONE_OF, 10, ALL),
        Descriptor::new(kw::NOT, 10, ALL),
        Descriptor::new(kw::IF, 10, SINCE_D7),
        Descriptor::new(kw::THEN, 10, SINCE_D7).depends_on(&[kw::IF]),
        Descriptor::new(kw::ELSE, 10, SINCE_D7).depends_on(&[kw::IF]),
        Descriptor::new(kw::DEPENDENCIES, 10, UNTIL_D7),
        Descriptor::new(kw::DEPENDENT_SCHEMAS, 10, SINCE_2019),
        Descriptor::new(kw::REF, 10, ALL),
        Descriptor::new(kw::RECURSIVE_REF, 10, D2019),
        Descriptor::new(kw::DYNAMIC_REF, 10, SINCE_2020),
        // Object location applicators.
        Descriptor::new(kw::PROPERTIES, 20, ALL),
        Descriptor::new(kw::PATTERN_PROPERTIES, 20, ALL),
        Descriptor::new(kw::ADDITIONAL_PROPERTIES, 20, ALL)
            .depends_on(&[kw::PROPERTIES, kw::PATTERN_PROPERTIES]),
        Descriptor::new(kw::PROPERTY_NAMES, 20, ALL),
        // Array location applicators.
        Descriptor::new(kw::PREFIX_ITEMS, 20, SINCE_2020),
        Descriptor::new(kw::ITEMS, 20, ALL).depends_on(&[kw::PREFIX_ITEMS]),
        Descriptor::new(kw::ADDITIONAL_ITEMS, 20, UNTIL_2019).depends_on(&[kw::ITEMS]),
        Descriptor::new(kw::CONTAINS, 20, ALL),
    ];

    let mut unevaluated_properties =
        Descriptor::new(kw::UNEVALUATED_PROPERTIES, 30, SINCE_2019);
    unevaluated_properties.depends_on = object_applicators();
    table.push(unevaluated_properties);

    let mut unevaluated_items = Descriptor::new(kw::UNEVALUATED_ITEMS, 30, SINCE_2019);
    unevaluated_items.depends_on = array_applicators();
    table.push(unevaluated_items);

    table
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::draft::{Draft, ALL};

    struct Nop;
    impl CustomKeyword for Nop {
        fn evaluate(&self, _: &Value, _: &Value) -> Result<Option<Value>, String> {
            Ok(None)
        }
    }

    #[test]
    fn test_ordering_is_topological_then_priority_then_source() {
        let registry = Registry::new();

        let names = vec![
            "unevaluatedProperties",
            "additionalProperties",
            "minimum",
            "properties",
            "allOf",
            "type",
        ];
        let order = registry.ordered(&names, Draft::Draft202012).unwrap();
        let ordered: Vec<&str> = order.iter().map(|i| names[*i]).collect();

        assert_eq!(
            ordered,
            vec![
                "minimum", // Priority 0, ties broken by source order.
                "type",
                "allOf", // In-place applicators.
                "properties",
                "additionalProperties", // After properties/patternProperties.
                "unevaluatedProperties", // Always last.
            ]
        );
    }

    #[test]
    fn test_ordering_respects_if_then_else() {
        let registry = Registry::new();

        let names = vec!["else", "then", "if"];
        let order = registry.ordered(&names, Draft::Draft7).unwrap();
        let ordered: Vec<&str> = order.iter().map(|i| names[*i]).collect();

        // `if` runs first; `else`/`then` retain source order between them.
        assert_eq!(ordered, vec!["if", "else", "then"]);
    }

    #[test]
    fn test_unknown_keywords_sort_first_by_source_order() {
        let registry = Registry::new();

        let names = vec!["x-custom", "allOf", "y-custom"];
        let order = registry.ordered(&names, Draft::Draft202012).unwrap();
        let ordered: Vec<&str> = order.iter().map(|i| names[*i]).collect();

        assert_eq!(ordered, vec!["x-custom", "y-custom", "allOf"]);
    }

    #[test]
    fn test_register_detects_cycles() {
        let mut registry = Registry::new();

        registry
            .register(
                Descriptor::new("x-a", 0, ALL).depends_on(&["x-b"]),
                Arc::new(Nop),
            )
            .unwrap();

        let err = registry
            .register(
                Descriptor::new("x-b", 0, ALL).depends_on(&["x-a"]),
                Arc::new(Nop),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));

        // The rejected registration is rolled back.
        assert!(registry.lookup("x-b").is_none());
        assert!(registry.lookup("x-a").is_some());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register(Descriptor::new("type", 0, ALL), Arc::new(Nop))
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
    }

    #[test]
    fn test_enumerate_by_draft() {
        let registry = Registry::new();

        let d7: Vec<&str> = registry
            .enumerate(Draft::Draft7)
            .map(|d| d.name.as_str())
            .collect();
        assert!(d7.contains(&"dependencies"));
        assert!(!d7.contains(&"dependentSchemas"));
        assert!(!d7.contains(&"unevaluatedProperties"));

        let d2020: Vec<&str> = registry
            .enumerate(Draft::Draft202012)
            .map(|d| d.name.as_str())
            .collect();
        assert!(d2020.contains(&"prefixItems"));
        assert!(d2020.contains(&"$dynamicRef"));
        assert!(!d2020.contains(&"$recursiveRef"));
    }
}
