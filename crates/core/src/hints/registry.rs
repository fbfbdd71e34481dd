/// Predicate name whose hints demote code blocks to data.
pub const INVALID: &str = "invalid";

/// What accepting a hint for a predicate does to the program model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintEffect {
    /// Reclassify the covering code block as data.
    Demote,
    /// Accepted and logged only.
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub effect: HintEffect,
}

/// Ordered set of recognized predicates.
///
/// Registration order is the order in which predicates are logged and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateRegistry {
    predicates: Vec<Predicate>,
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self { predicates: vec![Predicate { name: INVALID.to_string(), effect: HintEffect::Demote }] }
    }
}

impl PredicateRegistry {
    /// Registry containing only the built-in `invalid` predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with extra record-only predicates appended after the built-ins.
    pub fn with_extra<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name.as_ref(), HintEffect::Record);
        }
        registry
    }

    /// Register a predicate. Re-registering an existing name keeps its position and effect.
    pub fn register(&mut self, name: &str, effect: HintEffect) -> &mut Self {
        let name = name.trim();
        if !name.is_empty() && self.position(name).is_none() {
            self.predicates.push(Predicate { name: name.to_string(), effect });
        }
        self
    }

    /// Registry position of `name`, used as the primary ordering key for hints.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.predicates.iter().position(|p| p.name == name)
    }

    pub fn get(&self, position: usize) -> Option<&Predicate> {
        self.predicates.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.predicates.iter().map(|p| p.name.clone()).collect()
    }
}
