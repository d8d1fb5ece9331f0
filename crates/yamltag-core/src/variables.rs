//! Caller-supplied variables consulted by `!var`

use indexmap::IndexMap;

/// Variable table built from `key=value` arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    vars: IndexMap<String, String>,
}

impl Variables {
    /// Create an empty variable table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `key=value` strings.
    ///
    /// Each entry is split on the first `=`, so values may themselves
    /// contain `=`. Entries without `=` are dropped. When a key repeats, the
    /// last entry wins.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars = IndexMap::new();
        for arg in args {
            if let Some((key, value)) = arg.as_ref().split_once('=') {
                vars.insert(key.to_string(), value.to_string());
            }
        }
        Self { vars }
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Check if a variable is defined
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Set a variable, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over variables in the order they were supplied
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Variables
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
