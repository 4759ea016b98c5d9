use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maps source values of a property to display labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Codelist {
    #[serde(default)]
    entries: IndexMap<String, String>,

    /// Label for values without an entry; the value itself is kept if this is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback: Option<String>,
}

impl Codelist {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn lookup<'a>(&'a self, value: &'a str) -> &'a str {
        self.entries
            .get(value)
            .or(self.fallback.as_ref())
            .map(String::as_str)
            .unwrap_or(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_with_and_without_fallback() {
        let codelist = Codelist::new([
            ("1".to_string(), "residential".to_string()),
            ("2".to_string(), "commercial".to_string()),
        ]);
        assert_eq!(codelist.lookup("2"), "commercial");
        assert_eq!(codelist.lookup("9"), "9");

        let codelist = codelist.with_fallback("other");
        assert_eq!(codelist.lookup("9"), "other");
    }
}
