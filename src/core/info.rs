use indexmap::IndexMap;
use std::fmt;

/// Placeholder for data that is unavailable upstream
pub const UNKNOWN: &str = ".";

/// Parsed INFO column: tag name -> optional value (flags carry no value), in order of first occurrence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoField {
    entries: IndexMap<String, Option<String>>,
}

impl InfoField {
    pub fn parse(raw: &str) -> Self {
        let mut entries = IndexMap::new();
        if raw == UNKNOWN {
            return Self { entries };
        }

        for item in raw.split(';').filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (item, None),
            };
            // first occurrence wins for duplicated keys
            entries.entry(key.to_string()).or_insert(value);
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(|v| v.as_deref())
    }

    /// Append a tag at the end, removing any existing entry with the same key first
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries.shift_remove(key);
        self.entries.insert(key.to_string(), Some(value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Display for InfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str(UNKNOWN);
        }

        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            match value {
                Some(value) => write!(f, "{}={}", key, value)?,
                None => f.write_str(key)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AB=0;AO=10;DP=40", "AB=0;AO=10;DP=40")]
    #[case("DB;AO=1", "DB;AO=1")]
    #[case(".", ".")]
    #[case("AO=1;AO=2;RO=3", "AO=1;RO=3")]
    fn test_parse_display(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(InfoField::parse(raw).to_string(), expected);
    }

    #[test]
    fn test_lookup_by_name() {
        let info = InfoField::parse("NS=1;DB;AO=5,5;RO=0");
        assert_eq!(info.get("AO"), Some(Some("5,5")));
        assert_eq!(info.get("DB"), Some(None));
        assert_eq!(info.get("DP"), None);
    }

    #[test]
    fn test_append_moves_existing_tag_to_end() {
        let mut info = InfoField::parse("CSQ=old;AO=1");
        info.append("ExAC_AF", ".");
        info.append("CSQ", "new");

        assert_eq!(info.to_string(), "AO=1;ExAC_AF=.;CSQ=new");
        assert_eq!(info.keys().filter(|k| *k == "CSQ").count(), 1);
    }

    #[test]
    fn test_append_to_empty_info() {
        let mut info = InfoField::parse(".");
        assert!(info.is_empty());
        info.append("PSV", "25.0");
        assert_eq!(info.to_string(), "PSV=25.0");
    }
}
