//! Data-source selector.

use dyb_core::{Error, PathKey, Result};

/// Selects which of its ordered inputs feeds downstream computation.
///
/// `selected_index < available.len()` holds at all times: construction requires at
/// least one source and every selection is bounds-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceSwitch {
    selected: usize,
    available: Vec<String>,
}

impl DataSourceSwitch {
    pub(crate) fn new(available: Vec<String>) -> Result<Self> {
        if available.is_empty() {
            return Err(Error::Validation("a switch needs at least one source".to_string()));
        }
        for (i, name) in available.iter().enumerate() {
            if available[..i].contains(name) {
                return Err(Error::Validation(format!("duplicate switch source '{name}'")));
            }
        }
        Ok(Self { selected: 0, available })
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn current_name(&self) -> &str {
        &self.available[self.selected]
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.available.iter().position(|n| n == name)
    }

    /// Bounds-checked selection. Negative indices never wrap around.
    /// Returns whether the selection changed.
    pub(crate) fn select(&mut self, switch: &PathKey, index: i64) -> Result<bool> {
        let len = self.available.len();
        let idx = usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| Error::IndexOutOfRange { switch: switch.to_dotted(), index, len })?;
        let changed = idx != self.selected;
        self.selected = idx;
        Ok(changed)
    }

    /// Resolve a source name to its index.
    pub(crate) fn resolve(&self, switch: &PathKey, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| Error::UnknownSourceName {
            switch: switch.to_dotted(),
            name: name.to_string(),
            available: self.available.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> (PathKey, DataSourceSwitch) {
        let path = PathKey::parse("nodes.data.proxy").unwrap();
        let sw = DataSourceSwitch::new(vec!["asimov".into(), "real".into()]).unwrap();
        (path, sw)
    }

    #[test]
    fn bounds() {
        let (path, mut sw) = proxy();
        assert!(sw.select(&path, 1).unwrap());
        assert!(!sw.select(&path, 1).unwrap());
        assert_eq!(sw.current_name(), "real");
        assert!(sw.select(&path, 0).unwrap());

        for bad in [2, -1, i64::MIN, i64::MAX] {
            let err = sw.select(&path, bad).unwrap_err();
            assert!(matches!(err, Error::IndexOutOfRange { index, len: 2, .. } if index == bad));
        }
        assert_eq!(sw.selected_index(), 0);
    }

    #[test]
    fn names() {
        let (path, sw) = proxy();
        assert_eq!(sw.resolve(&path, "real").unwrap(), 1);
        assert!(matches!(sw.resolve(&path, "toy"), Err(Error::UnknownSourceName { .. })));
    }

    #[test]
    fn construction_rules() {
        assert!(DataSourceSwitch::new(vec![]).is_err());
        assert!(DataSourceSwitch::new(vec!["a".into(), "a".into()]).is_err());
    }
}
