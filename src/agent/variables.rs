use std::collections::BTreeMap;

/// Named values substituted into the system prompt.
///
/// Dotted names such as `user.username` are plain keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    values: BTreeMap<String, String>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `self` overlaid with `overrides`; keys in `overrides` win.
    pub fn merged(&self, overrides: &TemplateVariables) -> TemplateVariables {
        let mut values = self.values.clone();
        values.extend(overrides.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        TemplateVariables { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_when_merging() {
        let defaults = TemplateVariables::new()
            .with("repository", "microsoft/semantic-kernel")
            .with("now", "startup");
        let turn: TemplateVariables = [("now", "10/17/2026 3:04 PM")].into_iter().collect();

        let merged = defaults.merged(&turn);
        assert_eq!(merged.get("repository"), Some("microsoft/semantic-kernel"));
        assert_eq!(merged.get("now"), Some("10/17/2026 3:04 PM"));
        assert_eq!(merged.len(), 2);
        // inputs untouched
        assert_eq!(defaults.get("now"), Some("startup"));
    }
}
