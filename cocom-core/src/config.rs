//! Enricher configuration.

/// Records buffered by the flattener before each bulk upload.
pub const MAX_SIZE_BULK_ENRICHED_ITEMS: usize = 200;

/// Settings applied while flattening raw events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnricherConfig {
    /// Flattener batch size; independent of the store's bulk limit.
    pub bulk_size: usize,
    /// Labels attached to every record of the repository.
    pub repository_labels: Option<Vec<String>>,
    /// Raw filter the repository was collected with.
    pub filter_raw: Option<String>,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            bulk_size: MAX_SIZE_BULK_ENRICHED_ITEMS,
            repository_labels: None,
            filter_raw: None,
        }
    }
}

impl EnricherConfig {
    /// Set repository labels, ignoring blank entries.
    pub fn with_repository_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        self.repository_labels = if labels.is_empty() {
            None
        } else {
            Some(labels)
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{EnricherConfig, MAX_SIZE_BULK_ENRICHED_ITEMS};

    #[test]
    fn default_uses_fixed_flattener_batch() {
        let config = EnricherConfig::default();
        assert_eq!(config.bulk_size, MAX_SIZE_BULK_ENRICHED_ITEMS);
        assert!(config.repository_labels.is_none());
    }

    #[test]
    fn labels_drop_blank_entries() {
        let config = EnricherConfig::default().with_repository_labels(["core", " ", "ui "]);
        assert_eq!(
            config.repository_labels,
            Some(vec!["core".to_string(), "ui".to_string()])
        );
        let config = EnricherConfig::default().with_repository_labels(Vec::<String>::new());
        assert!(config.repository_labels.is_none());
    }
}
