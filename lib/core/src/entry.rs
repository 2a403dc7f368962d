use serde::{Deserialize, Serialize};

/// A product in the retrieval corpus.
///
/// Entries are immutable once ingested and are paired 1:1 with a vector by
/// their slot in the index. The ingestion aliases (`product_id`,
/// `product_title`, ...) are accepted so corpus dumps can be loaded as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    #[serde(alias = "product_id")]
    pub id: String,
    #[serde(alias = "product_title", default)]
    pub title: String,
    #[serde(alias = "product_description", default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
}

impl CorpusEntry {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            image_url: image_url.into(),
        }
    }

    /// Text used when the entry is embedded without its image
    pub fn embedding_text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// One ranked hit from [`crate::SimilarityIndex::search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entry: CorpusEntry,
    pub relevance_score: f32,
    /// Slot of the entry in the index; the tie-break key
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ingestion_aliases() {
        let raw = serde_json::json!({
            "product_id": "B01",
            "product_title": "Espresso machine",
            "product_description": "Stainless steel",
            "image_url": "https://img/1.jpg"
        });
        let entry: CorpusEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.id, "B01");
        assert_eq!(entry.title, "Espresso machine");
        assert_eq!(entry.embedding_text(), "Espresso machine Stainless steel");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let entry: CorpusEntry = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(entry.title, "");
        assert_eq!(entry.image_url, "");
    }
}
