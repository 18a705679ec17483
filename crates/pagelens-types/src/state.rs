//! The shared state record and the partial updates stages merge into it.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{FetchReason, PagelensError, Result};

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Every field a [`SharedState`] can carry. Declaration order is record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Url,
    ScrapedContent,
    Classification,
    Summary,
    Tags,
    RelatedTopics,
    Sentiment,
    KeyPhrases,
    Readability,
    FactsToVerify,
    Structure,
}

/// Whether a field holds a single text value or an ordered list of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Url,
        Field::ScrapedContent,
        Field::Classification,
        Field::Summary,
        Field::Tags,
        Field::RelatedTopics,
        Field::Sentiment,
        Field::KeyPhrases,
        Field::Readability,
        Field::FactsToVerify,
        Field::Structure,
    ];

    /// Fields present from the moment a state is created.
    pub const BASE: [Field; 2] = [Field::Url, Field::ScrapedContent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Url => "url",
            Field::ScrapedContent => "scraped_content",
            Field::Classification => "classification",
            Field::Summary => "summary",
            Field::Tags => "tags",
            Field::RelatedTopics => "related_topics",
            Field::Sentiment => "sentiment",
            Field::KeyPhrases => "key_phrases",
            Field::Readability => "readability",
            Field::FactsToVerify => "facts_to_verify",
            Field::Structure => "structure",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Tags | Field::RelatedTopics | Field::KeyPhrases | Field::FactsToVerify => {
                FieldKind::List
            }
            _ => FieldKind::Text,
        }
    }

    pub fn is_base(&self) -> bool {
        Field::BASE.contains(self)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = PagelensError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| PagelensError::Other(format!("Unknown field '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::List(_) => FieldKind::List,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }

    /// Render the value for inclusion in a prompt. Lists are joined with `", "`.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

// ---------------------------------------------------------------------------
// PartialUpdate
// ---------------------------------------------------------------------------

/// The one-or-more-field mapping a stage contributes back into a [`SharedState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    values: BTreeMap<Field, FieldValue>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(field: Field, value: impl Into<String>) -> Self {
        let mut update = Self::new();
        update.insert(field, FieldValue::Text(value.into()));
        update
    }

    pub fn list(field: Field, items: Vec<String>) -> Self {
        let mut update = Self::new();
        update.insert(field, FieldValue::List(items));
        update
    }

    pub fn insert(&mut self, field: Field, value: FieldValue) {
        self.values.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for PartialUpdate {
    type Item = (Field, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<Field, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// The single growable record threaded through every stage of one run.
///
/// `url` and `scraped_content` are fixed at creation. Every derived field is
/// written at most once, and only as a whole, via [`merge`](SharedState::merge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedState {
    url: String,
    scraped_content: String,
    derived: BTreeMap<Field, FieldValue>,
}

impl SharedState {
    /// Create a state for a successfully fetched page.
    ///
    /// Blank content is rejected as a fetch failure so no stage ever sees it.
    pub fn new(url: impl Into<String>, scraped_content: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let scraped_content = scraped_content.into();
        if url.trim().is_empty() {
            return Err(PagelensError::fetch(url, FetchReason::InvalidUrl, "URL is empty"));
        }
        if scraped_content.trim().is_empty() {
            return Err(PagelensError::fetch(
                url,
                FetchReason::EmptyContent,
                "page produced no readable text",
            ));
        }
        Ok(Self {
            url,
            scraped_content,
            derived: BTreeMap::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scraped_content(&self) -> &str {
        &self.scraped_content
    }

    /// `true` if the field has been written (base fields are always present).
    pub fn contains(&self, field: Field) -> bool {
        field.is_base() || self.derived.contains_key(&field)
    }

    /// `true` if the field is present and non-empty, i.e. usable as a stage input.
    pub fn is_satisfied(&self, field: Field) -> bool {
        match field {
            Field::Url => !self.url.trim().is_empty(),
            Field::ScrapedContent => !self.scraped_content.trim().is_empty(),
            _ => self.derived.get(&field).is_some_and(|v| !v.is_empty()),
        }
    }

    /// Text value of a field, if present and text-kinded.
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Url => Some(&self.url),
            Field::ScrapedContent => Some(&self.scraped_content),
            _ => self.derived.get(&field).and_then(FieldValue::as_text),
        }
    }

    /// List value of a field, if present and list-kinded.
    pub fn list(&self, field: Field) -> Option<&[String]> {
        self.derived.get(&field).and_then(FieldValue::as_list)
    }

    /// Value of a field rendered for prompt substitution.
    pub fn render_field(&self, field: Field) -> Option<String> {
        match field {
            Field::Url => Some(self.url.clone()),
            Field::ScrapedContent => Some(self.scraped_content.clone()),
            _ => self.derived.get(&field).map(FieldValue::render),
        }
    }

    /// Present fields, in record order.
    pub fn fields(&self) -> Vec<Field> {
        Field::BASE
            .iter()
            .copied()
            .chain(self.derived.keys().copied())
            .collect()
    }

    /// Merge a stage's update into the state.
    ///
    /// Every field is checked before any is written: it must be listed in
    /// `owned`, not yet present, and of the field's kind. On violation nothing
    /// is applied.
    pub fn merge(
        &mut self,
        stage: &str,
        owned: &BTreeSet<Field>,
        update: PartialUpdate,
    ) -> Result<()> {
        for (field, value) in &update.values {
            let violation = |message: String| PagelensError::OwnershipViolation {
                stage: stage.to_string(),
                field: field.to_string(),
                message,
            };
            if !owned.contains(field) {
                return Err(violation("field is not declared in the stage's outputs".into()));
            }
            if self.contains(*field) {
                return Err(violation("field is already populated".into()));
            }
            if value.kind() != field.kind() {
                return Err(violation(format!(
                    "expected a {:?} value, got {:?}",
                    field.kind(),
                    value.kind()
                )));
            }
        }

        let keys: Vec<Field> = update.fields().collect();
        self.derived.extend(update);
        tracing::debug!(stage, fields = ?keys, "Merged stage output");
        Ok(())
    }
}

impl Serialize for SharedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.derived.len()))?;
        map.serialize_entry(Field::Url.as_str(), &self.url)?;
        map.serialize_entry(Field::ScrapedContent.as_str(), &self.scraped_content)?;
        for (field, value) in &self.derived {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::new("https://example.com", "Example Domain.").unwrap()
    }

    fn owns(fields: &[Field]) -> BTreeSet<Field> {
        fields.iter().copied().collect()
    }

    #[test]
    fn new_rejects_blank_content() {
        let err = SharedState::new("https://example.com", "  \n ").unwrap_err();
        assert!(matches!(
            err,
            PagelensError::Fetch {
                reason: FetchReason::EmptyContent,
                ..
            }
        ));
    }

    #[test]
    fn new_rejects_empty_url() {
        let err = SharedState::new("", "text").unwrap_err();
        assert!(matches!(
            err,
            PagelensError::Fetch {
                reason: FetchReason::InvalidUrl,
                ..
            }
        ));
    }

    #[test]
    fn base_fields_present_derived_absent() {
        let s = state();
        assert!(s.contains(Field::Url));
        assert!(s.contains(Field::ScrapedContent));
        assert!(!s.contains(Field::Summary));
        assert_eq!(s.fields(), vec![Field::Url, Field::ScrapedContent]);
    }

    #[test]
    fn merge_adds_owned_field() {
        let mut s = state();
        s.merge(
            "classify",
            &owns(&[Field::Classification]),
            PartialUpdate::text(Field::Classification, "Technology"),
        )
        .unwrap();
        assert_eq!(s.text(Field::Classification), Some("Technology"));
    }

    #[test]
    fn merge_never_overwrites_existing_field() {
        let mut s = state();
        let owned = owns(&[Field::Summary]);
        s.merge("summarize", &owned, PartialUpdate::text(Field::Summary, "first"))
            .unwrap();
        let err = s
            .merge("summarize", &owned, PartialUpdate::text(Field::Summary, "second"))
            .unwrap_err();
        assert!(matches!(err, PagelensError::OwnershipViolation { .. }));
        assert_eq!(s.text(Field::Summary), Some("first"));
    }

    #[test]
    fn merge_rejects_unowned_field_atomically() {
        let mut s = state();
        let mut update = PartialUpdate::text(Field::Sentiment, "positive");
        update.insert(Field::Summary, FieldValue::Text("sneaky".into()));
        let err = s
            .merge("sentiment", &owns(&[Field::Sentiment]), update)
            .unwrap_err();
        match err {
            PagelensError::OwnershipViolation { stage, field, .. } => {
                assert_eq!(stage, "sentiment");
                assert_eq!(field, "summary");
            }
            other => panic!("expected OwnershipViolation, got {other:?}"),
        }
        assert!(!s.contains(Field::Sentiment));
        assert!(!s.contains(Field::Summary));
    }

    #[test]
    fn merge_rejects_base_field() {
        let mut s = state();
        let err = s
            .merge(
                "rogue",
                &owns(&[Field::ScrapedContent]),
                PartialUpdate::text(Field::ScrapedContent, "replaced"),
            )
            .unwrap_err();
        assert!(matches!(err, PagelensError::OwnershipViolation { .. }));
        assert_eq!(s.scraped_content(), "Example Domain.");
    }

    #[test]
    fn merge_rejects_kind_mismatch() {
        let mut s = state();
        let err = s
            .merge(
                "extract_tags",
                &owns(&[Field::Tags]),
                PartialUpdate::text(Field::Tags, "a, b"),
            )
            .unwrap_err();
        assert!(matches!(err, PagelensError::OwnershipViolation { .. }));
    }

    #[test]
    fn empty_list_is_present_but_not_satisfied() {
        let mut s = state();
        s.merge("extract_tags", &owns(&[Field::Tags]), PartialUpdate::list(Field::Tags, vec![]))
            .unwrap();
        assert!(s.contains(Field::Tags));
        assert!(!s.is_satisfied(Field::Tags));
        assert_eq!(s.list(Field::Tags), Some(&[][..]));
    }

    #[test]
    fn render_field_joins_lists() {
        let mut s = state();
        s.merge(
            "extract_tags",
            &owns(&[Field::Tags]),
            PartialUpdate::list(Field::Tags, vec!["rust".into(), "web".into()]),
        )
        .unwrap();
        assert_eq!(s.render_field(Field::Tags).as_deref(), Some("rust, web"));
        assert_eq!(s.render_field(Field::Summary), None);
    }

    #[test]
    fn serializes_in_record_order() {
        let mut s = state();
        s.merge(
            "extract_tags",
            &owns(&[Field::Tags]),
            PartialUpdate::list(Field::Tags, vec!["a".into()]),
        )
        .unwrap();
        s.merge(
            "classify",
            &owns(&[Field::Classification]),
            PartialUpdate::text(Field::Classification, "Other"),
        )
        .unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(
            json,
            r#"{"url":"https://example.com","scraped_content":"Example Domain.","classification":"Other","tags":["a"]}"#
        );
    }

    #[test]
    fn field_from_str_round_trips_names() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("content".parse::<Field>().is_err());
    }
}
