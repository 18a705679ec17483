//! The nine built-in analysis stages.
//!
//! Every stage reads the scraped page text; `suggest_topics` also reads the
//! tags produced by `extract_tags`, which is why it runs after it.

mod prompts;

use pagelens_types::Field;

use crate::stage::{ParseRule, PromptStage};

pub const CLASSIFY: &str = "classify";
pub const SUMMARIZE: &str = "summarize";
pub const EXTRACT_TAGS: &str = "extract_tags";
pub const SUGGEST_TOPICS: &str = "suggest_topics";
pub const SENTIMENT: &str = "sentiment";
pub const KEY_PHRASES: &str = "key_phrases";
pub const READABILITY: &str = "readability";
pub const FACT_CHECK: &str = "fact_check";
pub const STRUCTURE: &str = "structure";

/// Assign the page one category from a fixed list.
pub fn classify() -> PromptStage {
    PromptStage::new(
        CLASSIFY,
        [Field::ScrapedContent],
        prompts::CLASSIFY,
        ParseRule::Scalar(Field::Classification),
    )
}

/// Two or three sentence summary.
pub fn summarize() -> PromptStage {
    PromptStage::new(
        SUMMARIZE,
        [Field::ScrapedContent],
        prompts::SUMMARIZE,
        ParseRule::Scalar(Field::Summary),
    )
}

pub fn extract_tags() -> PromptStage {
    PromptStage::new(
        EXTRACT_TAGS,
        [Field::ScrapedContent],
        prompts::EXTRACT_TAGS,
        ParseRule::CommaList(Field::Tags),
    )
}

/// Related topics for further reading, seeded by the extracted tags.
pub fn suggest_topics() -> PromptStage {
    PromptStage::new(
        SUGGEST_TOPICS,
        [Field::ScrapedContent, Field::Tags],
        prompts::SUGGEST_TOPICS,
        ParseRule::CommaList(Field::RelatedTopics),
    )
}

pub fn sentiment() -> PromptStage {
    PromptStage::new(
        SENTIMENT,
        [Field::ScrapedContent],
        prompts::SENTIMENT,
        ParseRule::Scalar(Field::Sentiment),
    )
}

pub fn key_phrases() -> PromptStage {
    PromptStage::new(
        KEY_PHRASES,
        [Field::ScrapedContent],
        prompts::KEY_PHRASES,
        ParseRule::LineList(Field::KeyPhrases),
    )
}

pub fn readability() -> PromptStage {
    PromptStage::new(
        READABILITY,
        [Field::ScrapedContent],
        prompts::READABILITY,
        ParseRule::Scalar(Field::Readability),
    )
}

/// Claims from the page that a reader may want to verify.
pub fn fact_check() -> PromptStage {
    PromptStage::new(
        FACT_CHECK,
        [Field::ScrapedContent],
        prompts::FACT_CHECK,
        ParseRule::LineList(Field::FactsToVerify),
    )
}

pub fn structure() -> PromptStage {
    PromptStage::new(
        STRUCTURE,
        [Field::ScrapedContent],
        prompts::STRUCTURE,
        ParseRule::Scalar(Field::Structure),
    )
}

/// All nine stages in execution order.
pub fn standard() -> Vec<PromptStage> {
    vec![
        classify(),
        summarize(),
        extract_tags(),
        suggest_topics(),
        sentiment(),
        key_phrases(),
        readability(),
        fact_check(),
        structure(),
    ]
}

/// The first four stages: classification, summary, tags, related topics.
pub fn minimal() -> Vec<PromptStage> {
    let mut stages = standard();
    stages.truncate(4);
    stages
}
