// Prompt wording for the built-in stages. Placeholders are `{field_name}`.

pub(super) const CLASSIFY: &str = "\
Analyze the following content and classify it into one of these categories:
Technology, Business, Science, Health, Entertainment, Education, or Other.

Content: {scraped_content}

Category:";

pub(super) const SUMMARIZE: &str = "\
Provide a concise summary of the following content in 2-3 sentences.

Content: {scraped_content}

Summary:";

pub(super) const EXTRACT_TAGS: &str = "\
Analyze the following content and extract 5-7 most relevant tags that represent the main topics.
Return the tags as a comma-separated list.

Content: {scraped_content}

Tags:";

pub(super) const SUGGEST_TOPICS: &str = "\
Based on the following content and its tags, suggest 3-5 related topics that would be interesting to explore further.
Return the topics as a comma-separated list.

Content: {scraped_content}
Tags: {tags}

Related Topics:";

pub(super) const SENTIMENT: &str = "\
Analyze the sentiment of the following content.
Provide a sentiment score from -1 (very negative) to 1 (very positive) and a brief explanation.
Format: Score: [number], Explanation: [text]

Content: {scraped_content}

Sentiment Analysis:";

pub(super) const KEY_PHRASES: &str = "\
Extract 3-5 key phrases or important quotes from the following content.
For each phrase/quote, provide a brief context of why it's important.
Format each entry as: \"Phrase: [text] - Context: [explanation]\"

Content: {scraped_content}

Key Phrases:";

pub(super) const READABILITY: &str = "\
Analyze the readability of the following content.
Provide:
1. A readability score (1-10, where 10 is most complex)
2. The suggested target audience (e.g., \"General Public\", \"Academic\", \"Technical\")
3. Brief explanation of the complexity level

Content: {scraped_content}

Readability Analysis:";

pub(super) const FACT_CHECK: &str = "\
Identify 3-5 key facts or claims from the following content that might need verification.
For each fact/claim, provide:
1. The statement
2. Why it might need verification
3. Suggested sources to verify

Content: {scraped_content}

Facts to Verify:";

pub(super) const STRUCTURE: &str = "\
Analyze the structure and organization of the following content.
Provide:
1. The main sections/topics
2. The logical flow of the content
3. Suggestions for better organization (if any)

Content: {scraped_content}

Structure Analysis:";
