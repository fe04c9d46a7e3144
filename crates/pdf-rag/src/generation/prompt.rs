//! Prompt template for grounded answers

/// Builds the answer prompt around a single retrieved page
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// What the corpus is about, e.g. "yoga exercises"
    corpus_description: String,
}

impl PromptBuilder {
    pub fn new(corpus_description: impl Into<String>) -> Self {
        Self {
            corpus_description: corpus_description.into(),
        }
    }

    pub fn corpus_description(&self) -> &str {
        &self.corpus_description
    }

    /// Interpolate the question and the retrieved passage into the template
    pub fn build(&self, question: &str, context: &str) -> String {
        format!(
            r#"You are a helpful assistant for answering questions based on the retrieved context from a {topic} PDF. Your task is to provide clear, simple, and detailed answers, specifically tailored for a beginner.

- Use the provided context to answer the query.
- If the context doesn't contain the answer, acknowledge that you don't know.
- Ensure your answer is detailed and easy to understand for someone new to the subject.
- Organize your response in a structured and step-by-step manner where appropriate.
- Use markdown formatting for headers, lists, and emphasis.
- Use '\n' for line breaks to ensure proper formatting.

Question: {question}
Context: {context}
Answer:
"#,
            topic = self.corpus_description,
            question = question,
            context = context
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("yoga exercises")
    }
}
