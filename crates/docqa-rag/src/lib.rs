//! DocQA RAG - Retrieval-augmented answering over uploaded documents
//!
//! This crate wires the pipeline together:
//! - Upload: parse → chunk → embed → merge into the live index → persist
//! - Ask: embed query → nearest-neighbor search → prompt → LLM → sources
//!
//! The live index is held by an [`IndexRegistry`] and swapped atomically, so
//! queries always search a consistent snapshot.
//!
//! Author: hephaex@gmail.com

pub mod answerer;
pub mod cache;
pub mod llm;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testing;

pub use answerer::RetrievalAnswerer;
pub use cache::{CacheStatsReport, EmbeddingCache};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use registry::IndexRegistry;
pub use service::{DocumentService, IndexStats, RestoreOutcome, UploadReceipt};

// ============================================================================
// Prompt Building
// ============================================================================

/// Helper for assembling LLM prompts
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str("<s>\n");
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n</s>\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<context>\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push_str("\n\n");
            }
            prompt.push_str("</context>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("<instructions>\n");
            for (i, instruction) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, instruction));
            }
            prompt.push_str("</instructions>\n");
        }

        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new()
            .system("You are a helpful assistant.")
            .add_context("[1] Context from document A")
            .add_context("[2] Context from document B")
            .question("What is the answer?")
            .add_instruction("Be concise")
            .add_instruction("Cite sources")
            .build();

        assert!(prompt.contains("<s>"));
        assert!(prompt.contains("You are a helpful assistant."));
        assert!(prompt.contains("<context>"));
        assert!(prompt.contains("What is the answer?"));
        assert!(prompt.contains("1. Be concise"));
        assert!(prompt.contains("2. Cite sources"));
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let prompt = PromptBuilder::new().question("Only a question").build();
        assert!(!prompt.contains("<context>"));
        assert!(!prompt.contains("<s>"));
        assert!(prompt.starts_with("<question>"));
    }
}
