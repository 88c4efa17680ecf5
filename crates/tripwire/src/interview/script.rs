//! The fixed interview script handed to the conversational agent.
//!
//! The system never writes per-session question wording; it supplies the
//! intents and the closing protocol and lets the agent phrase them.

use serde::{Deserialize, Serialize};

use super::verdict::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionIntent {
    Summarize,
    MainPoint,
    ExplainConcept,
}

impl QuestionIntent {
    pub const ALL: [QuestionIntent; 3] = [
        QuestionIntent::Summarize,
        QuestionIntent::MainPoint,
        QuestionIntent::ExplainConcept,
    ];

    pub fn prompt(&self) -> &'static str {
        match self {
            QuestionIntent::Summarize => "Can you summarize what you wrote in your own words?",
            QuestionIntent::MainPoint => "What was the main point you were trying to make?",
            QuestionIntent::ExplainConcept => {
                "Can you explain a specific concept from your submission?"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewScript {
    pub greeting: String,
    pub intents: Vec<QuestionIntent>,
    pub closing: String,
    pub verdict_marker: String,
}

impl InterviewScript {
    pub fn standard(verdict_marker: &str) -> Self {
        Self {
            greeting: format!(
                "I need to verify your understanding of the assignment. {}",
                QuestionIntent::Summarize.prompt()
            ),
            intents: QuestionIntent::ALL.to_vec(),
            closing: "Thanks! Your response has been recorded.".to_string(),
            verdict_marker: verdict_marker.to_string(),
        }
    }

    /// Instructions for the agent's reasoning model.
    pub fn agent_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are verifying a student understood their assignment submission.\n\
             Their submission was flagged for potential AI assistance.\n\n",
        );
        prompt.push_str(&format!("Ask {} quick questions:\n", self.intents.len()));
        for (i, intent) in self.intents.iter().enumerate() {
            prompt.push_str(&format!("{}. \"{}\"\n", i + 1, intent.prompt()));
        }

        let tokens: Vec<&str> = [Verdict::LikelyCheated, Verdict::Unclear, Verdict::Legitimate]
            .iter()
            .map(Verdict::token)
            .collect();
        prompt.push_str(&format!(
            "\nBe conversational, not interrogative. After {} questions, say:\n\"{}\"\n\n\
             Then output: {} {}",
            self.intents.len(),
            self.closing,
            self.verdict_marker,
            tokens.join(" | ")
        ));
        prompt
    }
}
