//! Narrative synthesis for the simulated backend.
//!
//! Produces a deterministic clinical narrative from the request so that
//! simulated sessions exercise the same chunk/complete contract as a real
//! model, including the `max_tokens` stop reason.

use praxis_core::models::narrative::NarrativeRequest;

use crate::events::StopReason;

const SUBJECT_LIMIT: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedNarrative {
    pub text: String,
    pub stop_reason: StopReason,
}

impl SynthesizedNarrative {
    pub fn tokens(&self) -> Vec<&str> {
        split_words(&self.text)
    }
}

/// Compose the narrative for `request`, truncated to `max_tokens` words.
pub fn synthesize(request: &NarrativeRequest) -> SynthesizedNarrative {
    let subject = subject_line(&request.prompt);

    let mut text = String::new();
    if request
        .prefill
        .as_deref()
        .is_some_and(|p| !p.is_empty() && !p.ends_with(char::is_whitespace))
    {
        text.push(' ');
    }
    text.push_str(&format!(
        "The session focused on {subject}. The client arrived on time, was \
         alert and oriented, and engaged openly throughout. Mood was described \
         as steady with intermittent stress, and affect was congruent. The \
         client reviewed progress since the previous visit and identified one \
         situation where coping strategies were applied successfully. \
         Interventions included reflective listening, cognitive restructuring, \
         and collaborative goal review. No safety concerns were reported or \
         observed. Plan: continue the current treatment frequency, practice \
         the agreed strategies between sessions, and revisit goals at the \
         next appointment."
    ));

    match request.max_tokens.map(|n| n as usize) {
        Some(limit) => {
            let tokens = split_words(&text);
            if limit < tokens.len() {
                let truncated: String = tokens[..limit].concat();
                return SynthesizedNarrative {
                    text: truncated,
                    stop_reason: StopReason::MaxTokens,
                };
            }
            SynthesizedNarrative {
                text,
                stop_reason: StopReason::EndTurn,
            }
        }
        None => SynthesizedNarrative {
            text,
            stop_reason: StopReason::EndTurn,
        },
    }
}

fn subject_line(prompt: &str) -> String {
    let first = prompt
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("the client's presenting concerns");
    let trimmed = first.trim_end_matches(['.', '!', '?']);
    let mut subject: String = trimmed.chars().take(SUBJECT_LIMIT).collect();
    if let Some(first_char) = subject.chars().next()
        && first_char.is_uppercase()
        && subject.chars().nth(1).is_some_and(char::is_lowercase)
    {
        let lower: String = first_char.to_lowercase().collect();
        subject.replace_range(..first_char.len_utf8(), &lower);
    }
    subject
}

/// Split into word tokens, each carrying its trailing whitespace, so that
/// concatenating the tokens reproduces `text` exactly. Leading whitespace
/// stays attached to the first token.
pub fn split_words(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut seen_word = false;
    let mut previous_was_space = false;

    for (index, c) in text.char_indices() {
        let is_space = c.is_whitespace();
        if !is_space && previous_was_space && seen_word {
            tokens.push(&text[start..index]);
            start = index;
        }
        if !is_space {
            seen_word = true;
        }
        previous_was_space = is_space;
    }

    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}
