//! Prompt normalization and validation.
//!
//! Cleaning never fails: it always yields a [`CleanedPrompt`], and callers must check
//! [`CleanedPrompt::valid`] before anything is dispatched.

use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use thiserror::Error;

use crate::config::PromptConfig;
use crate::processing::{FailureKind, FailureReport, PiiFilter};

/// Fewer alphanumeric characters than this after injection removal means nothing usable is left.
const MIN_MEANINGFUL_ALPHANUMERICS: usize = 3;

/// Longest run of one repeated punctuation character kept verbatim.
const MAX_PUNCTUATION_RUN: usize = 3;

const SCRIPT_BLOCK: &str = r"(?is)<script\b[^>]*>.*?</script\s*>";
const HTML_TAG: &str = r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>";

/// Phrases that try to override the model's instructions. Gaps are bounded and never cross a
/// line so one match cannot swallow an entire prompt.
const INJECTION_PATTERNS: [&str; 6] = [
    r"(?i)\b(?:ignore|forget|disregard)\b[^\n]{0,80}?\b(?:previous|above|earlier|prior)\b[^\n]{0,40}?\b(?:instructions?|prompts?|rules?)\b",
    r"(?i)\b(?:system|admin|root)\b[^\n]{0,40}?\b(?:override|bypass)\b",
    r"(?i)\bjailbreak(?:s|ing)?\b",
    r"(?i)\bpretend\s+(?:you\s+are|to\s+be)\b",
    r"(?i)\bact\s+as\s+if\b",
    r"(?i)\b(?:developer|DAN)\s+mode\b",
];

/// Why a prompt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRejection {
    /// Nothing but whitespace or markup remained.
    #[error("prompt is empty after cleaning")]
    Empty,
    /// The prompt consisted of instruction-override content and little else.
    #[error("prompt contains only filtered instructions")]
    InjectionOnly,
}

impl PromptRejection {
    /// Taxonomy bucket of this rejection.
    pub fn kind(&self) -> FailureKind {
        FailureKind::EmptyOrInvalidPrompt
    }
}

impl From<&PromptRejection> for FailureReport {
    fn from(rejection: &PromptRejection) -> Self {
        Self::new(rejection.kind(), rejection.to_string())
    }
}

/// Sanitized prompt plus its validation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedPrompt {
    /// Normalized prompt text, at most the configured number of characters.
    pub text: String,
    /// Whether the prompt may be dispatched.
    pub valid: bool,
    /// Reason the prompt was refused, when `valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PromptRejection>,
    /// Whether the text was cut at the configured maximum.
    pub truncated: bool,
    /// Number of injection phrases removed.
    pub removed_injections: usize,
    /// PII placeholders present in `text`.
    pub redactions: usize,
}

impl CleanedPrompt {
    /// The rejection as a `Result`, for callers that propagate with `?`.
    pub fn validate(&self) -> Result<(), PromptRejection> {
        match self.rejection {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }
}

/// Normalizes free-form prompts and strips instruction-override phrases.
#[derive(Debug, Clone)]
pub struct PromptCleaner {
    max_chars: usize,
    pii: Option<PiiFilter>,
    script_block: Regex,
    html_tag: Regex,
    injections: Vec<Regex>,
}

impl PromptCleaner {
    /// Compile the cleaning patterns and bind the length limit.
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            pii: None,
            script_block: compile(SCRIPT_BLOCK),
            html_tag: compile(HTML_TAG),
            injections: INJECTION_PATTERNS.iter().map(|pattern| compile(pattern)).collect(),
        }
    }

    /// Redact PII with `filter` before the length limit is applied.
    pub fn with_pii_filter(mut self, filter: PiiFilter) -> Self {
        self.pii = Some(filter);
        self
    }

    /// Clean `raw` and decide whether it may be dispatched.
    pub fn clean(&self, raw: &str) -> CleanedPrompt {
        let text = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text = strip_invisible(&text);
        let text = self.script_block.replace_all(&text, " ");
        let text = self.html_tag.replace_all(&text, " ");

        let mut text = text.into_owned();
        let mut removed_injections = 0;
        for pattern in &self.injections {
            let found = pattern.find_iter(&text).count();
            if found > 0 {
                removed_injections += found;
                text = pattern.replace_all(&text, " ").into_owned();
            }
        }

        let text = cap_punctuation_runs(&text);
        let mut text = normalize_whitespace(&text);
        if let Some(filter) = &self.pii {
            text = filter.filter(&text).text;
        }

        let spans = self.placeholder_spans(&text);
        let (text, truncated) = truncate(text, self.max_chars, &spans);
        let placeholders = self.placeholder_spans(&text);

        // Placeholders stand in for user data, not for prompt content.
        let alphanumerics = count_alphanumerics(&text)
            - placeholders
                .iter()
                .map(|span| count_alphanumerics(&text[span.clone()]))
                .sum::<usize>();
        let rejection = if removed_injections > 0 && alphanumerics < MIN_MEANINGFUL_ALPHANUMERICS {
            Some(PromptRejection::InjectionOnly)
        } else if text.is_empty() {
            Some(PromptRejection::Empty)
        } else {
            None
        };

        tracing::debug!(
            input_chars = raw.chars().count(),
            output_chars = text.chars().count(),
            removed_injections,
            redactions = placeholders.len(),
            truncated,
            rejection = ?rejection,
            "Cleaned prompt"
        );

        CleanedPrompt {
            valid: rejection.is_none(),
            rejection,
            text,
            truncated,
            removed_injections,
            redactions: placeholders.len(),
        }
    }

    fn placeholder_spans(&self, text: &str) -> Vec<Range<usize>> {
        match &self.pii {
            Some(filter) => filter.placeholder_spans(text).collect(),
            None => Vec::new(),
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in prompt pattern must compile")
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// Drop control characters other than newline and tab, plus zero-width characters.
fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || c == '\t' || !(c.is_control() || is_zero_width(c)))
        .collect()
}

fn cap_punctuation_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous = None;
    let mut run = 0;
    for c in text.chars() {
        if previous == Some(c) {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if c.is_ascii_punctuation() && run > MAX_PUNCTUATION_RUN {
            continue;
        }
        out.push(c);
    }
    out
}

/// Collapse horizontal whitespace to one space per line, keep at most one blank line between
/// paragraphs, and trim the result.
fn normalize_whitespace(text: &str) -> String {
    let mut lines = Vec::new();
    let mut blank_run = 0;
    for line in text.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(collapsed);
    }
    lines.join("\n").trim().to_string()
}

fn count_alphanumerics(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

/// Cut to `max_chars`, moving the cut back to the start of any placeholder it would split.
fn truncate(text: String, max_chars: usize, placeholders: &[Range<usize>]) -> (String, bool) {
    let Some((mut cut, _)) = text.char_indices().nth(max_chars) else {
        return (text, false);
    };
    if let Some(span) = placeholders
        .iter()
        .find(|span| span.start < cut && cut < span.end)
    {
        cut = span.start;
    }
    (text[..cut].trim_end().to_string(), true)
}
