//! Character budget for context bundles.
//!
//! Bundles are measured in characters of rendered output rather than
//! tokens; roughly four characters make a token for source code, which is
//! close enough for sizing a prompt.

/// Rough token count for `text` at four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// A running allowance of rendered characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharBudget {
    limit: usize,
    used: usize,
}

impl CharBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Reserve `chars` if they fit. Nothing is reserved on failure.
    pub fn try_take(&mut self, chars: usize) -> bool {
        if chars > self.remaining() {
            return false;
        }
        self.used += chars;
        true
    }
}

/// Cut `text` to at most `max_chars`, keeping whole lines.
///
/// The first line is kept (and cut mid-line if needed) so the caller always
/// gets something when `max_chars > 0`.
pub fn truncate_to_fit(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut result = String::new();
    let mut used = 0usize;
    for (i, line) in text.lines().enumerate() {
        let cost = line.chars().count() + usize::from(i > 0);
        if used + cost > max_chars {
            if i == 0 {
                result = line.chars().take(max_chars).collect();
            }
            break;
        }
        if i > 0 {
            result.push('\n');
        }
        result.push_str(line);
        used += cost;
    }
    result
}
