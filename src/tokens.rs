// Token Counter Module
// Approximates token counts with a fixed characters-per-token ratio.
//
// No real tokenizer is involved: every count in the server (fake usage,
// stream usage, tracker totals) goes through these two functions so the
// numbers stay consistent between endpoints.

/// Characters per token used by the approximation
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate the number of tokens in a text.
///
/// `tokens(text) = ceil(chars(text) / 4)`, so the empty string counts 0.
pub fn count_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u32
}

/// Token count for a pre-tokenized input: one token per element
pub fn count_sequence_tokens(len: usize) -> u32 {
    len as u32
}

/// Token count for a scalar (single token id) input
pub const SCALAR_TOKENS: u32 = 1;
