//! Configuration types.

/// Tunables for one import run.
///
/// Every option the caller can influence lives here with its default.
/// The encoding and separator fields are handed to the external
/// tokenizer; the pipeline itself only reads already-split rows.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Number of models submitted per bulk apply call. `0` disables
    /// chunking (everything goes out in one call).
    pub chunk_size: usize,
    /// Minimum number of columns the header row must have before any
    /// mapping is attempted.
    pub required_header_length: usize,
    /// Delimiter used to split array-valued foreign-key fields
    /// ("Board, Staff" -> two group references).
    pub name_delimiter: char,
    /// Source encoding used when decoding raw bytes.
    pub encoding: String,
    /// Field delimiter of the tabular input. `None` means the tokenizer
    /// auto-detects it.
    pub column_separator: Option<char>,
    /// Quote character of the tabular input.
    pub text_separator: char,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            required_header_length: 2,
            name_delimiter: ',',
            encoding: "utf-8".to_string(),
            column_separator: None,
            text_separator: '"',
        }
    }
}
