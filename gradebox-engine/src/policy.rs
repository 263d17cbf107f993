//! The restricted-subset policy: what learner code may name, import and
//! consume.
//!
//! Everything here is checked at compile time except the runtime ceilings
//! (`MAX_CALL_DEPTH`, `MAX_EVAL_DEPTH`, `MAX_SEQUENCE_LEN`,
//! `MAX_TRANSCRIPT_BYTES`), which the interpreter consults as it runs.

/// Modules learner code may import. Pure, deterministic computation only.
pub const ALLOWED_MODULES: &[&str] = &["math"];

/// Largest source text the front end accepts, in bytes.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Deepest syntactic nesting the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Deepest expression tree the parser builds. Every operator link in a chain
/// such as `a + b + c` or `x[0][1]` counts, on top of the syntactic nesting.
pub const MAX_EXPR_DEPTH: usize = 200;

/// Deepest chain of user-function calls before a runtime error.
pub const MAX_CALL_DEPTH: usize = 100;

/// Deepest combined nesting of expression evaluation and statement blocks,
/// summed across active calls. Keeps the interpreter inside the main stack.
pub const MAX_EVAL_DEPTH: usize = 600;

/// Largest sequence a single repetition or `range` materialisation may build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 22;

/// Deepest container nesting for comparison, printing and submission.
pub const MAX_VALUE_DEPTH: usize = 100;

/// `print` output kept per run; the rest is dropped.
pub const MAX_TRANSCRIPT_BYTES: usize = 64 * 1024;

/// Reserved words of the accepted language, including the ones it rejects.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def",
    "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Keywords that start constructs outside the supported subset.
pub const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "class", "lambda", "try", "except", "finally", "with", "global", "nonlocal", "del", "yield", "async",
    "await", "raise", "assert",
];

/// `true` for reserved words.
#[must_use]
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Rejects identifiers that could reach interpreter internals.
///
/// # Errors
/// Returns the human-readable cause for names starting with `_`.
pub fn check_name(name: &str) -> Result<(), String> {
    if name.starts_with('_') {
        return Err(format!("\"{name}\" is an invalid variable name because it starts with \"_\""));
    }
    Ok(())
}

/// Rejects attribute names that could reach interpreter internals.
///
/// # Errors
/// Returns the human-readable cause for attributes starting with `_`.
pub fn check_attribute(attr: &str) -> Result<(), String> {
    if attr.starts_with('_') {
        return Err(format!("\"{attr}\" is an invalid attribute name because it starts with \"_\""));
    }
    Ok(())
}

/// Rejects imports outside [`ALLOWED_MODULES`].
///
/// # Errors
/// Returns the human-readable cause for any other module.
pub fn check_import(module: &str) -> Result<(), String> {
    if ALLOWED_MODULES.contains(&module) {
        Ok(())
    } else {
        Err(format!("import of module '{module}' is not allowed"))
    }
}
