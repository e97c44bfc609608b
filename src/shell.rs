//! Shell and PowerShell text generation helpers
//!
//! Everything that ends up inside a generated script goes through here so
//! that quoting rules live in one place.

use std::borrow::Cow;

/// Terminator used for POSIX here-documents
pub const HEREDOC_TERMINATOR: &str = "SYSPROV_EOF";

/// Terminator of a PowerShell single-quoted here-string
const PS_HERESTRING_END: &str = "'@";

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("cannot quote {0:?}: contains a NUL byte")]
    Nul(String),

    #[error("content for {path} contains the terminator line {terminator:?}")]
    Terminator { path: String, terminator: String },
}

/// Quote `s` as a single POSIX shell word.
pub fn quote(s: &str) -> Result<Cow<'_, str>, QuoteError> {
    shlex::try_quote(s).map_err(|_| QuoteError::Nul(s.to_string()))
}

/// Join argv into one shell command line.
pub fn join<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<String, QuoteError> {
    let quoted = words
        .into_iter()
        .map(quote)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(" "))
}

/// Command writing `content` to `path` with a quoted here-document.
///
/// Content that does not end in a newline cannot be expressed as a
/// here-document without changing its bytes, so it is written with
/// printf instead.
pub fn heredoc_write(path: &str, content: &str) -> Result<String, QuoteError> {
    let qpath = quote(path)?;

    if !content.ends_with('\n') {
        return Ok(format!("printf '%s' {} > {}", quote(content)?, qpath));
    }
    if content.lines().any(|line| line == HEREDOC_TERMINATOR) {
        return Err(QuoteError::Terminator {
            path: path.to_string(),
            terminator: HEREDOC_TERMINATOR.to_string(),
        });
    }

    Ok(format!(
        "cat > {} << '{}'\n{}{}",
        qpath, HEREDOC_TERMINATOR, content, HEREDOC_TERMINATOR
    ))
}

/// Quote `s` as a PowerShell single-quoted string literal.
pub fn ps_quote(s: &str) -> Result<String, QuoteError> {
    if s.contains('\0') {
        return Err(QuoteError::Nul(s.to_string()));
    }
    Ok(format!("'{}'", s.replace('\'', "''")))
}

/// PowerShell statement writing `content` to `path` byte-for-byte
/// (no BOM, no appended newline), creating the parent directory.
pub fn ps_write_file(path: &str, content: &str) -> Result<String, QuoteError> {
    if content.contains('\0') {
        return Err(QuoteError::Nul(path.to_string()));
    }
    if content
        .lines()
        .any(|line| line.starts_with(PS_HERESTRING_END))
    {
        return Err(QuoteError::Terminator {
            path: path.to_string(),
            terminator: PS_HERESTRING_END.to_string(),
        });
    }

    let qpath = ps_quote(path)?;
    Ok(format!(
        "New-Item -ItemType Directory -Force -Path (Split-Path -Parent {qpath}) | Out-Null\r\n\
         [System.IO.File]::WriteAllText({qpath}, @'\r\n{content}\r\n'@)"
    ))
}
