//! # Command Template Module
//!
//! Costruisce la riga di comando dell'ottimizzatore esterno a partire da un template
//! di argomenti con due placeholder: `{originalPath}` e `{optimizedPath}`.
//!
//! ## Regole di parsing:
//! - Gli spazi separano gli argomenti
//! - Le virgolette singole sono letterali, le doppie raggruppano (con `\"` e `\\`)
//! - Un placeholder può stare dentro un argomento (`--out={optimizedPath}`)
//! - Placeholder sconosciuti o virgolette non chiuse sono errori di configurazione
//!
//! Il comando viene eseguito senza shell: i path vengono sostituiti così come sono,
//! ciascuno resta un singolo argomento.
//!
//! ## Esempio:
//! ```rust,ignore
//! let template = CommandTemplate::parse("-o2 -out {optimizedPath} {originalPath}")?;
//! let command = template.render("optipng", original, optimized);
//! ```

use crate::error::{OptimizeError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

const ORIGINAL_PATH: &str = "originalPath";
const OPTIMIZED_PATH: &str = "optimizedPath";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    OriginalPath,
    OptimizedPath,
}

/// Parsed argument template. Each inner vector is one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    arguments: Vec<Vec<Segment>>,
}

impl CommandTemplate {
    /// Parse and validate an argument template
    pub fn parse(source: &str) -> Result<Self> {
        let arguments = split_arguments(source)?
            .into_iter()
            .map(|raw| parse_placeholders(&raw))
            .collect::<Result<Vec<_>>>()?;

        let mentions = |wanted: &Segment| arguments.iter().flatten().any(|s| s == wanted);
        if !mentions(&Segment::OriginalPath) {
            return Err(OptimizeError::Configuration(format!(
                "arguments \"{}\" never reference {{{}}}",
                source, ORIGINAL_PATH
            )));
        }
        if !mentions(&Segment::OptimizedPath) {
            return Err(OptimizeError::Configuration(format!(
                "arguments \"{}\" never reference {{{}}}",
                source, OPTIMIZED_PATH
            )));
        }

        Ok(Self {
            source: source.to_string(),
            arguments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute the two paths and pair the arguments with the program
    pub fn render(&self, program: &Path, original: &Path, optimized: &Path) -> PreparedCommand {
        let original = original.to_string_lossy();
        let optimized = optimized.to_string_lossy();

        let args = self
            .arguments
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => text.as_str(),
                        Segment::OriginalPath => original.as_ref(),
                        Segment::OptimizedPath => optimized.as_ref(),
                    })
                    .collect::<String>()
            })
            .collect();

        PreparedCommand {
            program: program.to_path_buf(),
            args,
        }
    }
}

/// A fully rendered command, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for PreparedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn split_arguments(source: &str) -> Result<Vec<String>> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut in_argument = false;
    let mut chars = source.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_argument {
                    arguments.push(std::mem::take(&mut current));
                    in_argument = false;
                }
            }
            '\'' => {
                in_argument = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unbalanced(source, '\'')),
                    }
                }
            }
            '"' => {
                in_argument = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(unbalanced(source, '"')),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unbalanced(source, '"')),
                    }
                }
            }
            c => {
                in_argument = true;
                current.push(c);
            }
        }
    }

    if in_argument {
        arguments.push(current);
    }
    Ok(arguments)
}

fn parse_placeholders(raw: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            return Err(OptimizeError::Configuration(format!(
                "unterminated placeholder in argument \"{}\"",
                raw
            )));
        };
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        segments.push(match &rest[start + 1..start + len] {
            ORIGINAL_PATH => Segment::OriginalPath,
            OPTIMIZED_PATH => Segment::OptimizedPath,
            other => {
                return Err(OptimizeError::Configuration(format!(
                    "unknown placeholder {{{}}} (expected {{{}}} or {{{}}})",
                    other, ORIGINAL_PATH, OPTIMIZED_PATH
                )))
            }
        });
        rest = &rest[start + len + 1..];
    }

    if !rest.is_empty() || segments.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn unbalanced(source: &str, quote: char) -> OptimizeError {
    OptimizeError::Configuration(format!("unbalanced {} quote in arguments \"{}\"", quote, source))
}
