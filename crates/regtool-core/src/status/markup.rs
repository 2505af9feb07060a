//! Row, column and table name derivation from register-name markup.
//!
//! A register name is split on `.`; position 0 is the whole name and position
//! `i` is the `i`-th component. Markup copies ordinary characters verbatim and
//! replaces underscore tokens with name components. Successive substitutions
//! are separated by a space.

use crate::error::RegisterError;

const TOKEN: char = '_';

/// Markup dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MarkupStyle {
    /// `__N` selects component `N` from the left, `___N` selects component
    /// `len - N`; a single `_` before a non-digit is literal.
    #[default]
    Positional,
    /// Deprecated dialect: `_N` selects component `N` (one digit) and `__` is
    /// a literal underscore.
    Legacy,
}

/// Builds a display name from `markup` and `register`.
///
/// `parameter` names the source parameter (`Row`, `Column`, `Table`) for
/// error messages.
///
/// # Errors
///
/// Returns [`RegisterError::BadMarkupName`] for structurally invalid markup
/// and [`RegisterError::BadValue`] when a positional index is out of range.
pub fn build_name(
    markup: &str,
    register: &str,
    parameter: &str,
    style: MarkupStyle,
) -> Result<String, RegisterError> {
    let builder = NameBuilder::new(markup, register, parameter);
    if markup.contains(' ') {
        return Err(builder.markup_error("spaces are not allowed"));
    }
    match style {
        MarkupStyle::Positional => builder.positional(),
        MarkupStyle::Legacy => builder.legacy(),
    }
}

struct NameBuilder<'a> {
    markup: Vec<char>,
    source: &'a str,
    register: &'a str,
    parameter: &'a str,
    components: Vec<&'a str>,
    out: String,
}

impl<'a> NameBuilder<'a> {
    fn new(markup: &'a str, register: &'a str, parameter: &'a str) -> Self {
        let components = std::iter::once(register)
            .chain(register.split('.').filter(|part| !part.is_empty()))
            .collect();
        Self {
            markup: markup.chars().collect(),
            source: markup,
            register,
            parameter,
            components,
            out: String::new(),
        }
    }

    fn context(&self) -> String {
        format!(
            "{} name for {} from markup {}",
            self.parameter, self.register, self.source
        )
    }

    fn markup_error(&self, cause: &str) -> RegisterError {
        RegisterError::bad_markup(format!("{}: {cause}", self.context()))
    }

    fn substitute(&mut self, position: Option<usize>) -> Result<(), RegisterError> {
        let Some(component) = position.and_then(|index| self.components.get(index).copied())
        else {
            return Err(RegisterError::bad_value(format!(
                "{}: position out of range (name has {} components)",
                self.context(),
                self.components.len() - 1
            )));
        };
        if !self.out.is_empty() {
            self.out.push(' ');
        }
        self.out.push_str(component);
        Ok(())
    }

    fn positional(mut self) -> Result<String, RegisterError> {
        let mut index = 0;
        while let Some(&current) = self.markup.get(index) {
            if current != TOKEN {
                self.out.push(current);
                index += 1;
                continue;
            }
            let run = self.markup[index..]
                .iter()
                .take_while(|c| **c == TOKEN)
                .count();
            match run {
                1 => match self.markup.get(index + 1) {
                    None => return Err(self.markup_error("trailing underscore")),
                    Some(next) if next.is_ascii_digit() => {
                        return Err(self.markup_error("digit after single underscore"));
                    }
                    Some(_) => {
                        self.out.push(TOKEN);
                        index += 1;
                    }
                },
                2 | 3 => {
                    let start = index + run;
                    let digits: String = self.markup[start..]
                        .iter()
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    if digits.is_empty() {
                        return Err(self.markup_error("missing position after underscores"));
                    }
                    let count = digits.parse::<usize>().ok();
                    let position = if run == 3 {
                        count.and_then(|n| self.components.len().checked_sub(n))
                    } else {
                        count
                    };
                    self.substitute(position)?;
                    index = start + digits.len();
                }
                _ => return Err(self.markup_error("too many consecutive underscores")),
            }
        }
        Ok(self.out)
    }

    fn legacy(mut self) -> Result<String, RegisterError> {
        let mut index = 0;
        while let Some(&current) = self.markup.get(index) {
            if current != TOKEN {
                self.out.push(current);
                index += 1;
                continue;
            }
            match self.markup.get(index + 1).copied() {
                None => return Err(self.markup_error("trailing underscore")),
                Some(TOKEN) => {
                    self.out.push(TOKEN);
                    index += 2;
                }
                Some(next) => {
                    if let Some(digit) = next.to_digit(10) {
                        if digit as usize >= self.components.len() {
                            return Err(self.markup_error(&format!(
                                "position {digit} is out of bounds"
                            )));
                        }
                        self.substitute(Some(digit as usize))?;
                        index += 2;
                    } else {
                        self.out.push(TOKEN);
                        index += 1;
                    }
                }
            }
        }
        Ok(self.out)
    }
}

/// Strips a purely numeric sort prefix (`"3_POWER"` becomes `"POWER"`).
///
/// The prefix is removed only when the first `_` is preceded by at least one
/// character, every character before it is a digit, and it is not the last
/// character.
#[must_use]
pub fn strip_sort_prefix(name: &str) -> &str {
    match name.split_once(TOKEN) {
        Some((prefix, rest))
            if !prefix.is_empty()
                && !rest.is_empty()
                && prefix.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => name,
    }
}

/// Drops a trailing `_LO`/`_HI` from a derived row or column name.
#[must_use]
pub fn strip_pair_suffix(name: &str) -> &str {
    name.strip_suffix("_LO")
        .or_else(|| name.strip_suffix("_HI"))
        .unwrap_or(name)
}
