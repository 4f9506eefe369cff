// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escaping for legacy filter strings.
//!
//! Filter strings use a backslash to escape the characters that are otherwise meaningful to the
//! expression grammar. All other characters, including non-ASCII ones, are passed through
//! unchanged.

use crate::errors::InvalidFilterSyntax;
use std::borrow::Cow;

/// The escape character.
pub const ESCAPE_CHARACTER: char = '\\';

/// Characters that must be escaped to appear literally in a filter string.
pub const SPECIAL_CHARACTERS: [char; 8] = ['\\', '(', ')', '&', '|', '=', '!', '~'];

#[inline]
pub(crate) fn is_special(c: char) -> bool {
    SPECIAL_CHARACTERS.contains(&c)
}

/// Removes escapes from a filter string.
///
/// Each backslash must be followed by one of [`SPECIAL_CHARACTERS`]; otherwise (including for a
/// trailing backslash) an [`InvalidFilterSyntax`] error is returned. Strings without a backslash
/// are returned as-is without allocating.
pub fn unescape(raw: &str) -> Result<Cow<'_, str>, InvalidFilterSyntax> {
    if !raw.contains(ESCAPE_CHARACTER) {
        return Ok(Cow::Borrowed(raw));
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((offset, c)) = chars.next() {
        if c != ESCAPE_CHARACTER {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, next)) if is_special(next) => out.push(next),
            _ => return Err(InvalidFilterSyntax::new(raw, offset)),
        }
    }

    Ok(Cow::Owned(out))
}

/// Escapes every special character in `s`, so that it is read back literally by the filter
/// parser.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(is_special) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if is_special(c) {
            out.push(ESCAPE_CHARACTER);
        }
        out.push(c);
    }
    Cow::Owned(out)
}
