//! Line ending handling for transcript text.
//!
//! Interpreters on different platforms terminate lines differently. Transcript
//! and expected text are compared byte for byte, so both are stored with bare
//! `\n` separators only.

use std::borrow::Cow;

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LineEnding {
  /// U+000A -- LineFeed
  LF,

  /// U+000D -- CarriageReturn
  CR,
}

impl LineEnding {
  #[inline]
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::LF => "\u{000A}",
      Self::CR => "\u{000D}",
    }
  }

  #[inline]
  pub const fn from_char(ch: char) -> Option<LineEnding> {
    match ch {
      '\u{000A}' => Some(LineEnding::LF),
      '\u{000D}' => Some(LineEnding::CR),
      _ => None,
    }
  }
}

/// Returns true if `text` contains any line ending other than a bare LF.
#[inline]
pub fn has_foreign_line_endings(text: &str) -> bool {
  text.contains('\u{000D}')
}

/// Rewrites CRLF and lone CR separators to LF.
///
/// CRLF pairs collapse to a single LF first, so `"a\r\n"` becomes `"a\n"` and
/// not `"a\n\n"`. Text that already uses LF only is borrowed unchanged.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
  if !has_foreign_line_endings(text) {
    return Cow::Borrowed(text);
  }

  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(ch) = chars.next() {
    match LineEnding::from_char(ch) {
      Some(LineEnding::CR) => {
        if chars.peek() == Some(&'\u{000A}') {
          chars.next();
        }
        out.push_str(LineEnding::LF.as_str());
      },
      _ => out.push(ch),
    }
  }
  Cow::Owned(out)
}
