// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

/// Very small, safe-ish single-quote escaper for command arguments.
pub fn sh_escape(p: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&p.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// Leaves plain words alone and single-quotes anything the shell would interpret.
pub fn sh_quote_if_needed(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:,@%+".contains(c));
    if plain { word.to_string() } else { sh_escape(word) }
}

/// Double-quoted form that still lets the job shell see a literal value.
pub fn sh_double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sh_escape_wraps_and_escapes_single_quotes() {
        assert_eq!(sh_escape("alice"), "'alice'");
        assert_eq!(sh_escape("it's"), r"'it'\''s'");
    }

    #[test]
    fn sh_quote_if_needed_only_quotes_special_words() {
        assert_eq!(sh_quote_if_needed("--port=9123"), "--port=9123");
        assert_eq!(sh_quote_if_needed("/usr/bin/jupyterhub-singleuser"), "/usr/bin/jupyterhub-singleuser");
        assert_eq!(sh_quote_if_needed("a b"), "'a b'");
        assert_eq!(sh_quote_if_needed("x;y"), "'x;y'");
        assert_eq!(sh_quote_if_needed(""), "''");
    }

    #[test]
    fn sh_double_quote_escapes_expansions() {
        assert_eq!(sh_double_quote("abc123"), "\"abc123\"");
        assert_eq!(sh_double_quote("a\"b$c`d\\"), "\"a\\\"b\\$c\\`d\\\\\"");
    }
}
