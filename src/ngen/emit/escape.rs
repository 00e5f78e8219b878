//! The three Ninja escaping alphabets. Their rules differ for `$`, `:`,
//! space, and newline, so each is its own function; they are never layered.

/// Escaping for file paths and rule tokens in `.ninja` files: `$`, space,
/// and `:` get `$`-escaped. Newlines cannot be represented in paths.
pub fn ninja_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '$' => out.push_str("$$"),
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaping for text spliced into a `command =` line. The command is
/// preformatted shell text, so only `$` (Ninja's own metacharacter) is
/// escaped; arguments containing spaces are the caller's concern.
pub fn ninja_command_escape(s: &str) -> String {
    s.replace('$', "$$")
}

/// Shell-style quoting for one argument of a generated command line, on top
/// of command escaping.
pub fn command_arg_escape(s: &str) -> String {
    let escaped = ninja_command_escape(s);
    if escaped.is_empty()
        || escaped
            .chars()
            .any(|c| matches!(c, ' ' | '"' | '\'' | '\\' | '*' | '?' | '&' | ';'))
    {
        format!("\"{}\"", escaped.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        escaped
    }
}

/// Escaping for Makefile-syntax depfiles: spaces become backslash-space,
/// and `$` is doubled for the Ninja depfile reader.
pub fn depfile_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' => out.push_str("\\ "),
            '$' => out.push_str("$$"),
            '#' => out.push_str("\\#"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_three_alphabets_differ() {
        let input = "a b:c$d";
        assert_eq!(ninja_escape(input), "a$ b$:c$$d");
        assert_eq!(ninja_command_escape(input), "a b:c$$d");
        assert_eq!(depfile_escape(input), "a\\ b:c$$d");
    }

    #[test]
    fn command_args_quote_spaces() {
        assert_eq!(command_arg_escape("plain"), "plain");
        assert_eq!(command_arg_escape("has space"), "\"has space\"");
    }
}
