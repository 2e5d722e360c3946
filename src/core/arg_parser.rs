// src/core/arg_parser.rs

/// A flag token split into its key and optional inline value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFlag {
    pub key: String,
    pub value: Option<String>,
    /// `true` for single-dash tokens with more than one character (`-fs`),
    /// which may be a bundle of short flags.
    pub bundle_candidate: bool,
}

/// Parses a flag token such as `--key`, `--key=value`, `-k` or `-fs`.
///
/// Returns `None` for anything that is not a flag: positional words, a bare
/// `-`, and the `--` separator.
pub fn parse_expandable_flag(arg: &str) -> Option<ParsedFlag> {
    let (body, single_dash) = if let Some(body) = arg.strip_prefix("--") {
        (body, false)
    } else if let Some(body) = arg.strip_prefix('-') {
        (body, true)
    } else {
        return None;
    };

    if body.is_empty() {
        return None;
    }

    let (key, value) = match body.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (body, None),
    };
    if key.is_empty() {
        return None;
    }

    Some(ParsedFlag {
        key: key.to_string(),
        value,
        bundle_candidate: single_dash && key.chars().count() > 1,
    })
}

/// Splits CLI tokens at the first `--`. Everything after the separator is
/// passed through untouched.
pub fn split_passthrough(args: &[String]) -> (&[String], &[String]) {
    match args.iter().position(|arg| arg == "--") {
        Some(index) => {
            let (head, tail) = args.split_at(index);
            (head, tail.get(1..).unwrap_or_default())
        }
        None => (args, &[]),
    }
}
