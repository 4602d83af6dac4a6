//! Shell-style `$VAR`/`${VAR}` interpolation applied to a package
//! descriptor's raw text before it is parsed as YAML.

#[derive(Debug, thiserror::Error)]
#[error("environment variables used in the package descriptor are not set: {0:?}")]
pub struct UndefinedVars(pub Vec<String>);

/// Expand `$VAR` and `${VAR}` references in `contents` using the current
/// process environment. Every referenced variable must be set; otherwise
/// an error names the full set of undefined variables (not just the
/// first one encountered).
pub fn expand_env(contents: &str) -> Result<String, UndefinedVars> {
    let mut out = String::with_capacity(contents.len());
    let mut undefined = Vec::new();
    let mut chars = contents.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let braced = chars.peek().map(|(_, c)| *c) == Some('{');
        if braced {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
            push_var(&name, &mut out, &mut undefined);
        } else {
            let mut name = String::new();
            while let Some((_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || *c == '_' {
                    name.push(*c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else {
                push_var(&name, &mut out, &mut undefined);
            }
        }
    }

    if !undefined.is_empty() {
        return Err(UndefinedVars(undefined));
    }
    Ok(out)
}

fn push_var(name: &str, out: &mut String, undefined: &mut Vec<String>) {
    match std::env::var(name) {
        Ok(val) => out.push_str(&val),
        Err(_) => undefined.push(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_both_forms() {
        unsafe {
            std::env::set_var("DPM_TEST_VAR", "hello");
        }
        assert_eq!(expand_env("$DPM_TEST_VAR world").unwrap(), "hello world");
        assert_eq!(expand_env("${DPM_TEST_VAR} world").unwrap(), "hello world");
        unsafe {
            std::env::remove_var("DPM_TEST_VAR");
        }
    }

    #[test]
    fn reports_every_undefined_variable() {
        unsafe {
            std::env::remove_var("DPM_TEST_UNSET_A");
            std::env::remove_var("DPM_TEST_UNSET_B");
        }
        let err = expand_env("$DPM_TEST_UNSET_A and ${DPM_TEST_UNSET_B}").unwrap_err();
        assert_eq!(err.0, vec!["DPM_TEST_UNSET_A", "DPM_TEST_UNSET_B"]);
    }

    #[test]
    fn leaves_unmatched_braces_alone() {
        assert_eq!(expand_env("sdk-version: $").unwrap(), "sdk-version: $");
    }
}
