//! Environment-variable expansion for paths.
//!
//! Every path that crosses into the node — data directory, upload source,
//! download destination — gets the same treatment here, so configuration
//! and CLI arguments can use `$VAR`-style references the way shell users
//! expect.

/// Expands `$VAR` and `${VAR}` references against the process environment.
/// An unresolvable variable is left untouched rather than erroring,
/// matching Python's `os.path.expandvars`.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match std::env::var(&name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else {
                match std::env::var(&name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push('$');
                        out.push_str(&name);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_bare_and_braced_forms() {
        std::env::set_var("SHARDNET_TEST_VAR", "/tmp/expanded");
        assert_eq!(
            expand_env_vars("$SHARDNET_TEST_VAR/file.bin"),
            "/tmp/expanded/file.bin"
        );
        assert_eq!(
            expand_env_vars("${SHARDNET_TEST_VAR}/file.bin"),
            "/tmp/expanded/file.bin"
        );
        std::env::remove_var("SHARDNET_TEST_VAR");
    }

    #[test]
    fn unresolvable_variable_is_left_untouched() {
        assert_eq!(expand_env_vars("$NO_SUCH_SHARDNET_VAR/x"), "$NO_SUCH_SHARDNET_VAR/x");
        assert_eq!(
            expand_env_vars("${NO_SUCH_SHARDNET_VAR}/x"),
            "${NO_SUCH_SHARDNET_VAR}/x"
        );
    }

    #[test]
    fn lone_dollar_is_literal() {
        assert_eq!(expand_env_vars("cost: $5"), "cost: $5");
    }
}
