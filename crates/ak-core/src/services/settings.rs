//! Region and secret-prefix resolution shared by the CLI and the deployer.

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SECRET_PREFIX: &str = "agentkit";

pub const REGION_ENV: &str = "AWS_REGION";
pub const DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";
pub const SECRET_PREFIX_ENV: &str = "AGENTKIT_SECRET_PREFIX";

/// Read a variable from the process environment. Empty values count as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn first_set(candidates: impl IntoIterator<Item = Option<String>>, fallback: &str) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// `flag` → `AWS_REGION` → `AWS_DEFAULT_REGION` → `us-east-1`.
pub fn resolve_region(flag: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    first_set(
        [
            flag.map(str::to_string),
            env(REGION_ENV),
            env(DEFAULT_REGION_ENV),
        ],
        DEFAULT_REGION,
    )
}

/// `flag` → `AGENTKIT_SECRET_PREFIX` → `agentkit`. Trailing slashes are
/// dropped so bundle names never contain `//`.
pub fn resolve_prefix(flag: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    let prefix = first_set(
        [flag.map(str::to_string), env(SECRET_PREFIX_ENV)],
        DEFAULT_SECRET_PREFIX,
    );
    match prefix.trim_end_matches('/') {
        "" => DEFAULT_SECRET_PREFIX.to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn region_precedence() {
        let env = env_of(&[(REGION_ENV, "eu-west-1"), (DEFAULT_REGION_ENV, "ap-south-1")]);
        assert_eq!(resolve_region(Some("us-west-2"), &env), "us-west-2");
        assert_eq!(resolve_region(None, &env), "eu-west-1");

        let env = env_of(&[(DEFAULT_REGION_ENV, "ap-south-1")]);
        assert_eq!(resolve_region(None, &env), "ap-south-1");

        assert_eq!(resolve_region(None, env_of(&[])), DEFAULT_REGION);
    }

    #[test]
    fn empty_values_fall_through() {
        let env = env_of(&[(REGION_ENV, ""), (DEFAULT_REGION_ENV, "ca-central-1")]);
        assert_eq!(resolve_region(Some("  "), &env), "ca-central-1");
    }

    #[test]
    fn prefix_precedence() {
        let env = env_of(&[(SECRET_PREFIX_ENV, "team-x")]);
        assert_eq!(resolve_prefix(Some("mine"), &env), "mine");
        assert_eq!(resolve_prefix(None, &env), "team-x");
        assert_eq!(resolve_prefix(None, env_of(&[])), "agentkit");
    }

    #[test]
    fn prefix_drops_trailing_slash() {
        assert_eq!(resolve_prefix(Some("acme/"), env_of(&[])), "acme");
        assert_eq!(resolve_prefix(Some("/"), env_of(&[])), "agentkit");
    }
}
