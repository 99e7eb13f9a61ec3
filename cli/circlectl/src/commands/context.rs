//! Config-only mode: show the resolved configuration.

use crate::config::Configuration;

/// Every resolved key as a `key=value` line.
pub fn render(config: &Configuration) -> String {
    config
        .pairs()
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn show(config: &Configuration) {
    tracing::debug!("Printing resolved configuration");
    println!("{}", render(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_key_including_unset_username() {
        let config = Configuration {
            token: "secret".to_string(),
            baseurl: "https://circleci.com/api/v1.1".to_string(),
            default_username: None,
        };
        assert_eq!(
            render(&config),
            "token=secret\nbaseurl=https://circleci.com/api/v1.1\ndefault_username="
        );
    }

    #[test]
    fn renders_default_username_when_set() {
        let config = Configuration {
            token: "secret".to_string(),
            baseurl: "https://example.test".to_string(),
            default_username: Some("octocat".to_string()),
        };
        assert!(render(&config).ends_with("\ndefault_username=octocat"));
    }
}
