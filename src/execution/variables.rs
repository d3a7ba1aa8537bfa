//! Variable resolution for command templates

use crate::core::StepData;
use regex::Regex;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex is valid"))
}

/// Replace `{{key}}` placeholders with values from step data
///
/// Literal substitution only. Placeholders without a value stay verbatim.
pub fn resolve_variables(template: &str, data: &StepData) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            data.get(&caps[1])
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_known_keys() {
        let mut data = StepData::new();
        data.set("profile", "release");
        data.set("exitcode:build", "0");

        assert_eq!(
            resolve_variables("cargo build --profile {{profile}} # {{exitcode:build}}", &data),
            "cargo build --profile release # 0"
        );
    }

    #[test]
    fn test_unresolved_placeholders_stay_verbatim() {
        let data = StepData::new();
        assert_eq!(resolve_variables("echo {{missing}}", &data), "echo {{missing}}");
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let mut data = StepData::new();
        data.set("a", "{{b}}");
        data.set("b", "nope");

        assert_eq!(resolve_variables("{{a}}", &data), "{{b}}");
    }
}
