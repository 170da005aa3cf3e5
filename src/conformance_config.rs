//! Conformance configuration: a text-protocol record of repeated
//! `requirement` entries, parsed into the rule set the conformance engine
//! evaluates.
//!
//! ```text
//! requirement: {
//!   type: BANNED_NAME
//!   value: 'eval'
//!   error_message: 'eval is not allowed'
//!   whitelist_regexp: 'test_'
//!   rule_id: 'no_eval'
//! }
//! ```
//!
//! Malformed requirements are configuration errors: they are reported
//! against a synthetic location and the offending requirement is
//! skipped, never fatal.

use regex::Regex;
use rustc_hash::FxHashMap;

use stoat_sema::{PropAccessMode, Rule, RuleKind};

/// A configuration problem: the requirement index it arose in plus a
/// description. Reported against a synthetic source location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conformance requirement #{index}: {message}")]
pub struct ConfigError {
    pub index: usize,
    pub message: String,
}

/// One requirement as read from the file, before interpretation.
#[derive(Debug, Default, Clone)]
struct RawRequirement {
    ty: Option<String>,
    values: Vec<String>,
    error_message: Option<String>,
    whitelist: Vec<String>,
    whitelist_regexp: Vec<String>,
    only_apply_to: Vec<String>,
    only_apply_to_regexp: Vec<String>,
    report_loose_type_violations: Option<bool>,
    rule_id: Option<String>,
    extends: Option<String>,
    java_class: Option<String>,
}

/// Parse a config text into rules. Returns the usable rules plus the
/// errors for requirements that had to be skipped.
pub fn parse_conformance_config(text: &str) -> (Vec<Rule>, Vec<ConfigError>) {
    let (raws, mut errors) = parse_raw(text);
    let merged = merge_requirements(raws);

    let mut rules = Vec::new();
    for (index, raw) in merged.into_iter().enumerate() {
        match build_rule(&raw) {
            Ok(rule) => rules.push(rule),
            Err(message) => errors.push(ConfigError { index, message }),
        }
    }
    (rules, errors)
}

fn parse_raw(text: &str) -> (Vec<RawRequirement>, Vec<ConfigError>) {
    let mut raws: Vec<RawRequirement> = Vec::new();
    let mut errors = Vec::new();
    let mut current: Option<RawRequirement> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("requirement") && line.ends_with('{') {
            if current.is_some() {
                errors.push(ConfigError {
                    index: raws.len(),
                    message: "unterminated requirement".into(),
                });
            }
            current = Some(RawRequirement::default());
            continue;
        }
        if line == "}" {
            if let Some(raw) = current.take() {
                raws.push(raw);
            }
            continue;
        }
        let Some(raw) = current.as_mut() else { continue };
        let Some((key, value)) = line.split_once(':') else {
            errors.push(ConfigError {
                index: raws.len(),
                message: format!("malformed field line: {line}"),
            });
            continue;
        };
        let value = unquote(value.trim());
        match key.trim() {
            "type" => raw.ty = Some(value),
            "value" => raw.values.push(value),
            "error_message" => raw.error_message = Some(value),
            "whitelist" => raw.whitelist.push(value),
            "whitelist_regexp" => raw.whitelist_regexp.push(value),
            "only_apply_to" => raw.only_apply_to.push(value),
            "only_apply_to_regexp" => raw.only_apply_to_regexp.push(value),
            "report_loose_type_violations" => {
                raw.report_loose_type_violations = Some(value == "true")
            }
            "rule_id" => raw.rule_id = Some(value),
            "extends" => raw.extends = Some(value),
            "java_class" => raw.java_class = Some(value),
            other => errors.push(ConfigError {
                index: raws.len(),
                message: format!("unrecognized field: {other}"),
            }),
        }
    }
    if current.is_some() {
        errors.push(ConfigError {
            index: raws.len(),
            message: "unterminated requirement".into(),
        });
    }
    (raws, errors)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// A requirement that `extends` another with the same `rule_id` merges
/// its whitelists into it (union, deduplicated) and disappears.
fn merge_requirements(raws: Vec<RawRequirement>) -> Vec<RawRequirement> {
    let mut base_by_id: FxHashMap<String, usize> = FxHashMap::default();
    let mut out: Vec<RawRequirement> = Vec::new();

    for raw in raws {
        if let (Some(extends), Some(rule_id)) = (&raw.extends, &raw.rule_id) {
            if extends == rule_id {
                if let Some(&idx) = base_by_id.get(rule_id) {
                    let base = &mut out[idx];
                    for w in raw.whitelist {
                        if !base.whitelist.contains(&w) {
                            base.whitelist.push(w);
                        }
                    }
                    for w in raw.whitelist_regexp {
                        if !base.whitelist_regexp.contains(&w) {
                            base.whitelist_regexp.push(w);
                        }
                    }
                    continue;
                }
            }
        }
        if let Some(id) = &raw.rule_id {
            base_by_id.entry(id.clone()).or_insert(out.len());
        }
        out.push(raw);
    }
    out
}

fn compile_regexes(patterns: &[String]) -> Result<Vec<Regex>, String> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| format!("invalid regex {p:?}: {e}")))
        .collect()
}

fn build_rule(raw: &RawRequirement) -> Result<Rule, String> {
    let ty = raw.ty.as_deref().ok_or("missing type")?;
    let message = raw
        .error_message
        .clone()
        .ok_or("missing error_message")?;

    let kind = match ty {
        "BANNED_NAME" => RuleKind::BannedName {
            names: raw.values.clone(),
        },
        "BANNED_NAME_CALL" => RuleKind::BannedNameCall {
            names: raw.values.clone(),
        },
        "BANNED_PROPERTY" | "BANNED_PROPERTY_READ" | "BANNED_PROPERTY_WRITE"
        | "BANNED_PROPERTY_NON_CONSTANT_WRITE" => {
            let mode = match ty {
                "BANNED_PROPERTY_READ" => PropAccessMode::Read,
                "BANNED_PROPERTY_WRITE" => PropAccessMode::Write,
                "BANNED_PROPERTY_NON_CONSTANT_WRITE" => PropAccessMode::NonConstantWrite,
                _ => PropAccessMode::Any,
            };
            let entries = raw
                .values
                .iter()
                .map(|v| parse_property_value(v))
                .collect::<Result<Vec<_>, _>>()?;
            RuleKind::BannedProperty { entries, mode }
        }
        "BANNED_CODE_PATTERN" => RuleKind::BannedCodePattern {
            patterns: raw.values.clone(),
        },
        "BANNED_DEPENDENCY" => RuleKind::BannedDependency {
            paths: raw.values.clone(),
        },
        "RESTRICTED_NAME_CALL" | "RESTRICTED_METHOD_CALL" => {
            let entries = raw
                .values
                .iter()
                .map(|v| {
                    v.split_once(':')
                        .map(|(n, s)| (n.trim().to_string(), s.trim().to_string()))
                        .ok_or_else(|| format!("malformed signature value: {v}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if ty == "RESTRICTED_METHOD_CALL" {
                RuleKind::RestrictedMethodCall { entries }
            } else {
                RuleKind::RestrictedNameCall { entries }
            }
        }
        "CUSTOM" => {
            let class = raw.java_class.as_deref().unwrap_or("<unspecified>");
            return Err(format!(
                "custom rule class {class} is not registered with this build"
            ));
        }
        other => return Err(format!("unrecognized requirement type: {other}")),
    };

    let mut rule = Rule::new(kind, message);
    rule.whitelist = raw.whitelist.clone();
    rule.whitelist_regexp = compile_regexes(&raw.whitelist_regexp)?;
    rule.only_apply_to = raw.only_apply_to.clone();
    rule.only_apply_to_regexp = compile_regexes(&raw.only_apply_to_regexp)?;
    rule.report_loose_type_violations = raw.report_loose_type_violations.unwrap_or(true);
    rule.rule_id = raw.rule_id.clone();
    Ok(rule)
}

/// `Type.prototype.prop` or `ns.prop`.
fn parse_property_value(value: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = value.split('.').collect();
    match parts.as_slice() {
        [ty, "prototype", prop] => Ok((ty.to_string(), prop.to_string())),
        [ns, prop] => Ok((ns.to_string(), prop.to_string())),
        _ => Err(format!("malformed property value: {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_banned_name_with_whitelist_regexp() {
        let (rules, errors) = parse_conformance_config(
            r#"
            requirement: {
              type: BANNED_NAME
              value: 'eval'
              error_message: 'eval is not allowed'
              whitelist_regexp: 'test_'
            }
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(rules.len(), 1);
        assert!(matches!(&rules[0].kind, RuleKind::BannedName { names } if names == &["eval"]));
        assert!(rules[0].whitelist_regexp[0].is_match("test_file.js"));
    }

    #[test]
    fn merges_whitelists_by_rule_id() {
        let (rules, errors) = parse_conformance_config(
            r#"
            requirement: {
              type: BANNED_NAME
              value: 'eval'
              error_message: 'no eval'
              rule_id: 'no_eval'
              whitelist: 'legacy/a.js'
            }
            requirement: {
              rule_id: 'no_eval'
              extends: 'no_eval'
              type: BANNED_NAME
              error_message: 'no eval'
              whitelist: 'legacy/b.js'
              whitelist: 'legacy/a.js'
            }
            "#,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].whitelist, vec!["legacy/a.js", "legacy/b.js"]);
    }

    #[test]
    fn banned_property_value_forms() {
        assert_eq!(
            parse_property_value("Foo.prototype.bar").unwrap(),
            ("Foo".into(), "bar".into())
        );
        assert_eq!(
            parse_property_value("ns.prop").unwrap(),
            ("ns".into(), "prop".into())
        );
        assert!(parse_property_value("justone").is_err());
    }

    #[test]
    fn bad_regex_is_a_config_error_not_a_crash() {
        let (rules, errors) = parse_conformance_config(
            r#"
            requirement: {
              type: BANNED_NAME
              value: 'eval'
              error_message: 'no eval'
              whitelist_regexp: '['
            }
            "#,
        );
        assert!(rules.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("invalid regex"));
    }

    #[test]
    fn custom_rule_without_registration_is_skipped() {
        let (rules, errors) = parse_conformance_config(
            r#"
            requirement: {
              type: CUSTOM
              java_class: 'com.example.MyRule'
              error_message: 'custom'
            }
            "#,
        );
        assert!(rules.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unknown_type_is_reported() {
        let (rules, errors) = parse_conformance_config(
            r#"
            requirement: {
              type: BANNED_EVERYTHING
              error_message: 'nope'
            }
            "#,
        );
        assert!(rules.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unrecognized requirement type"));
    }
}
