//! Response-shape checks and value templating.
//!
//! The scenario catalog describes expected response shapes as data: an
//! [`Envelope`] naming where the payload lives, and a list of [`BodyCheck`]s
//! applied to it. Checks can reference values captured by earlier steps
//! through the run's variable map, which is also used to resolve `{var}`
//! endpoint templates and `{{var}}` body placeholders.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Values captured from earlier responses, keyed by variable name.
pub type Vars = HashMap<String, String>;

/// Where the array/object payload of a response lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// The body is the payload (no envelope).
    Any,
    /// The body must be a JSON array.
    Array,
    /// The body must be an object; the payload is the array under this key.
    Keyed(&'static str),
    /// The body must be a JSON object.
    Object,
}

impl Envelope {
    /// Extracts the payload, or describes why the body does not match.
    pub fn extract<'a>(&self, body: &'a Value) -> Result<&'a Value, String> {
        match self {
            Envelope::Any => Ok(body),
            Envelope::Array => {
                if body.is_array() {
                    Ok(body)
                } else {
                    Err(format!("expected a JSON array, got {}", kind_of(body)))
                }
            }
            Envelope::Keyed(key) => match body.get(key) {
                Some(inner) if inner.is_array() => Ok(inner),
                Some(inner) => Err(format!(
                    "expected an array under '{key}', got {}",
                    kind_of(inner)
                )),
                None => Err(format!("expected an object with key '{key}'")),
            },
            Envelope::Object => {
                if body.is_object() {
                    Ok(body)
                } else {
                    Err(format!("expected a JSON object, got {}", kind_of(body)))
                }
            }
        }
    }
}

/// One declarative assertion over an extracted payload.
///
/// Pointers are JSON pointers (`/id`, `/user/role`); element variants apply
/// their pointer to each array element. Variants taking a `var` compare
/// against a value captured by an earlier step.
#[derive(Debug, Clone)]
pub enum BodyCheck {
    /// Payload is an array.
    IsArray,
    /// Payload object carries all of these keys.
    HasKeys(Vec<&'static str>),
    /// Every array element carries all of these keys (vacuous when empty).
    ElementsHaveKeys(Vec<&'static str>),
    /// The field at the pointer exists and is not null.
    FieldPresent(&'static str),
    /// The field at the pointer equals the literal value.
    FieldEquals(&'static str, Value),
    /// The field at the pointer equals the captured variable.
    FieldMatchesVar(&'static str, &'static str),
    /// The string field at the pointer starts with the prefix.
    FieldStartsWith(&'static str, String),
    /// The string field at the pointer contains the substring.
    FieldContains(&'static str, String),
    /// The string field at the pointer matches the regex.
    FieldRegex(&'static str, String),
    /// The field is missing or null (e.g. no campaign association).
    FieldAbsentOrNull(&'static str),
    /// Some array element's field equals the captured variable.
    ContainsWhere(&'static str, &'static str),
    /// No array element's field equals the captured variable.
    NoneWhere(&'static str, &'static str),
    /// Finds the element whose field equals the variable, then applies the
    /// nested checks to that element.
    ElementWhere {
        pointer: &'static str,
        var: &'static str,
        checks: Vec<BodyCheck>,
    },
    /// An arbitrary predicate; used where cross-field invariants do not fit
    /// the declarative variants.
    Custom {
        name: &'static str,
        f: fn(&Value) -> Result<(), String>,
    },
}

impl BodyCheck {
    /// Short name for failure messages.
    pub fn describe(&self) -> String {
        match self {
            BodyCheck::IsArray => "payload is array".to_string(),
            BodyCheck::HasKeys(keys) => format!("has keys {keys:?}"),
            BodyCheck::ElementsHaveKeys(keys) => format!("elements have keys {keys:?}"),
            BodyCheck::FieldPresent(p) => format!("field {p} present"),
            BodyCheck::FieldEquals(p, v) => format!("field {p} == {v}"),
            BodyCheck::FieldMatchesVar(p, var) => format!("field {p} == {{{var}}}"),
            BodyCheck::FieldStartsWith(p, prefix) => format!("field {p} starts with {prefix:?}"),
            BodyCheck::FieldContains(p, sub) => format!("field {p} contains {sub:?}"),
            BodyCheck::FieldRegex(p, pattern) => format!("field {p} matches /{pattern}/"),
            BodyCheck::FieldAbsentOrNull(p) => format!("field {p} absent or null"),
            BodyCheck::ContainsWhere(p, var) => format!("some element has {p} == {{{var}}}"),
            BodyCheck::NoneWhere(p, var) => format!("no element has {p} == {{{var}}}"),
            BodyCheck::ElementWhere { pointer, var, .. } => {
                format!("element with {pointer} == {{{var}}}")
            }
            BodyCheck::Custom { name, .. } => (*name).to_string(),
        }
    }

    /// Applies the check to an extracted payload.
    pub fn apply(&self, payload: &Value, vars: &Vars) -> Result<(), String> {
        match self {
            BodyCheck::IsArray => {
                if payload.is_array() {
                    Ok(())
                } else {
                    Err(format!("expected an array, got {}", kind_of(payload)))
                }
            }
            BodyCheck::HasKeys(keys) => {
                let missing: Vec<_> = keys
                    .iter()
                    .filter(|k| payload.get(**k).is_none())
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!("missing fields: {missing:?}"))
                }
            }
            BodyCheck::ElementsHaveKeys(keys) => {
                let elements = as_array(payload)?;
                for (i, element) in elements.iter().enumerate() {
                    let missing: Vec<_> = keys
                        .iter()
                        .filter(|k| element.get(**k).is_none())
                        .collect();
                    if !missing.is_empty() {
                        return Err(format!("element {i} missing fields: {missing:?}"));
                    }
                }
                Ok(())
            }
            BodyCheck::FieldPresent(pointer) => match payload.pointer(pointer) {
                Some(v) if !v.is_null() => Ok(()),
                _ => Err(format!("missing fields: [{pointer}]")),
            },
            BodyCheck::FieldEquals(pointer, expected) => {
                let actual = payload
                    .pointer(pointer)
                    .ok_or_else(|| format!("missing fields: [{pointer}]"))?;
                if actual == expected {
                    Ok(())
                } else {
                    Err(format!("{pointer}: expected {expected}, got {actual}"))
                }
            }
            BodyCheck::FieldMatchesVar(pointer, var) => {
                let expected = lookup_var(vars, var)?;
                let actual = payload
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("missing fields: [{pointer}]"))?;
                if actual == expected {
                    Ok(())
                } else {
                    Err(format!("{pointer}: expected {expected:?}, got {actual:?}"))
                }
            }
            BodyCheck::FieldStartsWith(pointer, prefix) => {
                let actual = string_field(payload, pointer)?;
                if actual.starts_with(prefix.as_str()) {
                    Ok(())
                } else {
                    Err(format!("{pointer} does not start with {prefix:?}"))
                }
            }
            BodyCheck::FieldContains(pointer, sub) => {
                let actual = string_field(payload, pointer)?;
                if actual.contains(sub.as_str()) {
                    Ok(())
                } else {
                    Err(format!("{pointer} does not contain {sub:?}"))
                }
            }
            BodyCheck::FieldRegex(pointer, pattern) => {
                let regex =
                    Regex::new(pattern).map_err(|e| format!("invalid pattern /{pattern}/: {e}"))?;
                let actual = string_field(payload, pointer)?;
                if regex.is_match(actual) {
                    Ok(())
                } else {
                    Err(format!("{pointer} value {actual:?} does not match /{pattern}/"))
                }
            }
            BodyCheck::FieldAbsentOrNull(pointer) => match payload.pointer(pointer) {
                None | Some(Value::Null) => Ok(()),
                Some(v) => Err(format!("{pointer} expected absent or null, got {v}")),
            },
            BodyCheck::ContainsWhere(pointer, var) => {
                let expected = lookup_var(vars, var)?;
                if find_element(payload, pointer, &expected)?.is_some() {
                    Ok(())
                } else {
                    Err(format!("no element with {pointer} == {expected:?}"))
                }
            }
            BodyCheck::NoneWhere(pointer, var) => {
                let expected = lookup_var(vars, var)?;
                if find_element(payload, pointer, &expected)?.is_none() {
                    Ok(())
                } else {
                    Err(format!("unexpected element with {pointer} == {expected:?}"))
                }
            }
            BodyCheck::ElementWhere {
                pointer,
                var,
                checks,
            } => {
                let expected = lookup_var(vars, var)?;
                let element = find_element(payload, pointer, &expected)?
                    .ok_or_else(|| format!("no element with {pointer} == {expected:?}"))?;
                for check in checks {
                    check.apply(element, vars)?;
                }
                Ok(())
            }
            BodyCheck::Custom { f, .. } => f(payload),
        }
    }
}

/// Resolves `{var}` placeholders in an endpoint template. An unresolved
/// placeholder is an error naming the variable, so the runner can skip the
/// step with a precondition reason.
pub fn resolve_template(template: &str, vars: &Vars) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        let value = vars.get(name).ok_or_else(|| name.to_string())?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Replaces string values of the form `{{var}}` anywhere in a JSON body.
pub fn substitute_body(body: &Value, vars: &Vars) -> Result<Value, String> {
    match body {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix("{{").and_then(|r| r.strip_suffix("}}")) {
                let value = vars.get(name).ok_or_else(|| name.to_string())?;
                Ok(Value::String(value.clone()))
            } else {
                Ok(body.clone())
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|v| substitute_body(v, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_body(v, vars)?);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(body.clone()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_array(payload: &Value) -> Result<&Vec<Value>, String> {
    payload
        .as_array()
        .ok_or_else(|| format!("expected an array, got {}", kind_of(payload)))
}

fn string_field<'a>(payload: &'a Value, pointer: &str) -> Result<&'a str, String> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing fields: [{pointer}]"))
}

fn lookup_var(vars: &Vars, var: &str) -> Result<String, String> {
    vars.get(var)
        .cloned()
        .ok_or_else(|| format!("value '{var}' unavailable from earlier step"))
}

/// Finds the first array element whose field at `pointer` equals the
/// expected string (numbers compare by display form).
fn find_element<'a>(
    payload: &'a Value,
    pointer: &str,
    expected: &str,
) -> Result<Option<&'a Value>, String> {
    let elements = as_array(payload)?;
    Ok(elements.iter().find(|e| match e.pointer(pointer) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        _ => false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_envelope_array() {
        assert!(Envelope::Array.extract(&json!([1, 2])).is_ok());
        assert!(Envelope::Array.extract(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_envelope_keyed() {
        let body = json!({"services": [{"id": "s1"}]});
        let payload = Envelope::Keyed("services").extract(&body).unwrap();
        assert_eq!(payload, &json!([{"id": "s1"}]));

        assert!(Envelope::Keyed("services").extract(&json!({})).is_err());
        assert!(
            Envelope::Keyed("services")
                .extract(&json!({"services": 3}))
                .is_err()
        );
    }

    #[test]
    fn test_elements_have_keys_vacuous_on_empty() {
        let check = BodyCheck::ElementsHaveKeys(vec!["id", "status"]);
        assert!(check.apply(&json!([]), &Vars::new()).is_ok());
    }

    #[test]
    fn test_elements_have_keys_reports_missing() {
        let check = BodyCheck::ElementsHaveKeys(vec!["id", "status"]);
        let err = check
            .apply(&json!([{"id": "a"}, {"id": "b", "status": "Pending"}]), &Vars::new())
            .unwrap_err();
        assert!(err.contains("element 0"));
        assert!(err.contains("status"));
    }

    #[test]
    fn test_field_equals_and_present() {
        let body = json!({"status": "PO Uploaded", "po_uploaded_at": "2025-06-01T00:00:00Z"});
        assert!(
            BodyCheck::FieldEquals("/status", json!("PO Uploaded"))
                .apply(&body, &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldPresent("/po_uploaded_at")
                .apply(&body, &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldPresent("/missing")
                .apply(&body, &Vars::new())
                .is_err()
        );
    }

    #[test]
    fn test_field_absent_or_null() {
        assert!(
            BodyCheck::FieldAbsentOrNull("/campaign_id")
                .apply(&json!({"id": "s1"}), &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldAbsentOrNull("/campaign_id")
                .apply(&json!({"campaign_id": null}), &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldAbsentOrNull("/campaign_id")
                .apply(&json!({"campaign_id": "c1"}), &Vars::new())
                .is_err()
        );
    }

    #[test]
    fn test_contains_and_none_where() {
        let body = json!([{"id": "s1"}, {"id": "s2"}]);
        let v = vars(&[("service_id", "s2")]);
        assert!(BodyCheck::ContainsWhere("/id", "service_id").apply(&body, &v).is_ok());
        assert!(BodyCheck::NoneWhere("/id", "service_id").apply(&body, &v).is_err());

        let v = vars(&[("service_id", "s9")]);
        assert!(BodyCheck::ContainsWhere("/id", "service_id").apply(&body, &v).is_err());
        assert!(BodyCheck::NoneWhere("/id", "service_id").apply(&body, &v).is_ok());
    }

    #[test]
    fn test_contains_where_matches_numeric_ids() {
        let body = json!([{"id": 7}]);
        let v = vars(&[("offer_id", "7")]);
        assert!(BodyCheck::ContainsWhere("/id", "offer_id").apply(&body, &v).is_ok());
    }

    #[test]
    fn test_element_where_applies_nested_checks() {
        let body = json!([
            {"id": "s1", "frequency": "monthly"},
            {"id": "s2", "frequency": "weekly", "campaign_id": null}
        ]);
        let v = vars(&[("service_id", "s2")]);
        let check = BodyCheck::ElementWhere {
            pointer: "/id",
            var: "service_id",
            checks: vec![
                BodyCheck::FieldEquals("/frequency", json!("weekly")),
                BodyCheck::FieldAbsentOrNull("/campaign_id"),
            ],
        };
        assert!(check.apply(&body, &v).is_ok());

        let v = vars(&[("service_id", "s1")]);
        assert!(check.apply(&body, &v).is_err());
    }

    #[test]
    fn test_field_regex() {
        let body = json!({"po_url": "https://cdn.example.com/po/doc.pdf"});
        assert!(
            BodyCheck::FieldRegex("/po_url", r"\.pdf$".to_string())
                .apply(&body, &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldRegex("/po_url", r"\.docx$".to_string())
                .apply(&body, &Vars::new())
                .is_err()
        );
    }

    #[test]
    fn test_field_starts_with_and_contains() {
        let body = json!({"raw_text": "%PDF-1.4 ..."});
        assert!(
            BodyCheck::FieldStartsWith("/raw_text", "%PDF".to_string())
                .apply(&body, &Vars::new())
                .is_ok()
        );
        assert!(
            BodyCheck::FieldContains("/raw_text", "1.4".to_string())
                .apply(&body, &Vars::new())
                .is_ok()
        );
    }

    #[test]
    fn test_missing_var_is_precondition_error() {
        let body = json!([{"id": "s1"}]);
        let err = BodyCheck::ContainsWhere("/id", "service_id")
            .apply(&body, &Vars::new())
            .unwrap_err();
        assert!(err.contains("service_id"));
        assert!(err.contains("unavailable"));
    }

    #[test]
    fn test_resolve_template() {
        let v = vars(&[("offer_id", "o-42")]);
        assert_eq!(
            resolve_template("offers/{offer_id}/upload-po", &v).unwrap(),
            "offers/o-42/upload-po"
        );
        assert_eq!(resolve_template("assets/public", &v).unwrap(), "assets/public");
        assert_eq!(resolve_template("offers/{missing}", &v).unwrap_err(), "missing");
    }

    #[test]
    fn test_substitute_body_nested() {
        let v = vars(&[("asset_id", "a-7")]);
        let body = json!({"asset_ids": ["{{asset_id}}"], "note": "plain", "n": 3});
        let out = substitute_body(&body, &v).unwrap();
        assert_eq!(out, json!({"asset_ids": ["a-7"], "note": "plain", "n": 3}));
    }

    #[test]
    fn test_substitute_body_missing_var() {
        let body = json!({"asset_ids": ["{{asset_id}}"]});
        assert_eq!(substitute_body(&body, &Vars::new()).unwrap_err(), "asset_id");
    }
}
