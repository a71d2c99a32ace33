use crate::query::value_to_param_string;
use crate::{FetchError, Result, Value};

/// Replaced by the singular resource name, e.g. `User`.
pub const RESOURCE_TOKEN: &str = "{:resource}";
/// Replaced by the capitalized plural resource name, e.g. `Users`.
pub const RESOURCES_TOKEN: &str = "{:resources}";

/// Where a declared action parameter ends up when the template has no
/// `{name}` placeholder for it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ParamRole {
    /// Positional route value, appended after the path or consumed by a leftover placeholder.
    Route,
    /// Query string entry under the parameter name.
    #[default]
    Query,
    /// Query string entry under an alias.
    QueryAs(String),
    /// Request body. Not counted against the supplied values.
    Body,
}

/// Declared parameter of an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub role: ParamRole,
}

impl ParamSpec {
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ParamRole::Query,
        }
    }

    pub fn query_as(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ParamRole::QueryAs(alias.into()),
        }
    }

    pub fn route(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ParamRole::Route,
        }
    }

    pub fn body(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ParamRole::Body,
        }
    }

    fn placeholder(&self) -> String {
        format!("{{{}}}", self.name)
    }
}

/// Output of [`resolve`]: a path plus the values left for request building.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedRoute {
    pub path: String,
    pub route_parameters: Vec<String>,
    pub query_parameters: Vec<(String, Value)>,
}

/// Resolves a route template against declared parameters and call-site values.
///
/// `values` holds one entry per non-body parameter, in declaration order.
pub fn resolve(
    template: &str,
    resource: &str,
    params: &[ParamSpec],
    values: &[Value],
) -> Result<ResolvedRoute> {
    check_braces(template)?;

    let declared: Vec<&ParamSpec> = params
        .iter()
        .filter(|param| param.role != ParamRole::Body)
        .collect();
    if declared.len() != values.len() {
        return Err(FetchError::Configuration(format!(
            "argument count does not match parameter count for `{template}`: {} parameters, {} arguments",
            declared.len(),
            values.len()
        )));
    }

    let mut path = substitute_resource_tokens(template, resource)?;
    let mut resolved = ResolvedRoute::default();
    for (param, value) in declared.into_iter().zip(values) {
        let placeholder = param.placeholder();
        if path.contains(&placeholder) {
            path = path.replace(&placeholder, &path_value(value));
            continue;
        }
        match &param.role {
            ParamRole::Route => resolved.route_parameters.push(value_to_param_string(value)),
            ParamRole::QueryAs(alias) if !alias.is_empty() => {
                resolved.query_parameters.push((alias.clone(), value.clone()))
            }
            _ => resolved
                .query_parameters
                .push((param.name.clone(), value.clone())),
        }
    }

    resolved.path = path;
    Ok(resolved)
}

/// Braces in substituted values are percent-escaped so the URL builder
/// never reads them as placeholders.
fn path_value(value: &Value) -> String {
    value_to_param_string(value)
        .replace('{', "%7B")
        .replace('}', "%7D")
}

/// Replaces `{:resource}` and `{:resources}` in `template`.
pub fn substitute_resource_tokens(template: &str, resource: &str) -> Result<String> {
    if !template.contains(RESOURCE_TOKEN) && !template.contains(RESOURCES_TOKEN) {
        return Ok(template.to_owned());
    }
    if resource.is_empty() {
        return Err(FetchError::Configuration(format!(
            "`{template}` uses a resource token but no resource name is set"
        )));
    }
    Ok(template
        .replace(RESOURCES_TOKEN, &pluralize(resource))
        .replace(RESOURCE_TOKEN, resource))
}

fn check_braces(template: &str) -> Result<()> {
    let mut open = false;
    for ch in template.chars() {
        match (ch, open) {
            ('{', false) => open = true,
            ('}', true) => open = false,
            ('{', true) | ('}', false) => {
                return Err(FetchError::Configuration(format!(
                    "malformed route template `{template}`"
                )))
            }
            _ => {}
        }
    }
    if open {
        return Err(FetchError::Configuration(format!(
            "malformed route template `{template}`"
        )));
    }
    Ok(())
}

/// Rule-based English plural, capitalized: `category` -> `Categories`.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    let plural = if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        format!("{lower}es")
    } else if let Some(stem) = lower.strip_suffix('y').filter(|stem| {
        stem.chars()
            .last()
            .is_some_and(|c| c.is_alphabetic() && !"aeiou".contains(c))
    }) {
        format!("{stem}ies")
    } else if let Some(stem) = lower.strip_suffix("fe") {
        format!("{stem}ves")
    } else if let Some(stem) = lower.strip_suffix('f') {
        format!("{stem}ves")
    } else {
        format!("{lower}s")
    };
    capitalize(&plural)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derives a resource name from a service type name by stripping the
/// `Client` suffix: `my_app::UserClient<T>` -> `User`.
pub fn resource_name_from_type_name(type_name: &str) -> Result<String> {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    let short = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);
    match short.strip_suffix("Client") {
        Some(resource) if !resource.is_empty() => Ok(resource.to_owned()),
        _ => Err(FetchError::Configuration(format!(
            "invalid service client name `{short}`: it must end with `Client`"
        ))),
    }
}
