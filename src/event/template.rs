//! Message templates with named `{placeholder}` fields.

use std::collections::HashMap;

use thiserror::Error;

use crate::base::{config::TemplateOverride, templates::DEFAULT_TEMPLATES};

// Errors.

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template for `{tag}` is malformed: {reason}")]
    Malformed { tag: String, reason: String },

    #[error("Template for `{tag}` references field `{field}`, which the event does not provide")]
    MissingField { tag: String, field: String },
}

// Structs.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tag_variant: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template body.
    ///
    /// `{name}` is a field, `{{` and `}}` are literal braces. Anything else
    /// involving a brace is rejected here, so that rendering can only fail on
    /// a missing field.
    pub fn parse(tag_variant: impl Into<String>, body: &str) -> Result<Self, TemplateError> {
        let tag_variant = tag_variant.into();
        let malformed = |reason: &str| TemplateError::Malformed {
            tag: tag_variant.clone(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = body.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();

                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(malformed("nested `{` inside a placeholder")),
                            Some(c) => name.push(c),
                            None => return Err(malformed("unterminated placeholder")),
                        }
                    }

                    if name.trim().is_empty() {
                        return Err(malformed("empty placeholder"));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(malformed("single `}` outside a placeholder")),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { tag_variant, segments })
    }

    /// Names of the fields this template references, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every field using `lookup`.
    ///
    /// Fails on the first field `lookup` cannot resolve; nothing is dropped silently.
    pub fn render<F>(&self, lookup: F) -> Result<String, TemplateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = lookup(name).ok_or_else(|| TemplateError::MissingField {
                        tag: self.tag_variant.clone(),
                        field: name.clone(),
                    })?;
                    out.push_str(&value);
                }
            }
        }

        Ok(out)
    }
}

/// Immutable table of templates keyed by tag variant.
///
/// Built once at startup and handed to the renderer; lookups are exact
/// matches on the full tag variant, with no prefix matching.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Build a registry from `(tag variant, body)` pairs. Later pairs replace earlier ones.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let templates = pairs
            .into_iter()
            .map(|(tag, body)| Template::parse(tag, body).map(|t| (tag.to_string(), t)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self { templates })
    }

    /// The built-in templates, with `overrides` added or replacing them.
    pub fn with_overrides(overrides: &[TemplateOverride]) -> Result<Self, TemplateError> {
        let pairs = DEFAULT_TEMPLATES.iter().copied().chain(overrides.iter().map(|o| (o.tag.as_str(), o.body.as_str())));

        Self::from_pairs(pairs)
    }

    pub fn get(&self, tag_variant: &str) -> Option<&Template> {
        self.templates.get(tag_variant)
    }

    /// Render the template for `tag_variant`, or `Ok(None)` if there is none.
    pub fn render<F>(&self, tag_variant: &str, lookup: F) -> Result<Option<String>, TemplateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.get(tag_variant).map(|t| t.render(lookup)).transpose()
    }

    /// Number of templates; the built-in table means this is never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_parse_and_render() {
        let template = Template::parse("t", "Package <b>{pkgname} {version}</b>").unwrap();

        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["pkgname", "version"]);
        assert_eq!(template.render(lookup_from(&[("pkgname", "foo"), ("version", "1.0")])).unwrap(), "Package <b>foo 1.0</b>");
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = Template::parse("t", "{{literal}} {name}}}").unwrap();

        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(template.render(lookup_from(&[("name", "x")])).unwrap(), "{literal} x}");
    }

    #[test]
    fn test_malformed_templates_are_rejected() {
        assert!(matches!(Template::parse("t", "open {name"), Err(TemplateError::Malformed { .. })));
        assert!(matches!(Template::parse("t", "close name}"), Err(TemplateError::Malformed { .. })));
        assert!(matches!(Template::parse("t", "empty {}"), Err(TemplateError::Malformed { .. })));
        assert!(matches!(Template::parse("t", "nested {a{b}}"), Err(TemplateError::Malformed { .. })));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let template = Template::parse("_lk.jobs.job-finished", "Job {job_id} finished with result {result}").unwrap();
        let err = template.render(lookup_from(&[("job_id", "abc")])).unwrap_err();

        assert_eq!(
            err,
            TemplateError::MissingField {
                tag: "_lk.jobs.job-finished".to_string(),
                field: "result".to_string()
            }
        );
    }

    #[test]
    fn test_builtin_templates_all_parse() {
        let registry = TemplateRegistry::with_overrides(&[]).unwrap();

        assert_eq!(registry.len(), DEFAULT_TEMPLATES.len());
        assert!(registry.get("_lk.synchrotron.src-package-synced:forced").is_some());
        assert!(registry.get("_lk.rubicon.upload-accepted:failed").is_some());
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = TemplateRegistry::with_overrides(&[]).unwrap();

        assert!(registry.get("_lk.job").is_none());
        assert!(registry.get("_lk.job.package-build-success:forced").is_none());
        assert_eq!(registry.render("_lk.unknown.thing", |_| None).unwrap(), None);
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let overrides = vec![
            TemplateOverride {
                tag: "_lk.jobs.job-finished".to_string(),
                body: "Done: {job_id}".to_string(),
            },
            TemplateOverride {
                tag: "_lk.custom.thing".to_string(),
                body: "Thing {name}".to_string(),
            },
        ];

        let registry = TemplateRegistry::with_overrides(&overrides).unwrap();

        assert_eq!(registry.len(), DEFAULT_TEMPLATES.len() + 1);
        assert_eq!(registry.render("_lk.jobs.job-finished", lookup_from(&[("job_id", "7")])).unwrap().as_deref(), Some("Done: 7"));
        assert_eq!(registry.render("_lk.custom.thing", lookup_from(&[("name", "n")])).unwrap().as_deref(), Some("Thing n"));
    }

    #[test]
    fn test_malformed_override_fails_construction() {
        let overrides = vec![TemplateOverride {
            tag: "_lk.custom.broken".to_string(),
            body: "Broken {name".to_string(),
        }];

        assert!(TemplateRegistry::with_overrides(&overrides).is_err());
    }
}
