//! Route path templates.
//!
//! Syntax:
//!
//! - `/users` - literal segments, matched exactly
//! - `/users/{id}` - `{name}` matches one non-empty segment
//! - `/files/{*path}` - `{*name}` matches one or more trailing segments
//!
//! A trailing slash is ignored on both templates and concrete paths,
//! except for the root path `/`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("template must start with '/'")]
    MissingLeadingSlash,

    #[error("empty segment in template")]
    EmptySegment,

    #[error("invalid parameter '{0}'")]
    InvalidParameter(String),

    #[error("catch-all parameter must be the last segment")]
    CatchAllNotLast,

    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

/// Strip one trailing slash, except from `/` itself.
pub fn normalize_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PathPattern {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] for templates that do not follow the syntax
    /// in the module docs.
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        let template = normalize_path(template.trim());
        let rest = template
            .strip_prefix('/')
            .ok_or(PatternError::MissingLeadingSlash)?;

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        if !rest.is_empty() {
            for raw in rest.split('/') {
                if matches!(segments.last(), Some(Segment::CatchAll(_))) {
                    return Err(PatternError::CatchAllNotLast);
                }
                if raw.is_empty() {
                    return Err(PatternError::EmptySegment);
                }

                let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(inner) => {
                        let (name, catch_all) = match inner.strip_prefix('*') {
                            Some(name) => (name, true),
                            None => (inner, false),
                        };
                        if !is_param_name(name) {
                            return Err(PatternError::InvalidParameter(raw.to_string()));
                        }
                        if names.contains(&name) {
                            return Err(PatternError::DuplicateParameter(name.to_string()));
                        }
                        names.push(name);
                        if catch_all {
                            Segment::CatchAll(name.to_string())
                        } else {
                            Segment::Param(name.to_string())
                        }
                    }
                    None if raw.contains(['{', '}']) => {
                        return Err(PatternError::InvalidParameter(raw.to_string()));
                    }
                    None => Segment::Literal(raw.to_string()),
                };
                segments.push(segment);
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The normalized template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether `path` fully matches this template.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = normalize_path(path).strip_prefix('/') else {
            return false;
        };

        let mut parts = rest.split('/').filter(|_| !rest.is_empty()).peekable();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part == literal => {}
                    _ => return false,
                },
                Segment::Param(_) => match parts.next() {
                    Some(part) if !part.is_empty() => {}
                    _ => return false,
                },
                Segment::CatchAll(_) => {
                    let mut any = false;
                    for part in parts.by_ref() {
                        if part.is_empty() {
                            return false;
                        }
                        any = true;
                    }
                    return any;
                }
            }
        }

        parts.peek().is_none()
    }
}
