//! Path pattern matching.
//!
//! # Responsibilities
//! - Match exact paths, optionally templated with `{name}` placeholders
//! - Match plain string prefixes
//! - Capture placeholder values as [`PathParams`]
//!
//! # Design Decisions
//! - Matching runs against the raw (percent-encoded) path
//! - Prefixes are string prefixes, not segment prefixes: `/v3` matches `/v3-public`
//! - A placeholder matches one non-empty segment and may be wrapped by literal
//!   text inside that segment (`{token}.yaml`)
//! - No regex to guarantee O(n) matching

/// How a pattern is compared against a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
}

/// Values captured from `{name}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Look up a captured value by placeholder name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        prefix: String,
        suffix: String,
    },
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match (raw.find('{'), raw.rfind('}')) {
            (Some(open), Some(close)) if open < close => Segment::Param {
                name: raw[open + 1..close].to_string(),
                prefix: raw[..open].to_string(),
                suffix: raw[close + 1..].to_string(),
            },
            _ => Segment::Literal(raw.to_string()),
        }
    }

    fn capture<'p>(&self, segment: &'p str) -> Option<Option<&'p str>> {
        match self {
            Segment::Literal(literal) => (literal == segment).then_some(None),
            Segment::Param { prefix, suffix, .. } => {
                if segment.len() <= prefix.len() + suffix.len() {
                    return None;
                }
                let value = segment.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())?;
                Some(Some(value))
            }
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    kind: MatchKind,
    /// Populated only for templated exact patterns.
    segments: Vec<Segment>,
}

impl Pattern {
    /// Exact pattern. `{name}` placeholders are compiled into segments.
    pub fn exact(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let segments = if raw.contains('{') {
            raw.split('/').map(Segment::parse).collect()
        } else {
            Vec::new()
        };
        Self {
            raw,
            kind: MatchKind::Exact,
            segments,
        }
    }

    /// Plain string prefix pattern.
    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self {
            raw: pattern.into(),
            kind: MatchKind::Prefix,
            segments: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Returns captured parameters when `path` satisfies this pattern.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        match self.kind {
            MatchKind::Prefix => path.starts_with(&self.raw).then(PathParams::default),
            MatchKind::Exact if self.segments.is_empty() => {
                (path == self.raw).then(PathParams::default)
            }
            MatchKind::Exact => self.match_template(path),
        }
    }

    fn match_template(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            if let Some(value) = segment.capture(part)? {
                if let Segment::Param { name, .. } = segment {
                    params.push((name.clone(), value.to_string()));
                }
            }
        }
        Some(PathParams(params))
    }
}
