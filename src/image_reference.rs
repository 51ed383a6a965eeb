use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static REPOSITORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$")
        .expect("repository pattern is valid")
});

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
});

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*(?::[0-9]+)?$",
    )
    .expect("domain pattern is valid")
});

/// Canonical identity of a container image: `[domain/]repository[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MalformedReference(String),
    MissingRepository,
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedReference(image) => {
                write!(f, "malformed image reference: {}", image)
            }
            ParseError::MissingRepository => write!(f, "image declaration has no repository"),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        Self::parse_with_tag(s, None)
    }

    /// Parses `s`, appending `explicit_tag` first when `s` carries no tag of its own.
    pub fn parse_with_tag(s: &str, explicit_tag: Option<&str>) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError::MalformedReference(s.to_string()));
        }
        // digest references are not supported
        if s.contains('@') {
            return Err(ParseError::MalformedReference(s.to_string()));
        }

        let (without_tag, tag) = split_tag(s);
        let tag = match (tag, explicit_tag) {
            (Some(tag), _) => Some(tag),
            (None, Some(explicit)) => Some(explicit),
            (None, None) => None,
        };

        if let Some(tag) = tag {
            if !TAG_PATTERN.is_match(tag) {
                return Err(ParseError::MalformedReference(s.to_string()));
            }
        }

        let (domain, repository) = split_domain(without_tag);

        if let Some(domain) = domain {
            if !DOMAIN_PATTERN.is_match(domain) {
                return Err(ParseError::MalformedReference(s.to_string()));
            }
        }
        if !REPOSITORY_PATTERN.is_match(repository) {
            return Err(ParseError::MalformedReference(s.to_string()));
        }

        Ok(Self {
            domain: domain.map(str::to_string),
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    /// The reference without its tag.
    pub fn name(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}/{}", domain, self.repository),
            None => self.repository.clone(),
        }
    }
}

/// Splits off a tag: a colon after the last slash.
fn split_tag(s: &str) -> (&str, Option<&str>) {
    match s.rfind(':') {
        Some(pos) if pos > s.rfind('/').unwrap_or(0) => (&s[..pos], Some(&s[pos + 1..])),
        _ => (s, None),
    }
}

/// The first path component is a domain when it looks like a host.
fn split_domain(s: &str) -> (Option<&str>, &str) {
    match s.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (Some(first), rest)
        }
        _ => (None, s),
    }
}
