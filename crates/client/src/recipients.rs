//! Recipient list normalization.
//!
//! Callers may pass `"a@x.com, b@y.com"`, `["a@x.com", "b@y.com"]` or any
//! mix; both reach the wire as `a@x.com, b@y.com`.

use crate::error::Error;

/// Ordered list of recipient addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry, splitting it on commas.
    pub fn push(&mut self, entry: &str) {
        self.0.extend(
            entry
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Rejects an empty list or any entry that is not an email address.
    pub fn validate(&self) -> Result<(), Error> {
        if self.0.is_empty() {
            return Err(Error::Validation("at least one recipient is required".into()));
        }
        match self.0.iter().find(|r| !is_valid_email(r)) {
            Some(bad) => Err(Error::Validation(format!("invalid recipient: {bad}"))),
            None => Ok(()),
        }
    }

    /// The `to` parameter: addresses joined by `", "`.
    pub fn to_wire(&self) -> String {
        self.0.join(", ")
    }
}

impl From<&str> for Recipients {
    fn from(s: &str) -> Self {
        let mut r = Self::new();
        r.push(s);
        r
    }
}

impl From<String> for Recipients {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl<S: AsRef<str>> From<Vec<S>> for Recipients {
    fn from(list: Vec<S>) -> Self {
        list.iter().map(|s| s.as_ref()).collect()
    }
}

impl<S: AsRef<str>> From<&[S]> for Recipients {
    fn from(list: &[S]) -> Self {
        list.iter().map(|s| s.as_ref()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for Recipients {
    fn from(list: [S; N]) -> Self {
        list.iter().map(|s| s.as_ref()).collect()
    }
}

impl<'a> FromIterator<&'a str> for Recipients {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut r = Self::new();
        for entry in iter {
            r.push(entry);
        }
        r
    }
}

/// Loose shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
