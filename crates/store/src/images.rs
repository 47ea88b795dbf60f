use url::Url;

/// Maps stored image paths to publicly fetchable URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResolver {
    base: String,
    placeholder: String,
}

impl ImageResolver {
    /// `base` is prepended verbatim to every stored path.
    pub fn new(base: &Url, placeholder: impl Into<String>) -> Self {
        Self {
            base: base.to_string(),
            placeholder: placeholder.into(),
        }
    }

    /// Returns the URL for `reference`, or the placeholder when it is absent
    /// or blank. Non-blank references are appended unchanged.
    pub fn resolve(&self, reference: Option<&str>) -> String {
        match reference.filter(|path| !path.trim().is_empty()) {
            Some(path) => format!("{}{}", self.base, path),
            None => self.placeholder.clone(),
        }
    }
}
