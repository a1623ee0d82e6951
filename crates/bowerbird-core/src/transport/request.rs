use super::CancelToken;

/// A fully formed HTTP request as handed over by the job producer.
///
/// Cloning is cheap and clones share the cancel token, so a per-attempt copy
/// with an extra `Range` header still observes the caller's cancellation.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    cancel: CancelToken,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Set a header, replacing any existing header of the same name
    /// (case-insensitive).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// A copy of this request with one header set. `self` is left untouched.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        self.clone().header(name, value)
    }

    /// Attach a cancel token (replacing the default, never-canceled one).
    pub fn cancel_with(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_header_leaves_original_untouched() {
        let base = Request::get("http://example.com/a.jpg").header("Referer", "https://example.com");
        let ranged = base.with_header("Range", "bytes=10-");
        assert_eq!(base.header_value("range"), None);
        assert_eq!(ranged.header_value("Range"), Some("bytes=10-"));
        assert_eq!(ranged.header_value("referer"), Some("https://example.com"));
    }

    #[test]
    fn header_replaces_case_insensitively() {
        let r = Request::get("http://x/")
            .header("range", "bytes=1-")
            .header("Range", "bytes=5-");
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.header_value("RANGE"), Some("bytes=5-"));
    }

    #[test]
    fn clones_share_cancellation() {
        let r = Request::get("http://x/");
        let attempt = r.with_header("Range", "bytes=1-");
        r.cancel_token().cancel();
        assert!(attempt.cancel_token().is_canceled());
    }
}
