//! Input reference validation.
//!
//! Input URLs are untrusted. The submitter refuses to send anything that the
//! configured [`InputValidator`] rejects.

use url::Url;

/// Predicate deciding whether an input reference may be submitted.
pub trait InputValidator: Send + Sync {
    /// Returns a human-readable reason on rejection.
    fn validate(&self, input: &str) -> Result<(), String>;
}

impl<F> InputValidator for F
where
    F: Fn(&str) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, input: &str) -> Result<(), String> {
        self(input)
    }
}

/// Scheme/host allow-list with a length cap.
#[derive(Debug, Clone)]
pub struct InputPolicy {
    /// Accepted URL schemes
    pub allowed_schemes: Vec<String>,
    /// Accepted hosts; subdomains of a listed host also match. `None` accepts any host.
    pub allowed_hosts: Option<Vec<String>>,
    /// Maximum length in bytes
    pub max_length: usize,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["https".to_string(), "http".to_string()],
            allowed_hosts: None,
            max_length: 2048,
        }
    }
}

impl InputPolicy {
    /// Only accept `https` URLs.
    pub fn https_only() -> Self {
        Self {
            allowed_schemes: vec!["https".to_string()],
            ..Default::default()
        }
    }

    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = Some(
            hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    fn host_allowed(&self, host: &str) -> bool {
        match &self.allowed_hosts {
            None => true,
            Some(hosts) => hosts.iter().any(|allowed| {
                host == allowed
                    || host
                        .strip_suffix(allowed.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }),
        }
    }
}

impl InputValidator for InputPolicy {
    fn validate(&self, input: &str) -> Result<(), String> {
        let input = input.trim();

        if input.is_empty() {
            return Err("input URL is empty".to_string());
        }
        if input.len() > self.max_length {
            return Err(format!(
                "input URL is {} bytes, limit is {}",
                input.len(),
                self.max_length
            ));
        }

        let url = Url::parse(input).map_err(|e| format!("not a valid URL: {}", e))?;

        if !self
            .allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(url.scheme()))
        {
            return Err(format!("scheme {:?} is not allowed", url.scheme()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| "URL has no host".to_string())?
            .to_ascii_lowercase();

        if !self.host_allowed(&host) {
            return Err(format!("host {:?} is not allowed", host));
        }

        Ok(())
    }
}
