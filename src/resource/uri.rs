//! URI-building methods for [`Resource`].
//!
//! Each setter appends to an ordered fragment list on a clone of the
//! receiver; `build_uri` evaluates the fragments on demand. Path
//! fragments resolve left to right with RFC 3986 relative-reference
//! semantics, and query fragments follow the verbatim/merge rules
//! described on [`Resource::query`].

use serde_json::{Map, Value};
use url::Url;

use crate::codec::{Coder, UrlEncodedCoder};
use crate::error::RestError;

use super::{deep_merge, QueryFragment, Resource};

impl Resource {
    /// Selects http (`false`) or https (`true`) explicitly.
    #[must_use]
    pub fn ssl(&self, flag: bool) -> Self {
        let mut next = self.clone();
        next.ssl_value = Some(flag);
        next
    }

    /// Shorthand for `ssl(false)`.
    #[must_use]
    pub fn http(&self) -> Self {
        self.ssl(false)
    }

    /// Shorthand for `ssl(true)`.
    #[must_use]
    pub fn https(&self) -> Self {
        self.ssl(true)
    }

    /// Selects the scheme by name.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Unresolvable`] for anything other than `http`
    /// or `https` (case-insensitive).
    pub fn scheme(&self, word: &str) -> Result<Self, RestError> {
        if word.eq_ignore_ascii_case("http") {
            Ok(self.http())
        } else if word.eq_ignore_ascii_case("https") {
            Ok(self.https())
        } else {
            Err(RestError::Unresolvable(format!(
                "scheme must be http or https, got {word:?}"
            )))
        }
    }

    /// Sets the userinfo user.
    #[must_use]
    pub fn user(&self, user: &str) -> Self {
        let mut next = self.clone();
        next.user_value = Some(user.to_string());
        next
    }

    /// Sets the userinfo password.
    #[must_use]
    pub fn password(&self, password: &str) -> Self {
        let mut next = self.clone();
        next.password_value = Some(password.to_string());
        next
    }

    /// Sets (or clears, with `None`) the full `user:password` userinfo.
    #[must_use]
    pub fn userinfo(&self, userinfo: Option<&str>) -> Self {
        let mut next = self.clone();
        match userinfo {
            Some(value) => {
                let (user, password) = value
                    .split_once(':')
                    .map_or((value, None), |(u, p)| (u, Some(p)));
                next.user_value = Some(user.to_string());
                if next.password_value.is_none() {
                    next.password_value = password.map(ToString::to_string);
                }
            }
            None => {
                next.user_value = None;
                next.password_value = None;
            }
        }
        next
    }

    /// Sets the host.
    #[must_use]
    pub fn host(&self, host: &str) -> Self {
        let mut next = self.clone();
        next.host_value = Some(host.to_string());
        next
    }

    /// Sets the port. Default ports (80 for http, 443 for https) are
    /// omitted from the built URI.
    #[must_use]
    pub fn port(&self, port: u16) -> Self {
        let mut next = self.clone();
        next.port_value = Some(port);
        next
    }

    /// Appends a path fragment, resolved against the path built so far
    /// with relative-reference semantics: an absolute fragment replaces
    /// the path, a relative one resolves against the current directory.
    #[must_use]
    pub fn path(&self, fragment: &str) -> Self {
        let mut next = self.clone();
        next.path_values.push(fragment.to_string());
        next
    }

    /// Appends a raw query-string fragment.
    ///
    /// A single accumulated fragment is preserved verbatim in the built
    /// URI. Once two or more fragments accumulate, every string fragment
    /// is decoded and the fragments merge key-wise, last one winning.
    #[must_use]
    pub fn query(&self, fragment: &str) -> Self {
        let mut next = self.clone();
        next.query_values.push(QueryFragment::Raw(fragment.to_string()));
        next
    }

    /// Appends a mapping query fragment, merged key-wise with any other
    /// fragments.
    #[must_use]
    pub fn query_map(&self, fragment: Map<String, Value>) -> Self {
        let mut next = self.clone();
        next.query_values.push(QueryFragment::Map(fragment));
        next
    }

    /// Discards all accumulated query fragments and starts over from the
    /// given one. `reset_query(x)` builds the same query as `query(x)`
    /// called on a resource with no query fragments.
    #[must_use]
    pub fn reset_query(&self, fragment: &str) -> Self {
        let mut next = self.clone();
        next.query_values = vec![QueryFragment::Raw(fragment.to_string())];
        next
    }

    /// Resolves a relative URL against the currently built URI and
    /// re-derives the scheme, host, port, path, and query from the result.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Unresolvable`] if the current URI cannot be
    /// built, the reference cannot be resolved, or the result is not an
    /// http(s) URL.
    pub fn at(&self, relative: &str) -> Result<Self, RestError> {
        let resolved = self.build_uri()?.join(relative).map_err(|e| {
            RestError::Unresolvable(format!("cannot resolve {relative:?}: {e}"))
        })?;
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return Err(RestError::Unresolvable(format!(
                "scheme must be http or https, got {:?}",
                resolved.scheme()
            )));
        }

        let mut next = self.clone();
        next.ssl_value = Some(resolved.scheme() == "https");
        next.host_value = resolved.host_str().map(ToString::to_string);
        next.port_value = resolved.port_or_known_default();
        // An absolute path fragment supersedes everything built before it.
        next.path_values = vec![resolved.path().to_string()];
        next.query_values = match resolved.query() {
            Some(query) if !query.is_empty() => vec![QueryFragment::Raw(query.to_string())],
            _ => Vec::new(),
        };
        Ok(next)
    }

    /// Builds the URI from the accumulated fragments.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Unresolvable`] when no host can be derived,
    /// the scheme is not http(s), or a path fragment cannot be merged.
    pub fn to_uri(&self) -> Result<Url, RestError> {
        self.build_uri()
    }

    /// Builds the URL string from the accumulated fragments.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Resource::to_uri`].
    pub fn to_url(&self) -> Result<String, RestError> {
        Ok(self.build_uri()?.to_string())
    }

    pub(crate) fn build_uri(&self) -> Result<Url, RestError> {
        let scheme = self.build_scheme();
        if scheme != "http" && scheme != "https" {
            return Err(RestError::Unresolvable(format!(
                "scheme must be http or https, got {scheme:?}"
            )));
        }
        let host = self.build_host()?;

        let mut url = Url::parse(&format!("{scheme}://{host}/")).map_err(|e| {
            RestError::Unresolvable(format!("cannot build URI for host {host:?}: {e}"))
        })?;
        if let Some(port) = self.build_port(&scheme) {
            url.set_port(Some(port))
                .map_err(|()| RestError::Unresolvable(format!("cannot set port {port}")))?;
        }
        if let Some(user) = self.build_user() {
            url.set_username(&user)
                .map_err(|()| RestError::Unresolvable("cannot set userinfo".to_string()))?;
            if let Some(password) = self.build_password() {
                url.set_password(Some(&password))
                    .map_err(|()| RestError::Unresolvable("cannot set userinfo".to_string()))?;
            }
        }
        url.set_path(&self.build_path()?);
        match self.build_query()? {
            Some(query) if !query.is_empty() => url.set_query(Some(&query)),
            _ => url.set_query(None),
        }
        Ok(url)
    }

    fn build_scheme(&self) -> String {
        match self.ssl_value {
            Some(true) => "https".to_string(),
            Some(false) => "http".to_string(),
            None => self
                .parent
                .as_ref()
                .map_or_else(|| self.base.scheme().to_string(), |p| p.build_scheme()),
        }
    }

    fn build_host(&self) -> Result<String, RestError> {
        if let Some(host) = &self.host_value {
            if !host.is_empty() {
                return Ok(host.clone());
            }
        }
        if let Some(parent) = &self.parent {
            return parent.build_host();
        }
        self.base
            .host_str()
            .map(ToString::to_string)
            .ok_or_else(|| RestError::Unresolvable("no HTTP host specified".to_string()))
    }

    /// Derives the port, omitting the scheme's default.
    fn build_port(&self, scheme: &str) -> Option<u16> {
        let port = self
            .port_value
            .or_else(|| self.parent.as_ref().and_then(|p| p.build_port(scheme)))
            .or_else(|| self.base.port());
        match (scheme, port) {
            ("http", Some(80)) | ("https", Some(443)) => None,
            _ => port,
        }
    }

    fn build_user(&self) -> Option<String> {
        self.user_value
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.build_user()))
    }

    fn build_password(&self) -> Option<String> {
        self.password_value
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.build_password()))
    }

    /// Successively merges path fragments, left to right, against the base
    /// path. A parent's path acts as a directory prefix once this resource
    /// contributes fragments of its own.
    pub(crate) fn build_path(&self) -> Result<String, RestError> {
        let mut start = match &self.parent {
            Some(parent) => {
                let mut path = parent.build_path()?;
                if !self.path_values.is_empty() && !path.ends_with('/') {
                    path.push('/');
                }
                path
            }
            None => self.base.path().to_string(),
        };
        if start.is_empty() {
            start.push('/');
        }

        let mut scratch = Url::parse("http://resolve.invalid/")
            .map_err(|e| RestError::Unresolvable(e.to_string()))?;
        scratch.set_path(&start);
        for fragment in &self.path_values {
            scratch = scratch.join(fragment).map_err(|e| {
                RestError::Unresolvable(format!("cannot merge path {fragment:?}: {e}"))
            })?;
        }
        Ok(scratch.path().to_string())
    }

    /// The effective query fragments: the parent chain's followed by this
    /// resource's own, with empty fragments dropped.
    fn build_query_values(&self) -> Vec<QueryFragment> {
        let mut fragments = self
            .parent
            .as_ref()
            .map(|p| p.build_query_values())
            .unwrap_or_default();
        fragments.extend(self.query_values.iter().filter(|f| !f.is_empty()).cloned());
        fragments
    }

    /// Assembles the query string. A single raw fragment is preserved
    /// verbatim; two or more fragments are decoded and merged key-wise,
    /// last one winning.
    pub(crate) fn build_query(&self) -> Result<Option<String>, RestError> {
        let coder = UrlEncodedCoder;
        let fragments = self.build_query_values();
        match fragments.as_slice() {
            [] => Ok(None),
            [QueryFragment::Raw(s)] => Ok(Some(s.clone())),
            [QueryFragment::Map(m)] => Ok(Some(coder.encode(&Value::Object(m.clone()))?)),
            _ => {
                let mut merged = Map::new();
                for fragment in fragments {
                    let decoded = match fragment {
                        QueryFragment::Raw(s) => coder.decode(&s)?,
                        QueryFragment::Map(m) => Value::Object(m),
                    };
                    if let Value::Object(map) = decoded {
                        deep_merge(&mut merged, &map);
                    }
                }
                Ok(Some(coder.encode(&Value::Object(merged))?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Resource {
        Resource::new("http://example.test/").unwrap()
    }

    #[test]
    fn test_scheme_selection() {
        assert_eq!(
            base().scheme("HTTPS").unwrap().to_url().unwrap(),
            "https://example.test/"
        );
        assert!(base().scheme("ftp").is_err());
    }

    #[test]
    fn test_default_port_omitted() {
        assert_eq!(
            base().http().port(80).to_uri().unwrap().port(),
            None
        );
        assert_eq!(
            base().https().port(443).to_uri().unwrap().port(),
            None
        );
        assert_eq!(
            base().port(8080).to_uri().unwrap().port(),
            Some(8080)
        );
        // A non-default port is preserved across the scheme it is not
        // the default for.
        assert_eq!(
            base().https().port(80).to_uri().unwrap().port(),
            Some(80)
        );
    }

    #[test]
    fn test_missing_host_is_unresolvable() {
        let resource = base().host("");
        // Empty override falls back to the base host.
        assert!(resource.to_url().is_ok());

        let hostless = Resource::new("http://gone.test/").unwrap();
        let mut broken = hostless.clone();
        broken.base = Url::parse("unix:/run/sock").unwrap();
        assert!(matches!(
            broken.to_url(),
            Err(RestError::Unresolvable(_))
        ));
    }

    #[test]
    fn test_path_fragments_resolve_relatively() {
        let api = Resource::new("http://example.test/api/").unwrap();
        assert_eq!(
            api.path("widgets").to_url().unwrap(),
            "http://example.test/api/widgets"
        );
        // Without a trailing slash the last segment is replaced.
        let flat = Resource::new("http://example.test/api").unwrap();
        assert_eq!(
            flat.path("widgets").to_url().unwrap(),
            "http://example.test/widgets"
        );
        // An absolute fragment restarts the path.
        assert_eq!(
            api.path("widgets").path("/admin").to_url().unwrap(),
            "http://example.test/admin"
        );
    }

    #[test]
    fn test_single_query_fragment_preserved_verbatim() {
        assert_eq!(
            base().query("q=1&q=2").build_query().unwrap().as_deref(),
            Some("q=1&q=2")
        );
    }

    #[test]
    fn test_two_query_fragments_merge_key_wise() {
        assert_eq!(
            base()
                .query("q=1&q=2")
                .query("r=1")
                .build_query()
                .unwrap()
                .as_deref(),
            Some("q=2&r=1")
        );
    }

    #[test]
    fn test_reset_query_round_trips() {
        let fragment = "a=1&b=2";
        let reset = base().query("zap=9").reset_query(fragment);
        let fresh = base().query(fragment);
        assert_eq!(reset.build_query().unwrap(), fresh.build_query().unwrap());
    }

    #[test]
    fn test_query_map_fragment() {
        let map = json!({"page": 2, "active": true}).as_object().cloned().unwrap();
        assert_eq!(
            base().query_map(map).build_query().unwrap().as_deref(),
            Some("active=true&page=2")
        );
    }

    #[test]
    fn test_at_rederives_components() {
        let resource = base()
            .path("v1/")
            .query("stale=1")
            .at("https://other.test:8443/fresh?x=1")
            .unwrap();
        assert_eq!(
            resource.to_url().unwrap(),
            "https://other.test:8443/fresh?x=1"
        );
    }

    #[test]
    fn test_subresource_treats_parent_path_as_directory() {
        let parent = Resource::new("http://example.test/widgets").unwrap();
        let child = Resource::subresource_of(&parent).path("42");
        assert_eq!(child.to_url().unwrap(), "http://example.test/widgets/42");
    }

    #[test]
    fn test_subresource_merges_parent_query() {
        let parent = base().query("token=abc");
        let child = Resource::subresource_of(&parent).query("page=1");
        assert_eq!(
            child.build_query().unwrap().as_deref(),
            Some("page=1&token=abc")
        );
    }

    #[test]
    fn test_subresource_falls_back_to_parent_components() {
        let parent = base().https().host("api.example.test").port(8443);
        let child = Resource::subresource_of(&parent);
        assert_eq!(child.to_url().unwrap(), "https://api.example.test:8443/");
    }
}
