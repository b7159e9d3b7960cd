// Network gate - allow/block classification of outgoing requests
//
// Blocking fonts, images, ads and analytics keeps runs fast and deterministic.
// The policy is an immutable value shared through an Arc; deciding is a pure
// function of the policy and the request.

use crate::api::config::NetworkConfig;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Ad, analytics and tracker domains blocked by default
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "google-analytics.com",
    "googletagmanager.com",
    "googletagservices.com",
    "adservice.google.com",
    "pagead2.googlesyndication.com",
    "amazon-adsystem.com",
    "adsafeprotected.com",
    "moatads.com",
    "criteo.com",
    "criteo.net",
    "pubmatic.com",
    "rubiconproject.com",
    "openx.net",
    "taboola.com",
    "outbrain.com",
    "facebook.net",
    "connect.facebook.net",
    "hotjar.com",
    "scorecardresearch.com",
    "quantserve.com",
    "ad.plus",
];

/// Resource categories blocked by default
pub const DEFAULT_BLOCKED_RESOURCE_TYPES: &[ResourceType] =
    &[ResourceType::Font, ResourceType::Image];

/// Resource type of a request, as reported by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    Xhr,
    Fetch,
    EventSource,
    WebSocket,
    Manifest,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Media => "media",
            ResourceType::Font => "font",
            ResourceType::Script => "script",
            ResourceType::TextTrack => "texttrack",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::EventSource => "eventsource",
            ResourceType::WebSocket => "websocket",
            ResourceType::Manifest => "manifest",
            ResourceType::Other => "other",
        }
    }

    /// Maps a browser-reported resource type, treating unknown names as `Other`.
    pub fn from_browser(name: &str) -> Self {
        name.parse().unwrap_or(ResourceType::Other)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let resource_type = match s.trim().to_ascii_lowercase().as_str() {
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "image" => ResourceType::Image,
            "media" => ResourceType::Media,
            "font" => ResourceType::Font,
            "script" => ResourceType::Script,
            "texttrack" => ResourceType::TextTrack,
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            "eventsource" => ResourceType::EventSource,
            "websocket" => ResourceType::WebSocket,
            "manifest" => ResourceType::Manifest,
            "other" => ResourceType::Other,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown resource type '{}'",
                    other
                )));
            }
        };
        Ok(resource_type)
    }
}

/// An outgoing request as seen by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRequest<'a> {
    pub url: &'a str,
    pub resource_type: ResourceType,
    /// Navigation of the page's main frame (the page under test itself)
    pub main_frame_navigation: bool,
}

impl<'a> NetworkRequest<'a> {
    /// A subresource or subframe request.
    pub fn new(url: &'a str, resource_type: ResourceType) -> Self {
        Self {
            url,
            resource_type,
            main_frame_navigation: false,
        }
    }

    /// The main frame's own document request.
    pub fn main_frame(url: &'a str) -> Self {
        Self {
            url,
            resource_type: ResourceType::Document,
            main_frame_navigation: true,
        }
    }
}

/// Outcome of [`NetworkGate::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Block)
    }
}

/// Which requests to block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPolicy {
    blocked_domains: Vec<String>,
    blocked_resource_types: BTreeSet<ResourceType>,
}

impl NetworkPolicy {
    /// Starts an empty policy (blocks nothing).
    pub fn builder() -> NetworkPolicyBuilder {
        NetworkPolicyBuilder::default()
    }

    pub fn blocked_domains(&self) -> &[String] {
        &self.blocked_domains
    }

    pub fn blocked_resource_types(&self) -> &BTreeSet<ResourceType> {
        &self.blocked_resource_types
    }
}

impl Default for NetworkPolicy {
    /// Fonts and images plus [`DEFAULT_BLOCKED_DOMAINS`].
    fn default() -> Self {
        NetworkPolicy::builder()
            .block_domains(DEFAULT_BLOCKED_DOMAINS.iter().copied())
            .block_resource_types(DEFAULT_BLOCKED_RESOURCE_TYPES.iter().copied())
            .build()
    }
}

impl From<&NetworkConfig> for NetworkPolicy {
    fn from(config: &NetworkConfig) -> Self {
        NetworkPolicy::builder()
            .block_domains(config.blocked_domains.iter().cloned())
            .block_resource_types(config.blocked_resource_types.iter().copied())
            .build()
    }
}

/// Builder for [`NetworkPolicy`]
#[derive(Debug, Clone, Default)]
pub struct NetworkPolicyBuilder {
    blocked_domains: Vec<String>,
    blocked_resource_types: BTreeSet<ResourceType>,
}

impl NetworkPolicyBuilder {
    /// Blocks every request whose URL contains `domain`.
    pub fn block_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into().trim().to_ascii_lowercase();
        if !domain.is_empty() && !self.blocked_domains.contains(&domain) {
            self.blocked_domains.push(domain);
        }
        self
    }

    pub fn block_domains<I, S>(self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        domains
            .into_iter()
            .fold(self, |builder, domain| builder.block_domain(domain))
    }

    /// Blocks every request of `resource_type`.
    ///
    /// Blocking `Document` only affects subframes; main-frame navigations always proceed.
    pub fn block_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.blocked_resource_types.insert(resource_type);
        self
    }

    pub fn block_resource_types<I>(self, resource_types: I) -> Self
    where
        I: IntoIterator<Item = ResourceType>,
    {
        resource_types
            .into_iter()
            .fold(self, |builder, resource_type| {
                builder.block_resource_type(resource_type)
            })
    }

    pub fn build(self) -> NetworkPolicy {
        NetworkPolicy {
            blocked_domains: self.blocked_domains,
            blocked_resource_types: self.blocked_resource_types,
        }
    }
}

/// Classifies outgoing requests against a [`NetworkPolicy`].
///
/// Cheap to clone; clones share the policy.
#[derive(Debug, Clone)]
pub struct NetworkGate {
    policy: Arc<NetworkPolicy>,
}

impl NetworkGate {
    pub fn new(policy: NetworkPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// Decides whether `request` may proceed.
    ///
    /// First match wins:
    /// 1. a main-frame navigation is allowed, so a test can never block its own page
    /// 2. a blocked resource type is blocked
    /// 3. a URL containing a denylisted domain is blocked (subframe documents included)
    /// 4. everything else is allowed
    pub fn decide(&self, request: &NetworkRequest<'_>) -> Decision {
        if request.main_frame_navigation {
            return Decision::Allow;
        }
        if self
            .policy
            .blocked_resource_types
            .contains(&request.resource_type)
        {
            return Decision::Block;
        }
        let url = request.url.to_ascii_lowercase();
        if self
            .policy
            .blocked_domains
            .iter()
            .any(|domain| url.contains(domain.as_str()))
        {
            return Decision::Block;
        }
        Decision::Allow
    }
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new(NetworkPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<(NetworkRequest<'static>, Decision)> {
        vec![
            (
                NetworkRequest::new("https://fonts.gstatic.com/x.woff", ResourceType::Font),
                Decision::Block,
            ),
            (
                NetworkRequest::new("https://doubleclick.net/pixel", ResourceType::Xhr),
                Decision::Block,
            ),
            (
                NetworkRequest::new("https://demoqa.com/images/logo.png", ResourceType::Image),
                Decision::Block,
            ),
            (
                NetworkRequest::new("https://demoqa.com/app.js", ResourceType::Script),
                Decision::Allow,
            ),
            (NetworkRequest::main_frame("https://demoqa.com/"), Decision::Allow),
            (
                NetworkRequest::new(
                    "https://googleads.g.doubleclick.net/pagead/ads?client=ca-pub-1",
                    ResourceType::Document,
                ),
                Decision::Block,
            ),
        ]
    }

    #[test]
    fn test_default_policy_classification() {
        let gate = NetworkGate::default();
        for (request, expected) in table() {
            assert_eq!(gate.decide(&request), expected, "request {:?}", request);
        }
    }

    #[test]
    fn test_main_frame_never_blocked() {
        let gate = NetworkGate::new(
            NetworkPolicy::builder()
                .block_domain("demoqa.com")
                .block_resource_type(ResourceType::Document)
                .build(),
        );

        let main = NetworkRequest::main_frame("https://demoqa.com/");
        assert_eq!(gate.decide(&main), Decision::Allow);

        let frame = NetworkRequest::new("https://demoqa.com/frame.html", ResourceType::Document);
        assert_eq!(gate.decide(&frame), Decision::Block);

        let script = NetworkRequest::new("https://demoqa.com/app.js", ResourceType::Script);
        assert_eq!(gate.decide(&script), Decision::Block);
    }

    #[test]
    fn test_subframe_document_follows_domain_rule() {
        let gate = NetworkGate::default();

        let ad = NetworkRequest::new(
            "https://tpc.googlesyndication.com/safeframe/1-0-40/html/container.html",
            ResourceType::Document,
        );
        assert!(gate.decide(&ad).is_blocked());

        let embed = NetworkRequest::new("https://demoqa.com/sample", ResourceType::Document);
        assert!(!gate.decide(&embed).is_blocked());
    }

    #[test]
    fn test_domain_match_is_case_insensitive() {
        let gate = NetworkGate::new(NetworkPolicy::builder().block_domain("Hotjar.com").build());
        let request =
            NetworkRequest::new("https://static.HOTJAR.com/c/hotjar.js", ResourceType::Script);
        assert!(gate.decide(&request).is_blocked());
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let gate = NetworkGate::new(NetworkPolicy::builder().build());
        for (request, _) in table() {
            assert_eq!(gate.decide(&request), Decision::Allow);
        }
    }

    #[test]
    fn test_identical_policies_decide_identically() {
        let first = NetworkGate::new(NetworkPolicy::default());
        let second = NetworkGate::new(NetworkPolicy::default());
        assert_eq!(first.policy(), second.policy());
        for (request, _) in table() {
            assert_eq!(first.decide(&request), second.decide(&request));
        }
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!(ResourceType::from_browser("xhr"), ResourceType::Xhr);
        assert_eq!(ResourceType::from_browser("FONT"), ResourceType::Font);
        assert_eq!(ResourceType::from_browser("prefetch"), ResourceType::Other);
        assert!("prefetch".parse::<ResourceType>().is_err());
        assert_eq!(ResourceType::EventSource.to_string(), "eventsource");
    }

    #[test]
    fn test_builder_deduplicates_domains() {
        let policy = NetworkPolicy::builder()
            .block_domains(["doubleclick.net", " DoubleClick.net ", ""])
            .build();
        assert_eq!(policy.blocked_domains(), ["doubleclick.net".to_string()]);
    }
}
