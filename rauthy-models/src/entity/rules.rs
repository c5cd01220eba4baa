use crate::entity::sessions::{AuthLevel, Session};
use ipnetwork::IpNetwork;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

/// One element of the ordered access control list (§3, §4.1). Evaluated in declaration
/// order; the first rule whose predicates all match wins. Missing predicates are wildcards.
#[derive(Debug, Clone)]
pub struct Rule {
    pub domains: Vec<DomainPattern>,
    pub resources: Vec<Regex>,
    pub subjects: Vec<SubjectPredicate>,
    pub methods: Vec<String>,
    pub networks: Vec<NetworkPredicate>,
    pub policy: Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    Bypass,
    OneFactor,
    TwoFactor,
    Deny,
}

#[derive(Debug, Clone)]
pub enum DomainPattern {
    Literal(String),
    /// `*.` consumes exactly one label.
    Wildcard(String),
    Regex(Regex),
}

impl DomainPattern {
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            DomainPattern::Literal(l) => l.eq_ignore_ascii_case(&host),
            DomainPattern::Wildcard(suffix) => {
                let suffix = suffix.to_ascii_lowercase();
                match host.split_once('.') {
                    Some((_, rest)) => rest == suffix,
                    None => false,
                }
            }
            DomainPattern::Regex(re) => re.is_match(&host),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubjectPredicate {
    User(String),
    Group(String),
    OAuth2Client(String),
}

impl SubjectPredicate {
    fn matches(&self, fp: &Fingerprint) -> bool {
        match self {
            SubjectPredicate::User(u) => fp.username.as_deref() == Some(u.as_str()),
            SubjectPredicate::Group(g) => fp.groups.iter().any(|x| x == g),
            SubjectPredicate::OAuth2Client(c) => fp.oauth2_client.as_deref() == Some(c.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NetworkPredicate {
    Cidr(IpNetwork),
    /// Named network, resolved against a configured set at rule-compile time.
    Named(String, Vec<IpNetwork>),
}

impl NetworkPredicate {
    fn matches(&self, ip: IpAddr) -> bool {
        match self {
            NetworkPredicate::Cidr(net) => net.contains(ip),
            NetworkPredicate::Named(_, nets) => nets.iter().any(|n| n.contains(ip)),
        }
    }
}

/// The tuple of request attributes the policy evaluator consumes (§3). The sole input to
/// policy evaluation besides the compiled rule set.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub client_ip: IpAddr,
    pub original_url: Option<String>,
    pub username: Option<String>,
    pub groups: Vec<String>,
    pub oauth2_client: Option<String>,
    pub session_level: AuthLevel,
}

impl Fingerprint {
    pub fn from_session(mut self, session: &Session) -> Self {
        self.username = session.username.clone();
        self.groups = session.groups.iter().cloned().collect();
        self.session_level = session.level;
        self
    }

    fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Output of policy evaluation (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredLevel {
    Bypass,
    OneFactor,
    TwoFactor,
    Denied,
}

impl From<Policy> for RequiredLevel {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Bypass => RequiredLevel::Bypass,
            Policy::OneFactor => RequiredLevel::OneFactor,
            Policy::TwoFactor => RequiredLevel::TwoFactor,
            Policy::Deny => RequiredLevel::Denied,
        }
    }
}

/// Result of evaluating the rule set against a fingerprint, including the "would-have-matched"
/// signal (§4.1, §9) the pipeline needs to distinguish 401 step-up from 403 deny when a
/// subject-gated rule is skipped for an anonymous/under-level session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub required: RequiredLevel,
    /// Set when a rule was skipped purely because its subject predicate needs a higher
    /// level than the current session holds, and no earlier rule matched.
    pub would_have_matched_at_higher_level: bool,
}

impl Rule {
    fn matches(&self, fp: &Fingerprint) -> RuleMatch {
        if !self.domains.is_empty() && !self.domains.iter().any(|d| d.matches(&fp.host)) {
            return RuleMatch::NoMatch;
        }

        if !self.resources.is_empty() {
            let pq = fp.path_and_query();
            if !self.resources.iter().any(|r| r.is_match(&pq)) {
                return RuleMatch::NoMatch;
            }
        }

        if !self.methods.is_empty()
            && !self
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&fp.method))
        {
            return RuleMatch::NoMatch;
        }

        if !self.networks.is_empty() && !self.networks.iter().any(|n| n.matches(fp.client_ip)) {
            return RuleMatch::NoMatch;
        }

        if !self.subjects.is_empty() {
            // Subject-scoped rules are skipped (not denied) below OneFactor; the evaluator
            // re-runs after step-up.
            if fp.session_level < AuthLevel::OneFactor {
                return RuleMatch::SkippedNeedsAuth;
            }
            if !self.subjects.iter().any(|s| s.matches(fp)) {
                return RuleMatch::NoMatch;
            }
        }

        RuleMatch::Match
    }
}

enum RuleMatch {
    Match,
    NoMatch,
    SkippedNeedsAuth,
}

/// Pure function over a compiled rule set and a request fingerprint (§4.1, §9 — no I/O,
/// testable in isolation).
pub fn evaluate(rules: &[Rule], default_policy: Policy, fp: &Fingerprint) -> Evaluation {
    let mut would_have_matched = false;

    for rule in rules {
        match rule.matches(fp) {
            RuleMatch::Match => {
                return Evaluation {
                    required: rule.policy.into(),
                    would_have_matched_at_higher_level: false,
                };
            }
            RuleMatch::SkippedNeedsAuth => {
                would_have_matched = true;
            }
            RuleMatch::NoMatch => {}
        }
    }

    Evaluation {
        required: default_policy.into(),
        would_have_matched_at_higher_level: would_have_matched,
    }
}

pub fn parse_policy(s: &str) -> Policy {
    match s {
        "bypass" => Policy::Bypass,
        "one_factor" => Policy::OneFactor,
        "two_factor" => Policy::TwoFactor,
        _ => Policy::Deny,
    }
}

pub fn parse_domain_pattern(s: &str) -> Result<DomainPattern, String> {
    if let Some(suffix) = s.strip_prefix("*.") {
        Ok(DomainPattern::Wildcard(suffix.to_string()))
    } else if let Some(pattern) = s.strip_prefix("regex:") {
        Regex::new(pattern)
            .map(DomainPattern::Regex)
            .map_err(|e| e.to_string())
    } else {
        Ok(DomainPattern::Literal(s.to_string()))
    }
}

pub fn parse_network(s: &str) -> Result<IpNetwork, String> {
    IpNetwork::from_str(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(host: &str, path: &str, level: AuthLevel, groups: &[&str]) -> Fingerprint {
        Fingerprint {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: host.to_string(),
            path: path.to_string(),
            query: String::new(),
            client_ip: "127.0.0.1".parse().unwrap(),
            original_url: None,
            username: None,
            groups: groups.iter().map(|s| s.to_string()).collect(),
            oauth2_client: None,
            session_level: level,
        }
    }

    #[test]
    fn empty_rule_set_uses_default_policy() {
        let eval = evaluate(&[], Policy::Deny, &fp("any.example.com", "/", AuthLevel::Anonymous, &[]));
        assert_eq!(eval.required, RequiredLevel::Denied);
        assert!(!eval.would_have_matched_at_higher_level);
    }

    #[test]
    fn bypass_rule_never_requires_step_up() {
        let rules = vec![Rule {
            domains: vec![DomainPattern::Literal("public.example.com".to_string())],
            resources: vec![],
            subjects: vec![],
            methods: vec![],
            networks: vec![],
            policy: Policy::Bypass,
        }];
        let eval = evaluate(
            &rules,
            Policy::Deny,
            &fp("public.example.com", "/", AuthLevel::Anonymous, &[]),
        );
        assert_eq!(eval.required, RequiredLevel::Bypass);
    }

    #[test]
    fn subject_rule_skipped_for_anonymous_yields_would_have_matched() {
        let rules = vec![Rule {
            domains: vec![DomainPattern::Literal("admin.example.com".to_string())],
            resources: vec![],
            subjects: vec![SubjectPredicate::Group("admins".to_string())],
            methods: vec![],
            networks: vec![],
            policy: Policy::TwoFactor,
        }];
        let eval = evaluate(
            &rules,
            Policy::Deny,
            &fp("admin.example.com", "/", AuthLevel::Anonymous, &[]),
        );
        assert_eq!(eval.required, RequiredLevel::Denied);
        assert!(eval.would_have_matched_at_higher_level);
    }

    #[test]
    fn subject_rule_matches_for_group_member_at_one_factor() {
        let rules = vec![Rule {
            domains: vec![DomainPattern::Literal("admin.example.com".to_string())],
            resources: vec![],
            subjects: vec![SubjectPredicate::Group("admins".to_string())],
            methods: vec![],
            networks: vec![],
            policy: Policy::TwoFactor,
        }];
        let eval = evaluate(
            &rules,
            Policy::Deny,
            &fp("admin.example.com", "/", AuthLevel::OneFactor, &["admins"]),
        );
        assert_eq!(eval.required, RequiredLevel::TwoFactor);
    }

    #[test]
    fn subject_rule_no_match_for_non_member_falls_through_to_default() {
        let rules = vec![Rule {
            domains: vec![DomainPattern::Literal("admin.example.com".to_string())],
            resources: vec![],
            subjects: vec![SubjectPredicate::Group("admins".to_string())],
            methods: vec![],
            networks: vec![],
            policy: Policy::TwoFactor,
        }];
        let eval = evaluate(
            &rules,
            Policy::Deny,
            &fp("admin.example.com", "/", AuthLevel::OneFactor, &["users"]),
        );
        assert_eq!(eval.required, RequiredLevel::Denied);
        assert!(!eval.would_have_matched_at_higher_level);
    }

    #[test]
    fn wildcard_domain_consumes_exactly_one_label() {
        let pat = parse_domain_pattern("*.example.com").unwrap();
        assert!(pat.matches("secure.example.com"));
        assert!(!pat.matches("a.b.example.com"));
        assert!(!pat.matches("example.com"));
    }

    #[test]
    fn first_match_wins_declaration_order() {
        let rules = vec![
            Rule {
                domains: vec![DomainPattern::Literal("x.example.com".to_string())],
                resources: vec![],
                subjects: vec![],
                methods: vec![],
                networks: vec![],
                policy: Policy::OneFactor,
            },
            Rule {
                domains: vec![DomainPattern::Literal("x.example.com".to_string())],
                resources: vec![],
                subjects: vec![],
                methods: vec![],
                networks: vec![],
                policy: Policy::TwoFactor,
            },
        ];
        let eval = evaluate(&rules, Policy::Deny, &fp("x.example.com", "/", AuthLevel::Anonymous, &[]));
        assert_eq!(eval.required, RequiredLevel::OneFactor);
    }
}
