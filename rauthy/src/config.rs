use rauthy_models::entity::rules::{
    parse_domain_pattern, parse_network, parse_policy, NetworkPredicate, Rule, SubjectPredicate,
};
use regex::Regex;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
struct RuleConfig {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    networks: Vec<String>,
    policy: String,
}

/// Loads the ordered access-control rule list from the YAML file at `RULES_FILE`. Ambient
/// config decoding per the non-goal carve-out (§1) — kept minimal, not a general-purpose
/// config framework. An unset or unreadable path falls back to an empty rule set, so every
/// request falls through to `DEFAULT_POLICY`.
pub fn load_rules() -> Vec<Rule> {
    let Ok(path) = std::env::var("RULES_FILE") else {
        tracing::info!("RULES_FILE not set, starting with an empty rule set");
        return Vec::new();
    };

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("could not read RULES_FILE={}: {}, starting empty", path, err);
            return Vec::new();
        }
    };

    let configs: Vec<RuleConfig> = match serde_yaml::from_str(&raw) {
        Ok(c) => c,
        Err(err) => {
            tracing::error!("could not parse RULES_FILE={}: {}, starting empty", path, err);
            return Vec::new();
        }
    };

    configs
        .into_iter()
        .filter_map(|c| match compile_rule(&c) {
            Ok(rule) => Some(rule),
            Err(err) => {
                tracing::error!("skipping malformed rule: {}", err);
                None
            }
        })
        .collect()
}

fn compile_rule(c: &RuleConfig) -> Result<Rule, String> {
    let domains = c
        .domains
        .iter()
        .map(|d| parse_domain_pattern(d))
        .collect::<Result<Vec<_>, _>>()?;
    let resources = c
        .resources
        .iter()
        .map(|r| Regex::new(r).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let subjects = c.subjects.iter().map(|s| parse_subject(s)).collect();
    let networks = c
        .networks
        .iter()
        .map(|n| parse_network(n).map(NetworkPredicate::Cidr))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Rule {
        domains,
        resources,
        subjects,
        methods: c.methods.clone(),
        networks,
        policy: parse_policy(&c.policy),
    })
}

fn parse_subject(s: &str) -> SubjectPredicate {
    if let Some(g) = s.strip_prefix("group:") {
        SubjectPredicate::Group(g.to_string())
    } else if let Some(oc) = s.strip_prefix("oauth2_client:") {
        SubjectPredicate::OAuth2Client(oc.to_string())
    } else if let Some(u) = s.strip_prefix("user:") {
        SubjectPredicate::User(u.to_string())
    } else {
        SubjectPredicate::User(s.to_string())
    }
}
