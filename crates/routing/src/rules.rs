//! Rule-based routing from a relay-rules file
//!
//! Rules are ordered sections, each matching metrics by regex (or `default`)
//! and naming destination addresses. Evaluation walks the file order: the
//! first matching rule yields its registered destinations, and evaluation
//! continues past it only when the rule sets `continue = true` - permitting
//! fan-out of one metric to multiple rule-sets.
//!
//! # File Format
//!
//! ```text
//! [collected]
//! pattern = ^collected\.
//! destinations = 10.0.0.1:2004:a, 10.0.0.2:2004:a
//! continue = true
//!
//! [default]
//! default = true
//! destinations = 10.0.0.9:2004
//! ```
//!
//! Exactly one `default` section is required; loading fails otherwise.
//! On-disk changes are picked up by an mtime check and swapped in
//! atomically - callers never observe a partial reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use metro_protocol::{Destination, MetricName};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio::task::JoinHandle;

use crate::{Result, Router, RoutingError};

/// How a rule decides whether a metric belongs to it
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// Metrics matching this regex
    Pattern(Regex),

    /// Every metric (the required fallback rule)
    Default,
}

impl RuleMatcher {
    /// Whether the metric belongs to this rule
    #[inline]
    pub fn matches(&self, metric: &MetricName) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(metric.as_str()),
            Self::Default => true,
        }
    }
}

/// One ordered routing rule from the relay-rules file
#[derive(Debug, Clone)]
pub struct RelayRule {
    /// Section name, for diagnostics
    pub name: String,

    /// Match condition
    pub matcher: RuleMatcher,

    /// Destinations this rule routes to
    pub destinations: Vec<Destination>,

    /// Keep evaluating subsequent rules after this one matches
    pub continue_matching: bool,
}

/// Router evaluating ordered relay rules in file order
pub struct RuleBasedRouter {
    /// Path to the relay-rules file, kept for reloads
    path: PathBuf,

    /// Current rule list, swapped whole on reload
    rules: RwLock<Vec<RelayRule>>,

    /// Destinations registered via the Router contract
    ///
    /// Rules may reference destinations that are not (yet or anymore)
    /// registered; resolution silently filters those out.
    registered: RwLock<HashMap<String, Destination>>,

    /// Mtime of the file as last loaded
    last_modified: Mutex<Option<SystemTime>>,
}

impl RuleBasedRouter {
    /// Load a rule-based router from a relay-rules file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, a section is malformed, a regex
    /// does not compile, or the file does not contain exactly one default
    /// rule.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = load_rules(&path)?;
        let mtime = file_mtime(&path);

        tracing::info!(
            path = %path.display(),
            rule_count = rules.len(),
            "relay rules loaded"
        );

        Ok(Self {
            path,
            rules: RwLock::new(rules),
            registered: RwLock::new(HashMap::new()),
            last_modified: Mutex::new(mtime),
        })
    }

    /// Build a router from an in-memory rule list (tests and embedding)
    pub fn from_rules(rules: Vec<RelayRule>) -> Self {
        Self {
            path: PathBuf::new(),
            rules: RwLock::new(rules),
            registered: RwLock::new(HashMap::new()),
            last_modified: Mutex::new(None),
        }
    }

    /// Number of loaded rules
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Re-read the rules file if its mtime changed since the last load
    ///
    /// The new rule list replaces the old one atomically; a failed reload
    /// leaves the previous rules in place (the caller decides how loudly to
    /// report it).
    ///
    /// Returns `true` if a reload happened.
    pub fn maybe_reload(&self) -> Result<bool> {
        let current = file_mtime(&self.path);

        {
            let last = self.last_modified.lock();
            if current == *last {
                return Ok(false);
            }
        }

        let rules = load_rules(&self.path)?;
        let rule_count = rules.len();

        *self.rules.write() = rules;
        *self.last_modified.lock() = current;

        tracing::info!(
            path = %self.path.display(),
            rule_count,
            "relay rules reloaded"
        );
        Ok(true)
    }
}

impl Router for RuleBasedRouter {
    fn add_destination(&self, destination: Destination) -> Result<()> {
        let key = destination.routing_key();
        let mut registered = self.registered.write();

        if registered.contains_key(&key) {
            return Err(RoutingError::DuplicateDestination { key });
        }

        registered.insert(key, destination);
        Ok(())
    }

    fn remove_destination(&self, destination: &Destination) -> Result<()> {
        let key = destination.routing_key();
        if self.registered.write().remove(&key).is_none() {
            return Err(RoutingError::UnknownDestination { key });
        }
        Ok(())
    }

    fn resolve(&self, metric: &MetricName) -> Vec<Destination> {
        let rules = self.rules.read();
        let registered = self.registered.read();

        let mut resolved: Vec<Destination> = Vec::new();

        for rule in rules.iter() {
            if !rule.matcher.matches(metric) {
                continue;
            }

            for destination in &rule.destinations {
                if let Some(known) = registered.get(&destination.routing_key()) {
                    if !resolved.contains(known) {
                        resolved.push(known.clone());
                    }
                }
            }

            if !rule.continue_matching {
                break;
            }
        }

        resolved
    }
}

impl std::fmt::Debug for RuleBasedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedRouter")
            .field("path", &self.path)
            .field("rule_count", &self.rule_count())
            .finish()
    }
}

/// Spawn the periodic mtime check for a rule-based router
///
/// Reload failures keep the previously loaded rules and log a warning; they
/// are never fatal to a running relay.
pub fn spawn_rules_reload(router: Arc<RuleBasedRouter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the file was just loaded.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = router.maybe_reload() {
                tracing::warn!(
                    error = %e,
                    "relay-rules reload failed, keeping previously loaded rules"
                );
            }
        }
    })
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Parse the relay-rules file into an ordered rule list
fn load_rules(path: &Path) -> Result<Vec<RelayRule>> {
    let contents = std::fs::read_to_string(path).map_err(|e| RoutingError::RuleFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_rules(&contents, &path.display().to_string())
}

/// One section under construction
#[derive(Debug, Default)]
struct Section {
    name: String,
    header_line: usize,
    pattern: Option<String>,
    is_default: bool,
    destinations: Option<String>,
    continue_matching: bool,
}

fn parse_rules(contents: &str, path: &str) -> Result<Vec<RelayRule>> {
    let mut sections: Vec<Section> = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push(Section {
                name: name.trim().to_string(),
                header_line: line_no,
                ..Section::default()
            });
            continue;
        }

        let section = sections
            .last_mut()
            .ok_or_else(|| RoutingError::InvalidRuleLine {
                line: line_no,
                message: "expected a [section] header before settings".into(),
            })?;

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| RoutingError::InvalidRuleLine {
                line: line_no,
                message: format!("expected 'key = value', got '{line}'"),
            })?;

        match (key.trim(), value.trim()) {
            ("pattern", pattern) => section.pattern = Some(pattern.to_string()),
            ("default", flag) => section.is_default = flag == "true",
            ("destinations", list) => section.destinations = Some(list.to_string()),
            ("continue", flag) => section.continue_matching = flag == "true",
            (other, _) => {
                return Err(RoutingError::InvalidRuleLine {
                    line: line_no,
                    message: format!("unknown setting '{other}'"),
                });
            }
        }
    }

    let default_count = sections.iter().filter(|s| s.is_default).count();
    if default_count != 1 {
        return Err(RoutingError::DefaultRuleCount {
            path: path.to_string(),
            found: default_count,
        });
    }

    sections.into_iter().map(build_rule).collect()
}

fn build_rule(section: Section) -> Result<RelayRule> {
    let matcher = match (&section.pattern, section.is_default) {
        (Some(_), true) | (None, false) => {
            return Err(RoutingError::InvalidRuleLine {
                line: section.header_line,
                message: format!(
                    "rule '{}' needs exactly one of 'pattern' or 'default = true'",
                    section.name
                ),
            });
        }
        (Some(pattern), false) => {
            RuleMatcher::Pattern(Regex::new(pattern).map_err(|e| RoutingError::InvalidPattern {
                rule: section.name.clone(),
                source: e,
            })?)
        }
        (None, true) => RuleMatcher::Default,
    };

    let list = section
        .destinations
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|addr| {
            addr.parse::<Destination>()
                .map_err(|e| RoutingError::InvalidRuleDestination {
                    rule: section.name.clone(),
                    source: e,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    if list.is_empty() {
        return Err(RoutingError::MissingDestinations { rule: section.name });
    }

    Ok(RelayRule {
        name: section.name,
        matcher,
        destinations: list,
        continue_matching: section.continue_matching,
    })
}

#[cfg(test)]
pub(crate) fn parse_rules_str(contents: &str) -> Result<Vec<RelayRule>> {
    parse_rules(contents, "<inline>")
}
