//! Aggregation rule language
//!
//! A rule line maps an input pattern to an output template with a method
//! and a bucket frequency. Rules are compiled to anchored regexes once at
//! load time and memoize their per-metric resolution, since the same
//! metric names arrive over and over.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use metro_protocol::MetricName;
use metro_routing::AggregateResolver;
use parking_lot::Mutex;
use regex::Regex;

use crate::{AggregateError, Result};

/// How bucket values collapse into one aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    /// Sum of all values
    Sum,
    /// Arithmetic mean
    Avg,
    /// Smallest value
    Min,
    /// Largest value
    Max,
}

impl AggregationMethod {
    /// Apply the method over a bucket's values
    ///
    /// Buckets are created on first input, so `values` is never empty.
    pub fn apply(&self, values: &[f64]) -> f64 {
        debug_assert!(!values.is_empty());
        match self {
            Self::Sum => values.iter().sum(),
            Self::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// The method's rule-file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl FromStr for AggregationMethod {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(()),
        }
    }
}

/// One compiled aggregation rule
pub struct AggregationRule {
    /// Output name template; `<name>` and `<<name>>` both substitute the
    /// matching capture
    pub output_template: String,

    /// Bucket width and compute period, in seconds
    pub frequency: u32,

    /// How bucket values collapse
    pub method: AggregationMethod,

    /// The input pattern as written, for diagnostics
    pub pattern_text: String,

    /// Compiled, fully anchored input matcher
    input_pattern: Regex,

    /// Memoized `metric -> resolved output name (or none)`
    ///
    /// Avoids re-matching the regex and re-substituting the template for
    /// every datapoint of an already-seen metric.
    cache: Mutex<HashMap<String, Option<MetricName>>>,
}

impl AggregationRule {
    /// Resolve the output name this rule produces for `metric`
    ///
    /// `None` when the metric does not match the input pattern. Memoized
    /// per metric for the lifetime of the rule.
    pub fn resolve(&self, metric: &MetricName) -> Option<MetricName> {
        if let Some(cached) = self.cache.lock().get(metric.as_str()) {
            return cached.clone();
        }

        let resolved = self.input_pattern.captures(metric.as_str()).map(|caps| {
            MetricName::new(substitute_template(&self.output_template, &caps))
        });

        self.cache
            .lock()
            .insert(metric.as_str().to_string(), resolved.clone());
        resolved
    }

    /// Drop all memoized resolutions
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

impl std::fmt::Debug for AggregationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationRule")
            .field("output_template", &self.output_template)
            .field("frequency", &self.frequency)
            .field("method", &self.method.as_str())
            .field("pattern", &self.pattern_text)
            .finish()
    }
}

/// Replace each placeholder with its capture
///
/// Both spellings substitute the same capture: `<name>` and `<<name>>`
/// are interchangeable in the output, mirroring the input grammar.
/// Placeholders were validated against the pattern's capture names at
/// parse time, so lookups cannot miss here.
fn substitute_template(template: &str, caps: &regex::Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];

        let (tail, closer) = match rest.strip_prefix("<<") {
            Some(tail) => (tail, ">>"),
            None => (&rest[1..], ">"),
        };
        match tail.find(closer) {
            Some(close) => {
                let name = &tail[..close];
                if let Some(value) = caps.name(name) {
                    out.push_str(value.as_str());
                }
                rest = &tail[close + closer.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Compile the input pattern language to an anchored regex
///
/// - `<<name>>` captures greedily across dot-delimited segments (`.+`)
/// - `<name>` captures a single segment (`[^.]+`)
/// - `*` matches a single segment without capturing
/// - everything else is literal
///
/// Anchoring with `^...$` guarantees full matches, so `*.hist.p99` never
/// matches a `.p999` metric.
fn compile_input_pattern(pattern: &str, line: usize) -> Result<(Regex, Vec<String>)> {
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("<<") {
            let close = tail
                .find(">>")
                .ok_or_else(|| AggregateError::InvalidRuleLine {
                    line,
                    message: format!("unclosed '<<' in pattern '{pattern}'"),
                })?;
            let name = &tail[..close];
            source.push_str(&format!("(?P<{name}>.+)"));
            names.push(name.to_string());
            rest = &tail[close + 2..];
        } else if let Some(tail) = rest.strip_prefix('<') {
            let close = tail
                .find('>')
                .ok_or_else(|| AggregateError::InvalidRuleLine {
                    line,
                    message: format!("unclosed '<' in pattern '{pattern}'"),
                })?;
            let name = &tail[..close];
            source.push_str(&format!("(?P<{name}>[^.]+)"));
            names.push(name.to_string());
            rest = &tail[close + 1..];
        } else if let Some(tail) = rest.strip_prefix('*') {
            source.push_str("[^.]+");
            rest = tail;
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            let mut escaped = String::new();
            escaped.push(ch);
            source.push_str(&regex::escape(&escaped));
            rest = &rest[ch.len_utf8()..];
        }
    }

    source.push('$');

    let regex =
        Regex::new(&source).map_err(|e| AggregateError::InvalidPattern { line, source: e })?;
    Ok((regex, names))
}

/// The placeholders a template references, in either spelling
fn template_placeholders(template: &str) -> Vec<&str> {
    let mut placeholders = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('<') {
        rest = &rest[open..];
        let (tail, closer) = match rest.strip_prefix("<<") {
            Some(tail) => (tail, ">>"),
            None => (&rest[1..], ">"),
        };
        match tail.find(closer) {
            Some(close) => {
                placeholders.push(&tail[..close]);
                rest = &tail[close + closer.len()..];
            }
            None => break,
        }
    }
    placeholders
}

/// Matches a rule line: `output (frequency) = method input`
fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^(?P<output>\S+)\s*\((?P<freq>\d+)\)\s*=\s*(?P<method>\S+)\s+(?P<input>\S+)$")
            .unwrap_or_else(|e| unreachable!("rule line regex is static: {e}"))
    })
}

/// An ordered, immutable set of aggregation rules
///
/// Reloads build a whole new set; live sets are never mutated.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Arc<AggregationRule>>,
}

impl RuleSet {
    /// Load a rule set from an aggregation-rules file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| AggregateError::RuleFileIo {
                path: path.display().to_string(),
                source: e,
            })?;
        Self::parse(&contents)
    }

    /// Parse a rule set from rule-file text
    pub fn parse(contents: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            rules.push(Arc::new(parse_rule_line(line, line_no)?));
        }

        Ok(Self { rules })
    }

    /// Number of rules in the set
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate the rules in file order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AggregationRule>> {
        self.rules.iter()
    }

    /// All `(rule, output name)` pairs matching a metric
    pub fn matches(&self, metric: &MetricName) -> Vec<(Arc<AggregationRule>, MetricName)> {
        self.rules
            .iter()
            .filter_map(|rule| rule.resolve(metric).map(|output| (Arc::clone(rule), output)))
            .collect()
    }
}

impl AggregateResolver for RuleSet {
    fn resolve_outputs(&self, metric: &MetricName) -> Vec<MetricName> {
        self.rules
            .iter()
            .filter_map(|rule| rule.resolve(metric))
            .collect()
    }
}

fn parse_rule_line(line: &str, line_no: usize) -> Result<AggregationRule> {
    let caps = line_regex()
        .captures(line)
        .ok_or_else(|| AggregateError::InvalidRuleLine {
            line: line_no,
            message: format!("expected 'output (frequency) = method input', got '{line}'"),
        })?;

    let output_template = caps["output"].to_string();
    let method_name = &caps["method"];
    let input = &caps["input"];

    let frequency: u32 =
        caps["freq"]
            .parse()
            .map_err(|_| AggregateError::InvalidRuleLine {
                line: line_no,
                message: format!("frequency '{}' is not a valid u32", &caps["freq"]),
            })?;
    if frequency == 0 {
        return Err(AggregateError::InvalidRuleLine {
            line: line_no,
            message: "frequency must be greater than zero".into(),
        });
    }

    let method =
        method_name
            .parse::<AggregationMethod>()
            .map_err(|()| AggregateError::UnknownMethod {
                method: method_name.to_string(),
                line: line_no,
            })?;

    let (input_pattern, capture_names) = compile_input_pattern(input, line_no)?;

    // Every output placeholder must be captured by the input pattern;
    // anything else would fail at compute time instead of load time.
    for placeholder in template_placeholders(&output_template) {
        if !capture_names.iter().any(|name| name == placeholder) {
            return Err(AggregateError::InvalidRuleLine {
                line: line_no,
                message: format!(
                    "output placeholder '<{placeholder}>' is not captured by '{input}'"
                ),
            });
        }
    }

    Ok(AggregationRule {
        output_template,
        frequency,
        method,
        pattern_text: input.to_string(),
        input_pattern,
        cache: Mutex::new(HashMap::new()),
    })
}
