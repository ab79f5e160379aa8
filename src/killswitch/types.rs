//! Killswitch rule types.

use super::path::{delete_path, redact_path, set_path};
use crate::error::{KillswitchError, KillswitchResult};
use semver::{Prerelease, Version, VersionReq};
use serde_json::{Map, Value};
use std::fmt;

/// A semantic-version predicate such as `>=5.0.0, <5.6.0 || =5.7.1`.
///
/// Alternatives are separated by `||`; each is a [`semver::VersionReq`].
/// A bare version or `==` pins exactly instead of the caret default.
///
/// A prerelease build is compared as its release version unless the
/// alternative itself names a prerelease, so `>=1.0.0` covers `1.2.0-beta1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

fn normalize_comparator(comparator: &str) -> String {
    let comparator = comparator.trim();
    if let Some(rest) = comparator.strip_prefix("==") {
        format!("={}", rest.trim())
    } else if comparator.starts_with(|c: char| c.is_ascii_digit()) {
        format!("={}", comparator)
    } else {
        comparator.to_string()
    }
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let alternatives = raw
            .split("||")
            .map(|alt| {
                let normalized: Vec<String> = alt.split(',').map(normalize_comparator).collect();
                VersionReq::parse(&normalized.join(", "))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.trim().to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        let release = (!version.pre.is_empty()).then(|| Version {
            pre: Prerelease::EMPTY,
            ..version.clone()
        });

        self.alternatives.iter().any(|req| match &release {
            Some(release) if !req.comparators.iter().any(|c| !c.pre.is_empty()) => {
                req.matches(release)
            }
            _ => req.matches(version),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One rule: the feature it matches, why, and how to sanitize instead of veto.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SingleKill {
    /// Dotted feature pattern; a `*` segment matches any single segment
    pub pattern: String,
    pub reason: String,
    pub set_fields: Map<String, Value>,
    pub redact_fields: Vec<String>,
    pub delete_fields: Vec<String>,
}

impl SingleKill {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Whether this rule sanitizes rather than vetoes.
    pub fn has_rules(&self) -> bool {
        !self.set_fields.is_empty() || !self.redact_fields.is_empty() || !self.delete_fields.is_empty()
    }

    /// Apply set, then redact, then delete, in place.
    ///
    /// Later operations win on the same field. On error `target` may be
    /// partially modified; [`KillSwitchSet::check`] applies to a copy.
    pub fn apply_rules(&self, target: &mut Value) -> KillswitchResult<()> {
        let rule_err = |source| KillswitchError::Rule {
            pattern: self.pattern.clone(),
            source,
        };

        for (path, value) in &self.set_fields {
            set_path(target, path, value.clone()).map_err(rule_err)?;
        }
        for path in &self.redact_fields {
            redact_path(target, path).map_err(rule_err)?;
        }
        for path in &self.delete_fields {
            delete_path(target, path).map_err(rule_err)?;
        }
        Ok(())
    }

    /// Whether `feature_id` is matched by this rule's pattern.
    pub fn matches(&self, feature_id: &str) -> bool {
        pattern_matches(&self.pattern, feature_id)
    }

    fn is_wildcard(&self) -> bool {
        self.pattern.split('.').any(|segment| segment == "*")
    }
}

/// Segment-wise match where `*` stands for exactly one segment.
pub fn pattern_matches(pattern: &str, feature_id: &str) -> bool {
    let mut pattern_segments = pattern.split('.');
    let mut id_segments = feature_id.split('.');
    loop {
        match (pattern_segments.next(), id_segments.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

/// The rules that apply to one version range.
#[derive(Debug, Clone, PartialEq)]
pub struct KillSwitches {
    pub version: VersionRange,
    pub kills: Vec<SingleKill>,
}

impl KillSwitches {
    pub fn new(version: VersionRange) -> Self {
        Self {
            version,
            kills: Vec::new(),
        }
    }

    /// Add a rule; a rule with the same pattern is replaced in place.
    pub fn insert(&mut self, kill: SingleKill) {
        match self.kills.iter_mut().find(|k| k.pattern == kill.pattern) {
            Some(existing) => *existing = kill,
            None => self.kills.push(kill),
        }
    }

    /// Exact pattern first, then wildcard patterns in document order.
    pub fn find(&self, feature_id: &str) -> Option<&SingleKill> {
        self.kills
            .iter()
            .find(|k| k.pattern == feature_id)
            .or_else(|| {
                self.kills
                    .iter()
                    .find(|k| k.is_wildcard() && k.matches(feature_id))
            })
    }
}

/// Result of looking a feature up against the active version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disabled<'a> {
    pub disabled: bool,
    pub kill: Option<&'a SingleKill>,
}

impl<'a> Disabled<'a> {
    pub fn reason(&self) -> &'a str {
        self.kill.map(|k| k.reason.as_str()).unwrap_or("")
    }

    pub fn has_kill(&self) -> bool {
        self.kill.is_some()
    }

    pub fn has_rules(&self) -> bool {
        self.kill.map(SingleKill::has_rules).unwrap_or(false)
    }
}

/// Every version range from one killswitch document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KillSwitchSet {
    /// Schema the document was written in (before any upgrade)
    pub schema_version: u64,
    pub last_updated: Option<String>,
    pub switches: Vec<KillSwitches>,
}

impl KillSwitchSet {
    pub fn new(switches: Vec<KillSwitches>) -> Self {
        Self {
            schema_version: super::document::SCHEMA_VERSION,
            last_updated: None,
            switches,
        }
    }

    /// A set that disables nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Total rules across every version range.
    pub fn rule_count(&self) -> usize {
        self.switches.iter().map(|s| s.kills.len()).sum()
    }

    /// First version range that matches `version`. Ranges are never merged.
    pub fn for_version(&self, version: &Version) -> Option<&KillSwitches> {
        self.switches.iter().find(|s| s.version.matches(version))
    }

    /// Rules that apply to `version`.
    pub fn kills_for_version(&self, version: &Version) -> &[SingleKill] {
        self.for_version(version)
            .map(|s| s.kills.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_disabled(&self, feature_id: &str, version: &Version) -> Disabled<'_> {
        let kill = self.for_version(version).and_then(|s| s.find(feature_id));
        Disabled {
            disabled: kill.is_some(),
            kill,
        }
    }

    pub fn is_disabled(&self, feature_id: &str, version: &Version) -> bool {
        self.get_disabled(feature_id, version).disabled
    }

    pub fn get_reason(&self, feature_id: &str, version: &Version) -> &str {
        self.get_disabled(feature_id, version).reason()
    }

    /// Check one feature against `data`.
    ///
    /// Returns `true` if the caller must not proceed. When the matching rule
    /// sanitizes instead, `data` is replaced by the sanitized copy and `false`
    /// is returned. A rule that does not fit `data` is an error and leaves
    /// `data` untouched.
    pub fn check(&self, feature_id: &str, data: &mut Value, version: &Version) -> KillswitchResult<bool> {
        let result = self.get_disabled(feature_id, version);
        let Some(kill) = result.kill else {
            return Ok(false);
        };

        log::info!("Killswitch {} is active: {}", feature_id, kill.reason);
        if !kill.has_rules() {
            log::info!("No rules for {}, stopping processing", feature_id);
            return Ok(true);
        }

        let mut working = data.clone();
        kill.apply_rules(&mut working)?;
        *data = working;

        log::info!("Rules for {} applied, allowing execution to continue", feature_id);
        Ok(false)
    }

    /// [`Self::check`] with owned data, returning `(should_abort, data)`.
    pub fn check_owned(
        &self,
        feature_id: &str,
        mut data: Value,
        version: &Version,
    ) -> KillswitchResult<(bool, Value)> {
        let abort = self.check(feature_id, &mut data, version)?;
        Ok((abort, data))
    }

    /// Check several features in order, stopping at the first veto.
    ///
    /// Mutations from features checked before the veto are kept.
    pub fn check_multiple<S: AsRef<str>>(
        &self,
        data: &mut Value,
        feature_ids: &[S],
        version: &Version,
    ) -> KillswitchResult<bool> {
        for feature_id in feature_ids {
            if self.check(feature_id.as_ref(), data, version)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    #[test]
    fn test_version_range_alternatives() {
        let range = VersionRange::parse(">=5.0.0, <5.1.0 || ==5.2.3").unwrap();
        assert!(range.matches(&v("5.0.4")));
        assert!(range.matches(&v("5.2.3")));
        assert!(!range.matches(&v("5.1.0")));
        assert!(!range.matches(&v("5.2.4")));
        assert_eq!(range.to_string(), ">=5.0.0, <5.1.0 || ==5.2.3");
        assert!(VersionRange::parse("not a range").is_err());

        let pinned = VersionRange::parse("5.2.3").unwrap();
        assert!(pinned.matches(&v("5.2.3")));
        assert!(!pinned.matches(&v("5.3.0")));
    }

    #[test]
    fn test_prerelease_builds_match_as_their_release() {
        let range = VersionRange::parse(">=1.0.0").unwrap();
        assert!(range.matches(&v("1.2.0")));
        assert!(range.matches(&v("1.2.0-beta1")));
        assert!(!range.matches(&v("0.9.0-rc1")));

        let everything = VersionRange::parse("*").unwrap();
        assert!(everything.matches(&v("3.0.0-alpha")));

        // 1.0.0-beta counts as 1.0.0, which is outside <1.0.0
        let before = VersionRange::parse("<1.0.0").unwrap();
        assert!(!before.matches(&v("1.0.0-beta")));

        // A range that names a prerelease keeps semver's own rules
        let beta_only = VersionRange::parse(">=2.0.0-beta.2, <2.0.0").unwrap();
        assert!(beta_only.matches(&v("2.0.0-beta.3")));
        assert!(!beta_only.matches(&v("2.0.0-beta.1")));
        assert!(!beta_only.matches(&v("2.0.0")));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("plugins.relay.event.*", "plugins.relay.event.Docked"));
        assert!(pattern_matches("plugins.*.send", "plugins.relay.send"));
        assert!(!pattern_matches("plugins.relay.event.*", "plugins.relay.event"));
        assert!(!pattern_matches("plugins.relay.event.*", "plugins.relay.event.Docked.extra"));
        assert!(!pattern_matches("plugins.relay.send", "plugins.relay.sent"));
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let mut switches = KillSwitches::new(VersionRange::parse("*").unwrap());
        switches.insert(SingleKill::new("event.*", "all events"));
        switches.insert(SingleKill::new("event.Docked", "docked only"));

        assert_eq!(switches.find("event.Docked").unwrap().reason, "docked only");
        assert_eq!(switches.find("event.Undocked").unwrap().reason, "all events");
        assert!(switches.find("other").is_none());
    }

    #[test]
    fn test_duplicate_pattern_replaces() {
        let mut switches = KillSwitches::new(VersionRange::parse("*").unwrap());
        switches.insert(SingleKill::new("a", "first"));
        switches.insert(SingleKill::new("a", "second"));
        assert_eq!(switches.kills.len(), 1);
        assert_eq!(switches.kills[0].reason, "second");
    }

    #[test]
    fn test_apply_rules_precedence() {
        let mut kill = SingleKill::new("x", "test");
        kill.set_fields.insert("a".to_string(), json!(1));
        kill.redact_fields.push("a".to_string());
        kill.delete_fields.push("a".to_string());

        let mut data = json!({});
        kill.apply_rules(&mut data).unwrap();
        assert_eq!(data, json!({}));

        let mut redact_wins = SingleKill::new("x", "test");
        redact_wins.set_fields.insert("a".to_string(), json!(1));
        redact_wins.redact_fields.push("a".to_string());
        let mut data = json!({});
        redact_wins.apply_rules(&mut data).unwrap();
        assert_eq!(data, json!({"a": "REDACTED"}));
    }

    #[test]
    fn test_failed_rule_leaves_data_untouched() {
        let mut kill = SingleKill::new("feature", "bad rule");
        kill.set_fields.insert("ok".to_string(), json!(true));
        kill.delete_fields.push("list.name".to_string());

        let mut switches = KillSwitches::new(VersionRange::parse("*").unwrap());
        switches.insert(kill);
        let set = KillSwitchSet::new(vec![switches]);

        let mut data = json!({"list": [1, 2]});
        let err = set.check("feature", &mut data, &v("1.0.0")).unwrap_err();
        assert!(matches!(err, KillswitchError::Rule { ref pattern, .. } if pattern == "feature"));
        assert_eq!(data, json!({"list": [1, 2]}));
    }
}
