//! Integration tests for killswitch evaluation.
//!
//! Tests verify:
//! - Version ranges select exactly one rule group
//! - Veto versus sanitize outcomes of check
//! - set / redact / delete ordering on one field
//! - check_multiple stops at the first veto and keeps earlier mutations
//! - Applying the same rules twice changes nothing the second time
//! - The shared active holder

use commlink::killswitch::{active, KillSwitchSet};
use commlink::ActiveKillSwitches;
use pretty_assertions::assert_eq;
use semver::Version;
use serde_json::{json, Value};
use std::sync::Arc;

fn v(raw: &str) -> Version {
    Version::parse(raw).unwrap()
}

fn sample_set() -> KillSwitchSet {
    KillSwitchSet::from_document(&json!({
        "version": 2,
        "last_updated": "2024-05-01",
        "kill_switches": [
            {
                "version": "<1.0.0",
                "kills": [{"match": "plugins.relay.send", "reason": "pre-release builds"}]
            },
            {
                "version": ">=1.0.0, <2.0.0",
                "kills": [
                    {"match": "plugins.relay.event.Location", "reason": "coordinates leak",
                     "redact_fields": ["StarPos"], "delete_fields": ["Factions.0"]},
                    {"match": "plugins.relay.event.*", "reason": "tag events",
                     "set_fields": {"tagged": true}},
                    {"match": "plugins.relay.event.Died", "reason": "broken schema"}
                ]
            },
            {
                "version": ">=1.5.0",
                "kills": [{"match": "plugins.relay.send", "reason": "never reached for 1.x"}]
            }
        ]
    }))
    .unwrap()
}

// ============================================================================
// VERSION MATCHING TESTS
// ============================================================================

#[test]
fn test_first_matching_range_wins() {
    let set = sample_set();

    assert!(set.is_disabled("plugins.relay.send", &v("0.9.0")));
    assert_eq!(set.get_reason("plugins.relay.send", &v("0.9.0")), "pre-release builds");

    // 1.6.0 matches both the second and third ranges; only the second applies
    assert!(!set.is_disabled("plugins.relay.send", &v("1.6.0")));
    assert!(set.is_disabled("plugins.relay.event.Died", &v("1.6.0")));

    assert!(set.is_disabled("plugins.relay.send", &v("2.0.0")));
    assert_eq!(set.kills_for_version(&v("0.9.0")).len(), 1);
}

#[test]
fn test_unmatched_feature_passes_untouched() {
    let set = sample_set();
    let mut data = json!({"event": "Docked"});
    assert!(!set.check("plugins.other", &mut data, &v("1.2.0")).unwrap());
    assert_eq!(data, json!({"event": "Docked"}));
}

// ============================================================================
// CHECK TESTS
// ============================================================================

#[test]
fn test_rule_without_fields_vetoes() {
    let set = sample_set();
    let mut data = json!({"event": "Died"});
    assert!(set.check("plugins.relay.event.Died", &mut data, &v("1.2.0")).unwrap());
    assert_eq!(data, json!({"event": "Died"}));
}

#[test]
fn test_rule_with_fields_sanitizes() {
    let set = sample_set();
    let mut data = json!({
        "event": "Location",
        "StarPos": [1.0, 2.0, 3.0],
        "Factions": [{"Name": "A"}, {"Name": "B"}],
    });

    let abort = set.check("plugins.relay.event.Location", &mut data, &v("1.2.0")).unwrap();
    assert!(!abort);
    assert_eq!(
        data,
        json!({
            "event": "Location",
            "StarPos": "REDACTED",
            "Factions": [{"Name": "B"}],
        })
    );
}

#[test]
fn test_wildcard_applies_when_no_exact_match() {
    let set = sample_set();
    let (abort, data) = set
        .check_owned("plugins.relay.event.Scan", json!({"event": "Scan"}), &v("1.2.0"))
        .unwrap();
    assert!(!abort);
    assert_eq!(data, json!({"event": "Scan", "tagged": true}));
}

#[test]
fn test_delete_beats_redact_beats_set() {
    let set = KillSwitchSet::from_document(&json!({
        "version": 2,
        "kill_switches": [{"version": "*", "kills": [
            {"match": "all", "reason": "r",
             "set_fields": {"a": 1, "b": 1, "c": 1},
             "redact_fields": ["b", "c"],
             "delete_fields": ["c"]}
        ]}]
    }))
    .unwrap();

    let mut data = json!({});
    assert!(!set.check("all", &mut data, &v("1.0.0")).unwrap());
    assert_eq!(data, json!({"a": 1, "b": "REDACTED"}));
}

#[test]
fn test_rules_are_idempotent() {
    let set = KillSwitchSet::from_document(&json!({
        "version": 2,
        "kill_switches": [{"version": "*", "kills": [
            {"match": "plugins.relay.event.Scan", "reason": "r",
             "set_fields": {"tagged": true},
             "redact_fields": ["secret"],
             "delete_fields": ["debug"]}
        ]}]
    }))
    .unwrap();

    let mut once = json!({"secret": "abc", "debug": {"trace": 1}, "keep": 2});
    set.check("plugins.relay.event.Scan", &mut once, &v("1.2.0")).unwrap();
    let mut twice = once.clone();
    set.check("plugins.relay.event.Scan", &mut twice, &v("1.2.0")).unwrap();

    assert_eq!(once, json!({"secret": "REDACTED", "keep": 2, "tagged": true}));
    assert_eq!(twice, once);
}

#[test]
fn test_bad_rule_is_an_error_and_data_is_kept() {
    let set = sample_set();
    let mut data = json!({"event": "Location", "Factions": "none"});
    assert!(set.check("plugins.relay.event.Location", &mut data, &v("1.2.0")).is_err());
    assert_eq!(data, json!({"event": "Location", "Factions": "none"}));
}

// ============================================================================
// CHECK MULTIPLE TESTS
// ============================================================================

#[test]
fn test_check_multiple_short_circuits_on_veto() {
    let set = sample_set();
    let mut data = json!({"event": "Died"});
    let features = [
        "plugins.relay.event.Scan",
        "plugins.relay.event.Died",
        "plugins.relay.event.Location",
    ];

    assert!(set.check_multiple(&mut data, &features, &v("1.2.0")).unwrap());
    // The wildcard rule before the veto already ran
    assert_eq!(data, json!({"event": "Died", "tagged": true}));
}

#[test]
fn test_check_multiple_applies_all_when_allowed() {
    let set = sample_set();
    let mut data = json!({"event": "Location", "StarPos": [0, 0, 0]});
    let features = vec![
        "plugins.relay.send".to_string(),
        "plugins.relay.event.Location".to_string(),
        "plugins.relay.event.Scan".to_string(),
    ];

    assert!(!set.check_multiple(&mut data, &features, &v("1.2.0")).unwrap());
    assert_eq!(data, json!({"event": "Location", "StarPos": "REDACTED", "tagged": true}));
}

#[test]
fn test_empty_set_allows_everything() {
    let set = KillSwitchSet::empty();
    let mut data: Value = json!({"x": 1});
    assert!(!set.check_multiple(&mut data, &["a", "b"], &Version::new(0, 0, 1)).unwrap());
    assert_eq!(data, json!({"x": 1}));
}

// ============================================================================
// ACTIVE SET TESTS
// ============================================================================

#[test]
fn test_snapshot_outlives_replacement() {
    let holder = ActiveKillSwitches::with_set(sample_set());
    let snapshot = holder.snapshot();
    holder.replace(KillSwitchSet::empty());

    assert!(snapshot.is_disabled("plugins.relay.event.Died", &v("1.2.0")));
    assert!(!holder.is_disabled("plugins.relay.event.Died", &v("1.2.0")));
}

#[test]
fn test_global_holder_is_shared() {
    let a = active();
    let b = active();
    assert!(Arc::ptr_eq(a, b));
}
