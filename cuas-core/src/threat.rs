//! Defended-asset store and rule set consulted by the Threat Assessor.
//! Static-ish configuration: add/remove/clear for both collections, plus
//! per-rule enable/disable without removal.

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::model::{GeoPosition, TrackClassification};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefendedAsset {
    pub id: String,
    pub name: String,
    pub position: GeoPosition,
    pub critical_radius_m: f64,
    pub warning_radius_m: f64,
    pub priority_level: i32,
}

impl DefendedAsset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: GeoPosition) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            critical_radius_m: 500.0,
            warning_radius_m: 1500.0,
            priority_level: 1,
        }
    }
}

/// Declarative predicate + action. Sentinel `-1` on any `min_`/`max_`
/// field means "unused" -- the predicate is not evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,

    pub min_proximity_m: f64,
    pub max_proximity_m: f64,
    pub min_velocity_mps: f64,
    pub max_velocity_mps: f64,
    pub min_heading_to_asset_deg: f64,
    pub max_heading_to_asset_deg: f64,
    pub requires_visual_confirmation: bool,
    /// Opposite polarity from `requires_visual_confirmation`: matches only
    /// when the track has *not* been visually confirmed.
    pub requires_no_visual_confirmation: bool,
    pub requires_rf_detection: bool,

    pub threat_level_increase: i32,
    /// `< 0` means "unused, use `threat_level_increase`".
    pub set_threat_level: i32,
    pub force_classification: TrackClassification,
    pub generate_alert: bool,
    pub alert_message: String,
}

impl ThreatRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            min_proximity_m: -1.0,
            max_proximity_m: -1.0,
            min_velocity_mps: -1.0,
            max_velocity_mps: -1.0,
            min_heading_to_asset_deg: -1.0,
            max_heading_to_asset_deg: -1.0,
            requires_visual_confirmation: false,
            requires_no_visual_confirmation: false,
            requires_rf_detection: false,
            threat_level_increase: 0,
            set_threat_level: -1,
            force_classification: TrackClassification::Unknown,
            generate_alert: false,
            alert_message: String::new(),
        }
    }
}

/// Evaluation context for a single track's rule pass, computed once per
/// track per assessment cycle rather than per rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    pub proximity_m: f64,
    pub velocity_mps: f64,
    pub heading_to_asset_deg: Option<f64>,
    pub has_rf: bool,
    pub has_visual: bool,
}

impl ThreatRule {
    /// Whether every predicate on this rule is satisfied by `ctx`.
    pub fn matches(&self, ctx: &RuleContext) -> bool {
        if self.min_proximity_m >= 0.0 && ctx.proximity_m < self.min_proximity_m {
            return false;
        }
        if self.max_proximity_m >= 0.0 && ctx.proximity_m > self.max_proximity_m {
            return false;
        }
        if self.min_velocity_mps >= 0.0 && ctx.velocity_mps < self.min_velocity_mps {
            return false;
        }
        if self.max_velocity_mps >= 0.0 && ctx.velocity_mps > self.max_velocity_mps {
            return false;
        }
        if self.min_heading_to_asset_deg >= 0.0 {
            match ctx.heading_to_asset_deg {
                Some(h) if h >= self.min_heading_to_asset_deg && h <= self.max_heading_to_asset_deg => {}
                _ => return false,
            }
        }
        if self.requires_rf_detection && !ctx.has_rf {
            return false;
        }
        if self.requires_visual_confirmation && !ctx.has_visual {
            return false;
        }
        if self.requires_no_visual_confirmation && ctx.has_visual {
            return false;
        }
        true
    }
}

/// Append-only, FIFO-capped alert record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAlert {
    pub alert_id: String,
    pub track_id: String,
    pub message: String,
    pub threat_level_at_emit: i32,
    pub timestamp_ms: i64,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_time_ms: Option<i64>,
}

/// Owns defended assets and rules; the Threat Assessor holds one of
/// these. CRUD mirrors the teacher's zone-registry shape: a flat `Vec`,
/// linear scan by id (these collections are small and read far more
/// often than they are mutated).
#[derive(Debug, Default)]
pub struct AssetAndRuleStore {
    assets: Vec<DefendedAsset>,
    rules: Vec<ThreatRule>,
}

impl AssetAndRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&mut self, asset: DefendedAsset) {
        self.assets.push(asset);
    }

    pub fn remove_asset(&mut self, id: &str) {
        self.assets.retain(|a| a.id != id);
    }

    pub fn clear_assets(&mut self) {
        self.assets.clear();
    }

    pub fn assets(&self) -> &[DefendedAsset] {
        &self.assets
    }

    /// Nearest asset to `pos` and the 3-D geodetic distance to it, or
    /// `None` when there are no defended assets.
    pub fn nearest_asset(&self, pos: &GeoPosition) -> Option<(&DefendedAsset, f64)> {
        self.assets
            .iter()
            .map(|a| (a, geo::haversine(&a.position, pos)))
            .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
    }

    pub fn add_rule(&mut self, rule: ThreatRule) {
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, id: &str) {
        self.rules.retain(|r| r.id != id);
    }

    pub fn set_rule_enabled(&mut self, id: &str, enabled: bool) {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id == id) {
            rule.enabled = enabled;
        }
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Rules in declaration order -- the order in which they are
    /// evaluated, and therefore the order in which a later
    /// `set_threat_level`/`force_classification` wins over an earlier
    /// one.
    pub fn rules(&self) -> &[ThreatRule] {
        &self.rules
    }

    pub fn load_default_rules(&mut self) {
        self.rules.clear();

        let mut critical = ThreatRule::new("RULE-001", "Critical Proximity");
        critical.description = "Track within critical radius of defended asset".into();
        critical.max_proximity_m = 500.0;
        critical.set_threat_level = 5;
        critical.force_classification = TrackClassification::Hostile;
        critical.generate_alert = true;
        critical.alert_message = "CRITICAL: Track %TRACK% within critical radius!".into();
        self.rules.push(critical);

        let mut warning = ThreatRule::new("RULE-002", "Warning Proximity");
        warning.description = "Track within warning radius".into();
        warning.min_proximity_m = 500.0;
        warning.max_proximity_m = 1500.0;
        warning.threat_level_increase = 2;
        warning.generate_alert = true;
        warning.alert_message = "WARNING: Track %TRACK% approaching defended area".into();
        self.rules.push(warning);

        let mut high_velocity = ThreatRule::new("RULE-003", "High Velocity Approach");
        high_velocity.description = "Fast moving track heading toward asset".into();
        high_velocity.min_velocity_mps = 20.0;
        high_velocity.min_heading_to_asset_deg = 0.0;
        high_velocity.max_heading_to_asset_deg = 30.0;
        high_velocity.threat_level_increase = 1;
        self.rules.push(high_velocity);

        let mut rf_confirmed = ThreatRule::new("RULE-004", "RF Confirmed");
        rf_confirmed.description = "Track confirmed by RF detection".into();
        rf_confirmed.requires_rf_detection = true;
        rf_confirmed.threat_level_increase = 1;
        rf_confirmed.force_classification = TrackClassification::Hostile;
        self.rules.push(rf_confirmed);

        let mut visual_unconfirmed = ThreatRule::new("RULE-005", "Unconfirmed Visual");
        visual_unconfirmed.description = "High threat without visual confirmation".into();
        visual_unconfirmed.min_proximity_m = 0.0;
        visual_unconfirmed.max_proximity_m = 2000.0;
        visual_unconfirmed.requires_no_visual_confirmation = true;
        visual_unconfirmed.generate_alert = true;
        visual_unconfirmed.alert_message = "Track %TRACK% requires visual confirmation".into();
        self.rules.push(visual_unconfirmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_asset_picks_closest() {
        let mut store = AssetAndRuleStore::new();
        store.add_asset(DefendedAsset::new("A1", "near", GeoPosition::new(34.0, -118.0, 0.0)));
        store.add_asset(DefendedAsset::new("A2", "far", GeoPosition::new(35.0, -119.0, 0.0)));

        let (nearest, _) = store.nearest_asset(&GeoPosition::new(34.001, -118.001, 0.0)).unwrap();
        assert_eq!(nearest.id, "A1");
    }

    #[test]
    fn nearest_asset_none_when_empty() {
        let store = AssetAndRuleStore::new();
        assert!(store.nearest_asset(&GeoPosition::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn default_rule_set_has_five_rules_in_order() {
        let mut store = AssetAndRuleStore::new();
        store.load_default_rules();
        let ids: Vec<_> = store.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["RULE-001", "RULE-002", "RULE-003", "RULE-004", "RULE-005"]);
    }

    #[test]
    fn disabling_a_rule_keeps_it_in_the_set() {
        let mut store = AssetAndRuleStore::new();
        store.load_default_rules();
        store.set_rule_enabled("RULE-001", false);
        assert_eq!(store.rules().len(), 5);
        assert!(!store.rules()[0].enabled);
    }

    #[test]
    fn rule_with_sentinel_predicates_matches_anything() {
        let rule = ThreatRule::new("R", "any");
        let ctx = RuleContext {
            proximity_m: 999_999.0,
            velocity_mps: 0.0,
            heading_to_asset_deg: None,
            has_rf: false,
            has_visual: false,
        };
        assert!(rule.matches(&ctx));
    }

    #[test]
    fn unconfirmed_visual_rule_fires_only_without_visual_confirmation() {
        let mut store = AssetAndRuleStore::new();
        store.load_default_rules();
        let rule = store.rules().iter().find(|r| r.id == "RULE-005").unwrap();

        let unconfirmed = RuleContext {
            proximity_m: 1000.0,
            velocity_mps: 0.0,
            heading_to_asset_deg: None,
            has_rf: false,
            has_visual: false,
        };
        assert!(rule.matches(&unconfirmed));

        let confirmed = RuleContext { has_visual: true, ..unconfirmed };
        assert!(!rule.matches(&confirmed));
    }
}
