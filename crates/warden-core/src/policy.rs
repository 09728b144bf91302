//! Operator policy: parsing, validation, immutable per-tick snapshots.
//!
//! The policy file is read-only to the engine; operator commands
//! rewrite it atomically and the reconciler picks up the new snapshot
//! at the next tick boundary. A snapshot that fails validation is
//! rejected wholesale so the previous good state stays in force.

use crate::domain;
use crate::duration::Delay;
use crate::error::WardenError;
use crate::schedule::{resolve_zone, Schedule};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Recognized policy file versions.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["1", "2"];

/// Native parental-control categories NextDNS exposes.
pub const NATIVE_CATEGORIES: [&str; 7] = [
    "dating",
    "gambling",
    "gaming",
    "piracy",
    "porn",
    "social-networks",
    "video-streaming",
];

/// Native parental-control services NextDNS exposes.
pub const NATIVE_SERVICES: [&str; 41] = [
    "9gag",
    "amazon",
    "bereal",
    "blizzard",
    "chatgpt",
    "dailymotion",
    "discord",
    "disneyplus",
    "ebay",
    "facebook",
    "fortnite",
    "google-chat",
    "hbomax",
    "hulu",
    "imgur",
    "instagram",
    "leagueoflegends",
    "mastodon",
    "messenger",
    "minecraft",
    "netflix",
    "pinterest",
    "playstation-network",
    "primevideo",
    "reddit",
    "roblox",
    "signal",
    "skype",
    "snapchat",
    "spotify",
    "steam",
    "telegram",
    "tiktok",
    "tinder",
    "tumblr",
    "twitch",
    "twitter",
    "vimeo",
    "whatsapp",
    "youtube",
    "zoom",
];

/// A blocklist or allowlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unblock_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
}

/// An operator-defined domain group with one shared schedule and delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCategory {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unblock_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
}

/// A native category or service managed through parental control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unblock_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
}

/// Global parental-control switches pushed verbatim to the profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentalFlags {
    #[serde(default)]
    pub safe_search: bool,
    #[serde(default)]
    pub youtube_restricted_mode: bool,
    #[serde(default)]
    pub block_bypass: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NextdnsSection {
    #[serde(default)]
    pub categories: Vec<NativeEntry>,
    #[serde(default)]
    pub services: Vec<NativeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ParentalFlags>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionSection {
    #[serde(default = "default_unlock_delay_hours")]
    pub unlock_delay_hours: u32,
}

fn default_unlock_delay_hours() -> u32 {
    48
}

/// Minimum accepted `protection.unlock_delay_hours`.
pub const MIN_UNLOCK_DELAY_HOURS: u32 = 24;

/// The whole policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: String,
    pub settings: Settings,
    /// Opaque to the engine; delivery adapters own this block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<serde_json::Value>,
    #[serde(default)]
    pub blocklist: Vec<DomainEntry>,
    #[serde(default)]
    pub allowlist: Vec<DomainEntry>,
    #[serde(default)]
    pub categories: Vec<UserCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextdns: Option<NextdnsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionSection>,
}

/// A validated, immutable view of the policy for one tick.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub policy: Policy,
    pub zone: Tz,
    /// Non-fatal findings (subdomain overrides, overlaps).
    pub warnings: Vec<String>,
}

impl Policy {
    /// Parse and validate the policy file at `path`.
    pub fn load(path: &Path) -> Result<PolicySnapshot, WardenError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WardenError::Config(format!("cannot read policy file {}: {e}", path.display()))
        })?;
        let policy: Policy = serde_json::from_str(&raw)
            .map_err(|e| WardenError::Config(format!("invalid policy JSON: {e}")))?;
        policy.into_snapshot()
    }

    /// Validate and freeze into a snapshot.
    pub fn into_snapshot(self) -> Result<PolicySnapshot, WardenError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            errors.push(format!("unrecognized policy version '{}'", self.version));
        }

        let zone = match resolve_zone(&self.settings.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                errors.push(e.to_string());
                chrono_tz::UTC
            }
        };

        self.validate_lists(&mut errors, &mut warnings);
        self.validate_categories(&mut errors);
        self.validate_nextdns(&mut errors);

        if let Some(protection) = &self.protection {
            if protection.unlock_delay_hours < MIN_UNLOCK_DELAY_HOURS {
                errors.push(format!(
                    "protection.unlock_delay_hours must be >= {MIN_UNLOCK_DELAY_HOURS}"
                ));
            }
        }

        if !errors.is_empty() {
            return Err(WardenError::Config(format!(
                "policy validation failed: {}",
                errors.join("; ")
            )));
        }

        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        Ok(PolicySnapshot {
            policy: self,
            zone,
            warnings,
        })
    }

    fn validate_lists(&self, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        let mut deny_names = BTreeSet::new();
        for (idx, entry) in self.blocklist.iter().enumerate() {
            Self::validate_domain_entry(entry, &format!("blocklist #{idx}"), errors);
            deny_names.insert(domain::normalize(&entry.domain));
        }

        let mut allow_names = BTreeSet::new();
        for (idx, entry) in self.allowlist.iter().enumerate() {
            Self::validate_domain_entry(entry, &format!("allowlist #{idx}"), errors);
            allow_names.insert(domain::normalize(&entry.domain));
        }

        for dup in deny_names.intersection(&allow_names) {
            errors.push(format!(
                "domain '{dup}' appears in both blocklist and allowlist"
            ));
        }

        // A child in the allowlist under a blocked parent is legal and
        // worth surfacing.
        for allowed in &allow_names {
            for denied in &deny_names {
                if domain::is_subdomain(allowed, denied) {
                    warnings.push(format!(
                        "allowlist '{allowed}' overrides blocked parent '{denied}'"
                    ));
                }
            }
        }
    }

    fn validate_domain_entry(entry: &DomainEntry, prefix: &str, errors: &mut Vec<String>) {
        if !domain::validate_domain(&entry.domain) {
            errors.push(format!("{prefix}: invalid domain '{}'", entry.domain));
        }
        if let Some(delay) = &entry.unblock_delay {
            if let Err(e) = Delay::parse(delay) {
                errors.push(format!("'{}': {e}", entry.domain));
            }
        }
        if let Some(schedule) = &entry.schedule {
            errors.extend(schedule.validate(&format!("'{}'", entry.domain)));
        }
    }

    fn validate_categories(&self, errors: &mut Vec<String>) {
        let mut seen_ids = BTreeSet::new();
        let mut member_owner: BTreeMap<String, String> = BTreeMap::new();

        for cat in &self.categories {
            if !valid_category_id(&cat.id) {
                errors.push(format!("invalid category id '{}'", cat.id));
            }
            if !seen_ids.insert(cat.id.clone()) {
                errors.push(format!("duplicate category id '{}'", cat.id));
            }
            if let Some(delay) = &cat.unblock_delay {
                if let Err(e) = Delay::parse(delay) {
                    errors.push(format!("category '{}': {e}", cat.id));
                }
            }
            if let Some(schedule) = &cat.schedule {
                errors.extend(schedule.validate(&format!("category '{}'", cat.id)));
            }
            for member in &cat.domains {
                let name = domain::normalize(member);
                if !domain::validate_domain(&name) {
                    errors.push(format!("category '{}': invalid domain '{member}'", cat.id));
                }
                if let Some(owner) = member_owner.insert(name.clone(), cat.id.clone()) {
                    errors.push(format!(
                        "domain '{name}' belongs to both category '{owner}' and '{}'",
                        cat.id
                    ));
                }
            }
        }

        // Category members may not also sit on the top-level lists.
        let deny: BTreeSet<String> = self
            .blocklist
            .iter()
            .map(|e| domain::normalize(&e.domain))
            .collect();
        let allow: BTreeSet<String> = self
            .allowlist
            .iter()
            .map(|e| domain::normalize(&e.domain))
            .collect();
        for (member, owner) in &member_owner {
            if deny.contains(member) {
                errors.push(format!(
                    "domain '{member}' is in both the blocklist and category '{owner}'"
                ));
            }
            if allow.contains(member) {
                errors.push(format!(
                    "domain '{member}' is in both the allowlist and category '{owner}'"
                ));
            }
        }
    }

    fn validate_nextdns(&self, errors: &mut Vec<String>) {
        let Some(nextdns) = &self.nextdns else {
            return;
        };
        for cat in &nextdns.categories {
            if !NATIVE_CATEGORIES.contains(&cat.id.as_str()) {
                errors.push(format!("unknown native category '{}'", cat.id));
            }
            Self::validate_native_entry(cat, "category", errors);
        }
        for svc in &nextdns.services {
            if !NATIVE_SERVICES.contains(&svc.id.as_str()) {
                errors.push(format!("unknown native service '{}'", svc.id));
            }
            Self::validate_native_entry(svc, "service", errors);
        }
    }

    fn validate_native_entry(entry: &NativeEntry, kind: &str, errors: &mut Vec<String>) {
        if let Some(delay) = &entry.unblock_delay {
            if let Err(e) = Delay::parse(delay) {
                errors.push(format!("{kind} '{}': {e}", entry.id));
            }
        }
        if let Some(schedule) = &entry.schedule {
            errors.extend(schedule.validate(&format!("{kind} '{}'", entry.id)));
        }
    }
}

/// Category ids: lowercase letters/digits/hyphens, letter first, <= 50.
pub fn valid_category_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 50 {
        return false;
    }
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    id.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// An item is locked when flagged `locked` or delayed `never`.
pub fn is_locked(locked: bool, unblock_delay: Option<&str>) -> bool {
    locked || unblock_delay == Some("never")
}

impl PolicySnapshot {
    /// Look up the blocklist entry for a domain (exact match).
    pub fn blocklist_entry(&self, name: &str) -> Option<&DomainEntry> {
        let name = domain::normalize(name);
        self.policy
            .blocklist
            .iter()
            .find(|e| domain::normalize(&e.domain) == name)
    }

    /// Find the user category owning a member domain.
    pub fn category_of(&self, name: &str) -> Option<&UserCategory> {
        let name = domain::normalize(name);
        self.policy
            .categories
            .iter()
            .find(|c| c.domains.iter().any(|d| domain::normalize(d) == name))
    }

    /// The unblock delay governing a domain: its own entry first, then
    /// its category's. `None` when the domain is unmanaged.
    pub fn delay_for(&self, name: &str) -> Option<Delay> {
        if let Some(entry) = self.blocklist_entry(name) {
            let raw = entry.unblock_delay.as_deref().unwrap_or("0");
            return Delay::parse(raw).ok();
        }
        if let Some(cat) = self.category_of(name) {
            let raw = cat.unblock_delay.as_deref().unwrap_or("0");
            return Delay::parse(raw).ok();
        }
        None
    }

    /// Whether a domain is locked directly or through its category.
    pub fn domain_locked(&self, name: &str) -> bool {
        if let Some(entry) = self.blocklist_entry(name) {
            return is_locked(entry.locked, entry.unblock_delay.as_deref());
        }
        if let Some(cat) = self.category_of(name) {
            return is_locked(cat.locked, cat.unblock_delay.as_deref());
        }
        false
    }

    /// Locked native category/service ids.
    pub fn locked_native_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        if let Some(nextdns) = &self.policy.nextdns {
            for entry in nextdns.categories.iter().chain(nextdns.services.iter()) {
                if is_locked(entry.locked, entry.unblock_delay.as_deref()) {
                    ids.insert(entry.id.clone());
                }
            }
        }
        ids
    }

    pub fn unlock_delay_hours(&self) -> u32 {
        self.policy
            .protection
            .as_ref()
            .map(|p| p.unlock_delay_hours)
            .unwrap_or_else(default_unlock_delay_hours)
    }
}

/// Errors raised when a proposed policy edit weakens a locked item.
///
/// Checked when the engine itself rewrites the policy file (unlock
/// execution); operator-side editors run the same check before saving.
pub fn locked_transition_errors(old: &Policy, new: &Policy) -> Vec<String> {
    let mut errors = Vec::new();

    let old_native: Vec<(&str, &NativeEntry)> = native_entries(old);
    let new_native: BTreeMap<String, &NativeEntry> = native_entries(new)
        .into_iter()
        .map(|(_, e)| (e.id.clone(), e))
        .collect();

    for (kind, entry) in old_native {
        if !is_locked(entry.locked, entry.unblock_delay.as_deref()) {
            continue;
        }
        match new_native.get(&entry.id) {
            None => errors.push(format!(
                "cannot remove locked {kind} '{}'; request an unlock with the configured delay",
                entry.id
            )),
            Some(new_entry) => {
                if !is_locked(new_entry.locked, new_entry.unblock_delay.as_deref()) {
                    errors.push(format!(
                        "cannot weaken protection for locked {kind} '{}'",
                        entry.id
                    ));
                }
            }
        }
    }

    let new_deny: BTreeMap<String, &DomainEntry> = new
        .blocklist
        .iter()
        .map(|e| (domain::normalize(&e.domain), e))
        .collect();
    for entry in &old.blocklist {
        if !is_locked(entry.locked, entry.unblock_delay.as_deref()) {
            continue;
        }
        let name = domain::normalize(&entry.domain);
        match new_deny.get(&name) {
            None => errors.push(format!("cannot remove locked domain '{name}'")),
            Some(new_entry) => {
                if !is_locked(new_entry.locked, new_entry.unblock_delay.as_deref()) {
                    errors.push(format!("cannot weaken protection for locked domain '{name}'"));
                }
            }
        }
    }

    errors
}

fn native_entries(policy: &Policy) -> Vec<(&'static str, &NativeEntry)> {
    let mut entries = Vec::new();
    if let Some(nextdns) = &policy.nextdns {
        entries.extend(nextdns.categories.iter().map(|c| ("category", c)));
        entries.extend(nextdns.services.iter().map(|s| ("service", s)));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_policy(blocklist: Vec<DomainEntry>, allowlist: Vec<DomainEntry>) -> Policy {
        Policy {
            version: "2".to_string(),
            settings: Settings {
                timezone: "UTC".to_string(),
                editor: None,
            },
            notifications: None,
            blocklist,
            allowlist,
            categories: vec![],
            nextdns: None,
            protection: None,
        }
    }

    fn entry(domain: &str) -> DomainEntry {
        DomainEntry {
            domain: domain.to_string(),
            description: None,
            unblock_delay: None,
            schedule: None,
            locked: false,
        }
    }

    #[test]
    fn test_parse_full_policy() {
        let json = r#"{
            "version": "2",
            "settings": {"timezone": "America/New_York", "editor": "vim"},
            "blocklist": [
                {"domain": "reddit.com", "unblock_delay": "4h", "schedule": {
                    "available_hours": [
                        {"days": ["monday", "friday"],
                         "time_ranges": [{"start": "12:00", "end": "13:00"}]}
                    ]}}
            ],
            "allowlist": [{"domain": "aws.amazon.com"}],
            "categories": [
                {"id": "doomscroll", "domains": ["news.example.com"], "unblock_delay": "30m"}
            ],
            "nextdns": {
                "categories": [{"id": "gambling", "unblock_delay": "never"}],
                "services": [{"id": "tiktok", "locked": true}],
                "settings": {"safe_search": true, "block_bypass": true}
            },
            "protection": {"unlock_delay_hours": 48}
        }"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        let snapshot = policy.into_snapshot().unwrap();
        assert_eq!(snapshot.policy.blocklist.len(), 1);
        assert_eq!(snapshot.zone, chrono_tz::America::New_York);
        assert!(snapshot.domain_locked("news.example.com") == false);
        assert!(snapshot.locked_native_ids().contains("gambling"));
        assert!(snapshot.locked_native_ids().contains("tiktok"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut policy = minimal_policy(vec![], vec![]);
        policy.settings.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            policy.into_snapshot(),
            Err(WardenError::Config(_))
        ));
    }

    #[test]
    fn test_cross_list_duplicate_rejected() {
        let policy = minimal_policy(vec![entry("x.com")], vec![entry("x.com")]);
        let err = policy.into_snapshot().unwrap_err();
        assert!(err.to_string().contains("both blocklist and allowlist"));
    }

    #[test]
    fn test_subdomain_override_warns_not_errors() {
        let policy = minimal_policy(vec![entry("amazon.com")], vec![entry("aws.amazon.com")]);
        let snapshot = policy.into_snapshot().unwrap();
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.warnings[0].contains("aws.amazon.com"));
    }

    #[test]
    fn test_unknown_native_ids_rejected() {
        let mut policy = minimal_policy(vec![], vec![]);
        policy.nextdns = Some(NextdnsSection {
            categories: vec![NativeEntry {
                id: "knitting".into(),
                unblock_delay: None,
                schedule: None,
                locked: false,
            }],
            services: vec![],
            settings: None,
        });
        assert!(policy.into_snapshot().is_err());
    }

    #[test]
    fn test_duplicate_category_member_rejected() {
        let mut policy = minimal_policy(vec![], vec![]);
        policy.categories = vec![
            UserCategory {
                id: "news".into(),
                description: None,
                domains: vec!["a.example.com".into()],
                unblock_delay: None,
                schedule: None,
                locked: false,
            },
            UserCategory {
                id: "misc".into(),
                description: None,
                domains: vec!["a.example.com".into()],
                unblock_delay: None,
                schedule: None,
                locked: false,
            },
        ];
        assert!(policy.into_snapshot().is_err());
    }

    #[test]
    fn test_category_id_grammar() {
        assert!(valid_category_id("social-media"));
        assert!(valid_category_id("a2"));
        assert!(!valid_category_id("2fast"));
        assert!(!valid_category_id("Upper"));
        assert!(!valid_category_id(""));
        assert!(!valid_category_id(&"a".repeat(51)));
    }

    #[test]
    fn test_protection_minimum_delay() {
        let mut policy = minimal_policy(vec![], vec![]);
        policy.protection = Some(ProtectionSection {
            unlock_delay_hours: 12,
        });
        assert!(policy.into_snapshot().is_err());
    }

    #[test]
    fn test_locked_weakening_detected() {
        let mut old = minimal_policy(
            vec![DomainEntry {
                domain: "gambling.com".into(),
                description: None,
                unblock_delay: Some("never".into()),
                schedule: None,
                locked: false,
            }],
            vec![],
        );
        old.nextdns = Some(NextdnsSection {
            categories: vec![NativeEntry {
                id: "gambling".into(),
                unblock_delay: Some("never".into()),
                schedule: None,
                locked: false,
            }],
            services: vec![],
            settings: None,
        });

        let mut new = old.clone();
        new.blocklist[0].unblock_delay = Some("30m".into());
        new.nextdns = Some(NextdnsSection::default());

        let errors = locked_transition_errors(&old, &new);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("gambling.com")));
        assert!(errors.iter().any(|e| e.contains("remove locked category")));
    }

    #[test]
    fn test_delay_for_falls_back_to_category() {
        let mut policy = minimal_policy(vec![], vec![]);
        policy.categories = vec![UserCategory {
            id: "news".into(),
            description: None,
            domains: vec!["slow.example.com".into()],
            unblock_delay: Some("4h".into()),
            schedule: None,
            locked: false,
        }];
        let snapshot = policy.into_snapshot().unwrap();
        assert_eq!(
            snapshot.delay_for("slow.example.com").unwrap().as_seconds(),
            Some(14_400)
        );
        assert!(snapshot.delay_for("other.example.com").is_none());
    }
}
