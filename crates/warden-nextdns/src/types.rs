//! Wire payloads for the NextDNS profile resources.

use serde::{Deserialize, Serialize};

/// `{"data": [...]}` envelope around list resources.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope {
    #[serde(default)]
    pub data: Vec<ListEntry>,
}

/// One denylist/allowlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// `{"data": {...}}` envelope around the parental-control resource.
#[derive(Debug, Deserialize)]
pub struct ParentalControlEnvelope {
    pub data: ParentalControl,
}

/// The parental-control subtree of a profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParentalControl {
    #[serde(default)]
    pub categories: Vec<PcEntry>,
    #[serde(default)]
    pub services: Vec<PcEntry>,
    #[serde(default, rename = "safeSearch")]
    pub safe_search: bool,
    #[serde(default, rename = "youtubeRestrictedMode")]
    pub youtube_restricted_mode: bool,
    #[serde(default, rename = "blockBypass")]
    pub block_bypass: bool,
}

/// A native category or service with its activation flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcEntry {
    pub id: String,
    #[serde(default)]
    pub active: bool,
}

/// Body of the global parental-control settings PATCH.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalFlags {
    #[serde(rename = "safeSearch")]
    pub safe_search: bool,
    #[serde(rename = "youtubeRestrictedMode")]
    pub youtube_restricted_mode: bool,
    #[serde(rename = "blockBypass")]
    pub block_bypass: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_envelope_parses() {
        let json = r#"{"data": [{"id": "example.com", "active": true}, {"id": "x.com"}]}"#;
        let envelope: ListEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.len(), 2);
        assert!(envelope.data[1].active);
    }

    #[test]
    fn test_parental_control_parses() {
        let json = r#"{"data": {
            "categories": [{"id": "gambling", "active": true}],
            "services": [{"id": "tiktok", "active": false}],
            "safeSearch": true,
            "blockBypass": false
        }}"#;
        let envelope: ParentalControlEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.categories[0].id, "gambling");
        assert!(!envelope.data.services[0].active);
        assert!(envelope.data.safe_search);
        assert!(!envelope.data.youtube_restricted_mode);
    }

    #[test]
    fn test_global_flags_serialize_camel_case() {
        let flags = GlobalFlags {
            safe_search: true,
            youtube_restricted_mode: false,
            block_bypass: true,
        };
        let json = serde_json::to_string(&flags).unwrap();
        assert!(json.contains("\"safeSearch\":true"));
        assert!(json.contains("\"youtubeRestrictedMode\":false"));
        assert!(json.contains("\"blockBypass\":true"));
    }
}
