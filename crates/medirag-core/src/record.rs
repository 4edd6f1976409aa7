//! Persisted record shape for a fragment.
//!
//! Every point written to the vector store carries the whole fragment in
//! its payload, including the text itself under `page_content`, so a single
//! lookup by id is enough to rebuild the [`Fragment`]:
//!
//! ```text
//! { source, page, kind, doc_id, parent_id?, cleaned, char_count, page_content }
//! ```
//!
//! `doc_id` is the fragment's own id and doubles as the point id.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Fragment, FragmentKind, SourceMetadata};
use crate::store::Payload;

/// Payload field holding the fragment kind; used to filter child searches.
pub const KIND_FIELD: &str = "kind";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub source: String,
    pub page: u32,
    pub kind: FragmentKind,
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub cleaned: bool,
    pub char_count: usize,
    pub page_content: String,
}

impl From<&Fragment> for FragmentRecord {
    fn from(f: &Fragment) -> Self {
        Self {
            source: f.metadata.source.clone(),
            page: f.metadata.page,
            kind: f.kind,
            doc_id: f.id.clone(),
            parent_id: f.parent_id.clone(),
            cleaned: f.metadata.cleaned,
            char_count: f.metadata.char_count,
            page_content: f.content.clone(),
        }
    }
}

impl From<FragmentRecord> for Fragment {
    fn from(r: FragmentRecord) -> Self {
        Self {
            id: r.doc_id,
            kind: r.kind,
            content: r.page_content,
            parent_id: r.parent_id,
            metadata: SourceMetadata {
                source: r.source,
                page: r.page,
                cleaned: r.cleaned,
                char_count: r.char_count,
            },
            relevance_score: None,
        }
    }
}

impl FragmentRecord {
    pub fn to_payload(&self) -> Result<Payload> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("fragment record serialized to non-object: {}", other),
        }
    }

    pub fn from_payload(payload: &Payload) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(payload.clone()))
            .context("payload is not a valid fragment record")
    }
}

/// Serialize a fragment into a store payload.
pub fn fragment_to_payload(fragment: &Fragment) -> Result<Payload> {
    FragmentRecord::from(fragment).to_payload()
}

/// Rebuild a fragment from a store payload.
pub fn fragment_from_payload(payload: &Payload) -> Result<Fragment> {
    Ok(FragmentRecord::from_payload(payload)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn child() -> Fragment {
        Fragment {
            id: "c-1".into(),
            kind: FragmentKind::Child,
            content: "Beta blockers reduce heart rate.".into(),
            parent_id: Some("p-1".into()),
            metadata: SourceMetadata {
                source: "cardio.pdf".into(),
                page: 4,
                cleaned: true,
                char_count: 1200,
            },
            relevance_score: Some(0.9),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = fragment_to_payload(&child()).unwrap();
        assert_eq!(payload["kind"], json!("child"));
        assert_eq!(payload["doc_id"], json!("c-1"));
        assert_eq!(payload["parent_id"], json!("p-1"));
        assert_eq!(payload["page"], json!(4));
        assert_eq!(payload["cleaned"], json!(true));
        assert_eq!(payload["char_count"], json!(1200));
        assert_eq!(payload["page_content"], json!("Beta blockers reduce heart rate."));
        assert_eq!(payload["source"], json!("cardio.pdf"));
        assert!(!payload.contains_key("relevance_score"));
    }

    #[test]
    fn test_parent_omits_parent_id() {
        let mut parent = child();
        parent.kind = FragmentKind::Parent;
        parent.parent_id = None;
        let payload = fragment_to_payload(&parent).unwrap();
        assert!(!payload.contains_key("parent_id"));
    }

    #[test]
    fn test_rebuild_drops_score() {
        let payload = fragment_to_payload(&child()).unwrap();
        let rebuilt = fragment_from_payload(&payload).unwrap();
        let mut expected = child();
        expected.relevance_score = None;
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let mut payload = Payload::new();
        payload.insert("kind".into(), json!("grandchild"));
        assert!(fragment_from_payload(&payload).is_err());
    }
}
