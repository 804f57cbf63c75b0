//! Product knowledge base: sled-backed playbook documents with a hot cache
//! and keyword relevance scoring.
//!
//! Lookups are deliberately cheap and local. A consultation attaches KB hits
//! to its action before dispatch, so a slow lookup here would stall coaching.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::shared::{round3, KbHit, KbLookup};

const KB_PREFIX: &str = "kb:";
/// Hits below this relevance are noise and never surface.
const RELEVANCE_FLOOR: f64 = 0.3;
const MAX_RESULTS: usize = 3;

/// One stored playbook document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
}

/// Sled-backed document store. The full (small) corpus is mirrored in a
/// DashMap so searches never touch disk.
pub struct KnowledgeBase {
    db: sled::Db,
    cache: Arc<DashMap<String, KbDocument>>,
}

impl KnowledgeBase {
    /// Opens the knowledge keyspace on the shared database, warming the cache
    /// and seeding the default playbook on first run.
    pub fn open(db: sled::Db) -> CoreResult<Self> {
        let kb = Self {
            db,
            cache: Arc::new(DashMap::new()),
        };

        for item in kb.db.scan_prefix(KB_PREFIX.as_bytes()) {
            let (_, value) = item?;
            match serde_json::from_slice::<KbDocument>(&value) {
                Ok(doc) => {
                    kb.cache.insert(doc.id.clone(), doc);
                }
                Err(e) => warn!(target: "maestro::kb", "Skipping unreadable KB record: {e}"),
            }
        }

        if kb.cache.is_empty() {
            kb.seed_default_knowledge()?;
            info!(target: "maestro::kb", "📚 Knowledge base seeded with {} documents", kb.cache.len());
        }

        Ok(kb)
    }

    /// Upserts a document and returns its id (12 hex chars derived from
    /// title + content, so re-adding the same text is idempotent).
    pub fn add_document(&self, title: &str, content: &str, category: &str) -> CoreResult<String> {
        let mut hasher = DefaultHasher::new();
        title.hash(&mut hasher);
        content.hash(&mut hasher);
        let id = format!("{:016x}", hasher.finish())[..12].to_string();

        let doc = KbDocument {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
        };
        self.insert(doc)?;
        Ok(id)
    }

    /// Scores every document against the query. Never fails outward: storage
    /// or scoring trouble comes back as `found: false` with `error` set.
    pub fn search(&self, query: &str) -> KbLookup {
        let mut hits: Vec<KbHit> = Vec::new();
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() >= 3)
            .map(str::to_string)
            .collect();

        if !terms.is_empty() {
            for doc in self.cache.iter() {
                let relevance = relevance(&terms, &doc);
                if relevance > RELEVANCE_FLOOR {
                    hits.push(KbHit {
                        content: doc.content.clone(),
                        title: doc.title.clone(),
                        category: doc.category.clone(),
                        relevance: round3(relevance),
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(MAX_RESULTS);

        KbLookup {
            query: query.to_string(),
            found: !hits.is_empty(),
            results: hits,
            error: None,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.cache.len()
    }

    fn insert(&self, doc: KbDocument) -> CoreResult<()> {
        let key = format!("{KB_PREFIX}{}", doc.id);
        self.db.insert(key.as_bytes(), serde_json::to_vec(&doc)?)?;
        self.cache.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn seed_default_knowledge(&self) -> CoreResult<()> {
        let defaults = [
            KbDocument {
                id: "refund_policy".to_string(),
                title: "Refund Policy".to_string(),
                content: "Full refunds available within 30 days of purchase. Partial refunds (50%) available 30-60 days. No refunds after 60 days except for defective products. Process: collect order number, verify purchase, initiate refund within 3-5 business days.".to_string(),
                category: "policy".to_string(),
            },
            KbDocument {
                id: "cancel_retention".to_string(),
                title: "Cancellation Retention Script".to_string(),
                content: "When customer wants to cancel: 1) Acknowledge their concern, 2) Ask 'Can I ask what's prompting you to cancel today?' 3) If price: offer 20% discount for 3 months 4) If features: schedule demo of features they're missing 5) If competitor: ask what they're looking for that we don't offer 6) Last resort: offer pause subscription for 1 month".to_string(),
                category: "script".to_string(),
            },
            KbDocument {
                id: "angry_customer".to_string(),
                title: "De-escalation Techniques".to_string(),
                content: "For angry customers: 1) Let them finish speaking completely 2) Validate: 'I completely understand why you're frustrated' 3) Apologize for experience (not for policy) 4) Focus on what you CAN do, not can't 5) Give them a choice between 2 options 6) Follow up within 24h. NEVER: argue, interrupt, say 'that's our policy', transfer without warning.".to_string(),
                category: "script".to_string(),
            },
            KbDocument {
                id: "pricing_objection".to_string(),
                title: "Handling Price Objections".to_string(),
                content: "Price objection scripts: 1) 'What would make this feel like good value to you?' 2) 'Let me show you the ROI our customers typically see...' 3) Offer annual billing (saves 20%) 4) Compare cost-per-day ('That's less than a coffee a day') 5) Highlight specific features they've mentioned needing. Discounts available: 10% for annual, 15% for referrals, 20% retention offer.".to_string(),
                category: "script".to_string(),
            },
            KbDocument {
                id: "tech_support_escalation".to_string(),
                title: "When to Escalate to Tier 2".to_string(),
                content: "Escalate to Tier 2 when: bug confirmed for 3+ users, data loss or corruption, security concerns, issue unresolved after 15 min, customer explicitly requests manager, account value > $500/month. Escalation phrase: 'I want to make sure you get the fastest resolution. Let me connect you with our specialist team who can resolve this immediately.'".to_string(),
                category: "policy".to_string(),
            },
        ];

        for doc in defaults {
            self.insert(doc)?;
        }
        Ok(())
    }
}

/// Keyword overlap: +1.0 per term found in the title, +0.6 in the content,
/// normalized by term count and capped at 1.0.
fn relevance(terms: &[String], doc: &KbDocument) -> f64 {
    let title = doc.title.to_lowercase();
    let content = doc.content.to_lowercase();
    let mut score = 0.0;
    for term in terms {
        if title.contains(term.as_str()) {
            score += 1.0;
        }
        if content.contains(term.as_str()) {
            score += 0.6;
        }
    }
    (score / terms.len() as f64).min(1.0)
}
