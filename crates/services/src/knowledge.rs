//! Keyword search over a small built-in corpus of NPC design notes.
//!
//! Documents live in the key-value store under `doc:<id>` so the search works
//! the same whether the store is in memory or on disk.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use strsim::jaro_winkler;
use tracing::debug;

use crate::storage::{KeyValueStore, StoreExt};

pub const DOC_PREFIX: &str = "doc:";

/// Keyword near-misses ("pathfind" vs "pathfinding") still count above this similarity.
const FUZZY_THRESHOLD: f64 = 0.92;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("word regex is valid"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "how", "what", "does", "can", "should", "into", "from", "that",
    "this", "make", "npc", "npcs", "game", "about", "are", "you", "your", "have", "when", "why",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocMatch {
    pub doc: KnowledgeDoc,
    pub score: u32,
    pub matched_terms: Vec<String>,
}

fn doc(id: &str, title: &str, keywords: &[&str], body: &str) -> KnowledgeDoc {
    KnowledgeDoc {
        id: id.to_string(),
        title: title.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        body: body.to_string(),
    }
}

/// The built-in corpus.
pub fn seed_documents() -> Vec<KnowledgeDoc> {
    vec![
        doc(
            "dialogue-trees",
            "Dialogue trees",
            &["dialogue", "conversation", "branching", "choices", "talk"],
            "Model conversations as nodes holding a line of text and a list of player \
             responses. Each response points to the next node or ends the conversation. \
             Keep conditions (quest state, reputation) on the response, not the node, so \
             the same line can be reused.",
        ),
        doc(
            "patrol-routes",
            "Patrol routes and waypoints",
            &["patrol", "waypoints", "guard", "route", "movement"],
            "Store a patrol as an ordered list of waypoints with an optional wait time at \
             each. Loop or ping-pong through the list. Interrupt the patrol when the guard \
             notices the player and resume from the nearest waypoint afterwards.",
        ),
        doc(
            "state-machines",
            "Finite state machines for behaviour",
            &["state", "fsm", "behaviour", "behavior", "transitions", "ai"],
            "A finite state machine gives each NPC one active state (idle, patrol, chase, \
             flee) and explicit transitions triggered by perception events. Enter and exit \
             hooks keep animation and sound changes in one place.",
        ),
        doc(
            "behavior-trees",
            "Behaviour trees",
            &["behavior", "behaviour", "tree", "selector", "sequence", "ai"],
            "Behaviour trees compose small tasks with selector and sequence nodes. \
             Re-evaluate from the root each tick so higher priority branches (fleeing at \
             low health) pre-empt lower ones (wandering).",
        ),
        doc(
            "pathfinding",
            "Pathfinding basics",
            &["pathfinding", "astar", "navmesh", "navigation", "grid"],
            "Use A* over a grid or navigation mesh. Cache paths for static targets, \
             re-plan only when the target moves past a threshold, and smooth the result so \
             NPCs do not zig-zag between cells.",
        ),
        doc(
            "shopkeepers",
            "Shopkeepers and trading",
            &["shop", "shopkeeper", "merchant", "trade", "inventory", "prices"],
            "A merchant needs an inventory, buy and sell price multipliers and a restock \
             timer. Let reputation adjust prices and lock rare items behind quest flags.",
        ),
        doc(
            "quest-givers",
            "Quest givers",
            &["quest", "quests", "objective", "reward", "giver"],
            "Quest givers offer a quest when its prerequisites are met, track objectives \
             per player and hand out the reward on turn-in. Show a marker above the NPC \
             while a quest is available or ready to complete.",
        ),
        doc(
            "barks",
            "Ambient barks",
            &["barks", "ambient", "lines", "voice", "chatter"],
            "Barks are short one-off lines triggered by events (spotting the player, \
             taking damage). Rate-limit them per NPC and pick randomly from a pool to avoid \
             repetition.",
        ),
        doc(
            "memory-relationships",
            "NPC memory and relationships",
            &["memory", "relationship", "reputation", "affinity", "remember"],
            "Track a small affinity score per NPC and a list of remembered events. Decay \
             old memories over time and let dialogue options read the current affinity.",
        ),
    ]
}

/// Lower-cased search terms with stop words and short tokens removed.
pub fn tokenize(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for m in WORD_RE.find_iter(&lower) {
        let word = m.as_str();
        if word.len() < 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

fn score_doc(doc: &KnowledgeDoc, terms: &[String]) -> Option<DocMatch> {
    let title = doc.title.to_lowercase();
    let body = doc.body.to_lowercase();
    let keywords: Vec<String> = doc.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut score = 0;
    let mut matched_terms = Vec::new();
    for term in terms {
        let mut hit = false;
        if keywords
            .iter()
            .any(|k| k == term || jaro_winkler(k, term) >= FUZZY_THRESHOLD)
        {
            score += 3;
            hit = true;
        }
        if title.contains(term.as_str()) {
            score += 2;
            hit = true;
        }
        if body.contains(term.as_str()) {
            score += 1;
            hit = true;
        }
        if hit {
            matched_terms.push(term.clone());
        }
    }

    if score == 0 {
        return None;
    }
    Some(DocMatch {
        doc: doc.clone(),
        score,
        matched_terms,
    })
}

pub struct KnowledgeBase {
    store: Arc<dyn KeyValueStore>,
}

impl KnowledgeBase {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write the built-in corpus into the store, overwriting older copies.
    pub fn seed(&self) -> Result<usize> {
        let docs = seed_documents();
        for d in &docs {
            self.store.set_as(&format!("{}{}", DOC_PREFIX, d.id), d)?;
        }
        debug!(count = docs.len(), "seeded knowledge base");
        Ok(docs.len())
    }

    pub fn documents(&self) -> Result<Vec<KnowledgeDoc>> {
        let mut docs = Vec::new();
        for key in self.store.keys_with_prefix(DOC_PREFIX)? {
            if let Some(d) = self.store.get_as::<KnowledgeDoc>(&key)? {
                docs.push(d);
            }
        }
        Ok(docs)
    }

    /// Documents matching any query term, best first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<DocMatch>> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<DocMatch> = self
            .documents()?
            .iter()
            .filter_map(|d| score_doc(d, &terms))
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.doc.id.cmp(&b.doc.id)));
        matches.truncate(limit);
        debug!(query, terms = ?terms, hits = matches.len(), "knowledge search");
        Ok(matches)
    }
}

/// Plain-text rendering handed back to the model.
pub fn format_matches(query: &str, matches: &[DocMatch]) -> String {
    if matches.is_empty() {
        return format!("No documents matched \"{}\".", query);
    }
    let mut out = format!("Found {} document(s) for \"{}\":\n", matches.len(), query);
    for (i, m) in matches.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} [{}]\n{}\n",
            i + 1,
            m.doc.title,
            m.doc.id,
            m.doc.body
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn seeded() -> KnowledgeBase {
        let kb = KnowledgeBase::new(Arc::new(MemoryStore::new()));
        kb.seed().unwrap();
        kb
    }

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("How should my NPC guard a patrol route?"),
            vec!["guard", "patrol", "route"]
        );
        assert!(tokenize("how do I?").is_empty());
    }

    #[test]
    fn test_search_ranks_keyword_hits_first() {
        let kb = seeded();
        let results = kb.search("guard patrol", 5).unwrap();
        assert_eq!(results[0].doc.id, "patrol-routes");
        assert!(results[0].matched_terms.contains(&"patrol".to_string()));
    }

    #[test]
    fn test_search_fuzzy_keyword() {
        let kb = seeded();
        let results = kb.search("merchants", 3).unwrap();
        assert_eq!(results[0].doc.id, "shopkeepers");
    }

    #[test]
    fn test_search_limits_and_empty_query() {
        let kb = seeded();
        assert_eq!(kb.search("behavior ai", 1).unwrap().len(), 1);
        assert!(kb.search("the and", 5).unwrap().is_empty());
        assert!(kb.search("spaceship", 5).unwrap().is_empty());
    }

    #[test]
    fn test_seed_is_idempotent() {
        let kb = seeded();
        let first = kb.documents().unwrap().len();
        kb.seed().unwrap();
        assert_eq!(kb.documents().unwrap().len(), first);
    }

    #[test]
    fn test_format_matches() {
        assert!(format_matches("xyz", &[]).contains("No documents"));
        let kb = seeded();
        let text = format_matches("quest", &kb.search("quest", 2).unwrap());
        assert!(text.contains("Quest givers"));
    }
}
