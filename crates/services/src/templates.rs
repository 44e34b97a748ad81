//! Canned code proposals for common NPC behaviours.
//!
//! Templates are plain JavaScript snippets for the host game. Placeholders are
//! `{{npc_name}}` (display name), `{{class_name}}` (PascalCase) and
//! `{{var_name}}` (camelCase).

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static NON_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("identifier regex is valid"));

#[derive(Debug, Clone, Serialize)]
pub struct CodeTemplate {
    pub id: &'static str,
    pub summary: &'static str,
    pub language: &'static str,
    body: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeProposal {
    pub template: String,
    pub language: String,
    pub code: String,
}

const TEMPLATES: &[CodeTemplate] = &[
    CodeTemplate {
        id: "dialogue_tree",
        summary: "Branching conversation with conditional responses",
        language: "javascript",
        body: r#"const {{var_name}}Dialogue = {
  start: {
    text: "Well met, traveller. I am {{npc_name}}.",
    responses: [
      { text: "Who are you?", next: "about" },
      { text: "Any work?", next: "work", when: (player) => player.level >= 2 },
      { text: "Farewell.", next: null },
    ],
  },
  about: { text: "Just someone who keeps an eye on things.", responses: [{ text: "Back", next: "start" }] },
  work: { text: "Come back when you have cleared the cellar.", responses: [{ text: "Back", next: "start" }] },
};

function talkTo{{class_name}}(player, nodeId = "start") {
  const node = {{var_name}}Dialogue[nodeId];
  return {
    text: node.text,
    options: node.responses.filter((r) => !r.when || r.when(player)),
  };
}
"#,
    },
    CodeTemplate {
        id: "patrol_route",
        summary: "Waypoint patrol with wait times and interruption",
        language: "javascript",
        body: r#"class {{class_name}}Patrol {
  constructor(npc, waypoints, { loop = true } = {}) {
    this.npc = npc; // {{npc_name}}
    this.waypoints = waypoints; // [{ x, y, wait }]
    this.loop = loop;
    this.index = 0;
    this.waitLeft = 0;
    this.paused = false;
  }

  update(dt) {
    if (this.paused || this.waypoints.length === 0) return;
    if (this.waitLeft > 0) { this.waitLeft -= dt; return; }
    const target = this.waypoints[this.index];
    if (this.npc.moveTowards(target, dt)) {
      this.waitLeft = target.wait ?? 0;
      this.index = this.loop
        ? (this.index + 1) % this.waypoints.length
        : Math.min(this.index + 1, this.waypoints.length - 1);
    }
  }

  interrupt() { this.paused = true; }
  resume() { this.paused = false; }
}
"#,
    },
    CodeTemplate {
        id: "shopkeeper",
        summary: "Merchant inventory with buy/sell multipliers and restock",
        language: "javascript",
        body: r#"const {{var_name}}Shop = {
  owner: "{{npc_name}}",
  buyMultiplier: 0.5,
  sellMultiplier: 1.2,
  restockSeconds: 600,
  stock: [
    { item: "potion", price: 25, qty: 5 },
    { item: "rope", price: 8, qty: 3 },
  ],
};

function sellTo{{class_name}}Customer(player, itemId) {
  const entry = {{var_name}}Shop.stock.find((s) => s.item === itemId && s.qty > 0);
  if (!entry) return { ok: false, reason: "out of stock" };
  const price = Math.round(entry.price * {{var_name}}Shop.sellMultiplier);
  if (player.gold < price) return { ok: false, reason: "not enough gold" };
  player.gold -= price;
  entry.qty -= 1;
  player.inventory.push(itemId);
  return { ok: true, price };
}
"#,
    },
    CodeTemplate {
        id: "quest_giver",
        summary: "Quest offer, objective tracking and turn-in",
        language: "javascript",
        body: r#"const {{var_name}}Quest = {
  id: "{{var_name}}_first_task",
  giver: "{{npc_name}}",
  requires: (player) => player.level >= 1,
  objectives: [{ id: "collect_herbs", target: 5 }],
  reward: { gold: 50, xp: 120 },
};

function offer{{class_name}}Quest(player) {
  if (player.quests[{{var_name}}Quest.id] || !{{var_name}}Quest.requires(player)) return null;
  player.quests[{{var_name}}Quest.id] = { progress: {}, done: false };
  return {{var_name}}Quest;
}

function turnIn{{class_name}}Quest(player) {
  const state = player.quests[{{var_name}}Quest.id];
  const complete = state && {{var_name}}Quest.objectives.every((o) => (state.progress[o.id] ?? 0) >= o.target);
  if (!complete || state.done) return false;
  state.done = true;
  player.gold += {{var_name}}Quest.reward.gold;
  player.xp += {{var_name}}Quest.reward.xp;
  return true;
}
"#,
    },
    CodeTemplate {
        id: "state_machine",
        summary: "Finite state machine with enter/exit hooks",
        language: "javascript",
        body: r#"class {{class_name}}Brain {
  constructor(npc) {
    this.npc = npc; // {{npc_name}}
    this.state = "idle";
    this.states = {
      idle: { on: { seePlayer: "chase" } },
      chase: { on: { lostPlayer: "idle", lowHealth: "flee" }, enter: () => npc.say("Halt!") },
      flee: { on: { safe: "idle" }, enter: () => npc.emote("panic") },
    };
  }

  send(event) {
    const next = this.states[this.state].on[event];
    if (!next) return this.state;
    this.states[this.state].exit?.();
    this.state = next;
    this.states[next].enter?.();
    return next;
  }
}
"#,
    },
];

pub fn templates() -> &'static [CodeTemplate] {
    TEMPLATES
}

pub fn template_ids() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.id).collect()
}

/// PascalCase identifier from a display name; falls back to "Npc".
pub fn class_name(npc_name: &str) -> String {
    let ident: String = NON_IDENT_RE
        .split(npc_name)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    match ident.chars().next() {
        None => "Npc".to_string(),
        Some(c) if c.is_ascii_digit() => format!("Npc{}", ident),
        Some(_) => ident,
    }
}

/// Names also appear in `//` comments, so line breaks (including U+2028/U+2029)
/// collapse to spaces and other control characters are dropped.
fn single_line(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn var_name(class: &str) -> String {
    let mut chars = class.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn render(template_id: &str, npc_name: &str) -> Result<CodeProposal> {
    let template = TEMPLATES
        .iter()
        .find(|t| t.id == template_id)
        .ok_or_else(|| {
            anyhow!(
                "Unknown template '{}'. Available templates: {}",
                template_id,
                template_ids().join(", ")
            )
        })?;

    let display = single_line(npc_name);
    let display = if display.is_empty() { "the NPC" } else { display.as_str() };
    // Display names land inside JS string literals
    let display = display.replace('\\', "\\\\").replace('"', "\\\"");
    let class = class_name(&display);
    let var = var_name(&class);

    let code = template
        .body
        .replace("{{npc_name}}", &display)
        .replace("{{class_name}}", &class)
        .replace("{{var_name}}", &var);

    Ok(CodeProposal {
        template: template.id.to_string(),
        language: template.language.to_string(),
        code,
    })
}
