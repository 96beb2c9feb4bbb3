use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::placeholders::scope_of;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Customer,
    Performer,
    Agreement,
    Other,
}

impl Entity {
    pub const ALL: [Entity; 4] = [
        Entity::Customer,
        Entity::Performer,
        Entity::Agreement,
        Entity::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Performer => "performer",
            Self::Agreement => "agreement",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "performer" => Ok(Self::Performer),
            "agreement" => Ok(Self::Agreement),
            "other" => Ok(Self::Other),
            other => Err(anyhow!(
                "unknown entity {other:?} (expected customer, performer, agreement or other)"
            )),
        }
    }
}

const CUSTOMER_KEYWORDS: &[&str] = &["customer", "client", "buyer"];
const PERFORMER_KEYWORDS: &[&str] = &["performer", "executor", "contractor", "seller", "provider"];
const AGREEMENT_KEYWORDS: &[&str] = &["agreement"];

/// One row of the classification table.
#[derive(Clone, Copy, Debug)]
pub struct EntityRule {
    pub entity: Entity,
    pub namespace: &'static str,
    pub keywords: &'static [&'static str],
    pub excluded: &'static [&'static [&'static str]],
}

impl EntityRule {
    fn excluded_hit(&self, lower: &str) -> bool {
        self.excluded
            .iter()
            .flat_map(|family| family.iter())
            .any(|kw| lower.contains(kw))
    }

    /// Scope equals the namespace and no conflicting keyword appears.
    pub fn matches_scope(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        scope_of(&lower).is_some_and(|scope| scope == self.namespace) && !self.excluded_hit(&lower)
    }

    /// Some family keyword appears anywhere and no conflicting keyword does.
    pub fn matches_keyword(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw)) && !self.excluded_hit(&lower)
    }
}

/// Evaluated top to bottom, all scope checks before any keyword check.
pub static ENTITY_RULES: &[EntityRule] = &[
    EntityRule {
        entity: Entity::Customer,
        namespace: "customer",
        keywords: CUSTOMER_KEYWORDS,
        excluded: &[PERFORMER_KEYWORDS],
    },
    EntityRule {
        entity: Entity::Performer,
        namespace: "performer",
        keywords: PERFORMER_KEYWORDS,
        excluded: &[CUSTOMER_KEYWORDS],
    },
    EntityRule {
        entity: Entity::Agreement,
        namespace: "agreement",
        keywords: AGREEMENT_KEYWORDS,
        excluded: &[CUSTOMER_KEYWORDS, PERFORMER_KEYWORDS],
    },
];

/// The single bucket a token belongs to.
pub fn entity_of(token: &str) -> Entity {
    entity_with(token, ENTITY_RULES)
}

pub fn entity_with(token: &str, rules: &[EntityRule]) -> Entity {
    rules
        .iter()
        .find(|r| r.matches_scope(token))
        .or_else(|| rules.iter().find(|r| r.matches_keyword(token)))
        .map_or(Entity::Other, |r| r.entity)
}

pub fn belongs_to(token: &str, entity: Entity) -> bool {
    entity_of(token) == entity
}

/// Tokens of `placeholders` that belong to `entity`, in input order.
pub fn classify(placeholders: &[String], entity: Entity) -> Vec<String> {
    placeholders
        .iter()
        .filter(|tok| belongs_to(tok, entity))
        .cloned()
        .collect()
}
