//! Capability Router
//!
//! Picks which capability groups (named clusters of tables) are relevant to a
//! question. The router itself only returns the generator's text with line
//! breaks removed; [`CapabilityRouter::resolve_groups`] is the caller-side
//! check against the known groups.

use crate::error::Result;
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::{field_text, normalize};
use crate::prompts::ROUTER_SYSTEM_PROMPT;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGroup {
    pub name: String,
    pub description: String,
    pub tables: Vec<String>,
}

impl CapabilityGroup {
    pub fn new(name: &str, description: &str, tables: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        }
    }
}

pub fn default_capability_groups() -> Vec<CapabilityGroup> {
    vec![
        CapabilityGroup::new(
            "customer",
            "All details about customer and seller locations and their unique identifiers",
            &["customer", "sellers"],
        ),
        CapabilityGroup::new(
            "orders",
            "Everything about orders: product and order identifiers, products in an order, number of items per product, price, freight value, order time, delivery status and time, payments and reviews",
            &["order_items", "order_payments", "order_reviews", "orders"],
        ),
        CapabilityGroup::new(
            "product",
            "Product details: product identifier, category, description and dimensions",
            &["products", "category_translation"],
        ),
    ]
}

pub struct CapabilityRouter {
    generator: Arc<dyn TextGenerator>,
    groups: Vec<CapabilityGroup>,
}

impl CapabilityRouter {
    pub fn new(generator: Arc<dyn TextGenerator>, groups: Vec<CapabilityGroup>) -> Self {
        Self { generator, groups }
    }

    pub fn groups(&self) -> &[CapabilityGroup] {
        &self.groups
    }

    pub fn prompt(&self, question: &str) -> ChatPrompt {
        let descriptions = self
            .groups
            .iter()
            .map(|g| format!("{} agent : {}", g.name, g.description))
            .join("\n");
        ChatPrompt::new(
            ROUTER_SYSTEM_PROMPT,
            format!(
                "Below are descriptions of the available agents.\n{}\n\nUser question:\n{}",
                descriptions, question
            ),
        )
    }

    /// One generation call; returns the raw list text with line breaks removed.
    pub async fn route(&self, question: &str) -> Result<String> {
        let raw = self.generator.generate(&self.prompt(question)).await?;
        let routed = raw.replace(['\n', '\r'], "");
        debug!(response = %routed, "router response");
        Ok(routed)
    }

    /// Known groups named in the router output, in emitted order, deduplicated.
    pub fn resolve_groups(&self, routed: &str) -> Vec<&CapabilityGroup> {
        normalize(routed)
            .iter()
            .map(field_text)
            .unique()
            .filter_map(|name| {
                let found = self.groups.iter().find(|g| g.name.eq_ignore_ascii_case(&name));
                if found.is_none() {
                    warn!(group = %name, "router emitted an unknown capability group");
                }
                found
            })
            .collect()
    }
}

/// Tables covered by the given groups, first occurrence wins.
pub fn tables_for(groups: &[&CapabilityGroup]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|g| g.tables.iter().cloned())
        .unique()
        .collect()
}
