use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder stored in a slot that does not apply to the ordered product.
pub const NOT_APPLICABLE: &str = "NA";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Product,
    Quantity,
    Size,
    Flavor,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Product, Slot::Quantity, Slot::Size, Slot::Flavor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Quantity => "quantity",
            Self::Size => "size",
            Self::Flavor => "flavor",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-progress order collected by the slot-filling flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: Slot, value: impl Into<String>) -> Self {
        self.set(slot, value);
        self
    }

    /// Returns the slot value, treating blank strings as unset.
    pub fn get(&self, slot: Slot) -> Option<&str> {
        let value = match slot {
            Slot::Product => &self.product,
            Slot::Quantity => &self.quantity,
            Slot::Size => &self.size,
            Slot::Flavor => &self.flavor,
        };
        value.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, slot: Slot, value: impl Into<String>) {
        let value = Some(value.into());
        match slot {
            Slot::Product => self.product = value,
            Slot::Quantity => self.quantity = value,
            Slot::Size => self.size = value,
            Slot::Flavor => self.flavor = value,
        }
    }

    pub fn is_filled(&self, slot: Slot) -> bool {
        self.get(slot).is_some()
    }

    pub fn missing_slots(&self) -> Vec<Slot> {
        Slot::ALL.into_iter().filter(|slot| !self.is_filled(*slot)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_slots().is_empty()
    }

    /// Human readable order line, e.g. `2 units of Brown flavored small size Bread`.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} units of", self.get(Slot::Quantity).unwrap_or("?"))];
        if let Some(flavor) = self.get(Slot::Flavor).filter(|value| *value != NOT_APPLICABLE) {
            parts.push(format!("{flavor} flavored"));
        }
        if let Some(size) = self.get(Slot::Size).filter(|value| *value != NOT_APPLICABLE) {
            parts.push(format!("{size} size"));
        }
        parts.push(self.get(Slot::Product).unwrap_or("?").to_string());
        parts.join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A confirmed order handed over for fulfilment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub id: OrderId,
    pub conversation_id: String,
    pub draft: OrderDraft,
    pub placed_at: DateTime<Utc>,
}

impl PlacedOrder {
    pub fn new(conversation_id: impl Into<String>, draft: OrderDraft) -> Self {
        Self {
            id: OrderId::generate(),
            conversation_id: conversation_id.into(),
            draft,
            placed_at: Utc::now(),
        }
    }

    /// Order named after the flow that collected it. Confirming the same flow
    /// again yields the same id.
    pub fn for_flow(conversation_id: impl Into<String>, flow_id: &str, draft: OrderDraft) -> Self {
        let conversation_id = conversation_id.into();
        let id = if flow_id.trim().is_empty() {
            OrderId::generate()
        } else {
            OrderId(format!("{conversation_id}/{flow_id}"))
        };
        Self { id, conversation_id, draft, placed_at: Utc::now() }
    }
}
