use serde::{Deserialize, Serialize};

/// Products the bakery knows how to branch on. Anything else is `Unlisted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    Pizza,
    Bun,
    Bread,
    Cake,
    Pastries,
    Eggs,
    Unlisted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlavorCategory {
    SweetBakery,
    Bread,
    Eggs,
    Pizza,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    Eggs,
    Standard,
}

impl ProductKind {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pizza" => Self::Pizza,
            "bun" | "buns" => Self::Bun,
            "bread" => Self::Bread,
            "cake" | "cakes" => Self::Cake,
            "pastries" | "pastry" => Self::Pastries,
            "eggs" | "egg" => Self::Eggs,
            _ => Self::Unlisted,
        }
    }

    pub fn size_category(&self) -> SizeCategory {
        match self {
            Self::Eggs => SizeCategory::Eggs,
            Self::Pizza | Self::Bun | Self::Bread | Self::Cake | Self::Pastries | Self::Unlisted => {
                SizeCategory::Standard
            }
        }
    }

    /// `None` means the product has no flavor choice at all.
    pub fn flavor_category(&self) -> Option<FlavorCategory> {
        match self {
            Self::Cake | Self::Pastries => Some(FlavorCategory::SweetBakery),
            Self::Bun | Self::Bread => Some(FlavorCategory::Bread),
            Self::Eggs => Some(FlavorCategory::Eggs),
            Self::Pizza => Some(FlavorCategory::Pizza),
            Self::Unlisted => None,
        }
    }
}

/// Named, ordered list of valid answers for a slot prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSet {
    pub name: String,
    pub choices: Vec<String>,
}

impl ChoiceSet {
    pub fn new(name: impl Into<String>, choices: &[&str]) -> Self {
        Self { name: name.into(), choices: choices.iter().map(|choice| choice.to_string()).collect() }
    }

    /// Case-insensitive lookup returning the canonical choice value.
    pub fn find(&self, candidate: &str) -> Option<&str> {
        find_choice(&self.choices, candidate)
    }
}

pub fn find_choice<'a>(choices: &'a [String], candidate: &str) -> Option<&'a str> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    choices.iter().find(|choice| choice.eq_ignore_ascii_case(candidate)).map(String::as_str)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceCatalog {
    pub products: ChoiceSet,
    pub quantities: ChoiceSet,
    pub standard_sizes: ChoiceSet,
    pub egg_sizes: ChoiceSet,
    pub sweet_bakery_flavors: ChoiceSet,
    pub bread_flavors: ChoiceSet,
    pub egg_flavors: ChoiceSet,
    pub pizza_flavors: ChoiceSet,
}

impl Default for ChoiceCatalog {
    fn default() -> Self {
        Self {
            products: ChoiceSet::new(
                "products",
                &["Pizza", "Bun", "Bread", "Cake", "Pastries", "Eggs"],
            ),
            quantities: ChoiceSet::new("quantities", &["1", "2", "3", "6", "12"]),
            standard_sizes: ChoiceSet::new("sizes.standard", &["small", "medium", "large"]),
            egg_sizes: ChoiceSet::new("sizes.eggs", &["Standard", "Choosen_Big"]),
            sweet_bakery_flavors: ChoiceSet::new(
                "flavors.sweet_bakery",
                &["Chocolate", "Vanilla", "Strawberry", "Butterscotch"],
            ),
            bread_flavors: ChoiceSet::new(
                "flavors.bread",
                &["Brown", "White", "Multigrain", "Garlic"],
            ),
            egg_flavors: ChoiceSet::new(
                "flavors.eggs",
                &["Brown_Shell", "White_Shell", "Free_Range", "Organic"],
            ),
            pizza_flavors: ChoiceSet::new(
                "flavors.pizza",
                &["Margherita", "Pepperoni", "Veggie", "Cheese"],
            ),
        }
    }
}

impl ChoiceCatalog {
    pub fn sizes_for(&self, product: ProductKind) -> &ChoiceSet {
        match product.size_category() {
            SizeCategory::Eggs => &self.egg_sizes,
            SizeCategory::Standard => &self.standard_sizes,
        }
    }

    pub fn flavors_for(&self, product: ProductKind) -> Option<&ChoiceSet> {
        product.flavor_category().map(|category| match category {
            FlavorCategory::SweetBakery => &self.sweet_bakery_flavors,
            FlavorCategory::Bread => &self.bread_flavors,
            FlavorCategory::Eggs => &self.egg_flavors,
            FlavorCategory::Pizza => &self.pizza_flavors,
        })
    }
}
