//! Placeholder substitution for per-customer message copy.
//!
//! Templates use `{{token}}` syntax. Only the tokens listed in
//! [`PERSONALIZATION_TOKENS`] are substituted; anything else is left as is.

use crate::types::{Customer, Product};
use std::collections::BTreeMap;

pub const PERSONALIZATION_TOKENS: [&str; 5] = [
    "first_name",
    "last_name",
    "full_name",
    "product_name",
    "customer_email",
];

/// Values substituted into a template for one customer.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    values: BTreeMap<&'static str, String>,
}

impl TemplateVariables {
    pub fn for_customer(customer: &Customer, product: Option<&Product>) -> Self {
        let mut values = BTreeMap::new();
        values.insert("first_name", customer.first_name.clone());
        values.insert("last_name", customer.last_name.clone());
        values.insert("full_name", customer.full_name());
        values.insert(
            "product_name",
            product.map(|p| p.name.clone()).unwrap_or_default(),
        );
        values.insert("customer_email", customer.email.clone());
        Self { values }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }
}

/// Substitute every known `{{token}}` in `template`.
pub fn personalize(template: &str, variables: &TemplateVariables) -> String {
    let mut rendered = template.to_string();
    for token in PERSONALIZATION_TOKENS {
        if let Some(value) = variables.get(token) {
            rendered = rendered.replace(&format!("{{{{{token}}}}}"), value);
        }
    }
    rendered
}
