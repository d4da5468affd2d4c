//! Template variable resolution.
//!
//! Steps may only reference variables from this allow-list; each variable
//! has a dedicated lookup against the customer directory, order history or
//! the instance context captured at trigger time.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use pulse_core::collaborators::{CustomerDirectory, OrderHistory};

/// The fixed allow-list of step template variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateVariable {
    FirstName,
    CartItems,
    CartTotal,
    LastOrderDate,
    PersonalizedProducts,
    DiscountCode,
}

impl TemplateVariable {
    pub fn key(&self) -> &'static str {
        match self {
            TemplateVariable::FirstName => "first_name",
            TemplateVariable::CartItems => "cart_items",
            TemplateVariable::CartTotal => "cart_total",
            TemplateVariable::LastOrderDate => "last_order_date",
            TemplateVariable::PersonalizedProducts => "personalized_products",
            TemplateVariable::DiscountCode => "discount_code",
        }
    }
}

/// Resolves each requested variable to its display string.
pub fn resolve_variables(
    variables: &[TemplateVariable],
    customer_id: &str,
    context: &HashMap<String, serde_json::Value>,
    orders: &Arc<dyn OrderHistory>,
    directory: &Arc<dyn CustomerDirectory>,
) -> HashMap<&'static str, String> {
    let mut resolved = HashMap::new();
    for variable in variables {
        let value = match variable {
            TemplateVariable::FirstName => directory
                .profile(customer_id)
                .map(|p| p.first_name)
                .unwrap_or_else(|| "there".to_string()),
            TemplateVariable::CartItems => context
                .get("cart_items")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default(),
            TemplateVariable::CartTotal => {
                let amount = context
                    .get("cart_value")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                format!("${:.2}", amount)
            }
            TemplateVariable::LastOrderDate => orders
                .orders_for(customer_id)
                .last()
                .map(|o| o.placed_at.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "never".to_string()),
            TemplateVariable::PersonalizedProducts => context
                .get("viewed_products")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .take(3)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "our new arrivals".to_string()),
            TemplateVariable::DiscountCode => generate_discount_code(),
        };
        resolved.insert(variable.key(), value);
    }
    resolved
}

/// Substitutes `{{key}}` placeholders. Unknown placeholders are left
/// untouched so broken templates surface visibly in test sends.
pub fn render(template: &str, variables: &HashMap<&'static str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in variables {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

fn generate_discount_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("SAVE-{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pulse_core::collaborators::{InMemoryDirectory, InMemoryOrderHistory};
    use pulse_core::types::{CustomerProfile, Order};
    use uuid::Uuid;

    fn fixtures() -> (Arc<dyn OrderHistory>, Arc<dyn CustomerDirectory>) {
        let orders = InMemoryOrderHistory::new();
        orders.record_order(Order {
            id: Uuid::new_v4(),
            customer_id: "c1".into(),
            amount: 75.0,
            placed_at: Utc::now() - Duration::days(3),
        });
        let directory = InMemoryDirectory::new();
        directory.upsert(CustomerProfile {
            customer_id: "c1".into(),
            first_name: "Ada".into(),
            email: Some("ada@example.com".into()),
            phone: None,
            subscribed: true,
        });
        (Arc::new(orders), Arc::new(directory))
    }

    #[test]
    fn test_resolution_from_each_source() {
        let (orders, directory) = fixtures();
        let mut context = HashMap::new();
        context.insert(
            "cart_items".to_string(),
            serde_json::json!(["Blue Mug", "Red Mug"]),
        );
        context.insert("cart_value".to_string(), serde_json::json!(34.5));

        let resolved = resolve_variables(
            &[
                TemplateVariable::FirstName,
                TemplateVariable::CartItems,
                TemplateVariable::CartTotal,
                TemplateVariable::LastOrderDate,
            ],
            "c1",
            &context,
            &orders,
            &directory,
        );

        assert_eq!(resolved["first_name"], "Ada");
        assert_eq!(resolved["cart_items"], "Blue Mug, Red Mug");
        assert_eq!(resolved["cart_total"], "$34.50");
        assert_ne!(resolved["last_order_date"], "never");
    }

    #[test]
    fn test_unknown_customer_falls_back() {
        let (orders, directory) = fixtures();
        let resolved = resolve_variables(
            &[TemplateVariable::FirstName, TemplateVariable::LastOrderDate],
            "nobody",
            &HashMap::new(),
            &orders,
            &directory,
        );
        assert_eq!(resolved["first_name"], "there");
        assert_eq!(resolved["last_order_date"], "never");
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let mut variables = HashMap::new();
        variables.insert("first_name", "Ada".to_string());
        variables.insert("cart_total", "$10.00".to_string());

        let body = render(
            "Hi {{first_name}}, your cart is worth {{cart_total}}. {{unknown}}",
            &variables,
        );
        assert_eq!(body, "Hi Ada, your cart is worth $10.00. {{unknown}}");
    }

    #[test]
    fn test_discount_code_shape() {
        let code = generate_discount_code();
        assert!(code.starts_with("SAVE-"));
        assert_eq!(code.len(), 11);
    }
}
