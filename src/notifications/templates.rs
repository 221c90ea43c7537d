use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Variables available to a template.
pub type TemplateVars = HashMap<String, String>;

pub const PURCHASE_ACKNOWLEDGEMENT: &str = "Hello {{name}}, your {{ticket_type}} ticket {{ticket_code}} for {{session}} on {{day}} is reserved. Confirm the payment of TZS {{amount}} on your phone to activate it.";

pub const PAYMENT_CONFIRMATION: &str = "Payment received. Ticket {{ticket_code}} ({{quantity}} x {{ticket_type}}) for {{session}} on {{day}} is now active. Show this code at the gate.";

pub const IMPORT_WELCOME: &str = "Hello {name}, your ticket {ticket_code} for {session} on {day} is confirmed ({quantity} x {ticket_type}, TZS {amount}). Show this code at the gate.";

pub const IMPORT_DUPLICATE: &str = "Hello {name}, ticket {ticket_code} for {session} on {day} has been added to your bookings.";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}|\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid")
    })
}

/// Substitutes `{{var}}` and `{var}` placeholders. Unknown placeholders are
/// left in place.
pub fn render_template(template: &str, vars: &TemplateVars) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_both_placeholder_styles() {
        let rendered = render_template(
            "Hi {{ name }}, code {code}.",
            &vars(&[("name", "Zawadi"), ("code", "TK123")]),
        );
        assert_eq!(rendered, "Hi Zawadi, code TK123.");
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        let rendered = render_template("Hi {{name}} {{missing}}", &vars(&[("name", "Zawadi")]));
        assert_eq!(rendered, "Hi Zawadi {{missing}}");
    }

    #[test]
    fn test_import_welcome_renders_fully() {
        let rendered = render_template(
            IMPORT_WELCOME,
            &vars(&[
                ("name", "Zawadi"),
                ("ticket_code", "IMP123456789"),
                ("session", "Evening"),
                ("day", "Day 1"),
                ("quantity", "2"),
                ("ticket_type", "ADULT"),
                ("amount", "20,000.00"),
            ]),
        );
        assert!(!rendered.contains('{'));
        assert!(rendered.contains("IMP123456789"));
    }
}
