//! Monitored targets and their availability predicates.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker the storefront renders when the add-to-cart button is disabled.
pub const DISABLED_ADD_TO_CART: &str = r#"id="AddToCart-product-template" disabled="disabled""#;

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
    #[error("Predicate failed: {0}")]
    Failed(String),
}

/// Answers "is this in stock" for a fetched page body.
pub trait Predicate: Send + Sync {
    fn evaluate(&self, content: &str) -> Result<bool, PredicateError>;
}

impl<F> Predicate for F
where
    F: Fn(&str) -> Result<bool, PredicateError> + Send + Sync,
{
    fn evaluate(&self, content: &str) -> Result<bool, PredicateError> {
        self(content)
    }
}

/// Declarative predicate as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateSpec {
    /// Available when the body contains `text`.
    Contains { text: String },
    /// Available when the body does not contain `text`.
    Absent { text: String },
    /// Available when the regex matches somewhere in the body.
    Matches { pattern: String },
    /// Available when the regex matches nowhere in the body.
    NotMatches { pattern: String },
}

impl Default for PredicateSpec {
    fn default() -> Self {
        Self::Absent {
            text: DISABLED_ADD_TO_CART.to_string(),
        }
    }
}

impl PredicateSpec {
    pub fn compile(&self) -> Result<CompiledPredicate, PredicateError> {
        Ok(match self {
            Self::Contains { text } => CompiledPredicate::Contains(text.clone()),
            Self::Absent { text } => CompiledPredicate::Absent(text.clone()),
            Self::Matches { pattern } => CompiledPredicate::Matches(compile_regex(pattern)?),
            Self::NotMatches { pattern } => CompiledPredicate::NotMatches(compile_regex(pattern)?),
        })
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, PredicateError> {
    Regex::new(pattern).map_err(|e| PredicateError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    Contains(String),
    Absent(String),
    Matches(Regex),
    NotMatches(Regex),
}

impl Predicate for CompiledPredicate {
    fn evaluate(&self, content: &str) -> Result<bool, PredicateError> {
        Ok(match self {
            Self::Contains(text) => content.contains(text.as_str()),
            Self::Absent(text) => !content.contains(text.as_str()),
            Self::Matches(re) => re.is_match(content),
            Self::NotMatches(re) => !re.is_match(content),
        })
    }
}

/// One monitored product page.
#[derive(Clone)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub alert_label: Option<String>,
    pub predicate: Arc<dyn Predicate>,
}

impl Target {
    pub fn new(id: impl Into<String>, url: impl Into<String>, predicate: Arc<dyn Predicate>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            alert_label: None,
            predicate,
        }
    }

    pub fn from_spec(
        id: impl Into<String>,
        url: impl Into<String>,
        spec: &PredicateSpec,
    ) -> Result<Self, PredicateError> {
        Ok(Self::new(id, url, Arc::new(spec.compile()?)))
    }

    pub fn with_alert_label(mut self, label: impl Into<String>) -> Self {
        self.alert_label = Some(label.into());
        self
    }

    /// Name used in alert subjects and bodies.
    pub fn label(&self) -> &str {
        self.alert_label.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("alert_label", &self.alert_label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicate_detects_disabled_button() {
        let p = PredicateSpec::default().compile().unwrap();
        let sold_out = r#"<button id="AddToCart-product-template" disabled="disabled">Sold out</button>"#;
        let in_stock = r#"<button id="AddToCart-product-template">Add to cart</button>"#;
        assert!(!p.evaluate(sold_out).unwrap());
        assert!(p.evaluate(in_stock).unwrap());
    }

    #[test]
    fn contains_and_absent_are_inverse() {
        let contains = PredicateSpec::Contains { text: "In stock".into() }.compile().unwrap();
        let absent = PredicateSpec::Absent { text: "In stock".into() }.compile().unwrap();
        assert!(contains.evaluate("<p>In stock</p>").unwrap());
        assert!(!absent.evaluate("<p>In stock</p>").unwrap());
    }

    #[test]
    fn regex_predicates() {
        let m = PredicateSpec::Matches { pattern: r"qty:\s*[1-9]".into() }.compile().unwrap();
        assert!(m.evaluate("qty: 3").unwrap());
        assert!(!m.evaluate("qty: 0").unwrap());

        let n = PredicateSpec::NotMatches { pattern: "(?i)sold out".into() }.compile().unwrap();
        assert!(!n.evaluate("SOLD OUT").unwrap());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = PredicateSpec::Matches { pattern: "(".into() }.compile().unwrap_err();
        assert!(matches!(err, PredicateError::Pattern { .. }));
    }

    #[test]
    fn spec_deserializes_from_tagged_table() {
        let spec: PredicateSpec =
            serde_json::from_str(r#"{"kind":"not_matches","pattern":"x+"}"#).unwrap();
        assert_eq!(spec, PredicateSpec::NotMatches { pattern: "x+".into() });
    }

    #[test]
    fn closures_are_predicates() {
        let target = Target::new("t", "https://shop.example.com/p", Arc::new(|body: &str| {
            Ok::<_, PredicateError>(body.len() > 3)
        }));
        assert!(target.predicate.evaluate("long body").unwrap());
        assert_eq!(target.label(), "t");
        assert_eq!(target.with_alert_label("Wheels").label(), "Wheels");
    }
}
