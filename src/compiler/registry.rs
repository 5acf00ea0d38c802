//! Verb and Attribute Registries
//!
//! Read-only vocabularies supplied by the external catalog. The compiler only
//! asks membership questions; it never mutates a registry during compilation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum Jaro-Winkler similarity for a verb suggestion
const VERB_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Maximum suggestions returned for an unregistered verb
const MAX_SUGGESTIONS: usize = 3;

// =============================================================================
// YAML FILE SHAPES
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerbsConfig {
    #[serde(default)]
    pub domains: BTreeMap<String, DomainVerbs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainVerbs {
    #[serde(default)]
    pub description: String,
    /// Verb names relative to the domain ("verify" → "kyc.verify")
    #[serde(default)]
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributesConfig {
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// VERB REGISTRY
// =============================================================================

/// Set of allowed fully-qualified verb names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerbRegistry {
    verbs: BTreeSet<String>,
}

impl VerbRegistry {
    pub fn from_config(config: &VerbsConfig) -> Self {
        let verbs = config
            .domains
            .iter()
            .flat_map(|(domain, d)| d.verbs.iter().map(move |v| format!("{}.{}", domain, v)))
            .collect();
        Self { verbs }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let config: VerbsConfig = serde_yaml::from_str(yaml)?;
        Ok(Self::from_config(&config))
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.verbs.contains(verb)
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.verbs.iter().map(String::as_str)
    }

    /// Distinct domains (first dotted segment) covered by the registry
    pub fn domains(&self) -> BTreeSet<&str> {
        self.verbs.iter().map(|v| dsl_types::domain_of(v)).collect()
    }

    /// Closest registered verbs by Jaro-Winkler similarity, best first
    pub fn suggestions(&self, verb: &str) -> Vec<String> {
        let mut scored: Vec<(&String, f64)> = self
            .verbs
            .iter()
            .map(|candidate| (candidate, strsim::jaro_winkler(verb, candidate)))
            .filter(|(_, score)| *score >= VERB_SIMILARITY_THRESHOLD)
            .collect();
        // Stable sort keeps alphabetical order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(v, _)| v.clone())
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for VerbRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            verbs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// ATTRIBUTE REGISTRY
// =============================================================================

/// Attribute id → owning domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRegistry {
    attributes: BTreeMap<String, String>,
}

impl AttributeRegistry {
    pub fn from_config(config: &AttributesConfig) -> Self {
        config
            .attributes
            .iter()
            .map(|a| (a.id.clone(), a.domain.clone()))
            .collect()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let config: AttributesConfig = serde_yaml::from_str(yaml)?;
        Ok(Self::from_config(&config))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.attributes.contains_key(id)
    }

    pub fn domain_of(&self, id: &str) -> Option<&str> {
        self.attributes.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeRegistry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
