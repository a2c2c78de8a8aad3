//! Entity template schema types for TOML deserialization.
//!
//! A template declares the component set an entity carries, the value range
//! of every component, and the data-driven behaviour (dynamics, depletion,
//! spawning, movement) the world runs for it each tick. Templates are the
//! single source of truth for which component shapes are valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigurationError, SchemaViolation};

/// A component value held by an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ComponentValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentValue::Bool(_) => "bool",
            ComponentValue::Int(_) => "int",
            ComponentValue::Float(_) => "float",
            ComponentValue::Text(_) => "text",
        }
    }

    /// Numeric view, for int and float components
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ComponentValue::Int(v) => Some(*v as f64),
            ComponentValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentValue::Bool(v) => write!(f, "{}", v),
            ComponentValue::Int(v) => write!(f, "{}", v),
            ComponentValue::Float(v) => write!(f, "{}", v),
            ComponentValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Type definition for a template component
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ComponentType {
    /// Floating-point component with range constraints
    Float { min: f64, max: f64, default: f64 },
    /// Integer component with range constraints
    Int { min: i64, max: i64, default: i64 },
    /// Boolean flag
    Bool { default: bool },
    /// Free text, optionally restricted to a fixed set of values
    Text {
        default: String,
        #[serde(default)]
        allowed: Vec<String>,
    },
}

impl ComponentType {
    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentType::Float { .. } => "float",
            ComponentType::Int { .. } => "int",
            ComponentType::Bool { .. } => "bool",
            ComponentType::Text { .. } => "text",
        }
    }

    pub fn default_value(&self) -> ComponentValue {
        match self {
            ComponentType::Float { default, .. } => ComponentValue::Float(*default),
            ComponentType::Int { default, .. } => ComponentValue::Int(*default),
            ComponentType::Bool { default } => ComponentValue::Bool(*default),
            ComponentType::Text { default, .. } => ComponentValue::Text(default.clone()),
        }
    }

    /// Numeric bounds, for int and float components
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            ComponentType::Float { min, max, .. } => Some((*min, *max)),
            ComponentType::Int { min, max, .. } => Some((*min as f64, *max as f64)),
            _ => None,
        }
    }

    /// Check the definition itself is coherent (min <= default <= max)
    fn check_definition(&self) -> Result<(), String> {
        match self {
            ComponentType::Float { min, max, default } => {
                if !(min.is_finite() && max.is_finite() && default.is_finite()) {
                    return Err("float bounds must be finite".into());
                }
                if min > max || default < min || default > max {
                    return Err(format!("default {} not within [{}, {}]", default, min, max));
                }
            }
            ComponentType::Int { min, max, default } => {
                if min > max || default < min || default > max {
                    return Err(format!("default {} not within [{}, {}]", default, min, max));
                }
            }
            ComponentType::Bool { .. } => {}
            ComponentType::Text { default, allowed } => {
                if !allowed.is_empty() && !allowed.contains(default) {
                    return Err(format!("default '{}' is not an allowed value", default));
                }
            }
        }
        Ok(())
    }

    /// Validate a value against this definition
    ///
    /// Integers are accepted for float components and widened. Anything
    /// else must match the declared type exactly.
    pub fn check(
        &self,
        template: &str,
        component: &str,
        value: ComponentValue,
    ) -> Result<ComponentValue, SchemaViolation> {
        let out_of_range = |value: f64, min: f64, max: f64| SchemaViolation::OutOfRange {
            template: template.to_string(),
            component: component.to_string(),
            value,
            min,
            max,
        };

        match (self, value) {
            (ComponentType::Float { min, max, .. }, ComponentValue::Float(v)) => {
                if v.is_nan() || v < *min || v > *max {
                    return Err(out_of_range(v, *min, *max));
                }
                Ok(ComponentValue::Float(v))
            }
            (ComponentType::Float { min, max, .. }, ComponentValue::Int(v)) => {
                let v = v as f64;
                if v < *min || v > *max {
                    return Err(out_of_range(v, *min, *max));
                }
                Ok(ComponentValue::Float(v))
            }
            (ComponentType::Int { min, max, .. }, ComponentValue::Int(v)) => {
                if v < *min || v > *max {
                    return Err(out_of_range(v as f64, *min as f64, *max as f64));
                }
                Ok(ComponentValue::Int(v))
            }
            (ComponentType::Bool { .. }, ComponentValue::Bool(v)) => Ok(ComponentValue::Bool(v)),
            (ComponentType::Text { allowed, .. }, ComponentValue::Text(v)) => {
                if !allowed.is_empty() && !allowed.contains(&v) {
                    return Err(SchemaViolation::NotAllowed {
                        template: template.to_string(),
                        component: component.to_string(),
                        value: v,
                    });
                }
                Ok(ComponentValue::Text(v))
            }
            (expected, found) => Err(SchemaViolation::TypeMismatch {
                template: template.to_string(),
                component: component.to_string(),
                expected: expected.type_name(),
                found: found.type_name(),
            }),
        }
    }
}

/// Broad category of a template, used for filtering and renderer hints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Unit,
    Building,
    Resource,
}

/// Template metadata
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateMeta {
    /// Unique string identifier; this is the template reference
    pub id: String,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// Score credited to the owner when an entity of this template spawns
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub description: String,
}

/// Movement capability (tiles per second)
#[derive(Debug, Clone, Deserialize)]
pub struct MovementDef {
    pub speed: f64,
}

/// Constant per-second change applied to a numeric component
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicsDef {
    pub component: String,
    pub rate: f64,
}

/// Despawn the entity once a component drops to a threshold
#[derive(Debug, Clone, Deserialize)]
pub struct DepletionDef {
    pub component: String,
    #[serde(default)]
    pub at_or_below: f64,
}

/// Periodically spawn another template next to this entity
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnerDef {
    pub template: String,
    /// Seconds between spawns
    pub interval: f64,
    /// Total number of spawns before the spawner goes idle
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Complete entity template definition
#[derive(Debug, Clone, Deserialize)]
pub struct EntityTemplate {
    pub meta: TemplateMeta,
    /// Component definitions (name -> type)
    #[serde(default)]
    pub components: BTreeMap<String, ComponentType>,
    #[serde(default)]
    pub movement: Option<MovementDef>,
    #[serde(default)]
    pub dynamics: Vec<DynamicsDef>,
    #[serde(default)]
    pub despawn_when: Option<DepletionDef>,
    #[serde(default)]
    pub spawner: Option<SpawnerDef>,
}

impl EntityTemplate {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn schema(&self, component: &str) -> Option<&ComponentType> {
        self.components.get(component)
    }

    /// Default values for every declared component
    pub fn default_components(&self) -> BTreeMap<String, ComponentValue> {
        self.components
            .iter()
            .map(|(name, ty)| (name.clone(), ty.default_value()))
            .collect()
    }

    /// Validate a component value against this template's schema
    pub fn check_component(
        &self,
        component: &str,
        value: ComponentValue,
    ) -> Result<ComponentValue, SchemaViolation> {
        let ty = self
            .schema(component)
            .ok_or_else(|| SchemaViolation::UnknownComponent {
                template: self.meta.id.clone(),
                component: component.to_string(),
            })?;
        ty.check(&self.meta.id, component, value)
    }

    pub fn speed(&self) -> f64 {
        self.movement.as_ref().map_or(0.0, |m| m.speed)
    }

    /// Structural validation performed at load time
    ///
    /// References to other templates or undeclared components are not
    /// checked here; those surface as schema violations when used.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidSchema {
            template: self.meta.id.clone(),
            reason,
        };

        if self.meta.id.trim().is_empty() {
            return Err(invalid("empty template id".into()));
        }

        for (name, ty) in &self.components {
            ty.check_definition()
                .map_err(|reason| invalid(format!("component '{}': {}", name, reason)))?;
        }

        if let Some(movement) = &self.movement {
            if !movement.speed.is_finite() || movement.speed < 0.0 {
                return Err(invalid(format!("movement speed {} must be >= 0", movement.speed)));
            }
        }

        for dynamic in &self.dynamics {
            if !dynamic.rate.is_finite() {
                return Err(invalid(format!(
                    "dynamics rate for '{}' must be finite",
                    dynamic.component
                )));
            }
        }

        if let Some(spawner) = &self.spawner {
            if !spawner.interval.is_finite() || spawner.interval <= 0.0 {
                return Err(invalid(format!(
                    "spawner interval {} must be > 0",
                    spawner.interval
                )));
            }
        }

        Ok(())
    }
}
