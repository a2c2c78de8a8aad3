//! Content database: the read-only, session-wide source of templates and
//! global rules.
//!
//! Loaded once from TOML files under the session root directory and shared
//! behind an `Arc` afterwards. Nothing mutates it after construction, so
//! every component reads it without locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::SessionConfig;
use crate::core::error::{ConfigurationError, SchemaViolation};
use crate::core::types::PlayerId;
use crate::data::manifest::{GameRules, Manifest, PlayerDef};
use crate::data::schema::{ComponentType, EntityTemplate};

/// Template and rule lookups for one session
#[derive(Debug)]
pub struct ContentDatabase {
    root: PathBuf,
    manifest: Manifest,
    /// Templates by id; ordered so iteration is reproducible
    templates: BTreeMap<String, Arc<EntityTemplate>>,
}

impl ContentDatabase {
    /// Load the manifest and every template below `root`
    pub fn load(root: &Path, config: &SessionConfig) -> Result<Self, ConfigurationError> {
        if !root.is_dir() {
            return Err(ConfigurationError::Missing(root.to_path_buf()));
        }

        let manifest_path = root.join(&config.manifest);
        let manifest_src = read_required(&manifest_path)?;
        let manifest = parse_manifest(&manifest_src, &manifest_path.display().to_string())?;

        let templates_dir = root.join(&manifest.info.templates);
        if !templates_dir.is_dir() {
            return Err(ConfigurationError::Missing(templates_dir));
        }

        let mut files = Vec::new();
        collect_toml_files(&templates_dir, &mut files)?;
        // read_dir order is platform dependent
        files.sort();

        let mut db = Self {
            root: root.to_path_buf(),
            manifest,
            templates: BTreeMap::new(),
        };

        for path in &files {
            let content = read_required(path)?;
            let template: EntityTemplate =
                toml::from_str(&content).map_err(|source| ConfigurationError::Toml {
                    origin: path.display().to_string(),
                    source,
                })?;
            db.insert(template)?;
        }

        if db.templates.is_empty() {
            return Err(ConfigurationError::NoTemplates(templates_dir));
        }

        db.finish();
        Ok(db)
    }

    /// Build a database from in-memory sources (tools and tests)
    pub fn from_toml(manifest: &str, templates: &[&str]) -> Result<Self, ConfigurationError> {
        let manifest = parse_manifest(manifest, "<manifest>")?;
        let mut db = Self {
            root: PathBuf::new(),
            manifest,
            templates: BTreeMap::new(),
        };

        for (i, src) in templates.iter().enumerate() {
            let template: EntityTemplate =
                toml::from_str(src).map_err(|source| ConfigurationError::Toml {
                    origin: format!("<template {}>", i),
                    source,
                })?;
            db.insert(template)?;
        }

        if db.templates.is_empty() {
            return Err(ConfigurationError::NoTemplates(PathBuf::from("<memory>")));
        }

        db.finish();
        Ok(db)
    }

    fn insert(&mut self, template: EntityTemplate) -> Result<(), ConfigurationError> {
        template.validate()?;
        let id = template.id().to_string();
        if self.templates.contains_key(&id) {
            return Err(ConfigurationError::DuplicateTemplate(id));
        }
        self.templates.insert(id, Arc::new(template));
        Ok(())
    }

    fn finish(&self) {
        for warning in self.lint() {
            tracing::warn!(content = %self.manifest.info.name, "{}", warning);
        }
        tracing::info!(
            content = %self.manifest.info.name,
            templates = self.templates.len(),
            players = self.manifest.players.len(),
            "Loaded content database"
        );
    }

    /// Dangling references and mistyped rules that will only fail once an
    /// entity uses them
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for template in self.templates.values() {
            let id = template.id();
            for dynamic in &template.dynamics {
                match template.schema(&dynamic.component) {
                    None => warnings.push(format!(
                        "'{}' dynamics reference undeclared component '{}'",
                        id, dynamic.component
                    )),
                    Some(ComponentType::Float { .. }) => {}
                    Some(other) => warnings.push(format!(
                        "'{}' dynamics target {} component '{}', only float is supported",
                        id,
                        other.type_name(),
                        dynamic.component
                    )),
                }
            }
            if let Some(depletion) = &template.despawn_when {
                match template.schema(&depletion.component) {
                    None => warnings.push(format!(
                        "'{}' despawn_when references undeclared component '{}'",
                        id, depletion.component
                    )),
                    Some(ComponentType::Bool { .. } | ComponentType::Text { .. }) => {
                        warnings.push(format!(
                            "'{}' despawn_when needs a numeric component, '{}' is not",
                            id, depletion.component
                        ))
                    }
                    Some(_) => {}
                }
            }
            if let Some(spawner) = &template.spawner {
                if !self.templates.contains_key(&spawner.template) {
                    warnings.push(format!(
                        "'{}' spawns unknown template '{}'",
                        id, spawner.template
                    ));
                }
            }
        }
        for start in &self.manifest.start {
            if !self.templates.contains_key(&start.template) {
                warnings.push(format!("start entity uses unknown template '{}'", start.template));
            }
        }
        warnings
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn rules(&self) -> &GameRules {
        &self.manifest.rules
    }

    pub fn players(&self) -> &[PlayerDef] {
        &self.manifest.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerDef> {
        self.manifest.player(id)
    }

    pub fn template(&self, id: &str) -> Option<&Arc<EntityTemplate>> {
        self.templates.get(id)
    }

    /// Template lookup as used at entity creation
    pub fn resolve(&self, id: &str) -> Result<Arc<EntityTemplate>, SchemaViolation> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| SchemaViolation::UnknownTemplate(id.to_string()))
    }

    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

fn read_required(path: &Path) -> Result<String, ConfigurationError> {
    if !path.exists() {
        return Err(ConfigurationError::Missing(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_manifest(src: &str, origin: &str) -> Result<Manifest, ConfigurationError> {
    let manifest: Manifest = toml::from_str(src).map_err(|source| ConfigurationError::Toml {
        origin: origin.to_string(),
        source,
    })?;
    manifest.validate()?;
    Ok(manifest)
}

fn collect_toml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigurationError> {
    let io_err = |source| ConfigurationError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry_path = entry.map_err(io_err)?.path();
        if entry_path.is_dir() {
            collect_toml_files(&entry_path, out)?;
        } else if entry_path.extension().map_or(false, |ext| ext == "toml") {
            out.push(entry_path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[info]
name = "unit"

[[players]]
id = 1
name = "Blue"
team = 1

[terrain]
width = 4
height = 4
fill = "grass"
[[terrain.tiles]]
id = "grass"
"#;

    const HUT: &str = r#"
[meta]
id = "hut"
name = "Hut"
kind = "building"

[spawner]
template = "peasant"
interval = 5.0
"#;

    #[test]
    fn test_from_toml() {
        let db = ContentDatabase::from_toml(MANIFEST, &[HUT]).unwrap();
        assert_eq!(db.template_count(), 1);
        assert!(db.template("hut").is_some());
        assert_eq!(db.players().len(), 1);
        assert_eq!(db.template_ids().collect::<Vec<_>>(), vec!["hut"]);
    }

    #[test]
    fn test_missing_template_is_resolve_error_not_load_error() {
        let db = ContentDatabase::from_toml(MANIFEST, &[HUT]).unwrap();
        assert!(matches!(
            db.resolve("peasant"),
            Err(SchemaViolation::UnknownTemplate(ref id)) if id == "peasant"
        ));
        let lint = db.lint();
        assert_eq!(lint.len(), 1);
        assert!(lint[0].contains("peasant"));
    }

    #[test]
    fn test_lint_flags_non_float_dynamics() {
        const LAMP: &str = r#"
[meta]
id = "lamp"
name = "Lamp"

[components.lit]
type = "bool"
default = true

[components.fuel]
type = "int"
min = 0
max = 10
default = 10

[[dynamics]]
component = "fuel"
rate = -1.0

[despawn_when]
component = "lit"
at_or_below = 0.0
"#;
        let db = ContentDatabase::from_toml(MANIFEST, &[LAMP]).unwrap();
        let lint = db.lint();
        assert_eq!(lint.len(), 2);
        assert!(lint[0].contains("int component 'fuel'"));
        assert!(lint[1].contains("'lit'"));
    }

    #[test]
    fn test_duplicate_template() {
        let err = ContentDatabase::from_toml(MANIFEST, &[HUT, HUT]).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateTemplate(ref id) if id == "hut"));
    }

    #[test]
    fn test_no_templates() {
        let err = ContentDatabase::from_toml(MANIFEST, &[]).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoTemplates(_)));
    }

    #[test]
    fn test_bad_toml_is_configuration_error() {
        let err = ContentDatabase::from_toml("[info", &[HUT]).unwrap_err();
        assert!(matches!(err, ConfigurationError::Toml { .. }));
    }

    #[test]
    fn test_missing_root() {
        let err =
            ContentDatabase::load(Path::new("no/such/root"), &SessionConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing(_)));
    }
}
