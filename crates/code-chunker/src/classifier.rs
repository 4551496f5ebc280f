use crate::types::{CodeChunk, Layer, PatternSet, PatternTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Feature tag for chunks outside any feature root
pub const SHARED_FEATURE: &str = "shared";

/// Directory-name conventions for layers and features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Layer -> directory names that mark it
    pub layers: BTreeMap<Layer, Vec<String>>,

    /// Directories whose direct children name features
    pub feature_roots: Vec<String>,
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

impl Default for LayerConfig {
    fn default() -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(
            Layer::Presentation,
            names(&[
                "components", "screens", "pages", "views", "ui", "widgets", "layouts",
            ]),
        );
        layers.insert(
            Layer::BusinessLogic,
            names(&[
                "services", "hooks", "store", "stores", "redux", "slices", "state", "contexts",
                "context", "usecases", "domain",
            ]),
        );
        layers.insert(
            Layer::DataAccess,
            names(&[
                "api",
                "repositories",
                "repository",
                "models",
                "db",
                "database",
                "data",
                "queries",
                "graphql",
            ]),
        );
        layers.insert(
            Layer::Infrastructure,
            names(&[
                "config",
                "utils",
                "lib",
                "helpers",
                "navigation",
                "constants",
                "theme",
                "infra",
                "setup",
            ]),
        );
        Self {
            layers,
            feature_roots: names(&["features", "modules", "screens", "pages"]),
        }
    }
}

impl LayerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.contains_key(&Layer::Unclassified) {
            return Err("layer 'unclassified' cannot be mapped to directories".to_string());
        }
        let blank = self
            .layers
            .values()
            .flatten()
            .chain(self.feature_roots.iter())
            .any(|name| name.trim().is_empty() || name.contains(['/', '\\']));
        if blank {
            return Err("directory names must be single, non-empty path segments".to_string());
        }
        Ok(())
    }
}

/// Assigns one layer and one feature tag per chunk
#[derive(Debug, Clone)]
pub struct LayerClassifier {
    directories: HashMap<String, Layer>,
    feature_roots: HashSet<String>,
}

impl Default for LayerClassifier {
    fn default() -> Self {
        Self::new(&LayerConfig::default())
    }
}

impl LayerClassifier {
    pub fn new(config: &LayerConfig) -> Self {
        let mut directories = HashMap::new();
        for (layer, dirs) in &config.layers {
            for dir in dirs {
                // First layer in declaration order wins a shared name.
                directories.entry(dir.to_lowercase()).or_insert(*layer);
            }
        }
        Self {
            directories,
            feature_roots: config
                .feature_roots
                .iter()
                .map(|root| root.to_lowercase())
                .collect(),
        }
    }

    /// Layer from the deepest matching directory, else from pattern tags
    pub fn layer(&self, path: &str, patterns: &PatternSet) -> Layer {
        let segments = segments(path);
        let dirs = &segments[..segments.len().saturating_sub(1)];
        dirs.iter()
            .rev()
            .find_map(|dir| self.directories.get(&dir.to_lowercase()).copied())
            .unwrap_or_else(|| layer_from_patterns(patterns))
    }

    /// First segment below a feature root (file stem if it is the file), else `shared`
    pub fn feature(&self, path: &str) -> String {
        let segments = segments(path);
        let Some(root) = segments
            .iter()
            .position(|segment| self.feature_roots.contains(&segment.to_lowercase()))
        else {
            return SHARED_FEATURE.to_string();
        };
        match segments.get(root + 1) {
            Some(name) if root + 2 < segments.len() => (*name).to_string(),
            Some(file) => file
                .split_once('.')
                .map_or(*file, |(stem, _)| stem)
                .to_string(),
            None => SHARED_FEATURE.to_string(),
        }
    }

    pub fn classify(&self, path: &str, patterns: &PatternSet) -> (Layer, String) {
        (self.layer(path, patterns), self.feature(path))
    }

    /// Tag chunks in place
    pub fn apply(&self, chunks: &mut [CodeChunk]) {
        for chunk in chunks {
            let (layer, feature) = self.classify(&chunk.file_path, &chunk.metadata.patterns);
            chunk.metadata.layer = layer;
            chunk.metadata.feature = feature;
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

fn layer_from_patterns(patterns: &PatternSet) -> Layer {
    if patterns.contains(&PatternTag::Network) {
        Layer::DataAccess
    } else if patterns.contains(&PatternTag::State) || patterns.contains(&PatternTag::Context) {
        Layer::BusinessLogic
    } else if patterns.contains(&PatternTag::Stylesheet)
        || patterns.contains(&PatternTag::Navigation)
    {
        Layer::Presentation
    } else {
        Layer::Unclassified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(items: &[PatternTag]) -> PatternSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_path_match_takes_precedence() {
        let classifier = LayerClassifier::default();
        let network = tags(&[PatternTag::Network]);
        assert_eq!(
            classifier.layer("src/components/Button.tsx", &network),
            Layer::Presentation
        );
        assert_eq!(
            classifier.layer("src/Components/hooks/useAuth.ts", &PatternSet::new()),
            Layer::BusinessLogic
        );
        assert_eq!(
            classifier.layer("src/api/client.ts", &PatternSet::new()),
            Layer::DataAccess
        );
    }

    #[test]
    fn test_pattern_fallback() {
        let classifier = LayerClassifier::default();
        assert_eq!(
            classifier.layer("src/App.tsx", &tags(&[PatternTag::Network, PatternTag::State])),
            Layer::DataAccess
        );
        assert_eq!(
            classifier.layer("src/App.tsx", &tags(&[PatternTag::Context])),
            Layer::BusinessLogic
        );
        assert_eq!(
            classifier.layer("src/App.tsx", &tags(&[PatternTag::Stylesheet])),
            Layer::Presentation
        );
        assert_eq!(
            classifier.layer("src/App.tsx", &tags(&[PatternTag::Hooks, PatternTag::Test])),
            Layer::Unclassified
        );
    }

    #[test]
    fn test_file_name_is_not_a_directory_match() {
        let classifier = LayerClassifier::default();
        assert_eq!(
            classifier.layer("src/api.ts", &PatternSet::new()),
            Layer::Unclassified
        );
    }

    #[test]
    fn test_feature_tags() {
        let classifier = LayerClassifier::default();
        assert_eq!(classifier.feature("src/features/auth/Login.tsx"), "auth");
        assert_eq!(classifier.feature("src/screens/Home.tsx"), "Home");
        assert_eq!(classifier.feature("src/utils/date.ts"), SHARED_FEATURE);
        assert_eq!(classifier.feature("features"), SHARED_FEATURE);
    }

    #[test]
    fn test_custom_config() {
        let mut config = LayerConfig::default();
        config.layers.clear();
        config
            .layers
            .insert(Layer::Infrastructure, vec!["Platform".to_string()]);
        config.feature_roots = vec!["apps".to_string()];
        let classifier = LayerClassifier::new(&config);

        let (layer, feature) =
            classifier.classify("apps/billing/platform/queue.ts", &PatternSet::new());
        assert_eq!(layer, Layer::Infrastructure);
        assert_eq!(feature, "billing");
    }

    #[test]
    fn test_config_validation() {
        let mut config = LayerConfig::default();
        assert!(config.validate().is_ok());
        config
            .layers
            .insert(Layer::Unclassified, vec!["misc".to_string()]);
        assert!(config.validate().is_err());

        let mut config = LayerConfig::default();
        config.feature_roots.push("a/b".to_string());
        assert!(config.validate().is_err());
    }
}
