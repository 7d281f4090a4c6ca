//! YAML manifest emitter

use super::{Artifact, Emitter, GenerationError};
use crate::model::ConfigurationModel;

pub struct YamlEmitter;

impl Emitter for YamlEmitter {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let rendered = serde_yaml::to_string(model).map_err(|err| GenerationError::Emitter {
            emitter: self.name(),
            reason: err.to_string(),
        })?;

        Ok(vec![Artifact::text("yaml/config.yaml", rendered)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parses_back() {
        let model = ConfigurationModel::from_toml_str(
            "[identity]\nhostname = \"host\"\n[packages]\ninstall = [\"htop\"]\n",
        )
        .unwrap();

        let files = YamlEmitter.emit(&model).unwrap();
        let parsed: ConfigurationModel = serde_yaml::from_str(&files[0].contents).unwrap();
        assert_eq!(parsed, model);
    }
}
