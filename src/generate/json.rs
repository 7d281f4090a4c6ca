//! JSON manifest emitter

use super::{Artifact, Emitter, GenerationError};
use crate::model::ConfigurationModel;

pub struct JsonEmitter;

impl Emitter for JsonEmitter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let rendered =
            serde_json::to_string_pretty(model).map_err(|err| GenerationError::Emitter {
                emitter: self.name(),
                reason: err.to_string(),
            })?;

        Ok(vec![Artifact::text("json/config.json", rendered + "\n")])
    }
}
