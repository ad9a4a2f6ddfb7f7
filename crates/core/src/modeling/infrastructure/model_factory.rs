use crate::modeling::domain::background_model::BackgroundModel;
use crate::modeling::domain::model_config::{Algorithm, ModelConfig};
use crate::shared::error::PipelineError;

use super::gmg_model::GmgModel;
use super::knn_model::KnnModel;
use super::mog2_model::Mog2Model;
use super::mog_model::MogModel;

/// Creates the background model selected by `config`.
///
/// MOG and GMG have no shadow label, so `detect_shadows` only reaches MOG2
/// and KNN. For GMG, `history` is the number of initialization frames.
pub fn create_model(config: &ModelConfig) -> Box<dyn BackgroundModel> {
    let history = config.history();
    let shadows = config.shadows_enabled();
    log::info!(
        "Using {} background model (history={}, detect_shadows={})",
        config.algorithm(),
        history,
        shadows
    );
    match config.algorithm() {
        Algorithm::Mog => Box::new(MogModel::new(history)),
        Algorithm::Mog2 => Box::new(Mog2Model::new(history, shadows)),
        Algorithm::Gmg => Box::new(GmgModel::new(history)),
        Algorithm::Knn => Box::new(KnnModel::new(history, shadows)),
    }
}

/// Parses `name` and validates `history` before creating the model.
pub fn create_model_by_name(
    name: &str,
    history: i64,
    detect_shadows: bool,
) -> Result<Box<dyn BackgroundModel>, PipelineError> {
    let algorithm: Algorithm = name.parse()?;
    let config = ModelConfig::new(algorithm, history, detect_shadows)?;
    Ok(create_model(&config))
}
