pub mod gmg_model;
pub mod knn_model;
pub mod model_factory;
pub mod mog2_model;
pub mod mog_model;
mod pixel_math;
#[cfg(test)]
pub(crate) mod test_scenes;
