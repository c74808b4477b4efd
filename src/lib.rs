pub mod config;
pub mod errors;
pub mod inference;
pub mod initialization;
pub mod logging;
pub mod manager_corrector;
pub mod manager_forecaster;
pub mod manager_model_client;
pub mod manager_model_service;
pub mod models;
pub mod prediction;
pub mod worker;

pub mod proto {
    tonic::include_proto!("model");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("model_descriptor");
}
