pub mod config;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod gate;
pub mod index;
pub mod normalize;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod publish;
pub mod schema;
pub mod store;
