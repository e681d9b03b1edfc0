// Core modules implementing compression layers, record codecs, and error modeling.
pub mod compression;
pub mod error;
pub mod frame;
pub mod json;
pub(crate) mod naming;
pub mod proto;
pub mod record;
