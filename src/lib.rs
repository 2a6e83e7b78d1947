pub mod app;
pub mod config;
mod geo;
mod hash;
pub mod map;
pub mod model;
pub mod raster;
pub mod store;
pub mod tracking;
pub mod ui;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
