pub mod browser;
pub mod config;
pub mod error;
pub mod generate;
pub mod hash;
pub mod merge;
pub mod model;
pub mod pool;
pub mod render;
pub mod request;
pub mod server;
pub mod services;
pub mod telemetry;

// Re-export the types a binary or test harness wires together
pub use browser::{BrowserDriver, ChromiumDriver, PageSession, PrintOptions};
pub use config::Environment;
pub use error::{Error, Result};
pub use generate::GeneratePdfUrl;
pub use pool::{PagePool, PoolLimits, PoolStats};
pub use render::{PdfRenderer, RenderPipeline};
