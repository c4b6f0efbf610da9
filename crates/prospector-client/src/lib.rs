pub mod extract;
pub mod http_source;
pub mod strategy;

#[cfg(feature = "browser")]
pub mod browser_source;

pub use extract::SelectorExtractor;
pub use http_source::HttpSource;
pub use strategy::{Field, FieldChain, Strategy};

#[cfg(feature = "browser")]
pub use browser_source::BrowserSource;
