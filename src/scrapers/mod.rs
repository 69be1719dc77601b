pub mod browser;
pub mod extractor;
pub mod http;
pub mod normalize;
pub mod orchestrator;
pub mod pagination;
pub mod retry;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use browser::BrowserNavigator;
pub use extractor::ListingExtractor;
pub use http::HttpNavigator;
pub use orchestrator::CategoryOrchestrator;
pub use pagination::{PaginationWalker, WalkSettings};
pub use retry::RetryPolicy;
pub use traits::Navigator;
