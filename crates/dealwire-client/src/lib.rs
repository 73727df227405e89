#[cfg(feature = "browser")]
pub mod browser;
pub mod fetcher;
pub mod http;
pub mod resolver;

#[cfg(feature = "browser")]
pub use browser::BrowserRenderer;
pub use fetcher::ReqwestFetcher;
pub use http::HttpOptions;
pub use resolver::ReqwestResolver;
