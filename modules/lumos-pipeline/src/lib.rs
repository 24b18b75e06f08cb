pub mod cache;
pub mod chain;
pub mod extractor;
pub mod grouper;
pub mod pipeline;
pub mod providers;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod verifier;

#[cfg(test)]
mod chain_tests;
