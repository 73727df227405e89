mod common;
mod fetcher_tests;
mod pipeline_tests;
mod resolver_tests;
