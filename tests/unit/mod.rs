mod aggregate_tests;
mod concurrency_tests;
mod journal_tests;
#[cfg(feature = "mmap")]
mod mmap_tests;
mod property_tests;
