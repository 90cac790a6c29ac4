mod concurrency_tests;
mod filename_tests;
mod helpers;
