mod bundle_tests;
mod common;
mod pipeline_tests;
mod watch_tests;
