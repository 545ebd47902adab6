mod crawl_tests;
mod download_tests;
