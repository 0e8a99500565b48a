//! Integration tests for Danmaku-Harvest

mod harvest_tests;
