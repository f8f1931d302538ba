//! Unit tests for the supervisor module.

mod mock_port_tests;
