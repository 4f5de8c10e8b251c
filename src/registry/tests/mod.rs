//! Unit tests for the instance registry.
