//! Unit tests for the staging context.
