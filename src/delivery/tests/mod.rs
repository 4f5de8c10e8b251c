//! Unit tests for delivery services.
