//! Unit tests for the connector contract.
